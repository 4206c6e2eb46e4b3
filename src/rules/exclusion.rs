// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Rules that look only at the shape of a file name

use super::CategoryRule;

/// Extensions that are never moved by default
pub const DEFAULT_IGNORED_EXTENSIONS: &[&str] =
    &[".jpeg", ".jpg", ".nfo", ".sub", ".idx", ".torrent", ".png"];

/// Matches names starting with a dot
#[derive(Debug, Clone, Copy, Default)]
pub struct DotfileRule;

impl CategoryRule for DotfileRule {
    fn name(&self) -> &'static str {
        "dotfile"
    }

    fn matches(&self, file_name: &str) -> bool {
        file_name.starts_with('.')
    }
}

/// Case-insensitive suffix match against a set of extensions
///
/// Extensions are stored lowercase with a leading dot, so `"PDF"`, `"pdf"`
/// and `".pdf"` all configure the same rule.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRule {
    extensions: Vec<String>,
}

impl ExtensionRule {
    /// Rule with the default ignore list
    pub fn ignored() -> Self {
        Self::with_extensions(DEFAULT_IGNORED_EXTENSIONS.iter().copied())
    }

    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rule = Self::default();
        rule.extend(extensions);
        rule
    }

    pub fn extend<I, S>(&mut self, extensions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for ext in extensions {
            if let Some(ext) = normalize_extension(ext.as_ref()) {
                if !self.extensions.contains(&ext) {
                    self.extensions.push(ext);
                }
            }
        }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl CategoryRule for ExtensionRule {
    fn name(&self) -> &'static str {
        "extension"
    }

    fn matches(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }
}

/// Lowercase an extension and give it a leading dot; `None` for blanks
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(".{}", trimmed.to_lowercase()))
}

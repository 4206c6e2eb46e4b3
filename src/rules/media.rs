// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Media naming rules: TV episode tokens and release keywords

use regex::Regex;

use super::CategoryRule;
use crate::Result;

/// Default episode token, e.g. `S01E02`
pub const DEFAULT_EPISODE_PATTERN: &str = r"(?i)S\d{2}E\d{2}";

/// Default movie release keywords
pub const DEFAULT_MOVIE_KEYWORDS: &[&str] = &["720p", "1080p", "bluray", "webrip", "dvdrip"];

/// Matches file names carrying a season/episode token
#[derive(Debug, Clone)]
pub struct EpisodeRule {
    pattern: Regex,
}

impl EpisodeRule {
    pub fn new() -> Result<Self> {
        Self::with_pattern(DEFAULT_EPISODE_PATTERN)
    }

    /// Build from a custom regular expression
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl CategoryRule for EpisodeRule {
    fn name(&self) -> &'static str {
        "episode"
    }

    fn matches(&self, file_name: &str) -> bool {
        self.pattern.is_match(file_name)
    }
}

/// Case-insensitive substring match against a keyword set
#[derive(Debug, Clone, Default)]
pub struct KeywordRule {
    keywords: Vec<String>,
}

impl KeywordRule {
    /// Rule with the default movie keywords
    pub fn movies() -> Self {
        Self::with_keywords(DEFAULT_MOVIE_KEYWORDS.iter().copied())
    }

    pub fn with_keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rule = Self::default();
        rule.extend(keywords);
        rule
    }

    /// Add keywords; blanks and duplicates are dropped
    pub fn extend<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !self.keywords.contains(&keyword) {
                self.keywords.push(keyword);
            }
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl CategoryRule for KeywordRule {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn matches(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

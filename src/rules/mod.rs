// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Filename rules used by the classifier
//!
//! Each rule is a single predicate over a file name. Rules know nothing about
//! categories or ordering; the [`crate::classifier::CategoryMap`] pairs every
//! rule with an action and decides the priority.

pub mod exclusion;
pub mod glob;
pub mod media;

use std::borrow::Cow;
use std::path::Path;

pub use exclusion::{DotfileRule, ExtensionRule};
pub use glob::GlobRule;
pub use media::{EpisodeRule, KeywordRule};

/// A single classification predicate
pub trait CategoryRule: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether the rule matches this file name (never a full path)
    fn matches(&self, file_name: &str) -> bool;

    /// Convenience wrapper that extracts the file name from a path
    fn matches_path(&self, path: &Path) -> bool {
        file_name_of(path).is_some_and(|name| self.matches(&name))
    }
}

/// Final path component as a string, lossily converted
pub fn file_name_of(path: &Path) -> Option<Cow<'_, str>> {
    path.file_name().map(|n| n.to_string_lossy())
}

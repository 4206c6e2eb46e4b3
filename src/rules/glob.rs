// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Glob rules for user-defined categories

use glob::{MatchOptions, Pattern};

use super::CategoryRule;
use crate::Result;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Case-insensitive glob over the file name, e.g. `*.epub` or `*invoice*`
#[derive(Debug, Clone)]
pub struct GlobRule {
    pattern: Pattern,
}

impl GlobRule {
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Pattern::new(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl CategoryRule for GlobRule {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn matches(&self, file_name: &str) -> bool {
        self.pattern.matches_with(file_name, MATCH_OPTIONS)
    }
}

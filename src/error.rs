// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for tidywatch

use thiserror::Error;

/// Result type alias for tidywatch operations
pub type Result<T> = std::result::Result<T, TidywatchError>;

/// tidywatch error types
///
/// Per-file transfer problems never show up here; the relocation executor
/// turns them into a [`crate::relocate::TransferOutcome`]. These are the
/// failures that stop startup or a whole pipeline.
#[derive(Error, Debug)]
pub enum TidywatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Glob error: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! tidywatch: folder-watching file organizer
//!
//! Watches download directories, classifies each new file by its name and
//! moves it into a category directory (TV, Movies, ...) under a destination
//! root without ever overwriting an existing file.

pub mod classifier;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod relocate;
pub mod rules;
pub mod sweep;
pub mod watcher;

pub use classifier::{CategoryMap, Classification, Classifier, Route};
pub use config::OrganizerConfig;
pub use error::{Result, TidywatchError};
pub use pipeline::{Pipeline, PipelineOptions};
pub use relocate::{Relocator, TransferOutcome, TransferStatus};
pub use watcher::{EventSource, FileEvent, FileWatcher, WatchTarget};

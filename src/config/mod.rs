// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration for tidywatch
//!
//! There is no configuration file. The binary builds an [`OrganizerConfig`]
//! from command-line arguments and environment variables, then calls
//! [`OrganizerConfig::into_validated`] before anything touches the disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::relocate::TransferMode;
use crate::rules::exclusion::{normalize_extension, DEFAULT_IGNORED_EXTENSIONS};
use crate::rules::media::{DEFAULT_EPISODE_PATTERN, DEFAULT_MOVIE_KEYWORDS};
use crate::watcher::{WatchTarget, WatcherBackend};
use crate::{Result, TidywatchError};

pub const DEFAULT_DESTINATION_ROOT: &str = "/media";
pub const DEFAULT_TV_DIR: &str = "TV";
pub const DEFAULT_MOVIES_DIR: &str = "Movies";
pub const DEFAULT_OTHER_DIR: &str = "Other";

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OrganizerConfig {
    /// Directories to watch, one pipeline each
    pub watch_roots: Vec<PathBuf>,

    /// Also watch subdirectories, including ones created later
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Root under which category directories are created
    #[serde(default = "default_destination_root")]
    pub destination_root: PathBuf,

    #[serde(default)]
    pub categories: CategoryConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Classify and log, never move
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CategoryConfig {
    #[serde(default = "default_true")]
    pub tv_enabled: bool,
    #[serde(default = "default_tv_dir")]
    pub tv_dir: String,
    #[serde(default = "default_episode_pattern")]
    pub episode_pattern: String,
    #[serde(default = "default_true")]
    pub movies_enabled: bool,
    #[serde(default = "default_movies_dir")]
    pub movies_dir: String,
    #[serde(default = "default_movie_keywords")]
    pub movie_keywords: Vec<String>,
    /// Checked before the TV and movie rules
    #[serde(default)]
    pub extension_routes: Vec<ExtensionRoute>,
    /// Checked after extension routes, before the TV and movie rules
    #[serde(default)]
    pub glob_routes: Vec<GlobRoute>,
    #[serde(default)]
    pub unclassified: UnclassifiedMode,
    #[serde(default = "default_other_dir")]
    pub other_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub ignore_dotfiles: bool,
    #[serde(default = "default_ignored_extensions")]
    pub ignored_extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TransferConfig {
    #[serde(default)]
    pub mode: TransferMode,
    /// Compare BLAKE3 digests after copying across filesystems
    #[serde(default)]
    pub verify_hash: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatcherConfig {
    /// Use the polling backend with this interval instead of native events
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    /// Longest wait for a growing file to settle; 0 disables the check
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
}

/// What happens to files no rule matched
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnclassifiedMode {
    #[default]
    Skip,
    Route,
}

impl FromStr for UnclassifiedMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "route" | "other" => Ok(Self::Route),
            other => Err(format!("expected 'skip' or 'route', got '{}'", other)),
        }
    }
}

/// `EXT=DIR`: files with this extension go to `DIR`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ExtensionRoute {
    pub extension: String,
    pub directory: String,
}

impl FromStr for ExtensionRoute {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (ext, dir) = split_assignment(s)?;
        let extension = normalize_extension(ext)
            .ok_or_else(|| format!("empty extension in '{}'", s))?;
        Ok(Self {
            extension,
            directory: dir.to_string(),
        })
    }
}

/// `DIR=GLOB`: file names matching `GLOB` go to `DIR`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct GlobRoute {
    pub directory: String,
    pub pattern: String,
}

impl FromStr for GlobRoute {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (dir, pattern) = split_assignment(s)?;
        Ok(Self {
            directory: dir.to_string(),
            pattern: pattern.to_string(),
        })
    }
}

fn split_assignment(s: &str) -> std::result::Result<(&str, &str), String> {
    let (left, right) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let (left, right) = (left.trim(), right.trim());
    if left.is_empty() || right.is_empty() {
        return Err(format!("expected KEY=VALUE, got '{}'", s));
    }
    Ok((left, right))
}

// Default value functions
fn default_true() -> bool { true }
fn default_destination_root() -> PathBuf { PathBuf::from(DEFAULT_DESTINATION_ROOT) }
fn default_tv_dir() -> String { DEFAULT_TV_DIR.to_string() }
fn default_movies_dir() -> String { DEFAULT_MOVIES_DIR.to_string() }
fn default_other_dir() -> String { DEFAULT_OTHER_DIR.to_string() }
fn default_episode_pattern() -> String { DEFAULT_EPISODE_PATTERN.to_string() }
fn default_settle_secs() -> u64 { 10 }

fn default_movie_keywords() -> Vec<String> {
    DEFAULT_MOVIE_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

fn default_ignored_extensions() -> Vec<String> {
    DEFAULT_IGNORED_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            watch_roots: Vec::new(),
            recursive: true,
            destination_root: default_destination_root(),
            categories: CategoryConfig::default(),
            filters: FilterConfig::default(),
            transfer: TransferConfig::default(),
            watcher: WatcherConfig::default(),
            dry_run: false,
        }
    }
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            tv_enabled: true,
            tv_dir: default_tv_dir(),
            episode_pattern: default_episode_pattern(),
            movies_enabled: true,
            movies_dir: default_movies_dir(),
            movie_keywords: default_movie_keywords(),
            extension_routes: Vec::new(),
            glob_routes: Vec::new(),
            unclassified: UnclassifiedMode::Skip,
            other_dir: default_other_dir(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            ignore_dotfiles: true,
            ignored_extensions: default_ignored_extensions(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: None,
            settle_secs: default_settle_secs(),
        }
    }
}

impl WatcherConfig {
    pub fn backend(&self) -> WatcherBackend {
        match self.poll_interval_secs {
            Some(secs) => WatcherBackend::Poll(Duration::from_secs(secs)),
            None => WatcherBackend::Native,
        }
    }

    pub fn settle(&self) -> Option<Duration> {
        (self.settle_secs > 0).then(|| Duration::from_secs(self.settle_secs))
    }
}

impl OrganizerConfig {
    /// Configuration with defaults for the given roots
    pub fn for_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            watch_roots: roots.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// One target per watched root
    pub fn watch_targets(&self) -> Vec<WatchTarget> {
        self.watch_roots
            .iter()
            .map(|root| WatchTarget::new(root.clone(), self.recursive))
            .collect()
    }

    /// Directory names files can be routed to under the destination root
    pub fn category_dirs(&self) -> Vec<&str> {
        let cats = &self.categories;
        let mut dirs: Vec<&str> = Vec::new();
        let routed = cats
            .extension_routes
            .iter()
            .map(|r| r.directory.as_str())
            .chain(cats.glob_routes.iter().map(|r| r.directory.as_str()))
            .chain(cats.tv_enabled.then_some(cats.tv_dir.as_str()))
            .chain(cats.movies_enabled.then_some(cats.movies_dir.as_str()))
            .chain((cats.unclassified == UnclassifiedMode::Route).then_some(cats.other_dir.as_str()));
        for dir in routed {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }

    /// Check the configuration and resolve every path to its absolute form
    ///
    /// Watched roots must exist and be readable directories. The destination
    /// root may not exist yet; it is created on the first move.
    pub fn into_validated(mut self) -> Result<Self> {
        if self.watch_roots.is_empty() {
            return Err(TidywatchError::Config("no watch root given".to_string()));
        }

        let mut roots = Vec::with_capacity(self.watch_roots.len());
        for root in &self.watch_roots {
            let resolved = resolve_watch_root(root)?;
            if roots.contains(&resolved) {
                return Err(TidywatchError::Config(format!(
                    "watch root {:?} given more than once",
                    root
                )));
            }
            roots.push(resolved);
        }
        self.watch_roots = roots;
        self.destination_root = absolute_path(&self.destination_root)?;

        for root in &self.watch_roots {
            if self.destination_root == *root {
                return Err(TidywatchError::Config(format!(
                    "destination root {:?} is also a watched root",
                    root
                )));
            }
        }

        let cats = &mut self.categories;
        cats.tv_dir = check_directory_name("tv", &cats.tv_dir)?;
        cats.movies_dir = check_directory_name("movies", &cats.movies_dir)?;
        cats.other_dir = check_directory_name("other", &cats.other_dir)?;
        for route in &mut cats.extension_routes {
            route.directory = check_directory_name(&route.extension, &route.directory)?;
        }
        for route in &mut cats.glob_routes {
            route.directory = check_directory_name(&route.pattern, &route.directory)?;
        }

        // A root inside the destination is fine, but not inside a category
        for root in &self.watch_roots {
            for category in self.category_dirs() {
                let dir = self.destination_root.join(category);
                if root.starts_with(&dir) {
                    return Err(TidywatchError::Config(format!(
                        "watch root {:?} lies inside category directory {:?}",
                        root, dir
                    )));
                }
            }
        }

        if let Some(0) = self.watcher.poll_interval_secs {
            return Err(TidywatchError::Config(
                "poll interval must be at least one second".to_string(),
            ));
        }

        Ok(self)
    }
}

fn resolve_watch_root(root: &Path) -> Result<PathBuf> {
    let resolved = root.canonicalize().map_err(|e| {
        TidywatchError::Config(format!("cannot access watch root {:?}: {}", root, e))
    })?;
    if !resolved.is_dir() {
        return Err(TidywatchError::Config(format!(
            "watch root {:?} is not a directory",
            root
        )));
    }
    std::fs::read_dir(&resolved).map_err(|e| {
        TidywatchError::Config(format!("cannot read watch root {:?}: {}", root, e))
    })?;
    Ok(resolved)
}

/// Canonical path when it exists, otherwise joined onto the current directory
fn absolute_path(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Category directories are single path components; returns the trimmed name
fn check_directory_name(label: &str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    let valid = !trimmed.is_empty()
        && trimmed != "."
        && trimmed != ".."
        && !trimmed.contains(['/', '\\']);
    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(TidywatchError::Config(format!(
            "invalid category directory '{}' for {}",
            name, label
        )))
    }
}

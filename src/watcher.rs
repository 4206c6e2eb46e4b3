// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher for a single watched root

use async_trait::async_trait;
use chrono::{DateTime, Local};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::sweep;
use crate::Result;

/// How often a vanished root is checked for again
const ROOT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// A directory under observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTarget {
    pub root: PathBuf,
    pub recursive: bool,
}

impl WatchTarget {
    pub fn new(root: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            root: root.into(),
            recursive,
        }
    }

    fn recursive_mode(&self) -> RecursiveMode {
        if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        }
    }
}

/// A file that appeared, either live or during a sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub discovered_at: DateTime<Local>,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            discovered_at: Local::now(),
        }
    }
}

/// Which notification mechanism backs the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherBackend {
    /// inotify / FSEvents / ReadDirectoryChangesW
    Native,
    /// Degraded mode: rescan the tree at a fixed interval
    Poll(Duration),
}

/// Anything that yields file events one at a time
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event; `None` once the feed is closed for good
    async fn next_event(&mut self) -> Option<FileEvent>;
}

#[async_trait]
impl EventSource for mpsc::UnboundedReceiver<FileEvent> {
    async fn next_event(&mut self) -> Option<FileEvent> {
        self.recv().await
    }
}

/// File system watcher
pub struct FileWatcher {
    watcher: Box<dyn Watcher + Send>,
    target: WatchTarget,
    registered: bool,
    exclude: Vec<PathBuf>,
    event_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    pending: VecDeque<FileEvent>,
}

impl FileWatcher {
    /// Create a watcher and register the root
    ///
    /// Failing to register at startup is an error; losing the root later is not.
    pub fn new(target: WatchTarget, backend: WatcherBackend) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        };

        let watcher: Box<dyn Watcher + Send> = match backend {
            WatcherBackend::Native => Box::new(RecommendedWatcher::new(handler, Config::default())?),
            WatcherBackend::Poll(interval) => {
                warn!("Using polling watcher every {:?} for {:?}", interval, target.root);
                Box::new(PollWatcher::new(
                    handler,
                    Config::default().with_poll_interval(interval),
                )?)
            }
        };

        let mut this = Self {
            watcher,
            target,
            registered: false,
            exclude: Vec::new(),
            event_rx: rx,
            pending: VecDeque::new(),
        };
        this.register()?;
        Ok(this)
    }

    /// Never report files under these subtrees (the destination, or its
    /// category directories)
    pub fn exclude(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.exclude = paths.into_iter().collect();
        self
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    fn register(&mut self) -> notify::Result<()> {
        self.watcher
            .watch(&self.target.root, self.target.recursive_mode())?;
        self.registered = true;
        info!(
            "Watching: {:?} (recursive: {})",
            self.target.root, self.target.recursive
        );
        Ok(())
    }

    fn mark_lost(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        let _ = self.watcher.unwatch(&self.target.root);
        error!(
            "Watched root {:?} is gone; checking again every {:?}",
            self.target.root, ROOT_RETRY_INTERVAL
        );
    }

    fn try_reregister(&mut self) {
        if !self.target.root.is_dir() {
            debug!("Watched root {:?} still missing", self.target.root);
            return;
        }
        match self.register() {
            Ok(()) => {
                info!("Watched root {:?} is back, rescanning", self.target.root);
                self.queue_rescan();
            }
            Err(e) => warn!("Failed to re-register {:?}: {}", self.target.root, e),
        }
    }

    fn queue_rescan(&mut self) {
        let events = sweep::scan(&self.target, &self.exclude);
        debug!("Rescan of {:?} queued {} files", self.target.root, events.len());
        self.pending.extend(events);
    }

    /// Queue the files of a directory that arrived whole, e.g. a finished
    /// multi-file download moved into the root
    fn queue_directory(&mut self, dir: &Path) {
        if sweep::is_excluded(dir, &self.exclude) {
            return;
        }
        let events = sweep::scan(&WatchTarget::new(dir, true), &self.exclude);
        debug!("Directory {:?} arrived with {} files", dir, events.len());
        self.pending.extend(events);
    }

    fn handle(&mut self, res: notify::Result<Event>) {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!("Watch error on {:?}: {}", self.target.root, e);
                if !self.target.root.is_dir() {
                    self.mark_lost();
                }
                return;
            }
        };

        if event.need_rescan() {
            warn!("Event queue overflowed for {:?}, rescanning", self.target.root);
            self.queue_rescan();
        }

        if event.paths.iter().any(|p| p == &self.target.root) && !self.target.root.is_dir() {
            self.mark_lost();
            return;
        }

        if self.target.recursive {
            for dir in Self::arrived_directories(&event) {
                self.queue_directory(&dir);
            }
        }

        for path in Self::appeared_paths(&event) {
            if sweep::is_excluded(&path, &self.exclude) {
                continue;
            }
            if should_process(&path) {
                self.pending.push_back(FileEvent::new(path));
            } else {
                debug!("Skipping transient file: {:?}", path);
            }
        }
    }

    /// Paths of files that appeared in this notify event
    ///
    /// Creations and renames into the tree count. Directories never do.
    fn appeared_paths(event: &Event) -> Vec<PathBuf> {
        let candidates: Vec<&PathBuf> = match event.kind {
            EventKind::Create(CreateKind::Folder) => Vec::new(),
            EventKind::Create(_) => event.paths.iter().collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.iter().collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.get(1).into_iter().collect()
            }
            // FSEvents cannot tell the two ends of a rename apart
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
                event.paths.iter().filter(|p| p.is_file()).collect()
            }
            _ => Vec::new(),
        };

        candidates
            .into_iter()
            .filter(|p| !p.is_dir())
            .cloned()
            .collect()
    }

    /// Directories created in or renamed into the tree
    fn arrived_directories(event: &Event) -> Vec<PathBuf> {
        let candidates: Vec<&PathBuf> = match event.kind {
            EventKind::Create(_) => event.paths.iter().collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
                event.paths.iter().collect()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                event.paths.get(1).into_iter().collect()
            }
            _ => Vec::new(),
        };

        candidates
            .into_iter()
            .filter(|p| p.is_dir())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSource for FileWatcher {
    async fn next_event(&mut self) -> Option<FileEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            if self.registered {
                let res = self.event_rx.recv().await?;
                self.handle(res);
            } else {
                tokio::select! {
                    res = self.event_rx.recv() => {
                        let res = res?;
                        self.handle(res);
                    }
                    _ = tokio::time::sleep(ROOT_RETRY_INTERVAL) => self.try_reregister(),
                }
            }
        }
    }
}

/// Check if a file should be handed to the pipeline at all
///
/// Filters out downloads still in progress and OS metadata files. Everything
/// else goes to the classifier, which owns the dotfile and ignore-list policy.
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    let lower = filename.to_lowercase();

    // Skip temporary files
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    if temp_extensions.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }

    // Skip system files
    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    if skip_names.contains(&lower.as_str()) {
        return false;
    }

    true
}

/// Wait for file to be stable (not being written)
///
/// Returns `false` if the file disappeared while waiting.
pub async fn wait_for_stable(path: &Path, max_wait: Duration) -> bool {
    let check_interval = Duration::from_millis(500);
    let start = std::time::Instant::now();

    let mut last_size = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return false,
    };

    loop {
        tokio::time::sleep(check_interval).await;

        let current_size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => return false, // File was deleted
        };

        if current_size == last_size {
            return true;
        }

        if start.elapsed() > max_wait {
            warn!("File {:?} still growing after {:?}, moving anyway", path, max_wait);
            return true;
        }

        last_size = current_size;
        debug!("File {:?} still being written, size: {}", path, current_size);
    }
}

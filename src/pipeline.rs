// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Per-root pipeline: observer → classifier → relocation executor
//!
//! Each watched root gets its own [`Pipeline`]. Events are handled one at a
//! time in arrival order. Shutdown is only checked between events, so a
//! relocation that has started always runs to completion.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::classifier::{Classifier, Route};
use crate::relocate::{FailureKind, Relocator, TransferOutcome};
use crate::sweep;
use crate::watcher::{wait_for_stable, EventSource, FileEvent, WatchTarget};

/// Above this many remembered paths, forget the ones that no longer exist
const HANDLED_PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Log planned moves without touching anything
    pub dry_run: bool,
    /// Wait up to this long for a growing file to settle before moving it
    pub settle: Option<Duration>,
}

pub struct Pipeline {
    target: WatchTarget,
    classifier: Arc<Classifier>,
    relocator: Relocator,
    destination_root: PathBuf,
    exclusions: Vec<PathBuf>,
    options: PipelineOptions,
    outcomes: mpsc::UnboundedSender<TransferOutcome>,
    handled: HashSet<PathBuf>,
}

impl Pipeline {
    pub fn new(
        target: WatchTarget,
        classifier: Arc<Classifier>,
        relocator: Relocator,
        destination_root: impl Into<PathBuf>,
        options: PipelineOptions,
        outcomes: mpsc::UnboundedSender<TransferOutcome>,
    ) -> Self {
        let destination_root = destination_root.into();
        let exclusions = sweep::exclusions(&target.root, &destination_root, classifier.categories());
        Self {
            target,
            classifier,
            relocator,
            destination_root,
            exclusions,
            options,
            outcomes,
            handled: HashSet::new(),
        }
    }

    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Subtrees under the destination that this pipeline never touches
    pub fn exclusions(&self) -> &[PathBuf] {
        &self.exclusions
    }

    /// Run the bootstrap sweep on its own, returning the number of files seen
    pub async fn sweep(&mut self) -> usize {
        self.sweep_until(None).await
    }

    async fn sweep_until(&mut self, shutdown: Option<&watch::Receiver<bool>>) -> usize {
        let target = self.target.clone();
        let exclude = self.exclusions.clone();
        let events = match tokio::task::spawn_blocking(move || sweep::scan(&target, &exclude)).await {
            Ok(events) => events,
            Err(e) => {
                error!("Bootstrap sweep of {:?} failed: {}", self.target.root, e);
                return 0;
            }
        };

        info!(
            "Processing {} existing files in {:?}",
            events.len(),
            self.target.root
        );

        let total = events.len();
        for event in events {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                info!("Shutdown requested during sweep of {:?}", self.target.root);
                break;
            }
            self.process(event).await;
        }
        total
    }

    /// Sweep, then handle live events until shutdown or the feed closes
    pub async fn run<S: EventSource>(mut self, mut source: S, mut shutdown: watch::Receiver<bool>) {
        self.sweep_until(Some(&shutdown)).await;

        info!("Waiting for files in {:?}...", self.target.root);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                event = source.next_event() => match event {
                    Some(event) => {
                        self.process(event).await;
                    }
                    None => {
                        warn!("Event feed for {:?} closed", self.target.root);
                        break;
                    }
                },
            }
        }

        info!("Pipeline for {:?} stopped", self.target.root);
    }

    /// Classify one event and relocate the file if a category claims it
    ///
    /// Returns the outcome when a relocation was attempted. Ignored,
    /// unclassified, duplicate and dry-run events return `None`.
    pub async fn process(&mut self, event: FileEvent) -> Option<TransferOutcome> {
        let path = event.path;

        if sweep::is_excluded(&path, &self.exclusions) {
            debug!("Ignoring event inside destination: {:?}", path);
            return None;
        }

        if self.handled.contains(&path) && !path.exists() {
            debug!("Already handled {:?}, dropping redundant event", path);
            self.handled.remove(&path);
            return None;
        }

        let route = self.classifier.route(&path);
        self.remember(&path);

        let category = match route {
            Route::Move(category) => category,
            Route::Ignore { rule } => {
                debug!("Ignoring {:?} (rule: {})", path, rule);
                return None;
            }
            Route::Skip => {
                debug!("Unclassified, leaving in place: {:?}", path);
                return None;
            }
        };

        let destination_dir = self.destination_root.join(&category);

        if self.options.dry_run {
            info!("DRY RUN: would move {:?} to {:?}", path, destination_dir);
            return None;
        }

        if let Some(max_wait) = self.options.settle {
            if !wait_for_stable(&path, max_wait).await {
                debug!("File disappeared while settling: {:?}", path);
                return None;
            }
        }

        let relocator = self.relocator.clone();
        let source = path.clone();
        let target_dir = destination_dir.clone();
        let outcome = match tokio::task::spawn_blocking(move || relocator.relocate(&source, &target_dir)).await {
            Ok(outcome) => outcome,
            Err(e) => TransferOutcome::failed(
                path,
                destination_dir,
                FailureKind::Io,
                format!("relocation task failed: {}", e),
            ),
        }
        .with_category(category);

        if self.outcomes.send(outcome.clone()).is_err() {
            debug!("Outcome receiver closed");
        }
        Some(outcome)
    }

    fn remember(&mut self, path: &Path) {
        if self.handled.len() >= HANDLED_PRUNE_THRESHOLD {
            self.handled.retain(|p| p.exists());
        }
        self.handled.insert(path.to_path_buf());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrganizerConfig;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        dest: PathBuf,
        pipeline: Pipeline,
        outcomes: mpsc::UnboundedReceiver<TransferOutcome>,
    }

    fn fixture(options: PipelineOptions) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("downloads");
        let dest = temp.path().join("media");
        fs::create_dir_all(&root).unwrap();

        let classifier = Arc::new(Classifier::from_config(&OrganizerConfig::default()).unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(
            WatchTarget::new(&root, true),
            classifier,
            Relocator::default(),
            &dest,
            options,
            tx,
        );
        Fixture {
            _temp: temp,
            root,
            dest,
            pipeline,
            outcomes: rx,
        }
    }

    #[tokio::test]
    async fn test_process_moves_tv() {
        let mut f = fixture(PipelineOptions::default());
        let file = f.root.join("Show.S01E02.1080p.mkv");
        fs::write(&file, "x").unwrap();

        let outcome = f.pipeline.process(FileEvent::new(&file)).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.category.as_deref(), Some("TV"));
        assert_eq!(outcome.destination, f.dest.join("TV/Show.S01E02.1080p.mkv"));
        assert!(f.outcomes.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let mut f = fixture(PipelineOptions {
            dry_run: true,
            settle: None,
        });
        let file = f.root.join("Film.720p.mkv");
        fs::write(&file, "x").unwrap();

        assert!(f.pipeline.process(FileEvent::new(&file)).await.is_none());
        assert!(file.exists());
        assert!(!f.dest.exists());
    }

    #[tokio::test]
    async fn test_redundant_event_dropped() {
        let mut f = fixture(PipelineOptions::default());
        let file = f.root.join("Film.720p.mkv");
        fs::write(&file, "x").unwrap();

        assert!(f.pipeline.process(FileEvent::new(&file)).await.is_some());
        assert!(f.pipeline.process(FileEvent::new(&file)).await.is_none());
        assert!(f.outcomes.try_recv().is_ok());
        assert!(f.outcomes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_settle_waits_then_moves() {
        let mut f = fixture(PipelineOptions {
            dry_run: false,
            settle: Some(Duration::from_secs(2)),
        });
        let file = f.root.join("Film.720p.mkv");
        fs::write(&file, "x").unwrap();

        let outcome = f.pipeline.process(FileEvent::new(&file)).await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_root_inside_destination() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("media");
        let root = dest.join("Downloads");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("Film.720p.mkv"), "film").unwrap();

        let classifier = Arc::new(Classifier::from_config(&OrganizerConfig::default()).unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut pipeline = Pipeline::new(
            WatchTarget::new(&root, true),
            classifier,
            Relocator::default(),
            &dest,
            PipelineOptions::default(),
            tx,
        );
        assert_eq!(pipeline.exclusions(), &[dest.join("TV"), dest.join("Movies")]);

        assert_eq!(pipeline.sweep().await, 1);
        assert!(rx.try_recv().unwrap().is_success());
        assert!(dest.join("Movies/Film.720p.mkv").exists());

        let file = root.join("Show.S01E02.1080p.mkv");
        fs::write(&file, "x").unwrap();
        let outcome = pipeline.process(FileEvent::new(&file)).await.unwrap();
        assert_eq!(outcome.destination, dest.join("TV/Show.S01E02.1080p.mkv"));
        assert!(!file.exists());

        // Already sorted files are left alone
        let sorted = dest.join("TV/Show.S01E02.1080p.mkv");
        assert!(pipeline.process(FileEvent::new(&sorted)).await.is_none());
    }

    #[tokio::test]
    async fn test_destination_events_ignored() {
        let mut f = fixture(PipelineOptions::default());
        let inside = f.dest.join("TV/Show.S01E02.mkv");
        fs::create_dir_all(inside.parent().unwrap()).unwrap();
        fs::write(&inside, "x").unwrap();

        assert!(f.pipeline.process(FileEvent::new(&inside)).await.is_none());
        assert!(inside.exists());
    }
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Tests against the real notification backends

use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_test::assert_ok;

use tidywatch::watcher::WatcherBackend;
use tidywatch::{
    Classifier, EventSource, FileWatcher, OrganizerConfig, Pipeline, PipelineOptions, Relocator,
    WatchTarget,
};

const WAIT: Duration = Duration::from_secs(15);

#[tokio::test]
async fn test_native_watcher_reports_new_file() {
    let temp = TempDir::new().unwrap();
    let mut watcher =
        FileWatcher::new(WatchTarget::new(temp.path(), true), WatcherBackend::Native).unwrap();

    let file = temp.path().join("Show.S01E02.mkv");
    fs::write(&file, "x").unwrap();

    let event = assert_ok!(timeout(WAIT, watcher.next_event()).await).unwrap();
    assert_eq!(event.path.file_name(), file.file_name());
}

#[tokio::test]
async fn test_native_watcher_sees_new_subdirectory_files() {
    let temp = TempDir::new().unwrap();
    let mut watcher =
        FileWatcher::new(WatchTarget::new(temp.path(), true), WatcherBackend::Native).unwrap();

    let season = temp.path().join("Season 1");
    fs::create_dir(&season).unwrap();
    // Give the backend a moment to pick up the new directory
    tokio::time::sleep(Duration::from_millis(300)).await;
    fs::write(season.join("Show.S01E03.mkv"), "x").unwrap();

    let event = assert_ok!(timeout(WAIT, watcher.next_event()).await).unwrap();
    assert_eq!(
        event.path.file_name().unwrap().to_string_lossy(),
        "Show.S01E03.mkv"
    );
}

#[tokio::test]
async fn test_native_watcher_sees_moved_in_directory() {
    let temp = TempDir::new().unwrap();
    let staging = TempDir::new_in(temp.path()).unwrap();
    let root = temp.path().join("downloads");
    fs::create_dir_all(&root).unwrap();
    let pack = staging.path().join("Show.S01.Pack");
    fs::create_dir_all(pack.join("Extras")).unwrap();
    fs::write(pack.join("Show.S01E01.mkv"), "x").unwrap();
    fs::write(pack.join("Extras/Show.S01E00.mkv"), "x").unwrap();

    let mut watcher =
        FileWatcher::new(WatchTarget::new(&root, true), WatcherBackend::Native).unwrap();
    fs::rename(&pack, root.join("Show.S01.Pack")).unwrap();

    let mut names = Vec::new();
    while names.len() < 2 {
        let event = assert_ok!(timeout(WAIT, watcher.next_event()).await).unwrap();
        let name = event.path.file_name().unwrap().to_string_lossy().into_owned();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names.sort();
    assert_eq!(names, vec!["Show.S01E00.mkv", "Show.S01E01.mkv"]);
}

#[tokio::test]
async fn test_poll_watcher_reports_new_file() {
    let temp = TempDir::new().unwrap();
    let backend = WatcherBackend::Poll(Duration::from_millis(100));
    let mut watcher = FileWatcher::new(WatchTarget::new(temp.path(), false), backend).unwrap();

    fs::write(temp.path().join("Film.1080p.mkv"), "x").unwrap();

    let event = assert_ok!(timeout(WAIT, watcher.next_event()).await).unwrap();
    assert_eq!(
        event.path.file_name().unwrap().to_string_lossy(),
        "Film.1080p.mkv"
    );
}

#[tokio::test]
async fn test_missing_root_is_a_startup_error() {
    let temp = TempDir::new().unwrap();
    let target = WatchTarget::new(temp.path().join("missing"), true);
    assert!(FileWatcher::new(target, WatcherBackend::Native).is_err());
}

#[tokio::test]
async fn test_live_pipeline_moves_existing_and_new_files() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("downloads");
    let dest = temp.path().join("media");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("Show.S01E01.mkv"), "old").unwrap();

    let config = OrganizerConfig::for_roots([&root]);
    let target = WatchTarget::new(&root, true);
    let watcher = FileWatcher::new(target.clone(), WatcherBackend::Native)
        .unwrap()
        .exclude([dest.clone()]);

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = Pipeline::new(
        target,
        Arc::new(Classifier::from_config(&config).unwrap()),
        Relocator::default(),
        &dest,
        PipelineOptions::default(),
        outcome_tx,
    );
    let task = tokio::spawn(pipeline.run(watcher, shutdown_rx));

    let swept = assert_ok!(timeout(WAIT, outcome_rx.recv()).await).unwrap();
    assert_eq!(swept.destination, dest.join("TV/Show.S01E01.mkv"));

    fs::write(root.join("Film.720p.mkv"), "new").unwrap();
    let live = assert_ok!(timeout(WAIT, outcome_rx.recv()).await).unwrap();
    assert!(live.is_success());
    assert_eq!(live.destination, dest.join("Movies/Film.720p.mkv"));

    shutdown_tx.send(true).unwrap();
    assert_ok!(timeout(WAIT, task).await).unwrap();
    assert!(!root.join("Film.720p.mkv").exists());
}

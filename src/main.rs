// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! tidywatch: sort new downloads into category directories
//!
//! Watches one or more directories, files every new or existing file into
//! TV, Movies or a user-defined category under the destination root.

use anyhow::Context;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use tidywatch::config::{
    ExtensionRoute, GlobRoute, OrganizerConfig, TransferConfig, UnclassifiedMode, WatcherConfig,
    DEFAULT_DESTINATION_ROOT, DEFAULT_MOVIES_DIR, DEFAULT_OTHER_DIR, DEFAULT_TV_DIR,
};
use tidywatch::relocate::TransferMode;
use tidywatch::{
    Classifier, FileWatcher, Pipeline, PipelineOptions, Relocator, TransferOutcome,
    TransferStatus, WatchTarget,
};

/// tidywatch CLI - folder-watching file organizer
#[derive(Parser, Debug)]
#[command(name = "tidywatch")]
#[command(version)]
#[command(about = "Watch folders and sort new files into category directories", long_about = None)]
struct Cli {
    /// Directories to watch
    #[arg(required = true, value_name = "ROOT")]
    roots: Vec<PathBuf>,

    /// Destination root for category directories
    #[arg(short, long, env = "TIDYWATCH_DEST", default_value = DEFAULT_DESTINATION_ROOT)]
    dest: PathBuf,

    /// Watch subdirectories, including ones created later
    #[arg(long, env = "TIDYWATCH_RECURSIVE", default_value_t = true, action = ArgAction::Set,
          value_parser = BoolishValueParser::new(), value_name = "BOOL")]
    recursive: bool,

    /// Leave files whose name starts with a dot alone
    #[arg(long, env = "TIDYWATCH_IGNORE_DOTFILES", default_value_t = true, action = ArgAction::Set,
          value_parser = BoolishValueParser::new(), value_name = "BOOL")]
    ignore_dotfiles: bool,

    /// Directory name for TV episodes
    #[arg(long, env = "TIDYWATCH_TV_DIR", default_value = DEFAULT_TV_DIR)]
    tv_dir: String,

    /// Directory name for movies
    #[arg(long, env = "TIDYWATCH_MOVIES_DIR", default_value = DEFAULT_MOVIES_DIR)]
    movies_dir: String,

    /// What to do with files no rule matches: skip or route
    #[arg(long, env = "TIDYWATCH_UNCLASSIFIED", default_value = "skip")]
    unclassified: UnclassifiedMode,

    /// Directory name for unclassified files when routing them
    #[arg(long, env = "TIDYWATCH_OTHER_DIR", default_value = DEFAULT_OTHER_DIR)]
    other_dir: String,

    /// Extra extensions to ignore (comma separated)
    #[arg(long = "ignore-ext", value_name = "EXT", env = "TIDYWATCH_IGNORE_EXT", value_delimiter = ',')]
    ignore_ext: Vec<String>,

    /// Extra movie keywords (comma separated)
    #[arg(long = "movie-keyword", value_name = "WORD", env = "TIDYWATCH_MOVIE_KEYWORDS", value_delimiter = ',')]
    movie_keywords: Vec<String>,

    /// Route an extension to a directory, e.g. pdf=Magazines
    #[arg(long = "route-ext", value_name = "EXT=DIR")]
    route_ext: Vec<ExtensionRoute>,

    /// Route file names matching a glob to a directory, e.g. Books=*.epub
    #[arg(long = "route-glob", value_name = "DIR=GLOB")]
    route_glob: Vec<GlobRoute>,

    /// Always copy, verify and delete instead of renaming
    #[arg(long)]
    copy: bool,

    /// Compare BLAKE3 digests after copying
    #[arg(long)]
    verify_hash: bool,

    /// Poll every SECS seconds instead of using native notifications
    #[arg(long, env = "TIDYWATCH_POLL_INTERVAL", value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Wait up to SECS seconds for a growing file to settle (0 disables)
    #[arg(long, env = "TIDYWATCH_SETTLE_SECS", default_value_t = 10, value_name = "SECS")]
    settle_secs: u64,

    /// Dry run mode (log what would be moved)
    #[arg(long)]
    dry_run: bool,

    /// Sort existing files and exit without watching
    #[arg(long)]
    once: bool,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Output format for transfer results
    #[arg(long, default_value = "text", value_parser = ["text", "jsonl"])]
    format: String,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn to_config(&self) -> OrganizerConfig {
        let mut config = OrganizerConfig::for_roots(self.roots.iter().cloned());
        config.recursive = self.recursive;
        config.destination_root = self.dest.clone();
        config.dry_run = self.dry_run;

        let cats = &mut config.categories;
        cats.tv_dir = self.tv_dir.clone();
        cats.movies_dir = self.movies_dir.clone();
        cats.movie_keywords.extend(self.movie_keywords.iter().cloned());
        cats.extension_routes = self.route_ext.clone();
        cats.glob_routes = self.route_glob.clone();
        cats.unclassified = self.unclassified;
        cats.other_dir = self.other_dir.clone();

        config.filters.ignore_dotfiles = self.ignore_dotfiles;
        config
            .filters
            .ignored_extensions
            .extend(self.ignore_ext.iter().cloned());

        config.transfer = TransferConfig {
            mode: if self.copy { TransferMode::Copy } else { TransferMode::Auto },
            verify_hash: self.verify_hash,
        };
        config.watcher = WatcherConfig {
            poll_interval_secs: self.poll_interval,
            settle_secs: self.settle_secs,
        };
        config
    }

    fn json_lines(&self) -> bool {
        self.format == "jsonl"
    }
}

#[derive(Debug, Default)]
struct Summary {
    moved: usize,
    skipped: usize,
    failed: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if cli.json_lines() {
        subscriber.with_writer(std::io::stderr).init();
    } else {
        subscriber.init();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli
        .to_config()
        .into_validated()
        .context("Invalid configuration")?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if !cli.quiet {
        info!("tidywatch v{}", env!("CARGO_PKG_VERSION"));
    }

    let classifier =
        Arc::new(Classifier::from_config(&config).context("Invalid classification rules")?);
    info!("Loaded {} rules: {:?}", classifier.len(), classifier.rule_names());
    info!("Destination root: {:?}", config.destination_root);

    if config.dry_run {
        warn!("DRY RUN MODE - files will not be moved");
    }

    let relocator = Relocator::new(config.transfer.mode, config.transfer.verify_hash);
    let options = PipelineOptions {
        dry_run: config.dry_run,
        settle: config.watcher.settle(),
    };

    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_outcomes(outcome_rx, cli.json_lines()));

    let make_pipeline = |target: WatchTarget| {
        Pipeline::new(
            target,
            Arc::clone(&classifier),
            relocator.clone(),
            config.destination_root.clone(),
            options.clone(),
            outcome_tx.clone(),
        )
    };

    let mut tasks = Vec::new();
    if cli.once {
        for target in config.watch_targets() {
            let mut pipeline = make_pipeline(target);
            tasks.push(tokio::spawn(async move {
                pipeline.sweep().await;
            }));
        }
    } else {
        // Every root is registered before any sweep starts
        let mut staged = Vec::new();
        for target in config.watch_targets() {
            let pipeline = make_pipeline(target.clone());
            let watcher = FileWatcher::new(target.clone(), config.watcher.backend())
                .with_context(|| format!("Failed to watch {:?}", target.root))?
                .exclude(pipeline.exclusions().to_vec());
            staged.push((pipeline, watcher));
        }

        let shutdown_rx = spawn_shutdown_listener();
        info!("Scanner active. Press Ctrl+C to stop.");

        for (pipeline, watcher) in staged {
            tasks.push(tokio::spawn(pipeline.run(watcher, shutdown_rx.clone())));
        }
    }
    drop(outcome_tx);

    for task in tasks {
        if let Err(e) = task.await {
            error!("Pipeline task failed: {}", e);
        }
    }

    let summary = reporter.await.unwrap_or_default();
    info!(
        "tidywatch stopped. Moved {} files, skipped {}, {} failures",
        summary.moved, summary.skipped, summary.failed
    );
    Ok(())
}

/// Print one line per outcome until every pipeline has finished
async fn report_outcomes(
    mut rx: mpsc::UnboundedReceiver<TransferOutcome>,
    json_lines: bool,
) -> Summary {
    let mut summary = Summary::default();

    while let Some(outcome) = rx.recv().await {
        match outcome.status {
            TransferStatus::Success { .. } => summary.moved += 1,
            TransferStatus::Skipped { .. } => summary.skipped += 1,
            TransferStatus::Failed { .. } => summary.failed += 1,
        }

        if json_lines {
            match serde_json::to_string(&outcome) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize outcome: {}", e),
            }
        } else {
            println!("{}", outcome);
        }
    }

    summary
}

/// Flip the returned receiver to `true` on Ctrl+C or SIGTERM
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, finishing current file..."),
            _ = terminate => info!("Received SIGTERM, finishing current file..."),
        }

        let _ = shutdown_tx.send(true);
    });

    shutdown_rx
}

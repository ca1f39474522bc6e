//! ScanScribe: streams a directory scan to an XML-like file while building
//! a live in-memory tree of the same scan.
//!
//! Thin binary entry point. All logic lives in the `scanscribe-core` crate;
//! the main thread owns the live document and drains its dispatch loop, the
//! way a UI thread would.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use scanscribe_core::model::size::{format_count, format_size};
use scanscribe_core::model::{LiveDocument, TreeDocument};
use scanscribe_core::scanner::{start_scan, ProgressSnapshot, ScanEvent};
use scanscribe_core::sinks::dispatcher;
use scanscribe_core::ScanOptions;

/// How often progress is logged while the scan runs.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(
    name = "scanscribe",
    version,
    about = "Stream a directory scan to an XML-like file and a live tree"
)]
struct Cli {
    /// Directory to scan (defaults to the config file's root, then ".")
    root: Option<PathBuf>,

    /// Output file (defaults to the config file's output, then "scan.xml")
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with scan options; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum records buffered per sink before the walk pauses
    #[arg(long)]
    max_queue: Option<usize>,

    /// Skip dot-prefixed entries
    #[arg(long)]
    skip_hidden: bool,

    /// Do not collect Owner and UserRights attributes
    #[arg(long)]
    no_security: bool,

    /// Print the live tree once the scan completes
    #[arg(long)]
    print_tree: bool,

    /// Depth of the printed tree
    #[arg(long, default_value = "2", requires = "print_tree")]
    depth: usize,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Machine-readable scan summary.
#[derive(Serialize)]
struct Summary {
    root: PathBuf,
    output: PathBuf,
    elements: usize,
    total_bytes: Option<u64>,
    duration_secs: f64,
    size_mismatches: usize,
    progress: ProgressSnapshot,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialise structured logging.
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    info!("ScanScribe starting");

    let options = build_options(&cli)?;
    run(&cli, &options)
}

/// Merge the config file (if any) with the command-line flags.
fn build_options(cli: &Cli) -> Result<ScanOptions> {
    let mut options = match &cli.config {
        Some(path) => ScanOptions::from_json_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ScanOptions::new(".", "scan.xml"),
    };
    if let Some(root) = &cli.root {
        options.root = root.clone();
    }
    if let Some(output) = &cli.output {
        options.output = output.clone();
    }
    if cli.max_queue.is_some() {
        options.queue_capacity = cli.max_queue;
    }
    if cli.skip_hidden {
        options.include_hidden = false;
    }
    if cli.no_security {
        options.collect_security = false;
    }
    options.validate()?;
    Ok(options)
}

fn run(cli: &Cli, options: &ScanOptions) -> Result<()> {
    let (dispatcher, pump) = dispatcher::channel();
    let document = LiveDocument::new(TreeDocument::with_capacity(4_096));
    let handle = start_scan(options, Arc::clone(&document), dispatcher)
        .with_context(|| format!("failed to start scan of {}", options.root.display()))?;

    let event = loop {
        if let Some(event) = pump.run_until(&handle.events_rx, PROGRESS_INTERVAL) {
            break event;
        }
        let progress = handle.progress();
        info!(
            "{} entries scanned, {} written",
            format_count(progress.scanned),
            format_count(progress.slowest_sink())
        );
    };

    // Release any sink still waiting on the owner thread before joining.
    pump.run_pending();
    handle.join();

    let (duration, progress) = match event {
        ScanEvent::Completed { duration, progress } => (duration, progress),
        ScanEvent::Failed { error } => {
            return Err(error).with_context(|| format!("scan of {} failed", options.root.display()));
        }
    };

    let doc = document.read();
    let mismatches = doc.size_mismatches();
    for &index in &mismatches {
        warn!("Stored size disagrees with contents: {}", doc.full_path(index));
    }
    let total_bytes = doc.root().and_then(|root| doc.node(root).size());

    if cli.json {
        let summary = Summary {
            root: options.root.clone(),
            output: options.output.clone(),
            elements: doc.len(),
            total_bytes,
            duration_secs: duration.as_secs_f64(),
            size_mismatches: mismatches.len(),
            progress,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Scanned {} entries ({}) in {:.2}s -> {}",
            format_count(doc.len() as u64),
            total_bytes.map(format_size).unwrap_or_else(|| "unknown size".into()),
            duration.as_secs_f64(),
            options.output.display()
        );
    }

    if cli.print_tree {
        print!("{}", doc.outline(cli.depth));
    }

    Ok(())
}

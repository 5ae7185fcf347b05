//! # CLI Module
//!
//! Mode selection and presentation for the duplicate archive detector.
//!
//! ## Usage
//! ```bash
//! # Fingerprint every archive under a directory
//! kagami local --scan-dir ~/comics
//!
//! # Coordinator: owns the archives, serves page jobs to workers
//! kagami server --scan-dir ~/comics --host-ip 0.0.0.0
//!
//! # Worker: pulls page jobs from the coordinator
//! kagami client --host-ip 192.168.1.10
//!
//! # Group duplicate archives from the stored manifests
//! kagami check --scan-dir ~/comics --max-image-dist 3
//! ```

use clap::{Parser, Subcommand};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use kagami::core::matcher::{DuplicateMatcher, MatchReport, MatcherConfig};
use kagami::core::pipeline::{LocalWorkerPool, PipelineConfig, PipelineDriver, POLL_INTERVAL};
use kagami::core::queue::Queue;
use kagami::error::{KagamiError, Result};
use kagami::events::{Event, EventChannel};
use kagami::rpc;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// Kagami - detect duplicate comic archives by page fingerprints
#[derive(Parser, Debug)]
#[command(name = "kagami")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fingerprint archives with in-process workers
    Local {
        /// Directory to scan for archives
        #[arg(long, default_value = ".")]
        scan_dir: PathBuf,

        /// Directory receiving the fingerprint manifests
        #[arg(long, default_value = "store")]
        store_dir: PathBuf,
    },
    /// Hold the archives and serve page jobs to remote workers
    Server {
        /// Directory to scan for archives
        #[arg(long, default_value = ".")]
        scan_dir: PathBuf,

        /// Directory receiving the fingerprint manifests
        #[arg(long, default_value = "store")]
        store_dir: PathBuf,

        /// Address to bind (all interfaces when omitted)
        #[arg(long, default_value = "")]
        host_ip: String,
    },
    /// Fingerprint pages pulled from a coordinator
    Client {
        /// Coordinator address to connect to
        #[arg(long)]
        host_ip: String,
    },
    /// Group duplicate archives from stored manifests
    Check {
        /// Scan root; manifests are read from its `store` subdirectory
        #[arg(long, default_value = ".")]
        scan_dir: PathBuf,

        /// Maximum page fingerprint distance (0-64)
        #[arg(long, default_value_t = 3)]
        max_image_dist: u32,

        /// Maximum page-count difference between archives
        #[arg(long, default_value_t = 10)]
        max_archive_diff: usize,

        /// Match on exact page metadata instead of similarity
        #[arg(long)]
        exact_match: bool,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI
pub fn run() -> Result<()> {
    kagami::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Local {
            scan_dir,
            store_dir,
        } => run_local(scan_dir, store_dir),
        Commands::Server {
            scan_dir,
            store_dir,
            host_ip,
        } => run_server(scan_dir, store_dir, host_ip),
        Commands::Client { host_ip } => rpc::client::connect(&host_ip, POLL_INTERVAL),
        Commands::Check {
            scan_dir,
            max_image_dist,
            max_archive_diff,
            exact_match,
            json,
        } => run_check(scan_dir, max_image_dist, max_archive_diff, exact_match, json),
    }
}

fn require_scan_dir(scan_dir: &PathBuf) -> Result<()> {
    if scan_dir.as_os_str().is_empty() {
        return Err(KagamiError::Config("scan directory must be specified".into()));
    }
    Ok(())
}

fn run_local(scan_dir: PathBuf, store_dir: PathBuf) -> Result<()> {
    require_scan_dir(&scan_dir)?;
    let term = Term::stderr();
    term.write_line(&format!(
        "{} {}",
        style("kagami").bold().cyan(),
        style("local scan").dim()
    ))
    .ok();

    let config = PipelineConfig {
        scan_root: scan_dir,
        store_dir,
        poll_interval: POLL_INTERVAL,
    };

    let queue = Arc::new(Queue::new());
    let (sender, receiver) = EventChannel::new();

    let pool = LocalWorkerPool::spawn(
        Arc::clone(&queue),
        LocalWorkerPool::default_workers(),
        config.poll_interval,
        sender.clone(),
    );

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█▓░"),
    );

    let progress_clone = progress.clone();
    let event_thread = thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::ArchiveStarted { path, pages } => {
                    progress_clone.set_length(pages as u64);
                    progress_clone.set_position(0);
                    progress_clone.set_message(
                        path.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    );
                }
                Event::PageHashed { .. } | Event::PageFailed { .. } => {
                    progress_clone.inc(1);
                }
                Event::ArchiveSkipped { path } => {
                    progress_clone
                        .println(format!("{} {}", style("fresh").dim(), path.display()));
                }
                Event::ManifestWritten { path, .. } => {
                    progress_clone
                        .println(format!("{} {}", style("wrote").green(), path.display()));
                }
                Event::Finished { .. } => {
                    progress_clone.finish_and_clear();
                }
                Event::ArchiveFound { .. } => {}
            }
        }
    });

    let driver = PipelineDriver::new(config, Arc::clone(&queue)).with_events(sender.clone());
    let stats = driver.run()?;

    // The closed queue sends the workers home; the dropped sender ends the
    // event thread.
    pool.join();
    drop(sender);
    event_thread.join().ok();

    term.write_line("").ok();
    term.write_line(&format!(
        "{} {} archives fingerprinted, {} skipped, {} pages",
        style("✓").green().bold(),
        style(stats.archives).cyan(),
        style(stats.skipped).cyan(),
        style(stats.pages).cyan(),
    ))
    .ok();

    Ok(())
}

fn run_server(scan_dir: PathBuf, store_dir: PathBuf, host_ip: String) -> Result<()> {
    require_scan_dir(&scan_dir)?;
    let config = PipelineConfig {
        scan_root: scan_dir,
        store_dir,
        poll_interval: POLL_INTERVAL,
    };
    rpc::server::serve(&host_ip, config)
}

fn run_check(
    scan_dir: PathBuf,
    max_image_dist: u32,
    max_archive_diff: usize,
    exact_match: bool,
    json: bool,
) -> Result<()> {
    require_scan_dir(&scan_dir)?;
    if max_image_dist > 64 {
        return Err(KagamiError::Config(format!(
            "invalid max image distance {max_image_dist}, valid 0-64"
        )));
    }

    let term = Term::stderr();
    term.write_line(&format!(
        "{} maxIDist: {}  maxADiff: {}  exactMatch: {}",
        style("kagami check").bold().cyan(),
        max_image_dist,
        max_archive_diff,
        exact_match
    ))
    .ok();

    let matcher = DuplicateMatcher::new(MatcherConfig {
        max_image_dist,
        max_archive_length_diff: max_archive_diff,
        exact_match,
    })?;

    let store_dir = scan_dir.join("store");
    let archives = matcher.load_archives(&store_dir)?;
    term.write_line(&format!("found {} manifests", archives.len()))
        .ok();

    let report = matcher.run(&archives);

    if json {
        print_json_report(&report);
    } else {
        print_pretty_report(&report);
    }

    Ok(())
}

fn print_pretty_report(report: &MatchReport) {
    for (index, group) in report.groups.iter().enumerate() {
        println!(
            "{}: ({}) {}",
            index + 1,
            group.head.inode,
            group.head.name.display()
        );
        for (nth, dup) in group.dups.iter().enumerate() {
            println!("  > {} ({}) {}", nth, dup.inode, dup.name.display());
        }
        println!();
    }
    println!("found {} dup groups", report.groups.len());
}

fn print_json_report(report: &MatchReport) {
    let output = serde_json::json!({
        "manifests": report.loaded,
        "group_count": report.groups.len(),
        "groups": report.groups.iter().map(|group| {
            serde_json::json!({
                "head": {
                    "inode": group.head.inode,
                    "path": group.head.name,
                    "pages": group.head.images.len(),
                },
                "dups": group.dups.iter().map(|dup| {
                    serde_json::json!({
                        "inode": dup.inode,
                        "path": dup.name,
                        "pages": dup.images.len(),
                    })
                }).collect::<Vec<_>>(),
            })
        }).collect::<Vec<_>>(),
    });

    println!("{}", serde_json::to_string_pretty(&output).unwrap());
}

//! # rotcheck CLI - detect silent data corruption
//!
//! Stores each file's mtime and SHA-256 in its extended attributes and, on
//! every later run, reports files whose content changed while their mtime did
//! not.
//!
//! ## Usage
//! ```bash
//! # Tag or verify a single file
//! rotcheck photo.jpg
//!
//! # Walk a tree, printing only corrupt files and errors
//! rotcheck -rq ~/Pictures
//!
//! # Accept the current content of corrupt files as the new baseline
//! rotcheck --fix damaged.iso
//! ```
//!
//! ## Exit status
//! - `0`: no corruption found (per-file errors alone do not fail a run)
//! - `5`: at least one file is corrupt
//! - `1`: the inputs could not be enumerated, the configuration is invalid,
//!   or the scan was interrupted
//!
//! ## Interrupting
//! The first Ctrl-C (or SIGTERM) lets files already being checked finish,
//! starts no new ones and prints the summary. A second one exits at once.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use rotcheck::{CorruptionPolicy, ReportFormat, Reporter, ScanConfig, ScannerBuilder};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit status when at least one corrupt file was found
const EXIT_CORRUPT: u8 = 5;

/// rotcheck - detect silent data corruption using checksums stored in extended attributes
#[derive(Parser)]
#[command(name = "rotcheck")]
#[command(author = "Mufeed VH <mufeed@asterisk.so>")]
#[command(version)]
#[command(about = "Detect silent data corruption using checksums stored in extended attributes")]
#[command(long_about = None)]
struct Cli {
    /// Files or directories to check
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Descend into directories
    #[arg(short, long)]
    recursive: bool,

    /// Follow symbolic links while descending
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Skip paths matching this glob (repeatable)
    #[arg(short, long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Number of files checked concurrently (defaults to CPU count)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Retag corrupt files with their current content after reporting them
    #[arg(long)]
    fix: bool,

    /// Classify files without writing any record
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Only print corrupt files and errors
    #[arg(short, long)]
    quiet: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Show a progress spinner on stderr
    #[arg(long)]
    progress: bool,

    /// Load settings from a JSON file (flags override it)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extended attribute prefix (records live in `<prefix>.record`)
    #[arg(long, value_name = "PREFIX")]
    attribute_prefix: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = build_config(&cli)?;
    let scanner = ScannerBuilder::new()
        .config(config)
        .build()
        .context("failed to set up scanner")?;

    let cancel = scanner.cancel_handle();
    for signal in [SIGINT, SIGTERM] {
        // Registered first, so it only fires once the flag is already set
        signal_hook::flag::register_conditional_shutdown(signal, 1, Arc::clone(&cancel))
            .context("failed to install signal handler")?;
        signal_hook::flag::register(signal, Arc::clone(&cancel))
            .context("failed to install signal handler")?;
    }

    let format = match cli.format {
        OutputFormat::Text => ReportFormat::Text,
        OutputFormat::Json => ReportFormat::Json,
    };
    let color = std::env::var("NO_COLOR").is_err() && std::io::stdout().is_terminal();
    let mut reporter = Reporter::stdout(format)
        .with_quiet(cli.quiet)
        .with_color(color);

    if cli.progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {pos} files checked ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(120));
        reporter = reporter.with_progress(pb);
    }

    let report = scanner.scan(&cli.paths, &reporter)?;

    if report.cancelled {
        eprintln!(
            "{}: scan interrupted after {} files",
            "Warning".yellow().bold(),
            report.summary.files_checked()
        );
    }

    if report.summary.is_failure() {
        Ok(ExitCode::from(EXIT_CORRUPT))
    } else if report.cancelled {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Merge the optional config file with command-line flags
fn build_config(cli: &Cli) -> anyhow::Result<ScanConfig> {
    let mut config = match &cli.config {
        Some(path) => ScanConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ScanConfig::default(),
    };

    config.recursive |= cli.recursive;
    config.follow_symlinks |= cli.follow_symlinks;
    config.dry_run |= cli.dry_run;
    config.exclude_patterns.extend(cli.exclude.iter().cloned());
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if cli.fix {
        config.corruption_policy = CorruptionPolicy::Retag;
    }
    if let Some(prefix) = &cli.attribute_prefix {
        config.attribute_prefix = prefix.clone();
    }

    config.validate()?;
    Ok(config)
}

//! emcdump - Extract versioned firmware payloads from container images
//!
//! This tool scans a folder for firmware container images, locates the
//! version marker in each, and stores the firmware region under a name
//! derived from the decoded versions, hardware model and region digest.

use anyhow::{bail, Context, Result};
use clap::Parser;
use emcdump_core::scanner::{DEFAULT_END_OFFSET, DEFAULT_START_OFFSET, DEFAULT_TOLERANCE};
use emcdump_core::store::DEFAULT_OUTPUT_DIR;
use emcdump_core::sink::DEFAULT_AUDIT_LOG;
use emcdump_core::{
    ArtifactStore, AuditLog, Error, Persisted, ScanOutcome, ScanReport, ScanSink, ScanStats,
    Scanner, ScannerConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Extract versioned firmware payloads from container images
#[derive(Parser, Debug)]
#[command(name = "emcdump")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Folder containing the images to scan
    #[arg(short, long, default_value = ".")]
    directory: PathBuf,

    /// Output folder for extracted firmware, relative to the scanned folder
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output: PathBuf,

    /// Audit log file, relative to the scanned folder
    #[arg(long, default_value = DEFAULT_AUDIT_LOG)]
    log_file: PathBuf,

    /// Extension of candidate image files
    #[arg(long, default_value = "bin")]
    extension: String,

    /// Descend into subfolders
    #[arg(short, long)]
    recursive: bool,

    /// Nominal start of the marker search range (hex with 0x, or decimal)
    #[arg(long, value_parser = parse_offset, default_value_t = DEFAULT_START_OFFSET)]
    start_offset: u64,

    /// Nominal end of the marker search range (hex with 0x, or decimal)
    #[arg(long, value_parser = parse_offset, default_value_t = DEFAULT_END_OFFSET)]
    end_offset: u64,

    /// Bytes searched beyond each end of the range
    #[arg(long, value_parser = parse_offset, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: u64,

    /// Dry run - extract and report, but don't write firmware or the log
    #[arg(long)]
    dry_run: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_offset(value: &str) -> std::result::Result<u64, String> {
    let value = value.trim().replace('_', "");
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid offset '{}': {}", value, e))
}

/// Prints a human-readable report for each scanned image
struct ConsoleReporter;

impl ScanSink for ConsoleReporter {
    fn on_file_scanned(&mut self, report: &ScanReport) {
        println!("File: {}, Size: {} bytes", report.path.display(), report.size);

        match &report.outcome {
            ScanOutcome::NotThisFormat => {
                println!(" - Header not found in this file. Skipping...");
            }
            ScanOutcome::TooSmall { required } => {
                println!(
                    " - File is too small for the given offset range ({:#x} required). Skipping...",
                    required
                );
            }
            ScanOutcome::MarkerAbsent { window } => {
                println!(" - Searched {}.", window);
                println!(" - Pattern not found in this file.");
            }
            ScanOutcome::Extracted(extraction) => {
                let metadata = &extraction.metadata;
                println!(" - Searched {}.", extraction.window);
                println!("   Magic pattern found at offset    {:#x}", extraction.hit.pattern_offset);
                println!("   `01` start found at offset       {:#x}", extraction.hit.marker_offset);
                println!("   following `01`:                  {}", extraction.hit.trailing_hex());
                println!("   Translated Version:              {}", extraction.version);
                println!("   HW Model:                        {}", metadata.hw_model);
                println!("   Product ID:                      {}", metadata.product_id);
                println!("   Current Firmware Version:        {}", metadata.current_fw);
                println!("   Minimum Firmware Version:        {}", metadata.min_fw);
                println!("   Firmware Region MD5 Hash:        {}", metadata.region_digest);

                match &extraction.persisted {
                    Some(Persisted::Written(path)) => {
                        println!(" - Saved firmware to: {}", path.display());
                    }
                    Some(Persisted::Skipped(path)) => {
                        println!(" - {} already exists. Skipping...", path.display());
                    }
                    None => {
                        println!(" - Would save firmware as: {}", extraction.artifact_name);
                    }
                }
            }
        }
        println!();
    }

    fn on_scan_failed(&mut self, path: &Path, error: &Error) {
        // Log error but continue with other files
        if error.is_recoverable() {
            warn!("Error processing {}: {}", path.display(), error);
        } else {
            error!("Error processing {}: {}", path.display(), error);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    run(&cli).map(|_| ())
}

/// Scans the configured folder and returns the run statistics
fn run(cli: &Cli) -> Result<ScanStats> {
    let directory = &cli.directory;
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    let config = ScannerConfig::new()
        .search_range(cli.start_offset, cli.end_offset)
        .tolerance(cli.tolerance);
    let scanner = Scanner::with_config(config).context("Invalid scan configuration")?;

    let output_dir = directory.join(&cli.output);
    let log_path = directory.join(&cli.log_file);

    info!("Scanning directory: {}", directory.display());
    println!(
        "Scanning range: {:#x} to {:#x} (+/- {} bytes for buffer).",
        cli.start_offset, cli.end_offset, cli.tolerance
    );
    println!();

    let images = discover(cli, directory, &output_dir)?;
    if images.is_empty() {
        println!(
            "No .{} files found in {}.",
            cli.extension,
            directory.display()
        );
        return Ok(ScanStats::default());
    }
    debug!("Found {} candidate image(s)", images.len());

    let mut stats = ScanStats::default();
    let mut console = ConsoleReporter;
    if cli.dry_run {
        scanner.scan_all(&images, None, &mut (&mut console, &mut stats));
    } else {
        let store = ArtifactStore::new(&output_dir);
        let mut audit = AuditLog::new(&log_path);
        scanner.scan_all(
            &images,
            Some(&store),
            &mut (&mut console, (&mut stats, &mut audit)),
        );
    }

    print_summary(&stats);
    Ok(stats)
}

/// Collects candidate images, sorted by name
fn discover(cli: &Cli, directory: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let max_depth = if cli.recursive { usize::MAX } else { 1 };
    let mut images = Vec::new();

    let walker = WalkDir::new(directory)
        .follow_links(false)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded(entry.path(), output_dir));

    for entry in walker {
        let entry =
            entry.with_context(|| format!("Failed to walk directory: {}", directory.display()))?;
        let path = entry.path();

        if !entry.file_type().is_file() {
            continue;
        }

        if !has_extension(path, &cli.extension) {
            trace!("Skipping {}", path.display());
            continue;
        }

        images.push(path.to_path_buf());
    }

    Ok(images)
}

/// Hidden entries and the output folder are never scanned
fn is_excluded(path: &Path, output_dir: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false);
    hidden || path == output_dir
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension.trim_start_matches('.')))
        .unwrap_or(false)
}

fn print_summary(stats: &ScanStats) {
    info!(
        "Summary: {} scanned, {} not this format, {} too small, {} without marker, {} written, {} already persisted, {} failed",
        stats.scanned,
        stats.not_this_format,
        stats.too_small,
        stats.marker_absent,
        stats.written,
        stats.already_persisted,
        stats.failed
    );
    if stats.invalid_fields > 0 {
        warn!(
            "{} image(s) had undecodable version fields",
            stats.invalid_fields
        );
    }
}

//! Receivers for per-file scan results.
//!
//! [`Scanner::scan_all`](crate::Scanner::scan_all) hands every report to a
//! [`ScanSink`]. Sinks compose as tuples, so a caller can combine console
//! output, the audit log and run statistics without a wrapper type.

use crate::error::{Error, Result};
use crate::scanner::{ScanOutcome, ScanReport};
use crate::store::Persisted;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default audit log file name, relative to the working directory
pub const DEFAULT_AUDIT_LOG: &str = "scan_log.txt";

/// Receives the result of each scanned file
pub trait ScanSink {
    /// Called once per file that was scanned to completion
    fn on_file_scanned(&mut self, report: &ScanReport);

    /// Called once per file whose scan failed with an error
    fn on_scan_failed(&mut self, path: &Path, error: &Error) {
        let _ = (path, error);
    }
}

impl<S: ScanSink + ?Sized> ScanSink for &mut S {
    fn on_file_scanned(&mut self, report: &ScanReport) {
        (**self).on_file_scanned(report);
    }

    fn on_scan_failed(&mut self, path: &Path, error: &Error) {
        (**self).on_scan_failed(path, error);
    }
}

impl<A: ScanSink, B: ScanSink> ScanSink for (A, B) {
    fn on_file_scanned(&mut self, report: &ScanReport) {
        self.0.on_file_scanned(report);
        self.1.on_file_scanned(report);
    }

    fn on_scan_failed(&mut self, path: &Path, error: &Error) {
        self.0.on_scan_failed(path, error);
        self.1.on_scan_failed(path, error);
    }
}

/// Append-only log with one line per extracted image
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Creates a log that appends to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a single line
    pub fn append(&self, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::file_write(&self.path, e))?;
        file.write_all(format!("{}\n", line).as_bytes())
            .map_err(|e| Error::file_write(&self.path, e))
    }
}

impl ScanSink for AuditLog {
    fn on_file_scanned(&mut self, report: &ScanReport) {
        let Some(line) = report.log_line() else {
            return;
        };
        if let Err(e) = self.append(&line) {
            warn!("Failed to append to audit log: {}", e);
        }
    }
}

/// Counters over a batch of scans
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Files scanned to completion
    pub scanned: usize,
    /// Files whose header did not match
    pub not_this_format: usize,
    /// Files smaller than the search start
    pub too_small: usize,
    /// Files without a marker
    pub marker_absent: usize,
    /// Extractions with an undecodable version field
    pub invalid_fields: usize,
    /// Artifacts written
    pub written: usize,
    /// Artifacts that already existed
    pub already_persisted: usize,
    /// Extractions that were not persisted
    pub inspected: usize,
    /// Files whose scan failed with an error
    pub failed: usize,
}

impl ScanSink for ScanStats {
    fn on_file_scanned(&mut self, report: &ScanReport) {
        self.scanned += 1;
        match &report.outcome {
            ScanOutcome::NotThisFormat => self.not_this_format += 1,
            ScanOutcome::TooSmall { .. } => self.too_small += 1,
            ScanOutcome::MarkerAbsent { .. } => self.marker_absent += 1,
            ScanOutcome::Extracted(extraction) => {
                let metadata = &extraction.metadata;
                if !extraction.version.is_valid()
                    || !metadata.current_fw.is_valid()
                    || !metadata.min_fw.is_valid()
                {
                    self.invalid_fields += 1;
                }
                match extraction.persisted {
                    Some(Persisted::Written(_)) => self.written += 1,
                    Some(Persisted::Skipped(_)) => self.already_persisted += 1,
                    None => self.inspected += 1,
                }
            }
        }
    }

    fn on_scan_failed(&mut self, _path: &Path, _error: &Error) {
        self.failed += 1;
    }
}

//! # emcdump-core
//!
//! A library for extracting versioned firmware payloads from firmware
//! container images.
//!
//! This crate provides the core functionality for:
//! - Validating the container signature of candidate images
//! - Locating the version marker inside a bounded search window
//! - Decoding the byte-reversed version fields and fixed-offset metadata
//! - Hashing the firmware region and storing it once under a derived name
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`image`]: Bounded reads from an image on disk
//! - [`decode`]: Field decoders
//! - [`digest`]: MD5 of the firmware region
//! - [`scanner`]: Marker search and the per-image pipeline
//! - [`store`]: Write-once artifact directory
//! - [`sink`]: Per-file result receivers, including the audit log
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use emcdump_core::{ArtifactStore, AuditLog, Scanner, ScanStats};
//!
//! let scanner = Scanner::new();
//! let store = ArtifactStore::new("EMC");
//! let mut sinks = (ScanStats::default(), AuditLog::new("scan_log.txt"));
//!
//! scanner.scan_all(["dump.bin"], Some(&store), &mut sinks);
//! println!("{} written", sinks.0.written);
//! ```
//!
//! ## Extensibility
//!
//! Implement [`ScanSink`] to route per-file results anywhere.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod decode;
pub mod digest;
pub mod error;
pub mod image;
pub mod scanner;
pub mod sink;
pub mod store;

// Re-export primary types for convenience
pub use decode::{Decoded, DottedVersion, VersionTriple};
pub use digest::Md5Digest;
pub use error::{Error, Result};
pub use image::{FirmwareImage, EXPECTED_HEADER};
pub use scanner::{
    ExtractedMetadata, Extraction, MarkerHit, ScanOutcome, ScanReport, Scanner, ScannerConfig,
    SearchWindow,
};
pub use sink::{AuditLog, ScanSink, ScanStats};
pub use store::{ArtifactStore, Persisted};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

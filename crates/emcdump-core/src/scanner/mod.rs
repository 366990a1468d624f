//! Per-image extraction pipeline.
//!
//! ## Algorithm Overview
//!
//! 1. Check the 32-byte container signature at offset 0
//! 2. Reject images smaller than the nominal search start
//! 3. Read the search window and find the first marker occurrence
//! 4. Decode the version triple stored from the marker byte on
//! 5. Decode the metadata fields at their fixed absolute offsets
//! 6. Hash the firmware region and derive the artifact name
//! 7. Persist the region under that name, once
//!
//! Steps 1–3 short-circuit with a [`ScanOutcome`] rather than an error. An
//! undecodable version field does not stop the pipeline: its placeholder text
//! ends up in the artifact name.

mod marker;
mod naming;

use crate::decode::{
    decode_dotted_version, decode_string, decode_version_triple, Decoded, DottedVersion,
    VersionTriple, VERSION_TRIPLE_LEN,
};
use crate::digest::Md5Digest;
use crate::error::{Error, Result};
use crate::image::{FirmwareImage, EXPECTED_HEADER};
use crate::sink::ScanSink;
use crate::store::{ArtifactStore, Persisted};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

pub use marker::{default_pattern, locate, MarkerHit, SearchWindow, MARKER_ZERO_RUN};
pub use naming::artifact_name;

/// Nominal start of the marker search range
pub const DEFAULT_START_OFFSET: u64 = 0x82000;
/// Nominal end of the marker search range
pub const DEFAULT_END_OFFSET: u64 = 0x10FFF0;
/// Bytes added on each side of the nominal search range
pub const DEFAULT_TOLERANCE: u64 = 500;

/// Absolute location of a fixed-width field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpan {
    /// Absolute offset in the image
    pub offset: u64,
    /// Field width in bytes
    pub len: usize,
}

impl FieldSpan {
    /// Creates a new field span
    pub const fn new(offset: u64, len: usize) -> Self {
        Self { offset, len }
    }
}

/// Configuration for the scanner. Defaults describe the known container layout.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Expected signature at offset 0
    pub header: Vec<u8>,
    /// Nominal start of the marker search range
    pub start_offset: u64,
    /// Nominal end of the marker search range
    pub end_offset: u64,
    /// Bytes added on each side of the search range
    pub tolerance: u64,
    /// Marker pattern; its last byte is the marker byte
    pub pattern: Vec<u8>,
    /// Number of bytes captured from the marker byte on
    pub trailing_len: usize,
    /// Hardware model string
    pub hw_model: FieldSpan,
    /// Product ID string
    pub product_id: FieldSpan,
    /// Current firmware version
    pub current_fw: FieldSpan,
    /// Minimum firmware version
    pub min_fw: FieldSpan,
    /// Firmware payload that is hashed and persisted
    pub firmware_region: FieldSpan,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            header: EXPECTED_HEADER.to_vec(),
            start_offset: DEFAULT_START_OFFSET,
            end_offset: DEFAULT_END_OFFSET,
            tolerance: DEFAULT_TOLERANCE,
            pattern: default_pattern(),
            trailing_len: VERSION_TRIPLE_LEN,
            hw_model: FieldSpan::new(0x1C7230, 0x20),
            product_id: FieldSpan::new(0x1C73E0, 0x8),
            current_fw: FieldSpan::new(0x1C8C30, 0x8),
            min_fw: FieldSpan::new(0x1C8C20, 0x8),
            firmware_region: FieldSpan::new(0x4000, 0x62E00),
        }
    }
}

impl ScannerConfig {
    /// Creates a new scanner config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expected header signature
    pub fn header(mut self, header: impl Into<Vec<u8>>) -> Self {
        self.header = header.into();
        self
    }

    /// Sets the nominal marker search range
    pub fn search_range(mut self, start: u64, end: u64) -> Self {
        self.start_offset = start;
        self.end_offset = end;
        self
    }

    /// Sets the tolerance added around the search range
    pub fn tolerance(mut self, tolerance: u64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the marker pattern
    pub fn pattern(mut self, pattern: impl Into<Vec<u8>>) -> Self {
        self.pattern = pattern.into();
        self
    }

    /// Sets the firmware payload region
    pub fn firmware_region(mut self, offset: u64, len: usize) -> Self {
        self.firmware_region = FieldSpan::new(offset, len);
        self
    }

    /// Checks the configuration for inconsistencies
    pub fn validate(&self) -> Result<()> {
        if self.pattern.is_empty() {
            return Err(Error::invalid_config("marker pattern is empty"));
        }
        if self.start_offset > self.end_offset {
            return Err(Error::invalid_config(format!(
                "search start {:#x} is past search end {:#x}",
                self.start_offset, self.end_offset
            )));
        }
        Ok(())
    }
}

/// Metadata read from fixed offsets of an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMetadata {
    /// Hardware model
    pub hw_model: String,
    /// Product ID
    pub product_id: String,
    /// Current firmware version
    pub current_fw: Decoded<DottedVersion>,
    /// Minimum firmware version
    pub min_fw: Decoded<DottedVersion>,
    /// MD5 of the firmware region
    pub region_digest: Md5Digest,
}

/// Everything extracted from an image that carries a marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Window that was searched
    pub window: SearchWindow,
    /// Where the marker was found
    pub hit: MarkerHit,
    /// Version triple decoded after the marker
    pub version: Decoded<VersionTriple>,
    /// Fixed-offset metadata
    pub metadata: ExtractedMetadata,
    /// Derived artifact file name
    pub artifact_name: String,
    /// Storage outcome, `None` when scanning without a store
    pub persisted: Option<Persisted>,
}

/// How a scan of one image ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Header signature did not match
    NotThisFormat,
    /// Image ends before the nominal search start
    TooSmall {
        /// Minimum size required
        required: u64,
    },
    /// Marker pattern not found in the window
    MarkerAbsent {
        /// Window that was searched
        window: SearchWindow,
    },
    /// Marker found and metadata extracted
    Extracted(Box<Extraction>),
}

impl ScanOutcome {
    /// Short tag describing the outcome
    pub fn tag(&self) -> &'static str {
        match self {
            Self::NotThisFormat => "not-this-format",
            Self::TooSmall { .. } => "too-small",
            Self::MarkerAbsent { .. } => "marker-absent",
            Self::Extracted(extraction) => match &extraction.persisted {
                Some(Persisted::Written(_)) => "written",
                Some(Persisted::Skipped(_)) => "already-persisted",
                None => "extracted",
            },
        }
    }

    /// Extraction details, if the marker was found
    pub fn extraction(&self) -> Option<&Extraction> {
        match self {
            Self::Extracted(extraction) => Some(extraction.as_ref()),
            _ => None,
        }
    }
}

/// Result of scanning one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Scanned path
    pub path: PathBuf,
    /// Image size in bytes
    pub size: u64,
    /// How the scan ended
    pub outcome: ScanOutcome,
}

impl ScanReport {
    /// Audit log line for an extracted image
    pub fn log_line(&self) -> Option<String> {
        let extraction = self.outcome.extraction()?;
        let metadata = &extraction.metadata;
        Some(format!(
            "{}: {}, {}, {}, {}, {}",
            self.path.display(),
            extraction.version,
            metadata.current_fw,
            metadata.min_fw,
            metadata.hw_model,
            metadata.region_digest
        ))
    }
}

/// Firmware image scanner
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScannerConfig,
}

impl Scanner {
    /// Creates a new scanner with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active configuration
    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scans one image and persists its payload into `store`
    pub fn scan_file(&self, path: impl AsRef<Path>, store: &ArtifactStore) -> Result<ScanReport> {
        self.run(path.as_ref(), Some(store))
    }

    /// Scans one image without persisting anything
    pub fn inspect_file(&self, path: impl AsRef<Path>) -> Result<ScanReport> {
        self.run(path.as_ref(), None)
    }

    /// Scans every path in turn and reports each result to `sink`.
    ///
    /// Errors are reported per file and never stop the batch. With no store
    /// the images are only inspected.
    pub fn scan_all<I, P, S>(&self, paths: I, store: Option<&ArtifactStore>, sink: &mut S)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
        S: ScanSink + ?Sized,
    {
        for path in paths {
            let path = path.as_ref();
            match self.run(path, store) {
                Ok(report) => sink.on_file_scanned(&report),
                Err(e) => {
                    debug!("Scan of {} failed: {}", path.display(), e);
                    sink.on_scan_failed(path, &e);
                }
            }
        }
    }

    fn run(&self, path: &Path, store: Option<&ArtifactStore>) -> Result<ScanReport> {
        let config = &self.config;
        let image = FirmwareImage::open(path)?;
        debug!("Scanning {} ({} bytes)", path.display(), image.size());

        let report = |outcome| ScanReport {
            path: path.to_path_buf(),
            size: image.size(),
            outcome,
        };

        if !image.has_header(&config.header)? {
            debug!("Header not found in {}", path.display());
            return Ok(report(ScanOutcome::NotThisFormat));
        }

        if image.size() < config.start_offset {
            debug!(
                "{} is too small for search start {:#x}",
                path.display(),
                config.start_offset
            );
            return Ok(report(ScanOutcome::TooSmall {
                required: config.start_offset,
            }));
        }

        let window = SearchWindow::around(
            config.start_offset,
            config.end_offset,
            config.tolerance,
            image.size(),
        );
        let window_len = usize::try_from(window.len())
            .map_err(|_| Error::internal(format!("search window {} exceeds memory", window)))?;
        let window_bytes = image.read_at(window.start, window_len)?;
        debug!("Searching {}", window);

        let Some(hit) = MarkerHit::find(
            &window_bytes,
            &window,
            &config.pattern,
            config.trailing_len,
        ) else {
            debug!("Marker not found in {}", path.display());
            return Ok(report(ScanOutcome::MarkerAbsent { window }));
        };
        trace!(
            "Marker at {:#x} (pattern at {:#x}), trailing {}",
            hit.marker_offset,
            hit.pattern_offset,
            hit.trailing_hex()
        );

        let version = decode_version_triple(&hit.trailing);
        if !version.is_valid() {
            warn!(
                "Version data after marker in {} is too short ({} bytes)",
                path.display(),
                hit.trailing.len()
            );
        }

        let metadata = self.extract_metadata(&image)?;
        let artifact_name = artifact_name(&version, &metadata);

        let persisted = match store {
            Some(store) => {
                let region = config.firmware_region;
                let payload = image.read_at(region.offset, region.len)?;
                Some(store.persist(&payload, &artifact_name)?)
            }
            None => None,
        };

        Ok(report(ScanOutcome::Extracted(Box::new(Extraction {
            window,
            hit,
            version,
            metadata,
            artifact_name,
            persisted,
        }))))
    }

    fn extract_metadata(&self, image: &FirmwareImage) -> Result<ExtractedMetadata> {
        let config = &self.config;
        let read = |span: FieldSpan| image.read_at(span.offset, span.len);

        let current_fw = decode_dotted_version(&read(config.current_fw)?);
        let min_fw = decode_dotted_version(&read(config.min_fw)?);
        for (name, field) in [("current", &current_fw), ("minimum", &min_fw)] {
            if let Decoded::Invalid { actual_len } = field {
                warn!(
                    "{} firmware version in {} is too short ({} bytes)",
                    name,
                    image.path().display(),
                    actual_len
                );
            }
        }

        let region = config.firmware_region;
        Ok(ExtractedMetadata {
            hw_model: decode_string(&read(config.hw_model)?),
            product_id: decode_string(&read(config.product_id)?),
            current_fw,
            min_fw,
            region_digest: image.digest_region(region.offset, region.len as u64)?,
        })
    }
}

//! Artifact file names.
//!
//! The name doubles as the deduplication key in the artifact store.

use super::ExtractedMetadata;
use crate::decode::{Decoded, VersionTriple};

/// Derives `"{version}_{current}_{minimum}_{hw_model}_{md5}.bin"`.
///
/// Dots are dropped from the firmware versions. Characters of the hardware
/// model that cannot appear in a file name are replaced with `_`.
pub fn artifact_name(version: &Decoded<VersionTriple>, metadata: &ExtractedMetadata) -> String {
    format!(
        "{}_{}_{}_{}_{}.bin",
        version,
        metadata.current_fw.without_dots(),
        metadata.min_fw.without_dots(),
        file_name_safe(&metadata.hw_model),
        metadata.region_digest
    )
}

fn file_name_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

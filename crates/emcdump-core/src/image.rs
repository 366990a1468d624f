//! Read-only access to firmware container images on disk.
//!
//! A [`FirmwareImage`] only remembers the path and size of the file. Every
//! read opens its own handle and drops it before returning, so no descriptor
//! outlives the stage that needed it.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::trace;

/// 32-byte signature every firmware container starts with
pub const EXPECTED_HEADER: &[u8; 32] = b"SONY COMPUTER ENTERTAINMENT INC.";

/// A borrowed view of a firmware image file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    path: PathBuf,
    size: u64,
}

impl FirmwareImage {
    /// Stats the file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| Error::file_read(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    /// Path of the image
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the image in bytes at the time it was opened
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns true if the image begins with `expected`.
    ///
    /// A short file is a mismatch, not an error.
    pub fn has_header(&self, expected: &[u8]) -> Result<bool> {
        let head = self.read_at(0, expected.len())?;
        trace!("Header of {}: {:02x?}", self.path.display(), head);
        Ok(head == expected)
    }

    /// Reads up to `len` bytes starting at `offset`.
    ///
    /// Fewer bytes are returned when the file ends first.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(len);
        self.open_at(offset)?
            .take(len as u64)
            .read_to_end(&mut buffer)
            .map_err(|e| Error::file_read(&self.path, e))?;
        Ok(buffer)
    }

    /// Opens a fresh handle positioned at `offset`
    pub(crate) fn open_at(&self, offset: u64) -> Result<File> {
        let mut file = File::open(&self.path).map_err(|e| Error::file_read(&self.path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::file_read(&self.path, e))?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn image_with(bytes: &[u8]) -> (NamedTempFile, FirmwareImage) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        let image = FirmwareImage::open(file.path()).unwrap();
        (file, image)
    }

    #[test]
    fn test_header_match() {
        let mut bytes = EXPECTED_HEADER.to_vec();
        bytes.extend_from_slice(&[0xFF; 64]);
        let (_file, image) = image_with(&bytes);
        assert_eq!(image.size(), 96);
        assert!(image.has_header(EXPECTED_HEADER).unwrap());
    }

    #[test]
    fn test_header_mismatch() {
        let mut bytes = EXPECTED_HEADER.to_vec();
        bytes[31] = b'!';
        let (_file, image) = image_with(&bytes);
        assert!(!image.has_header(EXPECTED_HEADER).unwrap());
    }

    #[test]
    fn test_header_short_file() {
        let (_file, image) = image_with(&EXPECTED_HEADER[..20]);
        assert!(!image.has_header(EXPECTED_HEADER).unwrap());
    }

    #[test]
    fn test_read_at_past_end() {
        let (_file, image) = image_with(b"0123456789");
        assert_eq!(image.read_at(6, 10).unwrap(), b"6789");
        assert!(image.read_at(64, 4).unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FirmwareImage::open(dir.path().join("missing.bin")).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}

//! MD5 digest of a fixed region of an image.
//!
//! The digest only identifies payloads for naming and deduplication. It is
//! not an integrity check.

use crate::error::{Error, Result};
use crate::image::FirmwareImage;
use std::fmt;
use std::io::Read;
use tracing::trace;

/// 128-bit MD5 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Md5Digest([u8; 16]);

impl Md5Digest {
    /// Digest of an in-memory buffer
    pub fn of(bytes: &[u8]) -> Self {
        Self(md5::compute(bytes).0)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex rendering (32 characters)
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Md5Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FirmwareImage {
    /// Hashes up to `len` bytes starting at `offset`.
    ///
    /// The seek must succeed; a region cut short by the end of the file is
    /// hashed as-is.
    pub fn digest_region(&self, offset: u64, len: u64) -> Result<Md5Digest> {
        let file = self.open_at(offset)?;
        let mut context = md5::Context::new();
        let hashed = std::io::copy(&mut file.take(len), &mut context)
            .map_err(|e| Error::file_read(self.path(), e))?;

        trace!(
            "Hashed {} of {} bytes at {:#x} in {}",
            hashed,
            len,
            offset,
            self.path().display()
        );
        Ok(Md5Digest(context.compute().0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_image() -> (NamedTempFile, FirmwareImage) {
        let mut file = NamedTempFile::new().unwrap();
        let bytes: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        let image = FirmwareImage::open(file.path()).unwrap();
        (file, image)
    }

    #[test]
    fn test_known_vector() {
        assert_eq!(
            Md5Digest::of(b"").to_hex(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_region_matches_in_memory_digest() {
        let (file, image) = sample_image();
        let bytes = std::fs::read(file.path()).unwrap();
        let digest = image.digest_region(0x100, 0x200).unwrap();
        assert_eq!(digest, Md5Digest::of(&bytes[0x100..0x300]));
    }

    #[test]
    fn test_region_is_deterministic() {
        let (_file, image) = sample_image();
        let first = image.digest_region(16, 1024).unwrap();
        let second = image.digest_region(16, 1024).unwrap();
        let longer = image.digest_region(16, 1025).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, longer);
    }

    #[test]
    fn test_region_truncated_at_eof() {
        let (file, image) = sample_image();
        let bytes = std::fs::read(file.path()).unwrap();
        let digest = image.digest_region(4000, 0x1000).unwrap();
        assert_eq!(digest, Md5Digest::of(&bytes[4000..]));
    }
}

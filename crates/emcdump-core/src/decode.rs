//! Decoding of fixed-width fields read from a firmware image.
//!
//! Both version encodings are stored byte-reversed on disk. The decoders
//! reverse the buffer explicitly and then read it in a fixed byte order, so
//! the result never depends on the host's endianness.
//!
//! Version fields that are too short decode to [`Decoded::Invalid`]. The
//! invalid value still renders (as a placeholder) so callers can carry it
//! into reports and artifact names without special casing.

use std::fmt;

/// Minimum number of bytes needed to decode a [`VersionTriple`]
pub const VERSION_TRIPLE_LEN: usize = 16;

/// Minimum number of bytes needed to decode a [`DottedVersion`]
pub const DOTTED_VERSION_MIN_LEN: usize = 2;

/// Text rendered in place of a field that could not be decoded
pub trait Placeholder {
    /// Placeholder text
    const PLACEHOLDER: &'static str;
}

/// Outcome of decoding a field that has a minimum length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded<T> {
    /// Field decoded successfully
    Valid(T),
    /// Input was shorter than the field requires
    Invalid {
        /// Number of bytes that were available
        actual_len: usize,
    },
}

impl<T> Decoded<T> {
    /// Returns true if the field decoded successfully
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Returns the decoded value, if any
    pub fn valid(&self) -> Option<&T> {
        match self {
            Self::Valid(value) => Some(value),
            Self::Invalid { .. } => None,
        }
    }
}

impl<T: fmt::Display + Placeholder> fmt::Display for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid(value) => value.fmt(f),
            Self::Invalid { .. } => f.write_str(T::PLACEHOLDER),
        }
    }
}

/// Version triple stored after the marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionTriple {
    /// Major component
    pub major: u16,
    /// Minor component
    pub minor: u16,
    /// Build component
    pub build: u16,
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X} {:04X} {:04X}", self.major, self.minor, self.build)
    }
}

impl Placeholder for VersionTriple {
    const PLACEHOLDER: &'static str = "(Invalid version data)";
}

/// Two-component firmware version such as `04.70`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DottedVersion {
    /// Major component
    pub major: u8,
    /// Minor component
    pub minor: u8,
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}.{:02X}", self.major, self.minor)
    }
}

impl Placeholder for DottedVersion {
    const PLACEHOLDER: &'static str = "(Invalid firmware version)";
}

impl Decoded<DottedVersion> {
    /// Rendered form with the dots removed, as used in artifact names
    pub fn without_dots(&self) -> String {
        self.to_string().replace('.', "")
    }
}

/// Decodes the version triple that follows the marker.
///
/// The first 16 bytes are reversed, then read as three big-endian `u16`.
pub fn decode_version_triple(bytes: &[u8]) -> Decoded<VersionTriple> {
    if bytes.len() < VERSION_TRIPLE_LEN {
        return Decoded::Invalid {
            actual_len: bytes.len(),
        };
    }

    let reversed = reversed(&bytes[..VERSION_TRIPLE_LEN]);
    let word = |i: usize| u16::from_be_bytes([reversed[i], reversed[i + 1]]);

    Decoded::Valid(VersionTriple {
        major: word(0),
        minor: word(2),
        build: word(4),
    })
}

/// Decodes a dotted firmware version.
///
/// The buffer is reversed and its first two bytes become major and minor.
pub fn decode_dotted_version(bytes: &[u8]) -> Decoded<DottedVersion> {
    if bytes.len() < DOTTED_VERSION_MIN_LEN {
        return Decoded::Invalid {
            actual_len: bytes.len(),
        };
    }

    let reversed = reversed(bytes);
    Decoded::Valid(DottedVersion {
        major: reversed[0],
        minor: reversed[1],
    })
}

/// Decodes a NUL-padded string field.
///
/// Invalid UTF-8 sequences are dropped and NUL padding is trimmed from both
/// ends. Never fails.
pub fn decode_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // Checked by from_utf8 above
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match e.error_len() {
                    Some(skip) => rest = &after[skip..],
                    None => break,
                }
            }
        }
    }

    out.trim_matches('\0').to_string()
}

fn reversed(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_version_triple_reads_reversed_big_endian() {
        // Reversed buffer is 00 01 00 02 00 03 ...
        let mut bytes = [0xEEu8; 16];
        bytes[15] = 0x00;
        bytes[14] = 0x01;
        bytes[13] = 0x00;
        bytes[12] = 0x02;
        bytes[11] = 0x00;
        bytes[10] = 0x03;

        let decoded = decode_version_triple(&bytes);
        assert_eq!(
            decoded,
            Decoded::Valid(VersionTriple {
                major: 0x0001,
                minor: 0x0002,
                build: 0x0003,
            })
        );
        assert_eq!(decoded.to_string(), "0001 0002 0003");
    }

    #[test]
    fn test_version_triple_ignores_bytes_past_sixteen() {
        let mut bytes = vec![0u8; 20];
        bytes[15] = 0xAB;
        bytes[14] = 0xCD;
        bytes[19] = 0xFF;

        let decoded = decode_version_triple(&bytes);
        assert_eq!(decoded.valid().map(|v| v.major), Some(0xABCD));
    }

    #[test]
    fn test_version_triple_too_short() {
        let decoded = decode_version_triple(&[0x01; 15]);
        assert_eq!(decoded, Decoded::Invalid { actual_len: 15 });
        assert!(!decoded.is_valid());
        assert_eq!(decoded.to_string(), "(Invalid version data)");
    }

    #[test]
    fn test_dotted_version_two_bytes() {
        let decoded = decode_dotted_version(&[0x10, 0x20]);
        assert_eq!(decoded.to_string(), "20.10");
        assert_eq!(decoded.without_dots(), "2010");
    }

    #[test]
    fn test_dotted_version_uses_tail_of_buffer() {
        let decoded = decode_dotted_version(&[0, 0, 0, 0, 0, 0, 0x70, 0x04]);
        assert_eq!(
            decoded.valid(),
            Some(&DottedVersion {
                major: 0x04,
                minor: 0x70
            })
        );
        assert_eq!(decoded.to_string(), "04.70");
    }

    #[test]
    fn test_dotted_version_too_short() {
        let decoded = decode_dotted_version(&[0x42]);
        assert_eq!(decoded, Decoded::Invalid { actual_len: 1 });
        assert_eq!(decoded.to_string(), "(Invalid firmware version)");
        assert_eq!(decoded.without_dots(), "(Invalid firmware version)");
    }

    #[test]
    fn test_decode_string_trims_padding() {
        assert_eq!(decode_string(b"COK-001\0\0\0\0"), "COK-001");
        assert_eq!(decode_string(b"\0\0CEB\0"), "CEB");
        assert_eq!(decode_string(&[0u8; 8]), "");
    }

    #[test]
    fn test_decode_string_drops_invalid_utf8() {
        assert_eq!(decode_string(b"DE\xFFCK\xC3\0"), "DECK");
        assert_eq!(decode_string("caf\u{e9}".as_bytes()), "caf\u{e9}");
    }
}

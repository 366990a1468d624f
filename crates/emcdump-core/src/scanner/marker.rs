//! Bounded search for the version marker.
//!
//! The marker is a run of zero bytes terminated by `0x01`. It is searched for
//! in a window around the nominal range, widened by a tolerance on both sides
//! and clamped to the file.

use std::fmt;
use std::ops::Range;

/// Number of zero bytes preceding the `0x01` marker byte
pub const MARKER_ZERO_RUN: usize = 80;

/// Default marker pattern: 80 zero bytes followed by `0x01`
pub fn default_pattern() -> Vec<u8> {
    let mut pattern = vec![0u8; MARKER_ZERO_RUN];
    pattern.push(0x01);
    pattern
}

/// Byte range of an image that is searched for the marker.
///
/// Always satisfies `start <= end <= size` for the image it was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    /// First byte of the window (inclusive)
    pub start: u64,
    /// End of the window (exclusive)
    pub end: u64,
}

impl SearchWindow {
    /// Builds the window `[start - tolerance, end + tolerance)` clamped to
    /// `[0, size]`
    pub fn around(start: u64, end: u64, tolerance: u64, size: u64) -> Self {
        let end = end.saturating_add(tolerance).min(size);
        let start = start.saturating_sub(tolerance).min(end);
        Self { start, end }
    }

    /// Window length in bytes
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns true if the window covers no bytes
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Window as a range of absolute offsets
    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

impl fmt::Display for SearchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x} to {:#x} ({} bytes)",
            self.start,
            self.end,
            self.len()
        )
    }
}

/// First occurrence of the marker pattern in a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerHit {
    /// Absolute offset of the first pattern byte
    pub pattern_offset: u64,
    /// Absolute offset of the `0x01` marker byte (last pattern byte)
    pub marker_offset: u64,
    /// Bytes starting at the marker byte, cut short by the end of the window
    pub trailing: Vec<u8>,
}

impl MarkerHit {
    /// Searches `bytes` (the contents of `window`) for `pattern` and captures
    /// up to `trailing_len` bytes from the marker byte on
    pub fn find(
        bytes: &[u8],
        window: &SearchWindow,
        pattern: &[u8],
        trailing_len: usize,
    ) -> Option<Self> {
        let relative = locate(bytes, pattern)?;
        let marker = relative + pattern.len() - 1;
        let trailing_end = marker.saturating_add(trailing_len).min(bytes.len());

        Some(Self {
            pattern_offset: window.start + relative as u64,
            marker_offset: window.start + marker as u64,
            trailing: bytes[marker..trailing_end].to_vec(),
        })
    }

    /// Trailing bytes as lowercase hex
    pub fn trailing_hex(&self) -> String {
        self.trailing.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Offset of the leftmost occurrence of `pattern` in `haystack`.
///
/// An empty pattern never matches.
pub fn locate(haystack: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() {
        return None;
    }
    haystack
        .windows(pattern.len())
        .position(|window| window == pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_locate() {
        let data = b"hello.bin.world";
        assert_eq!(locate(data, b".bin"), Some(5));
        assert_eq!(locate(data, b"world"), Some(10));
        assert_eq!(locate(data, b"missing"), None);
        assert_eq!(locate(data, b""), None);
        assert_eq!(locate(b"ab", b"abc"), None);
    }

    #[test]
    fn test_locate_returns_leftmost() {
        let pattern = default_pattern();
        let mut data = vec![0xFFu8; 400];
        data[50..50 + pattern.len()].copy_from_slice(&pattern);
        data[250..250 + pattern.len()].copy_from_slice(&pattern);
        assert_eq!(locate(&data, &pattern), Some(50));
    }

    #[test]
    fn test_long_zero_run_matches_at_last_position() {
        let pattern = default_pattern();
        let mut data = vec![0u8; 200];
        data[150] = 0x01;
        assert_eq!(locate(&data, &pattern), Some(150 - MARKER_ZERO_RUN));
    }

    #[test]
    fn test_window_clamping() {
        assert_eq!(
            SearchWindow::around(0x82000, 0x10FFF0, 500, 0x200000),
            SearchWindow {
                start: 0x82000 - 500,
                end: 0x10FFF0 + 500,
            }
        );
        assert_eq!(
            SearchWindow::around(100, 1000, 500, 0x90000),
            SearchWindow { start: 0, end: 1500 }
        );
        let clamped = SearchWindow::around(0x82000, 0x10FFF0, 500, 0x90000);
        assert_eq!(clamped.end, 0x90000);
        assert_eq!(clamped.len(), 0x90000 - (0x82000 - 500));
    }

    #[test]
    fn test_window_never_inverted() {
        let window = SearchWindow::around(1000, 10, 0, 5000);
        assert!(window.start <= window.end);
        assert!(window.is_empty());
    }

    #[test]
    fn test_marker_hit_offsets() {
        let pattern = default_pattern();
        let window = SearchWindow { start: 0x1000, end: 0x1200 };
        let mut bytes = vec![0xAAu8; 0x200];
        bytes[0x20..0x20 + pattern.len()].copy_from_slice(&pattern);

        let hit = MarkerHit::find(&bytes, &window, &pattern, 16).unwrap();
        assert_eq!(hit.pattern_offset, 0x1020);
        assert_eq!(hit.marker_offset, 0x1020 + 80);
        assert_eq!(hit.trailing.len(), 16);
        assert_eq!(hit.trailing[0], 0x01);
        assert!(hit.trailing[1..].iter().all(|&b| b == 0xAA));
        assert_eq!(&hit.trailing_hex()[..4], "01aa");
    }

    #[test]
    fn test_marker_hit_trailing_cut_by_window() {
        let pattern = default_pattern();
        let window = SearchWindow { start: 0, end: 90 };
        let mut bytes = vec![0u8; 90];
        bytes[85] = 0x01;

        let hit = MarkerHit::find(&bytes, &window, &pattern, 16).unwrap();
        assert_eq!(hit.marker_offset, 85);
        assert_eq!(hit.trailing, vec![0x01, 0, 0, 0, 0]);
    }
}

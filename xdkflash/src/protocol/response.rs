//! Parsers for the textual responses of the XDK110 bootloader.
//!
//! The bootloader answers maintenance commands with plain text lines such as
//!
//! ```text
//! BOOTLOADER version V1.2.0
//! ID 4A2F0C11
//! Ready
//! CRC0000ABCD
//! ```
//!
//! Everything here is pure: functions take a line (trailing CR/LF already
//! removed by the line reader) and never perform I/O.

use regex::bytes::Regex;
use std::fmt;
use std::sync::LazyLock;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?-u)BOOTLOADER version V([0-9]+)\.([0-9]+)\.([0-9]+)")
        .expect("static version pattern")
});

static CORE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)^.*ID(.*)").expect("static core id pattern"));

/// Prefix of the line answering the Info command.
pub const INFO_PREFIX: &[u8] = b"BOOTLOADER version";

/// Marker the bootloader prints when it is ready to receive an upload.
pub const READY_MARKER: &[u8] = b"Ready";

/// Bootloader version triplet.
///
/// `0.0.0` doubles as the "could not parse" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Version {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl Version {
    /// Sentinel returned when no version could be extracted.
    pub const UNKNOWN: Self = Self::new(0, 0, 0);

    /// Create a version triplet.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether this is the "could not parse" sentinel.
    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl From<(u32, u32, u32)> for Version {
    fn from((major, minor, patch): (u32, u32, u32)) -> Self {
        Self::new(major, minor, patch)
    }
}

/// Classification of a bootloader response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `BOOTLOADER version ...` answer to the Info command.
    Info,
    /// Line containing `Ready`.
    Ready,
    /// Checksum report (`0000xxxx` or `CRC0000xxxx`).
    Checksum,
    /// Anything else.
    Other,
}

/// Parse the bootloader version from an Info line.
///
/// `None` when the line does not carry a version or a component does not fit
/// in a `u32`. A literal `V0.0.0` parses as `Some`.
pub fn parse_version(line: &[u8]) -> Option<Version> {
    let caps = VERSION_PATTERN.captures_iter(line).last()?;

    let component = |i: usize| -> Option<u32> {
        let digits = caps.get(i)?.as_bytes();
        std::str::from_utf8(digits).ok()?.parse().ok()
    };

    Some(Version::new(component(1)?, component(2)?, component(3)?))
}

/// Extract the bootloader version from an Info line.
///
/// Returns [`Version::UNKNOWN`] where [`parse_version`] returns `None`.
pub fn extract_version(line: &[u8]) -> Version {
    parse_version(line).unwrap_or(Version::UNKNOWN)
}

/// Extract the core identifier following the last `ID` marker of a line.
///
/// The remainder is trimmed of surrounding whitespace; an `ID` at the very end
/// of the line yields an empty identifier.
pub fn extract_core_id(line: &[u8]) -> Option<String> {
    let caps = CORE_ID_PATTERN.captures(line)?;
    let rest = caps.get(1)?.as_bytes().trim_ascii();
    Some(String::from_utf8_lossy(rest).into_owned())
}

/// Whether the line answers the Info command.
pub fn is_info_line(line: &[u8]) -> bool {
    line.starts_with(INFO_PREFIX)
}

/// Whether the line reports the bootloader as ready for an upload.
pub fn is_ready_line(line: &[u8]) -> bool {
    line.windows(READY_MARKER.len())
        .any(|w| w == READY_MARKER)
}

/// Whether the line is a checksum report.
pub fn is_checksum_line(line: &[u8]) -> bool {
    (line.starts_with(b"0000") && line.len() == 8)
        || (line.starts_with(b"CRC0000") && line.len() == 11)
}

/// Classify a response line. Matching is case-sensitive.
pub fn classify(line: &[u8]) -> LineKind {
    if is_info_line(line) {
        LineKind::Info
    } else if is_ready_line(line) {
        LineKind::Ready
    } else if is_checksum_line(line) {
        LineKind::Checksum
    } else {
        LineKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_version() {
        assert_eq!(
            extract_version(b"BOOTLOADER version V1.2.0..."),
            Version::new(1, 2, 0)
        );
        assert_eq!(
            extract_version(b"XDK110 BOOTLOADER version V0.0.10 (build 7)"),
            Version::new(0, 0, 10)
        );
    }

    #[test]
    fn test_parse_version_distinguishes_literal_zero() {
        assert_eq!(
            parse_version(b"BOOTLOADER version V0.0.0"),
            Some(Version::UNKNOWN)
        );
        assert_eq!(parse_version(b"BOOTLOADER version unknown"), None);
        assert_eq!(parse_version(b"BOOTLOADER version V99999999999.0.0"), None);
    }

    #[test]
    fn test_extract_version_garbage_is_sentinel() {
        assert_eq!(extract_version(b"garbage"), Version::UNKNOWN);
        assert_eq!(extract_version(b""), Version::UNKNOWN);
        assert_eq!(extract_version(b"BOOTLOADER version V1.2"), Version::UNKNOWN);
        assert!(extract_version(b"bootloader version V1.2.0").is_unknown());
    }

    #[test]
    fn test_extract_version_overflow_is_sentinel() {
        assert_eq!(
            extract_version(b"BOOTLOADER version V99999999999.0.0"),
            Version::UNKNOWN
        );
    }

    #[test]
    fn test_extract_version_tolerates_binary_noise() {
        assert_eq!(
            extract_version(b"\xff\x00BOOTLOADER version V1.1.0\xfe"),
            Version::new(1, 1, 0)
        );
    }

    #[test]
    fn test_extract_core_id() {
        assert_eq!(extract_core_id(b"ID1234ABCD").as_deref(), Some("1234ABCD"));
        assert_eq!(
            extract_core_id(b"Core ID:  0815  ").as_deref(),
            Some(":  0815")
        );
        assert_eq!(extract_core_id(b"no match"), None);
    }

    #[test]
    fn test_extract_core_id_uses_last_marker() {
        assert_eq!(extract_core_id(b"ID ID 42").as_deref(), Some("42"));
        assert_eq!(extract_core_id(b"ID").as_deref(), Some(""));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(b"BOOTLOADER version V1.2.0"), LineKind::Info);
        assert_eq!(classify(b"Ready"), LineKind::Ready);
        assert_eq!(classify(b"XMODEM Ready for upload"), LineKind::Ready);
        assert_eq!(classify(b"0000ABCD"), LineKind::Checksum);
        assert_eq!(classify(b"CRC0000ABCD"), LineKind::Checksum);
        assert_eq!(classify(b"hello"), LineKind::Other);
        assert_eq!(classify(b""), LineKind::Other);
    }

    #[test]
    fn test_classify_is_case_sensitive() {
        assert_eq!(classify(b"ready"), LineKind::Other);
        assert_eq!(classify(b"bootloader version V1.2.0"), LineKind::Other);
    }

    #[test]
    fn test_checksum_requires_exact_length() {
        assert_eq!(classify(b"0000ABC"), LineKind::Other);
        assert_eq!(classify(b"0000ABCDE"), LineKind::Other);
        assert_eq!(classify(b"CRC0000ABC"), LineKind::Other);
        assert_eq!(classify(b"CRC0000ABCDE"), LineKind::Other);
    }

    #[test]
    fn test_info_takes_precedence_over_ready() {
        assert_eq!(classify(b"BOOTLOADER version V1.2.0 Ready"), LineKind::Info);
    }

    #[test]
    fn test_version_display() {
        assert_eq!(Version::new(0, 0, 10).to_string(), "0.0.10");
    }
}

//! Known XDK110 bootloader revisions and their flash layouts.
//!
//! The table is data: supporting a new bootloader release means appending a
//! row. Lookup is a linear scan where the first matching version wins, so the
//! order of rows is significant when versions repeat.

use crate::protocol::response::Version;
use std::fmt;

/// Flash layout and transfer limit of one bootloader revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BootloaderType {
    /// Human-readable label.
    pub label: &'static str,
    /// Flash address the application code is written to.
    pub code_address: u32,
    /// Flash address of the FOTA header, for layouts that reserve one.
    pub fota_header_address: Option<u32>,
    /// Version reported by the bootloader.
    pub version: Version,
    /// Largest image the bootloader accepts over XMODEM.
    pub max_image_size: usize,
}

impl BootloaderType {
    /// Whether the layout reserves a FOTA header in front of the code.
    pub fn has_fota_header(&self) -> bool {
        self.fota_header_address.is_some()
    }

    /// Whether an image of `size` bytes fits the transfer limit.
    pub fn accepts(&self, size: usize) -> bool {
        size <= self.max_image_size
    }
}

impl fmt::Display for BootloaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (V{}, code @ 0x{:08X}",
            self.label, self.version, self.code_address
        )?;
        if let Some(header) = self.fota_header_address {
            write!(f, ", FOTA header @ 0x{header:08X}")?;
        }
        write!(f, ", max {} bytes)", self.max_image_size)
    }
}

const fn row(
    label: &'static str,
    code_address: u32,
    fota_header_address: Option<u32>,
    version: (u32, u32, u32),
    max_image_size: usize,
) -> BootloaderType {
    BootloaderType {
        label,
        code_address,
        fota_header_address,
        version: Version::new(version.0, version.1, version.2),
        max_image_size,
    }
}

/// All known bootloader revisions, in lookup order.
///
/// The two generic layouts both report `0.0.0`, so only "With FOTA Header"
/// is reachable through [`lookup`]; they are kept for display.
pub const BOOTLOADER_TYPES: &[BootloaderType] = &[
    row("With FOTA Header", 0x0002_0000, Some(0x0002_0200), (0, 0, 0), 917_504),
    row("Without FOTA Header", 0x0001_0000, None, (0, 0, 0), 983_040),
    row("0.0.9", 0x0001_0000, None, (0, 0, 9), 983_040),
    row("0.0.10", 0x0001_0000, None, (0, 0, 10), 983_040),
    row("1.0.0", 0x0002_0000, Some(0x0002_0200), (1, 0, 0), 614_400),
    row("1.1.0", 0x0002_0000, Some(0x0002_0200), (1, 1, 0), 614_400),
    row("1.2.0", 0x0002_0000, Some(0x0002_0200), (1, 2, 0), 917_504),
];

/// Find the first bootloader revision reporting `version`.
pub fn lookup(version: Version) -> Option<&'static BootloaderType> {
    BOOTLOADER_TYPES.iter().find(|b| b.version == version)
}

/// All known bootloader revisions.
pub fn all() -> &'static [BootloaderType] {
    BOOTLOADER_TYPES
}

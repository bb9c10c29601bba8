//! Error types for xdkflash.

use crate::protocol::response::Version;
use std::io;
use thiserror::Error;

/// Result type for xdkflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for xdkflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The configured serial port is not present in the port list.
    #[error("Serial port {0} not found")]
    PortNotFound(String),

    /// The bootloader reported a version with no known capability entry.
    #[error("Unrecognized bootloader version {0}")]
    UnrecognizedBootloader(Version),

    /// The firmware image does not fit the bootloader's transfer limit.
    #[error(
        "Flashing aborted due to not supported firmware size for XMODEM file transfer. \
         The supported size for the {label} bootloader is {limit} bytes, \
         size of {path} is {size} bytes"
    )]
    ImageTooLarge {
        /// Bootloader label from the capability table.
        label: &'static str,
        /// Maximum image size accepted by the bootloader.
        limit: usize,
        /// Name or path of the firmware image.
        path: String,
        /// Actual image size.
        size: usize,
    },

    /// Block transfer failed.
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Operation cancelled by the embedding application.
    #[error("Operation interrupted")]
    Interrupted,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

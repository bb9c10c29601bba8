//! # xdkflash
//!
//! A library for flashing Bosch XDK110 devices through their serial
//! bootloader.
//!
//! This crate provides the device protocol engine:
//!
//! - Device mode detection from USB port metadata
//! - Mode-aware dispatch of bootloader commands
//! - Parsing of bootloader responses (version, core id, ready, checksum)
//! - Per-version capability table (flash layout and image size limit)
//! - XMODEM transfer with filtering of device diagnostics
//! - The flash session state machine tying it together
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport` crate
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use xdkflash::{FirmwareImage, SessionConfig, SessionOrchestrator};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = FirmwareImage::from_file("app.bin")?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         use xdkflash::{DeviceModeDetector, NativePort, NativePortEnumerator};
//!
//!         let port = NativePort::open_simple("/dev/ttyACM0", 19200)?;
//!         let modes = DeviceModeDetector::new(NativePortEnumerator, "/dev/ttyACM0");
//!         let mut session = SessionOrchestrator::new(port, modes, SessionConfig::default());
//!
//!         session.flash(&image, |sent, total| {
//!             println!("Flashing: {}/{}", sent, total);
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod session;
pub mod target;
pub mod transfer;

#[cfg(test)]
mod testing;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Line waits, the
/// transfer adapter and the XMODEM sender poll it between reads.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    device::{DeviceMode, DeviceModeDetector, ModeProvider, find_xdk_ports, format_port_list},
    error::{Error, Result},
    image::FirmwareImage,
    port::{Port, PortEnumerator, PortInfo, SerialConfig, XDK_BAUD_RATE},
    protocol::{
        BlockSize, Command, Dispatch, LineKind, LineWaiter, TransferIo, Version, XmodemConfig,
        XmodemSender, send_command,
    },
    session::{
        BootloaderInfo, FlashReport, SessionConfig, SessionOrchestrator, SessionState,
        VerifyPolicy,
    },
    target::{BOOTLOADER_TYPES, BootloaderType},
    transfer::TransferAdapter,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        assert!(!is_interrupted_requested());
    }
}

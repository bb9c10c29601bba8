//! Bootloader commands and the mode-aware dispatcher.
//!
//! Each command is only understood by one firmware: the single-character
//! maintenance commands by the bootloader, the `#...$` escape sequences by the
//! application. Sending a command while the device is in the wrong mode
//! instead writes a transition token that nudges it towards the other
//! firmware; the caller re-polls and retries.

use crate::device::{DeviceMode, ModeProvider};
use crate::error::Result;
use log::debug;
use std::fmt;
use std::io::Write;

/// Commands understood by the XDK110 bootloader and application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Start an XMODEM upload.
    Upload,
    /// Boot the application.
    Boot,
    /// Verify the flashed application.
    Verify,
    /// Enable debug output.
    Debug,
    /// Reset the device.
    Reset,
    /// Report the bootloader version.
    Info,
    /// Ask the application to restart into the bootloader.
    GotoBootloader,
    /// Ask the application to reboot.
    Reboot,
}

impl Command {
    /// Every command, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Upload,
        Self::Boot,
        Self::Verify,
        Self::Debug,
        Self::Reset,
        Self::Info,
        Self::GotoBootloader,
        Self::Reboot,
    ];

    /// Bytes written to the serial link for this command.
    pub fn token(self) -> &'static [u8] {
        match self {
            Self::Upload => b"u",
            Self::Boot => b"b",
            Self::Verify => b"c",
            Self::Debug => b"l",
            Self::Reset => b"r",
            Self::Info => b"i",
            Self::GotoBootloader => b"#reBoot$",
            Self::Reboot => b"#reSet$",
        }
    }

    /// Mode the device must be in for the token to be sent directly.
    pub fn required_mode(self) -> DeviceMode {
        match self {
            Self::GotoBootloader | Self::Reboot => DeviceMode::Application,
            _ => DeviceMode::Bootloader,
        }
    }

    /// Command written instead of `self` when the device is in `mode`.
    pub fn transition_from(mode: DeviceMode) -> Self {
        if mode == DeviceMode::Application {
            Self::GotoBootloader
        } else {
            Self::Boot
        }
    }

    /// Get a human-readable name for the command.
    pub fn name(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Boot => "boot",
            Self::Verify => "verify",
            Self::Debug => "debug",
            Self::Reset => "reset",
            Self::Info => "info",
            Self::GotoBootloader => "goto-bootloader",
            Self::Reboot => "reboot",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the dispatcher actually wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The requested command's token was written.
    Sent,
    /// The device was in `mode`, so the transition `command` was written
    /// instead.
    Nudged {
        /// Mode observed before writing.
        mode: DeviceMode,
        /// Transition command written.
        command: Command,
    },
}

/// Send `command`, or a mode-transition token if the device is in the wrong
/// mode.
pub fn send_command<W, M>(port: &mut W, modes: &M, command: Command) -> Result<Dispatch>
where
    W: Write + ?Sized,
    M: ModeProvider + ?Sized,
{
    let mode = modes.current_mode()?;

    let (written, dispatch) = if mode == command.required_mode() {
        (command, Dispatch::Sent)
    } else {
        let transition = Command::transition_from(mode);
        (
            transition,
            Dispatch::Nudged {
                mode,
                command: transition,
            },
        )
    };

    debug!("Sending {written} (requested {command}, device in {mode} mode)");
    port.write_all(written.token())?;
    port.flush()?;

    Ok(dispatch)
}

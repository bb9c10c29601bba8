//! Flash session orchestration.
//!
//! A flash follows a fixed sequence:
//!
//! ```text
//! Idle -> AwaitingInfo -> ValidatingSize -> AwaitingReadyForUpload
//!      -> Transferring -> Verifying -> Done
//! ```
//!
//! Any failure ends the session in `Aborted`. The image size is checked
//! against the bootloader's limit before the Upload command is written, so an
//! oversized image never starts a partial transfer. There is no automatic
//! retry; the port is closed when the sequence ends, whatever the outcome.
//!
//! ## Example
//!
//! ```rust,no_run
//! use xdkflash::{DeviceModeDetector, FirmwareImage, NativePort, NativePortEnumerator};
//! use xdkflash::session::{SessionConfig, SessionOrchestrator};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let port = NativePort::open_simple("/dev/ttyACM0", 19200)?;
//!     let modes = DeviceModeDetector::new(NativePortEnumerator, "/dev/ttyACM0");
//!     let image = FirmwareImage::from_file("app.bin")?;
//!
//!     let mut session = SessionOrchestrator::new(port, modes, SessionConfig::default());
//!     let report = session.flash(&image, |sent, total| {
//!         println!("{sent}/{total}");
//!     })?;
//!     println!("Flashed {} bytes to {}", report.bytes_sent, report.bootloader.label);
//!     Ok(())
//! }
//! ```

use crate::device::{DeviceMode, ModeProvider};
use crate::error::{Error, Result};
use crate::image::FirmwareImage;
use crate::port::Port;
use crate::protocol::command::{Command, Dispatch, send_command};
use crate::protocol::line::{DEFAULT_POLL_INTERVAL, LineWaiter, read_line};
use crate::protocol::response::{
    Version, extract_core_id, is_info_line, is_ready_line, parse_version,
};
use crate::protocol::xmodem::{XmodemConfig, XmodemSender};
use crate::target::bootloader::{self, BootloaderType};
use crate::transfer::TransferAdapter;
use log::{debug, info, trace, warn};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Lines read after the Info answer while looking for the core id.
const CORE_ID_LOOKAHEAD: usize = 2;

/// Stage of a flash session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Nothing sent yet.
    Idle,
    /// Info sent, waiting for the version line.
    AwaitingInfo,
    /// Checking the image against the bootloader's limit.
    ValidatingSize,
    /// Upload sent, waiting for `Ready`.
    AwaitingReadyForUpload,
    /// XMODEM transfer running.
    Transferring,
    /// Verify being sent.
    Verifying,
    /// Session finished successfully.
    Done,
    /// Session ended with an error.
    Aborted,
}

impl SessionState {
    /// Get a human-readable name for the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingInfo => "awaiting info",
            Self::ValidatingSize => "validating size",
            Self::AwaitingReadyForUpload => "awaiting ready",
            Self::Transferring => "transferring",
            Self::Verifying => "verifying",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether Verify is sent after a failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyPolicy {
    /// Verify only after a successful transfer.
    #[default]
    OnSuccess,
    /// Always send Verify once the transfer has started.
    Always,
}

impl VerifyPolicy {
    /// Name used in configuration files and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OnSuccess => "on-success",
            Self::Always => "always",
        }
    }
}

impl fmt::Display for VerifyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VerifyPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "on-success" => Ok(Self::OnSuccess),
            "always" => Ok(Self::Always),
            other => Err(Error::Config(format!(
                "invalid verify policy '{other}' (expected 'on-success' or 'always')"
            ))),
        }
    }
}

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pause between line reads while waiting for a response.
    pub poll_interval: Duration,
    /// Port read timeout used for line reads.
    pub read_timeout: Duration,
    /// Give up waiting for a response line after this long.
    pub line_timeout: Option<Duration>,
    /// Fail the transfer after this many consecutive diagnostic lines.
    pub max_noise_lines: Option<u32>,
    /// Verify behaviour after a failed transfer.
    pub verify_policy: VerifyPolicy,
    /// XMODEM sender settings.
    pub xmodem: XmodemConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_timeout: Duration::from_secs(1),
            line_timeout: None,
            max_noise_lines: None,
            verify_policy: VerifyPolicy::default(),
            xmodem: XmodemConfig::default(),
        }
    }
}

/// Outcome of a successful flash.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FlashReport {
    /// Bootloader revision matched from the Info answer.
    pub bootloader: &'static BootloaderType,
    /// Version reported by the bootloader.
    pub version: Version,
    /// Payload bytes transferred.
    pub bytes_sent: usize,
    /// Whether the Verify command was written.
    pub verify_sent: bool,
}

/// Answer to the Info command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BootloaderInfo {
    /// Reported version, `0.0.0` if unparseable.
    pub version: Version,
    /// Core identifier, if the bootloader printed one.
    pub core_id: Option<String>,
    /// Matching capability entry.
    pub bootloader: Option<&'static BootloaderType>,
}

/// Drives one device through the flash procedure.
///
/// Owns the serial port, so only one session can talk to it at a time.
pub struct SessionOrchestrator<P: Port, M: ModeProvider> {
    port: P,
    modes: M,
    config: SessionConfig,
    state: SessionState,
    on_state: Option<Box<dyn FnMut(SessionState)>>,
}

impl<P: Port, M: ModeProvider> SessionOrchestrator<P, M> {
    /// Create an idle session.
    pub fn new(port: P, modes: M, config: SessionConfig) -> Self {
        Self {
            port,
            modes,
            config,
            state: SessionState::Idle,
            on_state: None,
        }
    }

    /// Call `observer` on every state change.
    #[must_use]
    pub fn with_state_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(SessionState) + 'static,
    {
        self.on_state = Some(Box::new(observer));
        self
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Consume the session and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    fn set_state(&mut self, state: SessionState) {
        debug!("Session state: {} -> {state}", self.state);
        self.state = state;
        if let Some(observer) = self.on_state.as_mut() {
            observer(state);
        }
    }

    fn waiter(&self) -> LineWaiter {
        LineWaiter::new(self.config.poll_interval).with_timeout(self.config.line_timeout)
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        if let Dispatch::Nudged { mode, command: sent } =
            send_command(&mut self.port, &self.modes, command)?
        {
            warn!("Device is in {mode} mode; sent {sent} instead of {command}");
        }
        Ok(())
    }

    /// Poll the mode provider until the device reports `wanted`.
    ///
    /// A port missing from the enumeration counts as "not yet": the device
    /// re-enumerates while it restarts into the other firmware.
    fn await_mode(&self, wanted: DeviceMode) -> Result<()> {
        let start = Instant::now();

        loop {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            match self.modes.current_mode() {
                Ok(mode) if mode == wanted => return Ok(()),
                Ok(mode) => trace!("Device in {mode} mode, waiting for {wanted}"),
                Err(Error::PortNotFound(name)) => trace!("{name} not present, waiting"),
                Err(e) => return Err(e),
            }

            if let Some(timeout) = self.config.line_timeout {
                if start.elapsed() >= timeout {
                    return Err(Error::Timeout(format!(
                        "device did not enter {wanted} mode within {timeout:?}"
                    )));
                }
            }

            std::thread::sleep(self.config.poll_interval);
        }
    }

    fn read_info_line(&mut self) -> Result<Vec<u8>> {
        self.port.set_timeout(self.config.read_timeout)?;

        if let Dispatch::Nudged { mode, command: sent } =
            send_command(&mut self.port, &self.modes, Command::Info)?
        {
            info!("Device is in {mode} mode; sent {sent}, waiting for the bootloader");
            self.await_mode(Command::Info.required_mode())?;
            self.dispatch(Command::Info)?;
        }

        self.waiter().wait_for(&mut self.port, is_info_line)
    }

    /// Send a single command through the mode-aware dispatcher.
    pub fn send_command(&mut self, command: Command) -> Result<Dispatch> {
        send_command(&mut self.port, &self.modes, command)
    }

    /// Ask the bootloader for its version and core id without uploading.
    pub fn query_info(&mut self) -> Result<BootloaderInfo> {
        let line = self.read_info_line()?;
        let parsed = parse_version(&line);

        let mut core_id = extract_core_id(&line);
        for _ in 0..CORE_ID_LOOKAHEAD {
            if core_id.is_some() {
                break;
            }
            let next = read_line(&mut self.port)?;
            if next.is_empty() {
                break;
            }
            core_id = extract_core_id(&next);
            if core_id.is_none() {
                debug!("Ignoring device line: {}", String::from_utf8_lossy(&next));
            }
        }

        Ok(BootloaderInfo {
            version: parsed.unwrap_or(Version::UNKNOWN),
            core_id,
            bootloader: parsed.and_then(bootloader::lookup),
        })
    }

    /// Flash `image`, reporting `(bytes_sent, total)` after every block.
    ///
    /// The port is closed before returning, on success and on error.
    pub fn flash<F>(&mut self, image: &FirmwareImage, progress: F) -> Result<FlashReport>
    where
        F: FnMut(usize, usize),
    {
        let result = self.run_flash(image, progress);

        if let Err(e) = &result {
            debug!("Session failed while {}: {e}", self.state);
            self.set_state(SessionState::Aborted);
        }

        match (result, self.port.close()) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) | (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Failed to close {}: {close_err}", self.port.name());
                Err(e)
            },
        }
    }

    fn run_flash<F>(&mut self, image: &FirmwareImage, progress: F) -> Result<FlashReport>
    where
        F: FnMut(usize, usize),
    {
        self.set_state(SessionState::AwaitingInfo);
        let line = self.read_info_line()?;
        let version =
            parse_version(&line).ok_or(Error::UnrecognizedBootloader(Version::UNKNOWN))?;

        self.set_state(SessionState::ValidatingSize);
        let bootloader =
            bootloader::lookup(version).ok_or(Error::UnrecognizedBootloader(version))?;
        info!("Bootloader: {bootloader}");

        if !bootloader.accepts(image.len()) {
            return Err(Error::ImageTooLarge {
                label: bootloader.label,
                limit: bootloader.max_image_size,
                path: image.name().to_string(),
                size: image.len(),
            });
        }

        self.set_state(SessionState::AwaitingReadyForUpload);
        self.dispatch(Command::Upload)?;
        self.waiter().wait_for(&mut self.port, is_ready_line)?;

        self.set_state(SessionState::Transferring);
        info!("Sending {} ({} bytes)", image.name(), image.len());
        let transferred = {
            let mut adapter = TransferAdapter::new(&mut self.port)
                .with_max_noise_lines(self.config.max_noise_lines);
            XmodemSender::with_config(&mut adapter, self.config.xmodem.clone())
                .send(image.data(), progress)
        };

        let bytes_sent = match transferred {
            Ok(n) => n,
            Err(e) => {
                if self.config.verify_policy == VerifyPolicy::Always {
                    self.set_state(SessionState::Verifying);
                    if let Err(timeout_err) = self.port.set_timeout(self.config.read_timeout) {
                        warn!("Failed to reset read timeout: {timeout_err}");
                    }
                    if let Err(verify_err) = self.dispatch(Command::Verify) {
                        warn!("Failed to send verify after transfer error: {verify_err}");
                    }
                }
                return Err(e);
            },
        };

        self.set_state(SessionState::Verifying);
        self.port.set_timeout(self.config.read_timeout)?;
        self.dispatch(Command::Verify)?;

        self.set_state(SessionState::Done);
        info!("Flashing complete!");

        Ok(FlashReport {
            bootloader,
            version,
            bytes_sent,
            verify_sent: true,
        })
    }
}

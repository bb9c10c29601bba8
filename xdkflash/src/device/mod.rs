//! Device mode detection and port discovery.
//!
//! The XDK110 enumerates as a USB CDC device whose product string names the
//! firmware currently running ("... Bootloader" or "... Application"). The
//! mode is recomputed from the port list every time it is needed; nothing is
//! cached between commands.

use crate::error::{Error, Result};
use crate::port::{PortEnumerator, PortInfo};
use log::{debug, trace};
use std::fmt;

/// Firmware currently running on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceMode {
    /// Bootloader accepting single-character maintenance commands.
    Bootloader,
    /// User application firmware.
    Application,
    /// Debug mode.
    Debug,
    /// Mode could not be determined.
    Unknown,
}

impl DeviceMode {
    /// Derive the mode from a port description (case-sensitive).
    pub fn from_description(description: &str) -> Self {
        if description.contains("Application") {
            Self::Application
        } else if description.contains("Bootloader") {
            Self::Bootloader
        } else {
            Self::Unknown
        }
    }

    /// Get a human-readable name for the mode.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bootloader => "Bootloader",
            Self::Application => "Application",
            Self::Debug => "Debug",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source of the device's current mode.
pub trait ModeProvider {
    /// Determine the mode the device is in right now.
    fn current_mode(&self) -> Result<DeviceMode>;
}

impl<F> ModeProvider for F
where
    F: Fn() -> Result<DeviceMode>,
{
    fn current_mode(&self) -> Result<DeviceMode> {
        self()
    }
}

/// Detects the device mode of one configured port from port metadata.
#[derive(Debug, Clone)]
pub struct DeviceModeDetector<E> {
    enumerator: E,
    port_name: String,
}

impl<E: PortEnumerator> DeviceModeDetector<E> {
    /// Create a detector for `port_name`.
    pub fn new(enumerator: E, port_name: impl Into<String>) -> Self {
        Self {
            enumerator,
            port_name: port_name.into(),
        }
    }

    /// The port path this detector looks for.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Look up the configured port and classify its description.
    pub fn detect(&self) -> Result<DeviceMode> {
        let port = self
            .enumerator
            .find_by_name(&self.port_name)?
            .ok_or_else(|| Error::PortNotFound(self.port_name.clone()))?;

        let mode = DeviceMode::from_description(&port.description);
        trace!(
            "{} described as {:?}: {mode}",
            self.port_name, port.description
        );
        Ok(mode)
    }
}

impl<E: PortEnumerator> ModeProvider for DeviceModeDetector<E> {
    fn current_mode(&self) -> Result<DeviceMode> {
        self.detect()
    }
}

/// Whether a port looks like an XDK110 in a known mode.
pub fn is_xdk_port(port: &PortInfo) -> bool {
    DeviceMode::from_description(&port.description) != DeviceMode::Unknown
}

/// List ports whose description identifies an XDK110 mode.
pub fn find_xdk_ports<E: PortEnumerator>(enumerator: &E) -> Result<Vec<PortInfo>> {
    let ports: Vec<PortInfo> = enumerator
        .list_ports()?
        .into_iter()
        .filter(is_xdk_port)
        .collect();
    debug!("Found {} XDK port(s)", ports.len());
    Ok(ports)
}

/// Format a list of ports for display.
pub fn format_port_list(ports: &[PortInfo]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let mode = DeviceMode::from_description(&port.description);
            let mode_info = if mode != DeviceMode::Unknown {
                format!(" [{mode}]")
            } else {
                String::new()
            };

            let usb_info = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" ({vid:04X}:{pid:04X})")
            } else {
                String::new()
            };

            let description = if port.description.is_empty() {
                String::new()
            } else {
                format!(" - {}", port.description)
            };

            format!("{}{}{}{}", port.name, mode_info, usb_info, description)
        })
        .collect()
}

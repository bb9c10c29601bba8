//! Commands that talk to an attached device: info, mode and send.

use anyhow::{Context, Result};
use console::style;
use std::time::Duration;
use xdkflash::{
    BootloaderInfo, Command, DeviceModeDetector, Dispatch, NativePort, NativePortEnumerator,
    SessionConfig, SessionOrchestrator,
};

use crate::Cli;
use crate::config::Config;
use crate::serial::{open_port, resolve_baud, select_port};

/// Detector for the selected port.
fn detector(cli: &Cli, config: &Config) -> Result<DeviceModeDetector<NativePortEnumerator>> {
    let enumerator = NativePortEnumerator;
    let port_name = select_port(cli.port.as_deref(), config, &enumerator)?;
    Ok(DeviceModeDetector::new(enumerator, port_name))
}

/// Open a session on the selected port.
fn open_session(
    cli: &Cli,
    config: &Config,
    session_config: SessionConfig,
) -> Result<SessionOrchestrator<NativePort, DeviceModeDetector<NativePortEnumerator>>> {
    let modes = detector(cli, config)?;
    let port = open_port(modes.port_name(), resolve_baud(cli.baud, config))?;
    Ok(SessionOrchestrator::new(port, modes, session_config))
}

/// Human-readable lines describing a bootloader answer.
fn format_info(info: &BootloaderInfo) -> Vec<String> {
    let mut lines = vec![format!("Bootloader version: {}", info.version)];

    if let Some(core_id) = &info.core_id {
        lines.push(format!("Core ID:            {core_id}"));
    }

    match info.bootloader {
        Some(bootloader) => {
            lines.push(format!("Layout:             {}", bootloader.label));
            lines.push(format!(
                "Code address:       0x{:08X}",
                bootloader.code_address
            ));
            if let Some(header) = bootloader.fota_header_address {
                lines.push(format!("FOTA header:        0x{header:08X}"));
            }
            lines.push(format!(
                "Max image size:     {} bytes",
                bootloader.max_image_size
            ));
        },
        None => lines.push("Layout:             unknown (flashing not supported)".to_string()),
    }

    lines
}

/// Info command implementation.
pub(crate) fn cmd_info(cli: &Cli, config: &Config, json: bool, timeout: u64) -> Result<()> {
    let mut session_config = config.session_config()?;
    session_config.line_timeout = Some(Duration::from_secs(timeout));
    let mut session = open_session(cli, config, session_config)?;

    let info = session
        .query_info()
        .context("Failed to query bootloader info")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    for line in format_info(&info) {
        println!("{line}");
    }
    Ok(())
}

/// Mode command implementation.
pub(crate) fn cmd_mode(cli: &Cli, config: &Config) -> Result<()> {
    let modes = detector(cli, config)?;
    let mode = modes
        .detect()
        .with_context(|| format!("Failed to detect device mode on {}", modes.port_name()))?;

    println!("{mode}");
    Ok(())
}

/// Send command implementation.
pub(crate) fn cmd_send(cli: &Cli, config: &Config, command: Command) -> Result<()> {
    let mut session = open_session(cli, config, config.session_config()?)?;

    match session.send_command(command)? {
        Dispatch::Sent => {
            if !cli.quiet {
                eprintln!("{} Sent {}", style("✓").green(), command);
            }
        },
        Dispatch::Nudged {
            mode,
            command: sent,
        } => {
            eprintln!(
                "{} Device is in {} mode; sent {} instead of {}. Retry once it has switched.",
                style("⚠").yellow(),
                mode,
                sent,
                command
            );
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xdkflash::Version;
    use xdkflash::target::bootloader::lookup;

    #[test]
    fn test_format_info_known_bootloader() {
        let info = BootloaderInfo {
            version: Version::new(1, 2, 0),
            core_id: Some("4A2F0C11".into()),
            bootloader: lookup(Version::new(1, 2, 0)),
        };

        let lines = format_info(&info);
        assert_eq!(lines[0], "Bootloader version: 1.2.0");
        assert!(lines.iter().any(|l| l.contains("4A2F0C11")));
        assert!(lines.iter().any(|l| l.contains("0x00020200")));
        assert!(lines.iter().any(|l| l.contains("917504 bytes")));
    }

    #[test]
    fn test_format_info_unknown_bootloader() {
        let info = BootloaderInfo {
            version: Version::new(9, 9, 9),
            core_id: None,
            bootloader: None,
        };

        let lines = format_info(&info);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("unknown"));
    }

    #[test]
    fn test_info_json_shape() {
        let info = BootloaderInfo {
            version: Version::new(0, 0, 9),
            core_id: None,
            bootloader: lookup(Version::new(0, 0, 9)),
        };

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["version"]["minor"], 0);
        assert_eq!(value["version"]["patch"], 9);
        assert!(value["core_id"].is_null());
        assert_eq!(value["bootloader"]["max_image_size"], 983_040);
    }
}

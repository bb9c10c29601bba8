//! Serial port selection.
//!
//! The port comes from, in order: `--port`/`XDKFLASH_PORT`, the config file,
//! or the single attached port whose USB description names an XDK110 mode.
//! Zero or several candidates are usage errors, so scripts get exit code 2
//! instead of a guess.

use {
    crate::{CliError, config::Config},
    anyhow::{Context, Result},
    log::debug,
    std::cmp::Ordering,
    xdkflash::{
        NativePort, Port, PortEnumerator, PortInfo, SerialConfig, XDK_BAUD_RATE, find_xdk_ports,
        format_port_list,
    },
};

fn usage_err(message: impl Into<String>) -> anyhow::Error {
    CliError::Usage(message.into()).into()
}

/// Pick the one candidate, failing on zero or several.
fn select_single_port(candidates: Vec<PortInfo>) -> Result<PortInfo> {
    match candidates.len().cmp(&1) {
        Ordering::Equal => candidates
            .into_iter()
            .next()
            .ok_or_else(|| usage_err("No XDK110 device found")),
        Ordering::Greater => {
            let listing = format_port_list(&candidates).join("\n  ");
            Err(usage_err(format!(
                "Found multiple XDK110 devices; choose one with --port:\n  {listing}"
            )))
        },
        Ordering::Less => Err(usage_err(
            "No XDK110 device found; connect the device or pass --port",
        )),
    }
}

/// Resolve the serial port to use.
pub fn select_port<E: PortEnumerator>(
    explicit: Option<&str>,
    config: &Config,
    enumerator: &E,
) -> Result<String> {
    if let Some(port) = explicit {
        return Ok(port.to_string());
    }

    if let Some(port) = &config.connection.port {
        debug!("Using port from config: {port}");
        return Ok(port.clone());
    }

    let candidates = find_xdk_ports(enumerator).context("Failed to list serial ports")?;
    let port = select_single_port(candidates)?;
    debug!("Auto-selected {}", port.name);
    Ok(port.name)
}

/// Resolve the baud rate: command line, config, then the bootloader default.
pub fn resolve_baud(explicit: Option<u32>, config: &Config) -> u32 {
    explicit
        .or(config.connection.baud)
        .unwrap_or(XDK_BAUD_RATE)
}

/// Open `port` with the XDK110 line settings, dropping stale input.
pub fn open_port(port: &str, baud: u32) -> Result<NativePort> {
    let mut native = NativePort::open(&SerialConfig::new(port, baud))
        .with_context(|| format!("Failed to open serial port {port}"))?;
    native
        .clear_buffers()
        .with_context(|| format!("Failed to clear serial port {port}"))?;
    Ok(native)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPorts(Vec<PortInfo>);

    impl PortEnumerator for FixedPorts {
        fn list_ports(&self) -> xdkflash::Result<Vec<PortInfo>> {
            Ok(self.0.clone())
        }
    }

    fn port(name: &str, description: &str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }

    fn assert_usage_error(err: &anyhow::Error) {
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_explicit_port_wins() {
        let mut config = Config::default();
        config.connection.port = Some("/dev/ttyACM1".into());

        let selected = select_port(Some("COM3"), &config, &FixedPorts(vec![])).unwrap();
        assert_eq!(selected, "COM3");
    }

    #[test]
    fn test_config_port_used_before_detection() {
        let mut config = Config::default();
        config.connection.port = Some("/dev/ttyACM1".into());

        let ports = FixedPorts(vec![port("/dev/ttyACM0", "XDK Bootloader")]);
        assert_eq!(select_port(None, &config, &ports).unwrap(), "/dev/ttyACM1");
    }

    #[test]
    fn test_single_xdk_port_is_selected() {
        let ports = FixedPorts(vec![
            port("/dev/ttyS0", ""),
            port("/dev/ttyACM0", "XDK Application"),
        ]);
        assert_eq!(
            select_port(None, &Config::default(), &ports).unwrap(),
            "/dev/ttyACM0"
        );
    }

    #[test]
    fn test_no_xdk_port_is_usage_error() {
        let ports = FixedPorts(vec![port("/dev/ttyS0", "")]);
        let err = select_port(None, &Config::default(), &ports).unwrap_err();
        assert_usage_error(&err);
    }

    #[test]
    fn test_multiple_xdk_ports_is_usage_error() {
        let ports = FixedPorts(vec![
            port("/dev/ttyACM0", "XDK Bootloader"),
            port("/dev/ttyACM1", "XDK Application"),
        ]);
        let err = select_port(None, &Config::default(), &ports).unwrap_err();
        assert_usage_error(&err);
        assert!(err.to_string().contains("multiple"));
    }

    #[test]
    fn test_resolve_baud() {
        let mut config = Config::default();
        assert_eq!(resolve_baud(None, &config), 19200);

        config.connection.baud = Some(115_200);
        assert_eq!(resolve_baud(None, &config), 115_200);
        assert_eq!(resolve_baud(Some(9600), &config), 9600);
    }
}

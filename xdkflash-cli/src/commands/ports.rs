//! Port listing and bootloader table commands.

use anyhow::Result;
use console::style;
use log::debug;
use xdkflash::{
    BOOTLOADER_TYPES, BootloaderType, DeviceMode, NativePortEnumerator, PortEnumerator, PortInfo,
    format_port_list,
};

/// Ports visible to the host; enumeration errors count as no ports.
fn available_ports() -> Vec<PortInfo> {
    match NativePortEnumerator.list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            debug!("Port enumeration failed: {e}");
            Vec::new()
        },
    }
}

fn port_json(port: &PortInfo) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "description": port.description,
        "mode": DeviceMode::from_description(&port.description).name(),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial_number": port.serial_number,
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) {
    let ports = available_ports();

    if json {
        let values: Vec<serde_json::Value> = ports.iter().map(port_json).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&values).unwrap_or_default()
        );
        return;
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return;
    }

    for line in format_port_list(&ports) {
        eprintln!("  {} {}", style("•").green(), line);
    }
}

/// One table row per bootloader revision.
fn format_bootloader_table(types: &[BootloaderType]) -> Vec<String> {
    let mut rows = vec![format!(
        "{:<20} {:<8} {:<12} {:<12} {:>10}",
        "LABEL", "VERSION", "CODE", "FOTA HEADER", "MAX BYTES"
    )];

    rows.extend(types.iter().map(|b| {
        let header = b
            .fota_header_address
            .map_or_else(|| "-".to_string(), |addr| format!("0x{addr:08X}"));
        format!(
            "{:<20} {:<8} {:<12} {:<12} {:>10}",
            b.label,
            b.version.to_string(),
            format!("0x{:08X}", b.code_address),
            header,
            b.max_image_size
        )
    }));

    rows
}

/// Bootloaders command implementation.
pub(crate) fn cmd_bootloaders(json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(BOOTLOADER_TYPES)?);
        return Ok(());
    }

    for row in format_bootloader_table(BOOTLOADER_TYPES) {
        println!("{row}");
    }
    Ok(())
}

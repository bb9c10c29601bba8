//! Flash command implementation.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use xdkflash::{
    BlockSize, DeviceModeDetector, FirmwareImage, NativePortEnumerator, SessionConfig,
    SessionOrchestrator, SessionState, VerifyPolicy,
};

use crate::config::Config;
use crate::serial::{open_port, resolve_baud, select_port};
use crate::{Cli, CliError, use_fancy_output, was_interrupted};

/// Command-line overrides for the session settings.
#[derive(Debug, Clone, Default)]
pub(crate) struct FlashOptions {
    pub verify_policy: Option<VerifyPolicy>,
    pub line_timeout: Option<u64>,
    pub max_noise_lines: Option<u32>,
    pub one_k: bool,
}

/// Combine config file settings with command-line overrides.
fn session_config(config: &Config, options: &FlashOptions) -> Result<SessionConfig> {
    let mut session = config.session_config()?;

    if let Some(policy) = options.verify_policy {
        session.verify_policy = policy;
    }
    if let Some(secs) = options.line_timeout {
        session.line_timeout = Some(Duration::from_secs(secs));
    }
    if options.max_noise_lines.is_some() {
        session.max_noise_lines = options.max_noise_lines;
    }
    if options.one_k {
        session.xmodem.block_size = BlockSize::OneK;
    }

    Ok(session)
}

fn progress_bar(cli: &Cli, total: usize) -> ProgressBar {
    if cli.quiet || cli.non_interactive || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX));
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

/// Flash command implementation.
pub(crate) fn cmd_flash(
    cli: &Cli,
    config: &Config,
    firmware: &Path,
    options: &FlashOptions,
) -> Result<()> {
    let session_config = session_config(config, options)?;

    if !cli.quiet {
        eprintln!(
            "{} Loading firmware {}",
            style("📦").cyan(),
            firmware.display()
        );
    }

    let image = FirmwareImage::from_file(firmware)
        .with_context(|| format!("Failed to load firmware {}", firmware.display()))?;

    if image.is_empty() {
        return Err(CliError::Usage(format!("{} is empty", firmware.display())).into());
    }

    let enumerator = NativePortEnumerator;
    let port_name = select_port(cli.port.as_deref(), config, &enumerator)?;
    let baud = resolve_baud(cli.baud, config);

    let modes = DeviceModeDetector::new(enumerator, port_name.clone());
    let mode = modes
        .detect()
        .with_context(|| format!("Failed to detect device mode on {port_name}"))?;

    if !cli.quiet {
        eprintln!(
            "{} Using {} @ {} baud ({} mode, {} bytes to send)",
            style("🔌").cyan(),
            style(&port_name).green(),
            baud,
            mode,
            image.len()
        );
    }

    let port = open_port(&port_name, baud)?;

    let pb = progress_bar(cli, image.len());
    let observer_pb = pb.clone();
    let mut session = SessionOrchestrator::new(port, modes, session_config)
        .with_state_observer(move |state: SessionState| observer_pb.set_message(state.to_string()));

    let result = session.flash(&image, |sent, _total| {
        pb.set_position(u64::try_from(sent).unwrap_or(u64::MAX));
    });

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            pb.abandon();
            if was_interrupted() {
                return Err(CliError::Cancelled("Flashing interrupted".into()).into());
            }
            return Err(err).context("Flashing failed");
        },
    };

    pb.finish_with_message("done");

    if !cli.quiet {
        eprintln!(
            "{} Bootloader {} (V{}), max {} bytes",
            style("ℹ").blue(),
            report.bootloader.label,
            report.version,
            report.bootloader.max_image_size
        );
        eprintln!(
            "\n{} Flashed {} bytes, verify requested",
            style("🎉").green().bold(),
            report.bytes_sent
        );
    }

    Ok(())
}

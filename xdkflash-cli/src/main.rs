//! xdkflash CLI - Command-line tool for flashing Bosch XDK110 devices.
//!
//! ## Features
//!
//! - Flash application binaries through the XDK110 serial bootloader
//! - Query bootloader version, core id and transfer limit
//! - Send single bootloader/application commands
//! - Port auto-detection from USB descriptions
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod serial;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors classified for exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Bad invocation or ambiguous setup (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Invalid configuration (exit code 3).
    #[error("{0}")]
    Config(String),
    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// Exit codes.
mod exit_code {
    pub const FAILURE: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const DEVICE_NOT_FOUND: i32 = 4;
    pub const CANCELLED: i32 = 130;
}

/// Map an error chain to the process exit code.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(cli_err) = cause.downcast_ref::<CliError>() {
            return match cli_err {
                CliError::Usage(_) => exit_code::USAGE,
                CliError::Config(_) => exit_code::CONFIG,
                CliError::Cancelled(_) => exit_code::CANCELLED,
            };
        }
        if let Some(lib_err) = cause.downcast_ref::<xdkflash::Error>() {
            return match lib_err {
                xdkflash::Error::PortNotFound(_) => exit_code::DEVICE_NOT_FOUND,
                xdkflash::Error::Serial(e) if e.kind() == serialport::ErrorKind::NoDevice => {
                    exit_code::DEVICE_NOT_FOUND
                },
                xdkflash::Error::Interrupted => exit_code::CANCELLED,
                xdkflash::Error::Config(_) => exit_code::CONFIG,
                _ => exit_code::FAILURE,
            };
        }
    }
    exit_code::FAILURE
}

/// xdkflash - Flash Bosch XDK110 devices over the serial bootloader.
///
/// Environment variables:
///   XDKFLASH_PORT               - Default serial port
///   XDKFLASH_BAUD               - Baud rate (default: 19200)
///   XDKFLASH_NON_INTERACTIVE    - Non-interactive mode (no animations)
#[derive(Parser)]
#[command(name = "xdkflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "XDKFLASH_PORT")]
    port: Option<String>,

    /// Baud rate [default: 19200].
    #[arg(short, long, global = true, env = "XDKFLASH_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (plain output, no progress animation).
    #[arg(long, global = true, env = "XDKFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// When to send Verify after a failed transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum VerifyPolicyArg {
    /// Only after a successful transfer.
    OnSuccess,
    /// Also after a failed transfer.
    Always,
}

impl From<VerifyPolicyArg> for xdkflash::VerifyPolicy {
    fn from(arg: VerifyPolicyArg) -> Self {
        match arg {
            VerifyPolicyArg::OnSuccess => Self::OnSuccess,
            VerifyPolicyArg::Always => Self::Always,
        }
    }
}

/// Commands that can be sent with `send`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum CommandArg {
    /// Start an XMODEM upload (`u`).
    Upload,
    /// Boot the application (`b`).
    Boot,
    /// Verify the flashed application (`c`).
    Verify,
    /// Enable debug output (`l`).
    Debug,
    /// Reset the device (`r`).
    Reset,
    /// Print bootloader info (`i`).
    Info,
    /// Restart the application into the bootloader (`#reBoot$`).
    GotoBootloader,
    /// Reboot the application (`#reSet$`).
    Reboot,
}

impl From<CommandArg> for xdkflash::Command {
    fn from(arg: CommandArg) -> Self {
        match arg {
            CommandArg::Upload => Self::Upload,
            CommandArg::Boot => Self::Boot,
            CommandArg::Verify => Self::Verify,
            CommandArg::Debug => Self::Debug,
            CommandArg::Reset => Self::Reset,
            CommandArg::Info => Self::Info,
            CommandArg::GotoBootloader => Self::GotoBootloader,
            CommandArg::Reboot => Self::Reboot,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Flash an application binary.
    Flash {
        /// Path to the application binary.
        firmware: PathBuf,

        /// Send Verify after a failed transfer too.
        #[arg(long, value_enum)]
        verify_policy: Option<VerifyPolicyArg>,

        /// Give up waiting for a bootloader response after SECS seconds.
        #[arg(long, value_name = "SECS")]
        line_timeout: Option<u64>,

        /// Fail the transfer after N consecutive lines of device output.
        #[arg(long, value_name = "N")]
        max_noise_lines: Option<u32>,

        /// Use 1024-byte XMODEM blocks.
        #[arg(long)]
        one_k: bool,
    },

    /// Query bootloader version, core id and transfer limit.
    Info {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,

        /// Give up waiting for the answer after SECS seconds.
        #[arg(long, value_name = "SECS", default_value = "5")]
        timeout: u64,
    },

    /// Print the mode the device is in.
    Mode,

    /// Send a single command.
    Send {
        /// Command to send.
        #[arg(value_enum)]
        command: CommandArg,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Print the known bootloader revisions.
    Bootloaders {
        /// Output the table as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    xdkflash::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Flash {
            firmware,
            verify_policy,
            line_timeout,
            max_noise_lines,
            one_k,
        } => {
            let options = commands::flash::FlashOptions {
                verify_policy: verify_policy.map(Into::into),
                line_timeout: *line_timeout,
                max_noise_lines: *max_noise_lines,
                one_k: *one_k,
            };
            commands::flash::cmd_flash(cli, &config, firmware, &options)
        },
        Commands::Info { json, timeout } => {
            commands::device::cmd_info(cli, &config, *json, *timeout)
        },
        Commands::Mode => commands::device::cmd_mode(cli, &config),
        Commands::Send { command } => {
            commands::device::cmd_send(cli, &config, (*command).into())
        },
        Commands::ListPorts { json } => {
            commands::ports::cmd_list_ports(*json);
            Ok(())
        },
        Commands::Bootloaders { json } => commands::ports::cmd_bootloaders(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    install_interrupt_handler();

    debug!(
        "xdkflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code_for(&err));
    }
}

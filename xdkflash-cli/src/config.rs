//! Configuration file support for xdkflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (XDKFLASH_*)
//! 3. Local config file (./xdkflash.toml)
//! 4. Global config file (~/.config/xdkflash/config.toml)
//!
//! An unreadable or malformed file is reported as a warning and skipped.

use crate::CliError;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use xdkflash::{BlockSize, SessionConfig, VerifyPolicy};

/// Name of the per-project config file.
pub const LOCAL_CONFIG_FILE: &str = "xdkflash.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
}

/// Session tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSection {
    /// Pause between line reads, in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Give up waiting for a response line after this many seconds.
    pub line_timeout_secs: Option<u64>,
    /// Fail a transfer after this many consecutive device lines.
    pub max_noise_lines: Option<u32>,
    /// "on-success" or "always".
    pub verify_policy: Option<String>,
    /// XMODEM block size, 128 or 1024.
    pub block_size: Option<usize>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Session settings.
    #[serde(default)]
    pub session: SessionSection,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse TOML config {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "xdkflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.port.is_some() {
            self.connection.port = other.connection.port;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }

        let session = other.session;
        if session.poll_interval_ms.is_some() {
            self.session.poll_interval_ms = session.poll_interval_ms;
        }
        if session.line_timeout_secs.is_some() {
            self.session.line_timeout_secs = session.line_timeout_secs;
        }
        if session.max_noise_lines.is_some() {
            self.session.max_noise_lines = session.max_noise_lines;
        }
        if session.verify_policy.is_some() {
            self.session.verify_policy = session.verify_policy;
        }
        if session.block_size.is_some() {
            self.session.block_size = session.block_size;
        }
    }

    /// Build library session settings from the `[session]` section.
    ///
    /// Invalid values are configuration errors.
    pub fn session_config(&self) -> Result<SessionConfig, CliError> {
        let mut session = SessionConfig::default();
        let section = &self.session;

        if let Some(ms) = section.poll_interval_ms {
            session.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = section.line_timeout_secs {
            session.line_timeout = Some(Duration::from_secs(secs));
        }
        session.max_noise_lines = section.max_noise_lines;

        if let Some(policy) = &section.verify_policy {
            session.verify_policy = policy
                .parse::<VerifyPolicy>()
                .map_err(|e| CliError::Config(e.to_string()))?;
        }

        session.xmodem.block_size = match section.block_size {
            None | Some(128) => BlockSize::Standard,
            Some(1024) => BlockSize::OneK,
            Some(other) => {
                return Err(CliError::Config(format!(
                    "invalid block_size {other} (expected 128 or 1024)"
                )));
            },
        };

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Default values ----

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.port.is_none());
        assert!(config.connection.baud.is_none());
        assert!(config.session.verify_policy.is_none());
        assert!(config.session.block_size.is_none());
    }

    #[test]
    fn test_default_session_config_matches_library() {
        let session = Config::default().session_config().unwrap();
        let defaults = SessionConfig::default();
        assert_eq!(session.poll_interval, defaults.poll_interval);
        assert!(session.line_timeout.is_none());
        assert!(session.max_noise_lines.is_none());
        assert_eq!(session.verify_policy, VerifyPolicy::OnSuccess);
        assert_eq!(session.xmodem.block_size, BlockSize::Standard);
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_port() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.connection.port = Some("/dev/ttyACM0".to_string());
        other.session.verify_policy = Some("always".to_string());

        base.merge(other);

        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(base.session.verify_policy.as_deref(), Some("always"));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.connection.port = Some("/dev/ttyACM0".to_string());
        base.connection.baud = Some(19200);
        base.session.line_timeout_secs = Some(30);

        base.merge(Config::default());

        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(base.connection.baud, Some(19200));
        assert_eq!(base.session.line_timeout_secs, Some(30));
    }

    // ---- TOML ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[connection]
port = "/dev/ttyACM0"
baud = 19200

[session]
poll_interval_ms = 10
line_timeout_secs = 20
max_noise_lines = 100
verify_policy = "always"
block_size = 1024
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.connection.baud, Some(19200));

        let session = config.session_config().unwrap();
        assert_eq!(session.poll_interval, Duration::from_millis(10));
        assert_eq!(session.line_timeout, Some(Duration::from_secs(20)));
        assert_eq!(session.max_noise_lines, Some(100));
        assert_eq!(session.verify_policy, VerifyPolicy::Always);
        assert_eq!(session.xmodem.block_size, BlockSize::OneK);
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.connection.port.is_none());
        assert!(config.session.max_noise_lines.is_none());
    }

    #[test]
    fn test_invalid_verify_policy_is_config_error() {
        let config: Config = toml::from_str("[session]\nverify_policy = \"never\"\n").unwrap();
        assert!(matches!(config.session_config(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_invalid_block_size_is_config_error() {
        let config: Config = toml::from_str("[session]\nblock_size = 512\n").unwrap();
        assert!(matches!(config.session_config(), Err(CliError::Config(_))));
    }

    // ---- load_from_path ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[connection]\nport = \"COM3\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.port.as_deref(), Some("COM3"));
    }

    #[test]
    fn test_load_from_path_invalid_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.connection.port.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.connection.port.is_none());
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            assert!(p.to_string_lossy().contains("xdkflash"));
            assert!(p.to_string_lossy().ends_with("config.toml"));
        }
    }
}

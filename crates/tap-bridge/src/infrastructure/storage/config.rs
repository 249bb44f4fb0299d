//! TOML-based configuration persistence for the bridge.
//!
//! Reads and writes [`BridgeConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\TapBridge\config.toml`
//! - Linux:    `~/.config/tapbridge/config.toml`
//! - macOS:    `~/Library/Application Support/TapBridge/config.toml`
//!
//! ```toml
//! [adapter]
//! component_id = "tap0901"
//! min_driver_major = 9
//! min_driver_minor = 9
//!
//! [io]
//! receive_buffer_size = 2048
//! retry_initial_ms = 1
//! retry_max_ms = 100
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Serde default values
//!
//! Every field is annotated with `#[serde(default = "some_fn")]` and every
//! section with `#[serde(default)]`, so an empty file, a missing file and a
//! file written by an older release all load cleanly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tap_core::{
    AdapterOptions, DriverIdentity, DriverVersion, RetryPolicy, MAX_FRAME_SIZE,
    RECEIVE_BUFFER_SIZE,
};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level bridge configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which TAP adapter to look for and which driver versions to accept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdapterConfig {
    /// Driver component id the directory scan filters on.
    #[serde(default = "default_component_id")]
    pub component_id: String,
    /// Oldest accepted driver major version.
    #[serde(default = "default_min_driver_major")]
    pub min_driver_major: u32,
    /// Oldest accepted driver minor version (within `min_driver_major`).
    #[serde(default = "default_min_driver_minor")]
    pub min_driver_minor: u32,
}

/// Buffer sizing and read-error back-off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IoConfig {
    /// Receive buffer capacity in bytes.  Values below one maximum-size
    /// Ethernet frame are raised to it.
    #[serde(default = "default_receive_buffer_size")]
    pub receive_buffer_size: usize,
    /// Delay after the first consecutive read failure, in milliseconds.
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,
    /// Upper bound on the read-failure delay, in milliseconds.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter directive: `"error"`, `"warn"`, `"info"`, `"debug"`,
    /// `"trace"`, or a full `EnvFilter` expression.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_component_id() -> String {
    DriverIdentity::TAP_WINDOWS_V9.as_str().to_string()
}
fn default_min_driver_major() -> u32 {
    DriverVersion::MINIMUM.major
}
fn default_min_driver_minor() -> u32 {
    DriverVersion::MINIMUM.minor
}
fn default_receive_buffer_size() -> usize {
    RECEIVE_BUFFER_SIZE
}
fn default_retry_initial_ms() -> u64 {
    1
}
fn default_retry_max_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            component_id: default_component_id(),
            min_driver_major: default_min_driver_major(),
            min_driver_minor: default_min_driver_minor(),
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: default_receive_buffer_size(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl BridgeConfig {
    /// Converts the on-disk settings into the adapter's options.
    pub fn adapter_options(&self) -> AdapterOptions {
        let initial = Duration::from_millis(self.io.retry_initial_ms);
        let max = Duration::from_millis(self.io.retry_max_ms).max(initial);
        AdapterOptions {
            identity: DriverIdentity::new(self.adapter.component_id.clone()),
            minimum_version: DriverVersion::new(
                self.adapter.min_driver_major,
                self.adapter.min_driver_minor,
            ),
            receive_buffer_size: self.io.receive_buffer_size.max(MAX_FRAME_SIZE),
            read_retry: RetryPolicy { initial, max },
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`BridgeConfig`] from the platform config file, returning defaults
/// if the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<BridgeConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads [`BridgeConfig`] from an explicit path, returning defaults if the
/// file does not exist.
///
/// # Errors
///
/// As for [`load_config`].
pub fn load_config_from(path: &Path) -> Result<BridgeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BridgeConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &BridgeConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// As for [`save_config`].
pub fn save_config_to(config: &BridgeConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory including the `TapBridge`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("TapBridge"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("tapbridge"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("TapBridge")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tapbridge_test_{}", Uuid::new_v4()))
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_bridge_config_default_targets_tap_windows_v9() {
        // Arrange / Act
        let cfg = BridgeConfig::default();

        // Assert
        assert_eq!(cfg.adapter.component_id, "tap0901");
        assert_eq!(cfg.adapter.min_driver_major, 9);
        assert_eq!(cfg.adapter.min_driver_minor, 9);
    }

    #[test]
    fn test_io_config_default_matches_engine_defaults() {
        let cfg = IoConfig::default();
        assert_eq!(cfg.receive_buffer_size, 2048);
        assert_eq!(cfg.retry_initial_ms, 1);
        assert_eq!(cfg.retry_max_ms, 100);
    }

    #[test]
    fn test_logging_config_default_level_is_info() {
        assert_eq!(LoggingConfig::default().level, "info");
    }

    #[test]
    fn test_default_config_produces_default_adapter_options() {
        let options = BridgeConfig::default().adapter_options();
        assert_eq!(options, AdapterOptions::default());
    }

    // ── adapter_options ───────────────────────────────────────────────────────

    #[test]
    fn test_adapter_options_carry_configured_identity_and_version() {
        // Arrange
        let mut cfg = BridgeConfig::default();
        cfg.adapter.component_id = "tap_custom".to_string();
        cfg.adapter.min_driver_major = 9;
        cfg.adapter.min_driver_minor = 21;

        // Act
        let options = cfg.adapter_options();

        // Assert
        assert_eq!(options.identity.as_str(), "tap_custom");
        assert_eq!(options.minimum_version, DriverVersion::new(9, 21));
    }

    #[test]
    fn test_adapter_options_clamp_small_receive_buffer_up() {
        let mut cfg = BridgeConfig::default();
        cfg.io.receive_buffer_size = 512;

        assert_eq!(cfg.adapter_options().receive_buffer_size, MAX_FRAME_SIZE);
    }

    #[test]
    fn test_adapter_options_keep_retry_max_at_least_initial() {
        let mut cfg = BridgeConfig::default();
        cfg.io.retry_initial_ms = 50;
        cfg.io.retry_max_ms = 10;

        let retry = cfg.adapter_options().read_retry;

        assert_eq!(retry.initial, Duration::from_millis(50));
        assert_eq!(retry.max, Duration::from_millis(50));
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: BridgeConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn test_deserialize_partial_io_section_overrides_defaults() {
        // Arrange
        let toml_str = r#"
[io]
retry_max_ms = 250
"#;

        // Act
        let cfg: BridgeConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.io.retry_max_ms, 250);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.io.retry_initial_ms, 1);
        assert_eq!(cfg.adapter.component_id, "tap0901");
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let dir = temp_dir();
        let path = dir.join("config.toml");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    // ── load / save ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_defaults() {
        let path = temp_dir().join("config.toml");

        let cfg = load_config_from(&path).expect("missing file is not an error");

        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("nested").join("config.toml");
        let mut cfg = BridgeConfig::default();
        cfg.adapter.component_id = "tap0801".to_string();
        cfg.io.receive_buffer_size = 4096;
        cfg.logging.level = "debug".to_string();

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
        // NoPlatformConfigDir in a stripped CI env is also acceptable.
    }
}

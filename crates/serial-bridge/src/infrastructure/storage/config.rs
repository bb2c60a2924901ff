//! TOML-based configuration loading for the bridge.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\SerialBridge\config.toml`
//! - Linux:    `~/.config/serial-bridge/config.toml`
//! - macOS:    `~/Library/Application Support/SerialBridge/config.toml`
//!
//! The bridge never writes this file; it is maintained by hand or by
//! deployment tooling.  A missing file simply means defaults.
//!
//! # Example config
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1"
//! port = 8765
//!
//! [serial]
//! baud_rate = 115200
//! line_ending = "lf"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file, and whole
//! sections marked `#[serde(default)]` may be omitted entirely.  This allows
//! the bridge to run correctly on first run (before a config file exists) and
//! when upgrading from an older config file that is missing newer fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bridge_core::LineEnding;

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
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level bridge configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub serial: SerialConfig,
}

/// WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// IP address to bind the listener to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port for the WebSocket listener.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Serial device settings, applied to every port the bridge opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialConfig {
    /// Baud rate for opened devices.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Line terminator the devices speak: `"lf"`, `"cr"`, or `"crlf"`.
    #[serde(default)]
    pub line_ending: LineEnding,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8765
}
fn default_baud_rate() -> u32 {
    115_200
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            line_ending: LineEnding::default(),
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

/// Loads `AppConfig` from the platform config file, returning
/// `AppConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the directory cannot be
/// determined, [`ConfigError::Io`] for file-system errors other than
/// "not found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from an explicit path (the `--config` flag), returning
/// `AppConfig::default()` if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        // %APPDATA% e.g. C:\Users\<user>\AppData\Roaming
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("SerialBridge"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("serial-bridge"))
    }

    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/SerialBridge
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("SerialBridge")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        // Fallback for unsupported platforms.
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    // ── AppConfig defaults ────────────────────────────────────────────────────

    #[test]
    fn test_app_config_default_values() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert_eq!(cfg.server.port, 8765);
        assert_eq!(cfg.serial.baud_rate, 115_200);
        assert_eq!(cfg.serial.line_ending, LineEnding::Lf);
    }

    // ── TOML round-trip ───────────────────────────────────────────────────────

    #[test]
    fn test_app_config_serializes_and_deserializes_round_trip() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.server.port = 9000;
        cfg.serial.baud_rate = 57_600;

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        // Both sections carry #[serde(default)], so even an empty file works.
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");

        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_deserialize_minimal_toml_uses_defaults() {
        // Arrange: section headers present but no keys
        let toml_str = r#"
[server]
[serial]
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize minimal");

        // Assert
        assert_eq!(cfg.server.port, 8765);
        assert_eq!(cfg.serial.baud_rate, 115_200);
    }

    #[test]
    fn test_deserialize_partial_server_overrides_defaults() {
        // Arrange
        let toml_str = r#"
[server]
port = 9999
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.server.port, 9999);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert_eq!(cfg.serial.baud_rate, 115_200);
    }

    #[test]
    fn test_deserialize_line_ending_names() {
        let toml_str = r#"
[serial]
line_ending = "crlf"
"#;

        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize");

        assert_eq!(cfg.serial.line_ending, LineEnding::CrLf);
    }

    #[test]
    fn test_deserialize_unknown_line_ending_is_an_error() {
        let toml_str = r#"
[serial]
line_ending = "unix"
"#;

        let result: Result<AppConfig, toml::de::Error> = toml::from_str(toml_str);

        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        // Arrange
        let bad_toml = "[[[ not valid toml";

        // Act
        let result: Result<AppConfig, toml::de::Error> = toml::from_str(bad_toml);

        // Assert
        assert!(result.is_err());
    }

    // ── load_config_from ──────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_returns_default_when_file_absent() {
        // Arrange: a path that cannot exist, exercising the NotFound branch
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");

        // Act
        let cfg = load_config_from(&path).expect("absent file must load defaults");

        // Assert
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_load_config_from_reads_written_file() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("serial_bridge_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 12345

[serial]
baud_rate = 9600
line_ending = "crlf"
"#,
        )
        .unwrap();

        // Act
        let cfg = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(cfg.server.port, 12345);
        assert_eq!(cfg.serial.baud_rate, 9600);
        assert_eq!(cfg.serial.line_ending, LineEnding::CrLf);

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_from_propagates_parse_error() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("serial_bridge_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    // ── config_dir path formation ─────────────────────────────────────────────

    #[test]
    fn test_platform_config_dir_returns_some_on_this_platform() {
        // This test verifies the function returns Some on the current platform.
        // It may fail if the environment variable is unset in a stripped container.
        let result = platform_config_dir();
        // We only assert it is Some when the relevant env var is available.
        #[cfg(target_os = "windows")]
        if std::env::var_os("APPDATA").is_some() {
            assert!(result.is_some());
        }
        #[cfg(target_os = "linux")]
        {
            let has_xdg = std::env::var_os("XDG_CONFIG_HOME").is_some();
            let has_home = std::env::var_os("HOME").is_some();
            if has_xdg || has_home {
                assert!(result.is_some());
            }
        }
        #[cfg(target_os = "macos")]
        if std::env::var_os("HOME").is_some() {
            assert!(result.is_some());
        }
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        let path_result = config_file_path();
        if let Ok(path) = path_result {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
        // If NoPlatformConfigDir is returned (e.g. in a stripped CI env) that is also acceptable.
    }
}

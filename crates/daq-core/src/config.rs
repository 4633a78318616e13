//! Configuration for the instrument tools.
//!
//! Configuration is layered with `figment`:
//! 1. Library defaults ([`LabConfig::default`])
//! 2. A TOML file (`oselots.toml` unless another path is given)
//! 3. Environment variables prefixed with `OSELOTS_` (`__` separates nesting,
//!    e.g. `OSELOTS_STORAGE__OVERWRITE=false`)
//!
//! ## Schema
//!
//! ```toml
//! log_level = "info"
//!
//! [storage]
//! output_dir = "/data/oselots"
//! overwrite = true
//! suffix = ".fits"
//!
//! [[devices]]
//! id = "wheel"
//! type = "atik_efw"
//! index = 0
//!
//! [[devices]]
//! id = "mono"
//! type = "cornerstone"
//! port = "/dev/ttyUSB0"
//! ```
//!
//! Every key of a `[[devices]]` entry other than `id` and `type` is handed to
//! the driver factory untouched.

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "oselots.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "OSELOTS_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabConfig {
    /// Logging verbosity (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// FITS output settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Device definitions
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// Where and how converted frames are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory used when the command line does not name one
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Replace existing files
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,

    /// Suffix appended to single-frame outputs
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

/// One device entry.
///
/// The `type` field in TOML maps to `type_name` in code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Unique identifier for this device
    pub id: String,

    /// Driver type name (must match a registered factory)
    #[serde(rename = "type")]
    pub type_name: String,

    /// Driver-specific settings
    #[serde(flatten)]
    pub settings: toml::Value,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_overwrite() -> bool {
    true
}

fn default_suffix() -> String {
    ".fits".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            overwrite: default_overwrite(),
            suffix: default_suffix(),
        }
    }
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage: StorageSettings::default(),
            devices: Vec::new(),
        }
    }
}

impl LabConfig {
    /// Load `oselots.toml` from the working directory (if present) and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        }
        let config: LabConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment overlay).
    pub fn from_toml_str(contents: &str) -> AppResult<Self> {
        let config: LabConfig = Figment::from(Serialized::defaults(LabConfig::default()))
            .merge(Toml::string(contents))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(LabConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        if self.storage.suffix.is_empty() {
            return Err(DaqError::Configuration(
                "storage.suffix must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err(DaqError::Configuration(format!(
                    "Device of type '{}' has an empty id",
                    device.type_name
                )));
            }
            if !seen.insert(device.id.as_str()) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate device id '{}'",
                    device.id
                )));
            }
        }

        Ok(())
    }

    /// Look up a device by id
    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }

    /// First device with the given driver type
    pub fn first_of_type(&self, type_name: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.type_name == type_name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
log_level = "debug"

[storage]
output_dir = "/data/oselots"
overwrite = false

[[devices]]
id = "wheel"
type = "atik_efw"
index = 1
mock = true

[[devices]]
id = "mono"
type = "cornerstone"
port = "/dev/ttyUSB1"
"#;

    #[test]
    fn parses_devices_and_storage() {
        let config = LabConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.storage.output_dir, PathBuf::from("/data/oselots"));
        assert!(!config.storage.overwrite);
        assert_eq!(config.storage.suffix, ".fits");

        let wheel = config.device("wheel").unwrap();
        assert_eq!(wheel.type_name, "atik_efw");
        assert_eq!(wheel.settings.get("index").and_then(|v| v.as_integer()), Some(1));
        assert!(wheel.settings.get("id").is_none());

        let mono = config.first_of_type("cornerstone").unwrap();
        assert_eq!(mono.id, "mono");
    }

    #[test]
    fn defaults_when_empty() {
        let config = LabConfig::from_toml_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert!(config.storage.overwrite);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn rejects_bad_log_level() {
        let err = LabConfig::from_toml_str("log_level = \"chatty\"").unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let toml = r#"
[[devices]]
id = "wheel"
type = "atik_efw"

[[devices]]
id = "wheel"
type = "cornerstone"
"#;
        let err = LabConfig::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("Duplicate device id 'wheel'"));
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(DEFAULT_CONFIG_FILE, SAMPLE)?;
            jail.set_env("OSELOTS_LOG_LEVEL", "warn");
            jail.set_env("OSELOTS_STORAGE__OVERWRITE", "true");
            jail.set_env("OSELOTS_STORAGE__SUFFIX", ".fit");

            let config = LabConfig::load().unwrap();
            assert_eq!(config.log_level, "warn");
            assert!(config.storage.overwrite);
            assert_eq!(config.storage.suffix, ".fit");
            assert_eq!(config.storage.output_dir, PathBuf::from("/data/oselots"));
            assert_eq!(config.devices.len(), 2);
            Ok(())
        });
    }

    #[test]
    fn environment_applies_without_file() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("OSELOTS_STORAGE__OVERWRITE", "false");
            jail.set_env("OSELOTS_LOG_LEVEL", "debug");

            let config = LabConfig::load_from("absent.toml").unwrap();
            assert!(!config.storage.overwrite);
            assert_eq!(config.log_level, "debug");

            jail.set_env("OSELOTS_LOG_LEVEL", "chatty");
            assert!(LabConfig::load_from("absent.toml").is_err());
            Ok(())
        });
    }

    #[test]
    fn loads_file_and_tolerates_missing_file() {
        // Jail serialises with the tests that set OSELOTS_* variables
        figment::Jail::expect_with(|_| {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(SAMPLE.as_bytes()).unwrap();
            let config = LabConfig::load_from(file.path()).unwrap();
            assert_eq!(config.devices.len(), 2);

            let dir = tempfile::tempdir().unwrap();
            let config = LabConfig::load_from(dir.path().join("absent.toml")).unwrap();
            assert!(config.devices.is_empty());
            Ok(())
        });
    }
}

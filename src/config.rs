//! Configuration system for licstore.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `LICSTORE_STORE_PATH` - Location of the license database JSON document
//! - `LICSTORE_LICENSE_KEY_PREFIX` - Product tag prepended to every key
//! - `LICSTORE_VALIDATOR_LICENSE_PATH` - Location of the end-user license file
//! - `LICSTORE_BINDING_POLICY` - `permissive` or `strict`
//! - `LICSTORE_LOGGING_ENABLED` - Enable the fmt subscriber in the binaries
//! - `LICSTORE_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};
use crate::validator::BindingMode;

/// Global configuration singleton.
static CONFIG: OnceLock<LicenseStoreConfig> = OnceLock::new();

/// Directory name used under the platform data directory.
pub const APP_DIR_NAME: &str = "licstore";

/// Default file name of the license database.
pub const STORE_FILE_NAME: &str = "license_database.json";

/// Default file name of the end-user license file.
pub const LICENSE_FILE_NAME: &str = "user_license.json";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LicenseStoreConfig {
    /// License database configuration
    pub store: StoreConfig,
    /// License key format configuration
    pub license: LicenseConfig,
    /// Client-side validator configuration
    pub validator: ValidatorConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// License database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Explicit database path; falls back to the platform data directory
    pub path: Option<String>,
    /// Literal version string written into new documents
    pub version: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            version: "1.0".to_string(),
        }
    }
}

impl StoreConfig {
    /// Resolve the database location.
    pub fn resolved_path(&self) -> LicenseResult<PathBuf> {
        resolve_path(self.path.as_deref(), STORE_FILE_NAME)
    }
}

/// License key generation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Prefix for generated license keys (e.g., "CNPRO" -> "CNPRO-XXXX-XXXX-XXXX-XXXX")
    pub key_prefix: String,
    /// Number of segments in the license key
    pub key_segments: u8,
    /// Characters per segment
    pub key_segment_length: u8,
    /// How many tokens to draw before giving up on finding an unused one
    pub max_generation_attempts: u32,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "CNPRO".to_string(),
            key_segments: 4,
            key_segment_length: 4,
            max_generation_attempts: 16,
        }
    }
}

/// Client-side validator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Explicit license file path; falls back to the platform data directory
    pub license_path: Option<String>,
    /// Hardware binding policy: "permissive" or "strict"
    pub binding_policy: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            license_path: None,
            binding_policy: "permissive".to_string(),
        }
    }
}

impl ValidatorConfig {
    /// Resolve the license file location.
    pub fn resolved_license_path(&self) -> LicenseResult<PathBuf> {
        resolve_path(self.license_path.as_deref(), LICENSE_FILE_NAME)
    }

    /// Parse the configured binding policy.
    pub fn binding_mode(&self) -> LicenseResult<BindingMode> {
        self.binding_policy.parse()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "info".to_string(),
        }
    }
}

/// Platform data directory for licstore files.
///
/// - Windows: `%APPDATA%\licstore\`
/// - macOS: `~/Library/Application Support/licstore/`
/// - Linux: `~/.local/share/licstore/`
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join(APP_DIR_NAME))
}

fn resolve_path(explicit: Option<&str>, file_name: &str) -> LicenseResult<PathBuf> {
    match explicit {
        Some(path) if !path.trim().is_empty() => Ok(PathBuf::from(path)),
        _ => app_data_dir()
            .map(|dir| dir.join(file_name))
            .ok_or_else(|| {
                LicenseError::ConfigError("could not determine app data directory".to_string())
            }),
    }
}

impl LicenseStoreConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let builder = Config::builder()
            .set_default("store.version", "1.0")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("license.key_prefix", "CNPRO")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("license.key_segments", 4)
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("license.key_segment_length", 4)
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("license.max_generation_attempts", 16)
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("validator.binding_policy", "permissive")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("logging.enabled", false)
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("logging.level", "info")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("store.path", env::var("LICSTORE_STORE_PATH").ok())
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "license.key_prefix",
                env::var("LICSTORE_LICENSE_KEY_PREFIX").ok(),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "validator.license_path",
                env::var("LICSTORE_VALIDATOR_LICENSE_PATH").ok(),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "validator.binding_policy",
                env::var("LICSTORE_BINDING_POLICY").ok(),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "logging.enabled",
                env::var("LICSTORE_LOGGING_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option("logging.level", env::var("LICSTORE_LOG_LEVEL").ok())
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.license.key_prefix.is_empty() {
            return Err(LicenseError::ConfigError(
                "license.key_prefix cannot be empty".to_string(),
            ));
        }
        if self.license.key_prefix.contains('-') {
            return Err(LicenseError::ConfigError(
                "license.key_prefix cannot contain '-'".to_string(),
            ));
        }
        if self.license.key_segments == 0 {
            return Err(LicenseError::ConfigError(
                "license.key_segments must be greater than 0".to_string(),
            ));
        }
        if self.license.key_segment_length == 0 {
            return Err(LicenseError::ConfigError(
                "license.key_segment_length must be greater than 0".to_string(),
            ));
        }
        if self.license.max_generation_attempts == 0 {
            return Err(LicenseError::ConfigError(
                "license.max_generation_attempts must be greater than 0".to_string(),
            ));
        }

        if self.store.version.trim().is_empty() {
            return Err(LicenseError::ConfigError(
                "store.version cannot be empty".to_string(),
            ));
        }

        self.validator.binding_mode().map_err(|_| {
            LicenseError::ConfigError(format!(
                "validator.binding_policy must be 'permissive' or 'strict', got '{}'",
                self.validator.binding_policy
            ))
        })?;

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static LicenseStoreConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = LicenseStoreConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    Ok(CONFIG.get_or_init(|| config))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> LicenseResult<&'static LicenseStoreConfig> {
    get_config()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LicenseStoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.license.key_prefix, "CNPRO");
        assert_eq!(config.store.version, "1.0");
        assert_eq!(config.validator.binding_mode().unwrap(), BindingMode::Permissive);
    }

    #[test]
    fn rejects_empty_prefix() {
        let mut config = LicenseStoreConfig::default();
        config.license.key_prefix = String::new();
        assert!(matches!(
            config.validate(),
            Err(LicenseError::ConfigError(_))
        ));
    }

    #[test]
    fn rejects_dashed_prefix() {
        let mut config = LicenseStoreConfig::default();
        config.license.key_prefix = "CN-PRO".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_binding_policy() {
        let mut config = LicenseStoreConfig::default();
        config.validator.binding_policy = "paranoid".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("paranoid"));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = LicenseStoreConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_paths_win() {
        let mut config = LicenseStoreConfig::default();
        config.store.path = Some("/tmp/db.json".to_string());
        config.validator.license_path = Some("/tmp/lic.json".to_string());
        assert_eq!(
            config.store.resolved_path().unwrap(),
            PathBuf::from("/tmp/db.json")
        );
        assert_eq!(
            config.validator.resolved_license_path().unwrap(),
            PathBuf::from("/tmp/lic.json")
        );
    }
}

//! # Pricing Configuration
//!
//! Store-wide settings for bundle pricing: where the database lives, the
//! promotion stacking default and cap, and order limits.
//!
//! ## Load Order (later overrides earlier)
//! ```text
//! defaults ──► pricing.toml ──► BUNDLE_* environment ──► validate()
//! ```
//!
//! ## Example `pricing.toml`
//! ```toml
//! [database]
//! path = "/var/lib/bundles/bundles.db"
//!
//! [stacking]
//! default = "exclude"
//! cap_bps = 4000
//!
//! [limits]
//! max_bundle_quantity = 50
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use bundle_core::{GlobalStackingPolicy, Rate, StackingDefault, MAX_BUNDLE_QUANTITY};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "bundles", "pricing")
        .map(|dirs| dirs.data_dir().join("bundles.db"))
        .unwrap_or_else(|| PathBuf::from("bundles.db"))
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackingSettings {
    /// Whether promotions stack on bundle lines when nothing overrides it.
    #[serde(default)]
    pub default: StackingDefault,

    /// Cap on the cumulative discount rate of a bundle line, in basis points.
    #[serde(default)]
    pub cap_bps: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    #[serde(default = "default_max_bundle_quantity")]
    pub max_bundle_quantity: i64,
}

fn default_max_bundle_quantity() -> i64 {
    MAX_BUNDLE_QUANTITY
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_bundle_quantity: default_max_bundle_quantity(),
        }
    }
}

/// Complete pricing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub stacking: StackingSettings,

    #[serde(default)]
    pub limits: LimitSettings,
}

impl PricingConfig {
    /// Loads configuration from file, environment, and defaults.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading pricing config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load pricing config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::Invalid("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Pricing config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(cap) = self.stacking.cap_bps {
            if cap > Rate::FULL_BPS {
                return Err(ConfigError::Invalid(format!(
                    "stacking cap_bps must be at most {}, got {}",
                    Rate::FULL_BPS,
                    cap
                )));
            }
        }

        let max = self.limits.max_bundle_quantity;
        if max < 1 || max > MAX_BUNDLE_QUANTITY {
            return Err(ConfigError::Invalid(format!(
                "max_bundle_quantity must be between 1 and {}, got {}",
                MAX_BUNDLE_QUANTITY, max
            )));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("BUNDLE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(value) = std::env::var("BUNDLE_STACKING_DEFAULT") {
            match value.parse() {
                Ok(parsed) => self.stacking.default = parsed,
                Err(_) => warn!(value = %value, "Unknown stacking default in environment"),
            }
        }

        if let Ok(value) = std::env::var("BUNDLE_STACKING_CAP_BPS") {
            if value.is_empty() || value.eq_ignore_ascii_case("none") {
                self.stacking.cap_bps = None;
            } else if let Ok(cap) = value.parse::<u32>() {
                debug!(cap_bps = cap, "Overriding stacking cap from environment");
                self.stacking.cap_bps = Some(cap);
            }
        }

        if let Ok(value) = std::env::var("BUNDLE_MAX_QUANTITY") {
            if let Ok(max) = value.parse::<i64>() {
                self.limits.max_bundle_quantity = max;
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "bundles", "pricing")
            .map(|dirs| dirs.config_dir().join("pricing.toml"))
    }

    /// The stacking policy handed to the promotion guard.
    pub fn stacking_policy(&self) -> GlobalStackingPolicy {
        GlobalStackingPolicy {
            default: self.stacking.default,
            cap: self.stacking.cap_bps.map(Rate::from_bps),
        }
    }

    pub fn database_path(&self) -> &PathBuf {
        &self.database.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PricingConfig::default();
        assert_eq!(config.stacking.default, StackingDefault::Exclude);
        assert_eq!(config.stacking.cap_bps, None);
        assert_eq!(config.limits.max_bundle_quantity, MAX_BUNDLE_QUANTITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: PricingConfig = toml::from_str(
            r#"
            [database]
            path = "/tmp/bundles.db"

            [stacking]
            default = "allow"
            cap_bps = 4000
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/bundles.db"));
        let policy = config.stacking_policy();
        assert_eq!(policy.default, StackingDefault::Allow);
        assert_eq!(policy.cap, Some(Rate::from_percent(40)));
        assert_eq!(config.limits.max_bundle_quantity, MAX_BUNDLE_QUANTITY);
    }

    #[test]
    fn test_validation() {
        let mut config = PricingConfig::default();
        config.stacking.cap_bps = Some(12_000);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.stacking.cap_bps = Some(4000);
        config.limits.max_bundle_quantity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_toml_rejected() {
        let result: Result<PricingConfig, _> = toml::from_str("[stacking]\ndefault = 7");
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let mut config = PricingConfig::default();
        config.stacking.cap_bps = Some(4000);
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[stacking]"));
        assert!(toml_str.contains("cap_bps = 4000"));
    }
}

use crate::currency::ConversionMode;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Rate used when a user has no stored settings
pub const DEFAULT_USD_TO_INR_RATE: f64 = 83.0;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: "mm_tracker.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    pub secret_key: String,
    pub access_token_minutes: i64,
    pub verification_token_hours: i64,
    /// bcrypt work factor
    pub password_cost: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            secret_key: "change-me-in-production".to_string(),
            access_token_minutes: 24 * 60,
            verification_token_hours: 24,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ConversionConfig {
    pub mode: ConversionMode,
    pub default_rate: f64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        ConversionConfig {
            mode: ConversionMode::Smart,
            default_rate: DEFAULT_USD_TO_INR_RATE,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct EmailConfig {
    pub frontend_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        EmailConfig {
            frontend_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub conversion: ConversionConfig,
    pub email: EmailConfig,
}

impl AppConfig {
    /// Load from `path` when given, otherwise use built-in defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                debug!("No config path given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config = Self::from_yaml(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not a mapping
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.conversion.default_rate.is_finite() || self.conversion.default_rate <= 0.0 {
            bail!(
                "conversion.default_rate must be positive, got {}",
                self.conversion.default_rate
            );
        }
        if self.security.secret_key.is_empty() {
            bail!("security.secret_key must not be empty");
        }
        if self.security.access_token_minutes <= 0 || self.security.verification_token_hours <= 0 {
            bail!("token lifetimes must be positive");
        }
        if !(4..=31).contains(&self.security.password_cost) {
            bail!(
                "security.password_cost must be between 4 and 31, got {}",
                self.security.password_cost
            );
        }
        Ok(())
    }
}

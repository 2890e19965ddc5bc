use anyhow::{Context, Result};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `database.path`.
pub const ENV_DATABASE_PATH: &str = "METEO_DATABASE_PATH";

/// Environment variable overriding `cache.ttl_seconds`.
pub const ENV_CACHE_TTL: &str = "METEO_CACHE_TTL_SECONDS";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Observation database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Query cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Default query parameters
    #[serde(default)]
    pub queries: QueryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("meteo")
        .join("weather.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a cached query result, in seconds (default: 300)
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Drop cached entries for a city when one of its observations changes.
    ///
    /// Off by default: reads may then be stale for up to `ttl_seconds`.
    #[serde(default)]
    pub invalidate_on_write: bool,
}

fn default_ttl_seconds() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            invalidate_on_write: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Default number of observations returned by history queries
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Default trailing window for trends, in days
    #[serde(default = "default_trend_days")]
    pub trend_days: u32,

    /// Maximum number of city suggestions
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
}

fn default_history_limit() -> usize {
    10
}

fn default_trend_days() -> u32 {
    7
}

fn default_suggestion_limit() -> usize {
    5
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            trend_days: default_trend_days(),
            suggestion_limit: default_suggestion_limit(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist.
    ///
    /// Environment overrides are applied after the file is read.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Apply `METEO_*` environment variables on top of the loaded values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(ttl) = std::env::var(ENV_CACHE_TTL) {
            self.cache.ttl_seconds = ttl
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of seconds", ENV_CACHE_TTL))?;
        }
        Ok(())
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.database.path.as_os_str().is_empty() {
            result.add_error("database.path", "Database path cannot be empty");
        } else if self.database.path.is_dir() {
            result.add_error(
                "database.path",
                format!("Path is a directory: {}", self.database.path.display()),
            );
        }

        if self.cache.ttl_seconds == 0 {
            result.add_warning("cache.ttl_seconds", "Query cache disabled (0 seconds)");
        } else if self.cache.ttl_seconds > 3600 {
            result.add_warning(
                "cache.ttl_seconds",
                "Cache lifetime is more than an hour; reads may be very stale",
            );
        }

        if self.queries.history_limit == 0 {
            result.add_error("queries.history_limit", "History limit must be greater than 0");
        }

        if self.queries.trend_days == 0 {
            result.add_error("queries.trend_days", "Trend window must be at least 1 day");
        }

        if self.queries.suggestion_limit == 0 {
            result.add_error(
                "queries.suggestion_limit",
                "Suggestion limit must be greater than 0",
            );
        }

        result
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("meteo");

        Ok(config_dir.join("config.toml"))
    }
}

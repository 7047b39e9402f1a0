//! Configuration management for `prettymap`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::MapError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest AOI radius the pipeline accepts, in metres
pub const MIN_RADIUS_M: u32 = 100;
/// Largest AOI radius the pipeline accepts, in metres
pub const MAX_RADIUS_M: u32 = 2000;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    /// Place search / geocoding service settings
    #[serde(default)]
    pub search: SearchConfig,
    /// Geometry source settings
    #[serde(default)]
    pub geometry: GeometryConfig,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Default request settings
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Nominatim settings, shared by location search and the geocoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Base URL of the Nominatim instance
    #[serde(default = "default_nominatim_url")]
    pub base_url: String,
    /// User-Agent sent with every request (required by the Nominatim usage policy)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u32,
    /// Number of suggestions returned by a search
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

/// Overpass settings for the geometry fetcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Base URL of the Overpass API
    #[serde(default = "default_overpass_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_geometry_timeout")]
    pub timeout_seconds: u32,
}

/// Cache configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of cached search suggestions in seconds
    #[serde(default = "default_search_ttl")]
    pub search_ttl_seconds: u64,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Default request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// AOI radius in metres
    #[serde(default = "default_radius")]
    pub radius_m: u32,
    /// Use a rectangular AOI instead of a circle
    #[serde(default)]
    pub rectangular: bool,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum upload size in MB
    #[serde(default = "default_max_upload")]
    pub max_upload_mb: u32,
    /// Directory with a built front-end to serve next to the API
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

// Default value functions
fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    format!("prettymap/{}", crate::VERSION)
}

fn default_search_timeout() -> u32 {
    10
}

fn default_search_limit() -> usize {
    5
}

fn default_overpass_url() -> String {
    "https://overpass-api.de/api".to_string()
}

fn default_geometry_timeout() -> u32 {
    60
}

fn default_search_ttl() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_radius() -> u32 {
    500
}

fn default_port() -> u16 {
    8501
}

fn default_max_upload() -> u32 {
    20
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_nominatim_url(),
            user_agent: default_user_agent(),
            timeout_seconds: default_search_timeout(),
            limit: default_search_limit(),
        }
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            base_url: default_overpass_url(),
            timeout_seconds: default_geometry_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            search_ttl_seconds: default_search_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            radius_m: default_radius(),
            rectangular: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_upload_mb: default_max_upload(),
            static_dir: None,
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            geometry: GeometryConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            defaults: DefaultsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl MapConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // PRETTYMAP__SEARCH__TIMEOUT_SECONDS=5 -> search.timeout_seconds
        builder = builder.add_source(
            Environment::with_prefix("PRETTYMAP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: MapConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("prettymap").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.search.base_url.is_empty() {
            self.search.base_url = default_nominatim_url();
        }
        if self.search.user_agent.is_empty() {
            self.search.user_agent = default_user_agent();
        }
        if self.search.timeout_seconds == 0 {
            self.search.timeout_seconds = default_search_timeout();
        }
        if self.search.limit == 0 {
            self.search.limit = default_search_limit();
        }
        if self.geometry.base_url.is_empty() {
            self.geometry.base_url = default_overpass_url();
        }
        if self.geometry.timeout_seconds == 0 {
            self.geometry.timeout_seconds = default_geometry_timeout();
        }
        if self.cache.search_ttl_seconds == 0 {
            self.cache.search_ttl_seconds = default_search_ttl();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        if self.defaults.radius_m == 0 {
            self.defaults.radius_m = default_radius();
        }
        if self.server.port == 0 {
            self.server.port = default_port();
        }
        if self.server.max_upload_mb == 0 {
            self.server.max_upload_mb = default_max_upload();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.search.timeout_seconds > 60 {
            return Err(MapError::config("Search timeout cannot exceed 60 seconds").into());
        }

        if self.search.limit > 20 {
            return Err(MapError::config("Search limit cannot exceed 20 results").into());
        }

        if self.geometry.timeout_seconds > 300 {
            return Err(MapError::config("Geometry timeout cannot exceed 300 seconds").into());
        }

        if self.cache.search_ttl_seconds > 24 * 60 * 60 {
            return Err(MapError::config("Search cache TTL cannot exceed 1 day").into());
        }

        if !(MIN_RADIUS_M..=MAX_RADIUS_M).contains(&self.defaults.radius_m) {
            return Err(MapError::config(format!(
                "Default radius must be between {MIN_RADIUS_M} and {MAX_RADIUS_M} metres"
            ))
            .into());
        }

        if self.server.max_upload_mb > 200 {
            return Err(MapError::config("Upload limit cannot exceed 200 MB").into());
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(MapError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(MapError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, url) in [
            ("Search", &self.search.base_url),
            ("Geometry", &self.geometry.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(MapError::config(format!(
                    "{name} base URL must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        Ok(())
    }
}

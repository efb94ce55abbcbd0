#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Server configuration.
//!
//! Values come from an optional TOML file named by `PARCEL_MAP_CONFIG`,
//! overlaid by environment variables. Secrets (the contact provider key,
//! the geocoder token) are read here and never leave the server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parcel_map_parcel_models::Coordinate;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Environment variable naming the optional TOML config file.
pub const CONFIG_PATH_VAR: &str = "PARCEL_MAP_CONFIG";

/// Default location of the query log database.
pub const DEFAULT_QUERY_LOG_PATH: &str = "data/query_log.duckdb";

/// Default bind address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";

/// Default port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default timeout for the contact and geocoding providers.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`FileConfig`].
    #[error("Invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value could not be parsed.
    #[error("Invalid value for {key}: {message}")]
    Invalid {
        /// Setting name.
        key: &'static str,
        /// What was wrong.
        message: String,
    },

    /// A setting required in this environment is missing.
    #[error("{key} is required in {environment}")]
    Missing {
        /// Setting name.
        key: &'static str,
        /// The environment that requires it.
        environment: Environment,
    },
}

/// Deployment environment.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    /// Local development: placeholder contacts are allowed.
    #[default]
    Development,
    /// Production: provider failures surface as errors.
    Production,
}

/// Settings as written in the TOML file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Deployment environment.
    pub environment: Option<Environment>,
    /// Cadastral `/query` endpoint.
    pub cadastral_url: Option<String>,
    /// Cadastral timeout in seconds.
    pub cadastral_timeout_secs: Option<u64>,
    /// Whether to serve synthetic parcels when the cadastral service fails.
    pub mock_fallback: Option<bool>,
    /// Contact provider base URL.
    pub contact_api_url: Option<String>,
    /// Contact provider API key.
    pub contact_api_key: Option<String>,
    /// Geocoding endpoint.
    pub geocoder_url: Option<String>,
    /// Geocoding access token.
    pub geocoder_token: Option<String>,
    /// Geocoding proximity bias as `"lng,lat"`.
    pub geocoder_proximity: Option<String>,
    /// Query log database path.
    pub query_log_path: Option<PathBuf>,
    /// Bind address.
    pub bind_addr: Option<String>,
    /// Port.
    pub port: Option<u16>,
}

impl FileConfig {
    /// Parses TOML config text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] on invalid TOML or unknown keys.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}

/// Contact provider credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ContactConfig {
    /// Provider base URL.
    pub url: String,
    /// Provider API key.
    pub api_key: String,
}

impl std::fmt::Debug for ContactConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Deployment environment.
    pub environment: Environment,
    /// Cadastral `/query` endpoint.
    pub cadastral_url: String,
    /// Upper bound on one cadastral request.
    pub cadastral_timeout: Duration,
    /// Whether to serve synthetic parcels when the cadastral service fails.
    pub mock_fallback: bool,
    /// Contact provider, if configured.
    pub contact: Option<ContactConfig>,
    /// Geocoding endpoint.
    pub geocoder_url: String,
    /// Geocoding access token.
    pub geocoder_token: Option<String>,
    /// Geocoding proximity bias.
    pub geocoder_proximity: Coordinate,
    /// Query log database path.
    pub query_log_path: PathBuf,
    /// Bind address.
    pub bind_addr: String,
    /// Port.
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            cadastral_url: parcel_map_arcgis::BOONE_COUNTY_PARCELS_URL.to_string(),
            cadastral_timeout: parcel_map_arcgis::DEFAULT_TIMEOUT,
            mock_fallback: true,
            contact: None,
            geocoder_url: parcel_map_geocoder::mapbox::MAPBOX_PLACES_URL.to_string(),
            geocoder_token: None,
            geocoder_proximity: parcel_map_geocoder::mapbox::DEFAULT_PROXIMITY,
            query_log_path: PathBuf::from(DEFAULT_QUERY_LOG_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}

fn parse_proximity(key: &'static str, value: &str) -> Result<Coordinate, ConfigError> {
    let invalid = |message: String| ConfigError::Invalid { key, message };
    let (lng, lat) = value
        .split_once(',')
        .ok_or_else(|| invalid(format!("expected \"lng,lat\", got {value:?}")))?;
    Coordinate::new(parse_number(key, lng)?, parse_number(key, lat)?)
        .map_err(|e| invalid(e.to_string()))
}

impl AppConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file or a variable is invalid,
    /// or a setting required in this environment is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let file = match lookup(CONFIG_PATH_VAR) {
            Some(path) => {
                log::info!("Reading config file {path}");
                FileConfig::read(Path::new(&path))?
            }
            None => FileConfig::default(),
        };
        Self::from_sources(file, lookup)
    }

    /// Builds configuration from file settings overlaid by `env`.
    ///
    /// Empty environment values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value is invalid or a setting required
    /// in this environment is missing.
    pub fn from_sources(
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let environment = match env("PARCEL_MAP_ENV") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "PARCEL_MAP_ENV",
                message: format!("expected development or production, got {value:?}"),
            })?,
            None => file.environment.unwrap_or_default(),
        };

        let cadastral_timeout = match env("CADASTRAL_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse_number("CADASTRAL_TIMEOUT_SECS", &value)?),
            None => file
                .cadastral_timeout_secs
                .map_or(defaults.cadastral_timeout, Duration::from_secs),
        };

        let mock_fallback = match env("MOCK_FALLBACK") {
            Some(value) => parse_bool("MOCK_FALLBACK", &value)?,
            None => file.mock_fallback.unwrap_or(defaults.mock_fallback),
        };

        let geocoder_proximity = match env("GEOCODER_PROXIMITY").or(file.geocoder_proximity) {
            Some(value) => parse_proximity("GEOCODER_PROXIMITY", &value)?,
            None => defaults.geocoder_proximity,
        };

        let port = match env("PORT") {
            Some(value) => parse_number("PORT", &value)?,
            None => file.port.unwrap_or(defaults.port),
        };

        let contact = match (
            env("CONTACT_API_URL").or(file.contact_api_url),
            env("CONTACT_API_KEY").or(file.contact_api_key),
        ) {
            (Some(url), Some(api_key)) => Some(ContactConfig { url, api_key }),
            (Some(_), None) | (None, Some(_)) => {
                log::warn!("Only one of CONTACT_API_URL and CONTACT_API_KEY is set, ignoring both");
                None
            }
            (None, None) => None,
        };

        let config = Self {
            environment,
            cadastral_url: env("CADASTRAL_URL")
                .or(file.cadastral_url)
                .unwrap_or(defaults.cadastral_url),
            cadastral_timeout,
            mock_fallback,
            contact,
            geocoder_url: env("GEOCODER_URL")
                .or(file.geocoder_url)
                .unwrap_or(defaults.geocoder_url),
            geocoder_token: env("GEOCODER_TOKEN").or(file.geocoder_token),
            geocoder_proximity,
            query_log_path: env("QUERY_LOG_PATH")
                .map(PathBuf::from)
                .or(file.query_log_path)
                .unwrap_or(defaults.query_log_path),
            bind_addr: env("BIND_ADDR")
                .or(file.bind_addr)
                .unwrap_or(defaults.bind_addr),
            port,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-setting requirements.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the cadastral timeout is zero or
    /// production is missing contact provider credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cadastral_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "CADASTRAL_TIMEOUT_SECS",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.environment == Environment::Production && self.contact.is_none() {
            return Err(ConfigError::Missing {
                key: "CONTACT_API_URL and CONTACT_API_KEY",
                environment: self.environment,
            });
        }

        if self.geocoder_token.is_none() {
            log::warn!("GEOCODER_TOKEN is not set; address search will fail");
        }

        Ok(())
    }

    /// Whether placeholder contacts may be served.
    #[must_use]
    pub fn allow_placeholder_contact(&self) -> bool {
        self.environment != Environment::Production
    }
}

//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::{CacheKind, ConfigError, JanusConfig, LogFormat};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use janus_config::ConfigLoader;
///
/// # fn main() -> Result<(), janus_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("janus.toml")?
///     .with_env_prefix("JANUS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: JanusConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: JanusConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    ///
    /// This is called automatically by `new()`, but can be chained for clarity.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = JanusConfig::default();
        self
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats.
    /// The file format is determined by the file extension.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file contains invalid TOML/JSON
    /// - The file contains unknown fields (strict mode)
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from an optional file.
    ///
    /// If the file exists, loads it. If not, silently continues.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`"toml"` or `"json"`).
    ///
    /// # Example
    ///
    /// ```
    /// use janus_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [http]
    ///     port = 8080
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.http.port, 8080);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`.
    /// For example, with prefix "JANUS":
    /// - `JANUS__HTTP__PORT=8081`
    /// - `JANUS__SERVICE__NAME=orders`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file from the working directory (or a parent) into the
    /// process environment, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if a `.env` file exists but cannot be
    /// read or parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        accept_missing(dotenvy::dotenv())?;
        Ok(self)
    }

    /// Load the `.env`-style file at `path` into the process environment, if
    /// it exists.
    pub fn with_dotenv_path(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        accept_missing(dotenvy::from_path(path.as_ref()))?;
        Ok(self)
    }

    /// Finalize and return the loaded configuration.
    ///
    /// Applies environment variable overrides (if a prefix was set) and
    /// validates the final configuration.
    pub fn load(mut self) -> Result<JanusConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without validation.
    #[must_use]
    pub fn load_unvalidated(self) -> JanusConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<JanusConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> =
            env::vars().filter(|(k, _)| k.starts_with(prefix)).collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(key_without_prefix) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__"))
        else {
            // JANUS_CONFIG and friends share the prefix but are not overrides.
            return Ok(());
        };

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            // Service section
            ["SERVICE", "NAME"] => config.service.name = value.to_string(),
            ["SERVICE", "REGISTRY_ADDRESS"] => config.service.registry_address = value.to_string(),
            ["SERVICE", "ADVERTISE_HOST"] => {
                config.service.advertise_host = (!value.is_empty()).then(|| value.to_string());
            }
            ["SERVICE", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.service.shutdown_timeout_secs = parse_num(key, value)?;
            }
            ["SERVICE", "DEREGISTER_AFTER_SECS"] => {
                config.service.deregister_after_secs = parse_num(key, value)?;
            }

            // RPC section
            ["GRPC", "HOST"] => config.grpc.host = value.to_string(),
            ["GRPC", "PORT"] => config.grpc.port = parse_num(key, value)?,
            ["GRPC", "KEEP_ALIVE_SECS"] => config.grpc.keep_alive_secs = parse_num(key, value)?,
            ["GRPC", "CHECK_TIMEOUT_SECS"] => {
                config.grpc.check_timeout_secs = parse_num(key, value)?;
            }
            ["GRPC", "CHECK_INTERVAL_SECS"] => {
                config.grpc.check_interval_secs = parse_num(key, value)?;
            }

            // HTTP section
            ["HTTP", "HOST"] => config.http.host = value.to_string(),
            ["HTTP", "PORT"] => config.http.port = parse_num(key, value)?,
            ["HTTP", "KEEP_ALIVE_SECS"] => config.http.keep_alive_secs = parse_num(key, value)?,
            ["HTTP", "CERT_FILE"] => {
                config.http.cert_file = (!value.is_empty()).then(|| value.to_string());
            }
            ["HTTP", "KEY_FILE"] => {
                config.http.key_file = (!value.is_empty()).then(|| value.to_string());
            }
            ["HTTP", "CHECK_TIMEOUT_SECS"] => {
                config.http.check_timeout_secs = parse_num(key, value)?;
            }
            ["HTTP", "CHECK_INTERVAL_SECS"] => {
                config.http.check_interval_secs = parse_num(key, value)?;
            }
            ["HTTP", "ENTRY"] => config.http.entry = value.to_string(),
            ["HTTP", "CACHE", "KIND"] => {
                config.http.cache.kind = match value.to_lowercase().as_str() {
                    "none" => CacheKind::None,
                    "memory" => CacheKind::Memory,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'none' or 'memory'",
                        ))
                    }
                };
            }
            ["HTTP", "CACHE", "TTL_SECS"] => config.http.cache.ttl_secs = parse_num(key, value)?,
            ["HTTP", "CACHE", "MAX_ENTRIES"] => {
                config.http.cache.max_entries = parse_num(key, value)?;
            }
            ["HTTP", "SOCKET", "MAX_MESSAGE_SIZE"] => {
                config.http.socket.max_message_size = parse_num(key, value)?;
            }
            ["HTTP", "SOCKET", "MAX_FRAME_SIZE"] => {
                config.http.socket.max_frame_size = parse_num(key, value)?;
            }

            // Logging section
            ["LOGGING", "ENABLED"] => {
                config.logging.enabled = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LOGGING", "LEVEL"] => config.logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }

            _ => {}
        }

        Ok(())
    }
}

/// A missing `.env` file is not an error; anything else is.
fn accept_missing<T>(result: Result<T, dotenvy::Error>) -> Result<(), ConfigError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(ConfigError::Dotenv(e)),
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

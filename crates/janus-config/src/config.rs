//! Root configuration type.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, GrpcSection, HttpSection, LoggingSection, ServiceSection};

/// Complete Janus configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables, or build it directly with struct update syntax.
///
/// # Example
///
/// ```
/// use janus_config::{HttpSection, JanusConfig, ServiceSection};
///
/// let config = JanusConfig {
///     service: ServiceSection { name: "svc".to_string(), ..Default::default() },
///     http: HttpSection { port: 8080, ..Default::default() },
///     ..Default::default()
/// };
///
/// assert!(config.http.is_enabled());
/// assert!(!config.grpc.is_enabled());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct JanusConfig {
    /// Logical service settings.
    #[serde(default)]
    pub service: ServiceSection,

    /// RPC listener settings.
    #[serde(default)]
    pub grpc: GrpcSection,

    /// HTTP listener settings.
    #[serde(default)]
    pub http: HttpSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl JanusConfig {
    /// Returns `true` if at least one listener has a non-zero port.
    pub fn any_listener_enabled(&self) -> bool {
        self.grpc.is_enabled() || self.http.is_enabled()
    }

    /// Fills every unset value from the process defaults.
    ///
    /// A value is unset when it is empty or zero. Ports are never filled:
    /// a zero port stays zero and keeps its listener disabled.
    #[must_use]
    pub fn merged(mut self) -> Self {
        let defaults = Self::default();

        fill_str(&mut self.service.registry_address, &defaults.service.registry_address);
        fill_u64(&mut self.service.shutdown_timeout_secs, defaults.service.shutdown_timeout_secs);
        fill_u64(&mut self.service.deregister_after_secs, defaults.service.deregister_after_secs);

        fill_str(&mut self.grpc.host, &defaults.grpc.host);
        fill_u64(&mut self.grpc.check_timeout_secs, defaults.grpc.check_timeout_secs);
        fill_u64(&mut self.grpc.check_interval_secs, defaults.grpc.check_interval_secs);

        fill_str(&mut self.http.host, &defaults.http.host);
        fill_u64(&mut self.http.check_timeout_secs, defaults.http.check_timeout_secs);
        fill_u64(&mut self.http.check_interval_secs, defaults.http.check_interval_secs);
        if self.http.cache.max_entries == 0 {
            self.http.cache.max_entries = defaults.http.cache.max_entries;
        }
        if self.http.socket.max_message_size == 0 {
            self.http.socket.max_message_size = defaults.http.socket.max_message_size;
        }
        if self.http.socket.max_frame_size == 0 {
            self.http.socket.max_frame_size = defaults.http.socket.max_frame_size;
        }

        fill_str(&mut self.logging.level, &defaults.logging.level);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - Only one of `http.cert_file` / `http.key_file` is set
    /// - `http.entry` is non-empty and does not start with `/`
    /// - A plugin entry has an empty name
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cert = self.http.cert_file.as_deref().unwrap_or_default();
        let key = self.http.key_file.as_deref().unwrap_or_default();
        if cert.is_empty() != key.is_empty() {
            return Err(ConfigError::invalid_value(
                "http.cert_file",
                "cert_file and key_file must be set together",
            ));
        }

        if !self.http.entry.is_empty() && !self.http.entry.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "http.entry",
                format!("entry must start with '/': {}", self.http.entry),
            ));
        }

        if self.http.plugins.iter().any(|p| p.name.is_empty()) {
            return Err(ConfigError::invalid_value("http.plugins", "plugin name is empty"));
        }

        Ok(())
    }
}

fn fill_str(value: &mut String, default: &str) {
    if value.is_empty() {
        *value = default.to_string();
    }
}

fn fill_u64(value: &mut u64, default: u64) {
    if *value == 0 {
        *value = default;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PluginConfig;

    #[test]
    fn test_merged_fills_unset_values() {
        let mut config = JanusConfig::default();
        config.grpc.host = String::new();
        config.grpc.check_timeout_secs = 0;
        config.http.check_interval_secs = 0;
        config.service.registry_address = String::new();

        let merged = config.merged();
        assert_eq!(merged.grpc.host, "0.0.0.0");
        assert_eq!(merged.grpc.check_timeout_secs, 5);
        assert_eq!(merged.http.check_interval_secs, 10);
        assert_eq!(merged.service.registry_address, "http://127.0.0.1:8500");
    }

    #[test]
    fn test_merged_keeps_caller_values_and_zero_ports() {
        let mut config = JanusConfig::default();
        config.http.host = "127.0.0.1".to_string();
        config.http.check_timeout_secs = 2;

        let merged = config.merged();
        assert_eq!(merged.http.host, "127.0.0.1");
        assert_eq!(merged.http.check_timeout_secs, 2);
        assert_eq!(merged.http.port, 0);
        assert_eq!(merged.grpc.port, 0);
    }

    #[test]
    fn test_validate_cert_without_key() {
        let mut config = JanusConfig::default();
        config.http.cert_file = Some("cert.pem".to_string());
        assert!(config.validate().is_err());

        config.http.key_file = Some("key.pem".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_entry_prefix() {
        let mut config = JanusConfig::default();
        config.http.entry = "api".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http.entry"));

        config.http.entry = "/api".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_plugin_name() {
        let mut config = JanusConfig::default();
        config.http.plugins.push(PluginConfig::new("", Vec::new()));
        assert!(config.validate().is_err());
    }
}

//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bind host for both listeners.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default registry (Consul agent) address.
pub const DEFAULT_REGISTRY_ADDRESS: &str = "http://127.0.0.1:8500";

/// Default registry health-check timeout in seconds.
pub const DEFAULT_CHECK_TIMEOUT_SECS: u64 = 5;

/// Default registry health-check interval in seconds.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 10;

/// Default bound on draining HTTP connections at shutdown, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default registry-side expiry for instances whose checks stay critical.
pub const DEFAULT_DEREGISTER_AFTER_SECS: u64 = 60;

/// Logical service section.
///
/// The service name drives registry registration: when it is empty, neither
/// listener is registered and no health endpoints are installed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    /// Logical service name used for registry records.
    pub name: String,

    /// Registry (Consul agent) base URL.
    pub registry_address: String,

    /// Address advertised to the registry when the bind host is a wildcard.
    pub advertise_host: Option<String>,

    /// Upper bound for draining HTTP connections at shutdown.
    pub shutdown_timeout_secs: u64,

    /// Registry-side expiry for instances whose health check stays critical.
    pub deregister_after_secs: u64,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: String::new(),
            registry_address: DEFAULT_REGISTRY_ADDRESS.to_string(),
            advertise_host: None,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            deregister_after_secs: DEFAULT_DEREGISTER_AFTER_SECS,
        }
    }
}

impl ServiceSection {
    /// Returns `true` when a service name is configured.
    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    /// Returns the shutdown drain bound.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Returns the host to advertise for a listener bound on `bind_host`.
    ///
    /// Wildcard and empty bind hosts fall back to `advertise_host`, then to
    /// the loopback address.
    pub fn advertised_host(&self, bind_host: &str) -> String {
        let wildcard = bind_host.is_empty() || bind_host == "0.0.0.0" || bind_host == "::";
        if !wildcard {
            return bind_host.to_string();
        }
        self.advertise_host
            .clone()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }
}

/// RPC listener section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GrpcSection {
    /// Bind host.
    pub host: String,

    /// Bind port. `0` disables the RPC listener.
    pub port: u16,

    /// HTTP/2 keep-alive ping interval in seconds. `0` leaves the transport default.
    pub keep_alive_secs: u64,

    /// Registry health-check timeout in seconds.
    pub check_timeout_secs: u64,

    /// Registry health-check interval in seconds.
    pub check_interval_secs: u64,
}

impl Default for GrpcSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            keep_alive_secs: 0,
            check_timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
        }
    }
}

impl GrpcSection {
    /// Returns `true` when the RPC listener is enabled.
    pub fn is_enabled(&self) -> bool {
        self.port > 0
    }

    /// Returns the `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        host_port(&self.host, self.port)
    }

    /// Returns the keep-alive interval, if configured.
    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }
}

/// HTTP listener section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSection {
    /// Bind host.
    pub host: String,

    /// Bind port. `0` disables the HTTP listener.
    pub port: u16,

    /// TCP keep-alive idle time for accepted connections. `0` disables it.
    pub keep_alive_secs: u64,

    /// PEM certificate chain. Enables TLS when set.
    pub cert_file: Option<String>,

    /// PEM private key matching `cert_file`.
    pub key_file: Option<String>,

    /// Registry health-check timeout in seconds.
    pub check_timeout_secs: u64,

    /// Registry health-check interval in seconds.
    pub check_interval_secs: u64,

    /// Path prefix under which every declared route is mounted.
    pub entry: String,

    /// Plugins applied at route compilation.
    pub plugins: Vec<PluginConfig>,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Persistent-connection (WebSocket) limits.
    pub socket: SocketConfig,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: 0,
            keep_alive_secs: 0,
            cert_file: None,
            key_file: None,
            check_timeout_secs: DEFAULT_CHECK_TIMEOUT_SECS,
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            entry: String::new(),
            plugins: Vec::new(),
            cache: CacheConfig::default(),
            socket: SocketConfig::default(),
        }
    }
}

impl HttpSection {
    /// Returns `true` when the HTTP listener is enabled.
    pub fn is_enabled(&self) -> bool {
        self.port > 0
    }

    /// Returns `true` when TLS is configured.
    pub fn tls_enabled(&self) -> bool {
        self.cert_file.as_deref().is_some_and(|f| !f.is_empty())
    }

    /// Returns the `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        host_port(&self.host, self.port)
    }

    /// Returns the TCP keep-alive idle time, if configured.
    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }
}

/// A plugin entry in `[[http.plugins]]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PluginConfig {
    /// Plugin name (`"cache"` or `"access-log"`).
    pub name: String,

    /// Route paths the plugin applies to. Empty means every route.
    pub paths: Vec<String>,
}

impl PluginConfig {
    /// Creates a plugin entry.
    pub fn new(name: impl Into<String>, paths: Vec<String>) -> Self {
        Self {
            name: name.into(),
            paths,
        }
    }
}

/// Response cache backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// No response cache.
    #[default]
    None,
    /// In-process memory cache.
    Memory,
}

/// Response cache configuration (`[http.cache]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Backend kind.
    pub kind: CacheKind,

    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,

    /// Maximum number of cached responses.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::None,
            ttl_secs: 60,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    /// An in-memory cache with the given TTL.
    pub fn memory(ttl: Duration) -> Self {
        Self {
            kind: CacheKind::Memory,
            ttl_secs: ttl.as_secs(),
            ..Self::default()
        }
    }

    /// Returns the entry time-to-live.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Persistent-connection limits (`[http.socket]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SocketConfig {
    /// Maximum message size in bytes.
    pub max_message_size: usize,

    /// Maximum frame size in bytes.
    pub max_frame_size: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024, // 16 MB
            max_frame_size: 4 * 1024 * 1024,    // 4 MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines, for production.
    #[default]
    Json,
    /// Human-readable output.
    Pretty,
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Whether the process entry point installs a subscriber.
    pub enabled: bool,

    /// Filter directive (e.g. `"info"` or `"janus=debug,hyper=warn"`).
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Joins a host and port, bracketing IPv6 literals.
fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertised_host_wildcard_falls_back_to_loopback() {
        let section = ServiceSection::default();
        assert_eq!(section.advertised_host("0.0.0.0"), "127.0.0.1");
        assert_eq!(section.advertised_host(""), "127.0.0.1");
    }

    #[test]
    fn test_advertised_host_prefers_configured_address() {
        let section = ServiceSection {
            advertise_host: Some("10.0.0.7".to_string()),
            ..Default::default()
        };
        assert_eq!(section.advertised_host("0.0.0.0"), "10.0.0.7");
        assert_eq!(section.advertised_host("192.168.1.2"), "192.168.1.2");
    }

    #[test]
    fn test_keep_alive_zero_is_unset() {
        let grpc = GrpcSection::default();
        assert_eq!(grpc.keep_alive(), None);

        let grpc = GrpcSection {
            keep_alive_secs: 30,
            ..Default::default()
        };
        assert_eq!(grpc.keep_alive(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_tls_enabled_requires_non_empty_cert() {
        let mut http = HttpSection::default();
        assert!(!http.tls_enabled());

        http.cert_file = Some(String::new());
        assert!(!http.tls_enabled());

        http.cert_file = Some("/etc/tls/cert.pem".to_string());
        assert!(http.tls_enabled());
    }

    #[test]
    fn test_cache_kind_deserializes_snake_case() {
        let cache: CacheConfig = toml::from_str("kind = \"memory\"\nttl_secs = 5").unwrap();
        assert_eq!(cache.kind, CacheKind::Memory);
        assert_eq!(cache.ttl(), Duration::from_secs(5));
        assert_eq!(cache.max_entries, 10_000);
    }

    #[test]
    fn test_bind_addr_brackets_ipv6() {
        let mut http = HttpSection::default();
        http.host = "::".to_string();
        http.port = 8080;
        assert_eq!(http.bind_addr(), "[::]:8080");

        let mut grpc = GrpcSection::default();
        grpc.host = "127.0.0.1".to_string();
        grpc.port = 9090;
        assert_eq!(grpc.bind_addr(), "127.0.0.1:9090");
    }
}

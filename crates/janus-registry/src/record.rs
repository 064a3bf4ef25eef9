//! Registration records and the per-protocol record templates.
//!
//! An HTTP endpoint is written to the registry twice under the same address:
//! once under the protocol-scoped name (`orders.http`) and once under the
//! bare service name (`orders`). Consumers resolving by either name find it.
//! An RPC endpoint is written once under `orders.grpc`.
//!
//! The shapes are fixed by [`RecordTemplate::HTTP`] and
//! [`RecordTemplate::GRPC`]; [`records_for`] renders them uniformly.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Protocol of a registered endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Plain HTTP or HTTPS listener.
    Http,
    /// gRPC listener.
    Grpc,
}

impl ServiceKind {
    /// Returns the kind tag written into records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the registry polls to decide whether an instance is healthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthProbe {
    /// HTTP GET against a full URL.
    Http(String),
    /// gRPC health protocol against `host:port`.
    Grpc(String),
}

/// Health-check metadata attached to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Probe target.
    pub probe: HealthProbe,
    /// Per-probe timeout.
    pub timeout: Duration,
    /// Probe interval.
    pub interval: Duration,
    /// Registry-side expiry for instances whose check stays critical.
    pub deregister_after: Option<Duration>,
}

impl HealthCheck {
    /// HTTP check probing `GET http(s)://{addr}/health`.
    pub fn http(addr: &str, tls: bool, timeout: Duration, interval: Duration) -> Self {
        let scheme = if tls { "https" } else { "http" };
        Self {
            probe: HealthProbe::Http(format!("{scheme}://{addr}/health")),
            timeout,
            interval,
            deregister_after: None,
        }
    }

    /// gRPC check probing the standard health service at `addr`.
    pub fn grpc(addr: &str, timeout: Duration, interval: Duration) -> Self {
        Self {
            probe: HealthProbe::Grpc(addr.to_string()),
            timeout,
            interval,
            deregister_after: None,
        }
    }

    /// Sets the registry-side expiry backstop.
    #[must_use]
    pub fn with_deregister_after(mut self, after: Duration) -> Self {
        self.deregister_after = (!after.is_zero()).then_some(after);
        self
    }
}

/// The advertised location of one listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Logical service name.
    pub service: String,
    /// Advertised host.
    pub host: String,
    /// Bound port.
    pub port: u16,
}

impl Endpoint {
    /// Creates an endpoint.
    pub fn new(service: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            service: service.into(),
            host: host.into(),
            port,
        }
    }

    /// Returns `host:port`, with IPv6 hosts in brackets.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// One registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    /// Endpoint protocol.
    pub kind: ServiceKind,
    /// Unique instance id (`{name}@{host}:{port}`).
    pub id: String,
    /// Registered name.
    pub name: String,
    /// Advertised host.
    pub address: String,
    /// Advertised port.
    pub port: u16,
    /// Tags.
    pub tags: Vec<String>,
    /// Health check.
    pub check: HealthCheck,
}

/// Shape of one record written for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTemplate {
    /// Endpoint protocol.
    pub kind: ServiceKind,
    /// Register under `{service}.{kind}` rather than the bare service name.
    pub scoped: bool,
}

impl RecordTemplate {
    /// HTTP endpoints: scoped name plus the bare legacy name.
    pub const HTTP: &'static [Self] = &[
        Self {
            kind: ServiceKind::Http,
            scoped: true,
        },
        Self {
            kind: ServiceKind::Http,
            scoped: false,
        },
    ];

    /// RPC endpoints: scoped name only.
    pub const GRPC: &'static [Self] = &[Self {
        kind: ServiceKind::Grpc,
        scoped: true,
    }];

    /// Returns the templates for a protocol.
    pub const fn for_kind(kind: ServiceKind) -> &'static [Self] {
        match kind {
            ServiceKind::Http => Self::HTTP,
            ServiceKind::Grpc => Self::GRPC,
        }
    }

    /// Returns the registered name for `service`.
    pub fn name(&self, service: &str) -> String {
        if self.scoped {
            format!("{service}.{}", self.kind)
        } else {
            service.to_string()
        }
    }

    /// Returns the tag set for `service`.
    pub fn tags(&self, service: &str) -> Vec<String> {
        let mut tags = vec![self.kind.to_string(), service.to_string()];
        if self.scoped {
            tags.push(self.name(service));
        }
        tags
    }

    /// Renders this template for an endpoint.
    pub fn render(&self, endpoint: &Endpoint, check: &HealthCheck) -> RegistrationRecord {
        let name = self.name(&endpoint.service);
        RegistrationRecord {
            kind: self.kind,
            id: format!("{name}@{}", endpoint.addr()),
            tags: self.tags(&endpoint.service),
            name,
            address: endpoint.host.clone(),
            port: endpoint.port,
            check: check.clone(),
        }
    }
}

/// Renders every record template of `kind` for an endpoint.
pub fn records_for(
    kind: ServiceKind,
    endpoint: &Endpoint,
    check: &HealthCheck,
) -> Vec<RegistrationRecord> {
    RecordTemplate::for_kind(kind)
        .iter()
        .map(|t| t.render(endpoint, check))
        .collect()
}

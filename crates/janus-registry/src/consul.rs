//! Consul agent client.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::{BoxFuture, HealthProbe, Registry, RegistrationRecord, RegistryError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Registers services with a local Consul agent over its HTTP API.
#[derive(Debug, Clone)]
pub struct ConsulRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl ConsulRegistry {
    /// Creates a client for the agent at `address` (e.g. `http://127.0.0.1:8500`).
    ///
    /// A bare `host:port` is treated as `http://host:port`.
    pub fn new(address: &str) -> Result<Self, RegistryError> {
        let address = address.trim().trim_end_matches('/');
        if address.is_empty() {
            return Err(RegistryError::InvalidAddress("empty address".to_string()));
        }

        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Returns the agent base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn put(&self, url: String, body: Option<AgentServiceRegistration<'_>>) -> Result<(), RegistryError> {
        let request = self.client.put(&url);
        let request = match body {
            Some(body) => request.json(&body),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Consul agent request succeeded");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(RegistryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl Registry for ConsulRegistry {
    fn register<'a>(
        &'a self,
        record: &'a RegistrationRecord,
    ) -> BoxFuture<'a, Result<(), RegistryError>> {
        Box::pin(async move {
            let url = format!("{}/v1/agent/service/register", self.base_url);
            self.put(url, Some(AgentServiceRegistration::from(record))).await
        })
    }

    fn deregister<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), RegistryError>> {
        Box::pin(async move {
            let url = format!("{}/v1/agent/service/deregister/{id}", self.base_url);
            self.put(url, None).await
        })
    }
}

/// Body of `PUT /v1/agent/service/register`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    tags: &'a [String],
    address: &'a str,
    port: u16,
    meta: HashMap<&'static str, &'static str>,
    check: AgentServiceCheck,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceCheck {
    #[serde(rename = "HTTP", skip_serializing_if = "Option::is_none")]
    http: Option<String>,
    #[serde(rename = "GRPC", skip_serializing_if = "Option::is_none")]
    grpc: Option<String>,
    timeout: String,
    interval: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    deregister_critical_service_after: Option<String>,
}

impl<'a> From<&'a RegistrationRecord> for AgentServiceRegistration<'a> {
    fn from(record: &'a RegistrationRecord) -> Self {
        let (http, grpc) = match &record.check.probe {
            HealthProbe::Http(url) => (Some(url.clone()), None),
            HealthProbe::Grpc(target) => (None, Some(target.clone())),
        };

        Self {
            id: &record.id,
            name: &record.name,
            tags: &record.tags,
            address: &record.address,
            port: record.port,
            meta: HashMap::from([("kind", record.kind.as_str())]),
            check: AgentServiceCheck {
                http,
                grpc,
                timeout: consul_duration(record.check.timeout),
                interval: consul_duration(record.check.interval),
                deregister_critical_service_after: record.check.deregister_after.map(consul_duration),
            },
        }
    }
}

/// Formats a duration the way the Consul agent parses it (`"5s"`, `"250ms"`).
fn consul_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

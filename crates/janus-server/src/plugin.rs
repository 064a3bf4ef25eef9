//! Configured plugins resolved at compile time.
//!
//! A plugin is middleware selected by name from configuration and applied
//! to every route, or only to the routes listed in its `paths`. Plugin
//! middleware runs after global middleware and before group middleware.
//!
//! | name | effect |
//! |---|---|
//! | `cache` | serves repeated unary calls from the response cache |
//! | `access-log` | logs method, path, status and latency of each request |

use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use bytes::Bytes;
use http::header;
use http_body_util::{BodyExt, Full};
use janus_config::PluginConfig;
use sha1::{Digest, Sha1};
use tracing::info;

use crate::cache::{CachedResponse, ResponseCache};
use crate::compile::CompileError;
use crate::middleware::{EndpointKind, Middleware, Next};
use crate::types::{response, BoxFuture, HttpRequest, HttpResponse};

/// Name of the response cache plugin.
pub const CACHE_PLUGIN: &str = "cache";

/// Name of the access log plugin.
pub const ACCESS_LOG_PLUGIN: &str = "access-log";

/// Header set on responses served from the cache.
pub const CACHE_HIT_HEADER: &str = "x-cache";

/// A plugin with its middleware built.
pub(crate) struct ResolvedPlugin {
    name: &'static str,
    paths: Vec<String>,
    middleware: Arc<dyn Middleware>,
}

impl ResolvedPlugin {
    pub(crate) fn resolve(
        config: &PluginConfig,
        cache: Option<&Arc<dyn ResponseCache>>,
    ) -> Result<Self, CompileError> {
        let (name, middleware): (&'static str, Arc<dyn Middleware>) = match config.name.as_str() {
            CACHE_PLUGIN => {
                let cache = cache.ok_or_else(|| CompileError::CacheRequired(config.name.clone()))?;
                (CACHE_PLUGIN, Arc::new(CacheLayer::new(Arc::clone(cache))))
            }
            ACCESS_LOG_PLUGIN => (ACCESS_LOG_PLUGIN, Arc::new(AccessLog)),
            other => return Err(CompileError::UnknownPlugin(other.to_string())),
        };

        Ok(Self {
            name,
            paths: config.paths.clone(),
            middleware,
        })
    }

    /// Whether the plugin wraps a route declared at `declared` and mounted
    /// at `mounted`.
    pub(crate) fn applies_to(&self, declared: &str, mounted: &str, kind: EndpointKind) -> bool {
        if self.name == CACHE_PLUGIN && matches!(kind, EndpointKind::Socket | EndpointKind::Health) {
            return false;
        }
        self.paths.is_empty() || self.paths.iter().any(|p| p == declared || p == mounted)
    }

    pub(crate) fn middleware(&self) -> Arc<dyn Middleware> {
        Arc::clone(&self.middleware)
    }
}

/// Logs each request once its response is ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLog;

impl Middleware for AccessLog {
    fn name(&self) -> &'static str {
        ACCESS_LOG_PLUGIN
    }

    fn process<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> BoxFuture<'a, HttpResponse> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_string();
            let start = Instant::now();

            let response = next.run(request).await;

            info!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "HTTP request"
            );
            response
        })
    }
}

/// Serves identical requests from a [`ResponseCache`].
///
/// The key covers method, URI and a digest of the body. Only `200`
/// responses are stored.
#[derive(Debug)]
pub struct CacheLayer {
    cache: Arc<dyn ResponseCache>,
}

impl CacheLayer {
    /// Creates a layer over `cache`.
    pub fn new(cache: Arc<dyn ResponseCache>) -> Self {
        Self { cache }
    }

    fn key(request: &HttpRequest) -> String {
        let digest = Sha1::digest(request.body());
        format!(
            "{} {} {}",
            request.method(),
            request.uri(),
            base64::engine::general_purpose::STANDARD.encode(digest)
        )
    }
}

impl Middleware for CacheLayer {
    fn name(&self) -> &'static str {
        CACHE_PLUGIN
    }

    fn process<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> BoxFuture<'a, HttpResponse> {
        Box::pin(async move {
            let key = Self::key(&request);

            if let Some(hit) = self.cache.get(&key) {
                let mut cached = response(hit.status, "application/octet-stream", hit.body);
                if let Ok(value) = header::HeaderValue::from_str(&hit.content_type) {
                    cached.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                cached
                    .headers_mut()
                    .insert(CACHE_HIT_HEADER, header::HeaderValue::from_static("HIT"));
                return cached;
            }

            let fresh = next.run(request).await;
            if fresh.status() != http::StatusCode::OK {
                return fresh;
            }

            let (parts, body) = fresh.into_parts();
            let body: Bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };
            let content_type = parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream")
                .to_string();

            self.cache.put(
                key,
                CachedResponse {
                    status: parts.status,
                    content_type,
                    body: body.clone(),
                },
            );
            http::Response::from_parts(parts, Full::new(body))
        })
    }
}

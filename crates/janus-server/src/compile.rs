//! Compilation of a [`RouteTable`] into an immutable [`HttpApp`].
//!
//! Compilation mounts every route under the entry path, resolves the
//! configured plugins and flattens each route's middleware into one chain:
//!
//! ```text
//! global → plugins → group → method → endpoint
//! ```
//!
//! The liveness route keeps its own path regardless of the entry path.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use http::{Method, StatusCode};
use janus_config::{HttpSection, PluginConfig};
use thiserror::Error;

use crate::cache::ResponseCache;
use crate::middleware::{Endpoint, EndpointKind, Middleware, Next};
use crate::plugin::ResolvedPlugin;
use crate::router::{join_path, match_path, parse_segments, shape_key, PathSegment, RouteInfo, RouteTable};
use crate::types::{error_response, not_found, HttpRequest, HttpResponse, PathParams};

/// Errors that abort compilation.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The entry path does not start with `/`.
    #[error("invalid entry path '{0}': must start with '/'")]
    InvalidEntry(String),

    /// A route path is malformed.
    #[error("invalid route path '{path}': {reason}")]
    InvalidPath {
        /// The declared path.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two routes share a method and a path shape.
    #[error("duplicate route {method} {path}")]
    DuplicateRoute {
        /// HTTP method.
        method: Method,
        /// Mounted path of the second declaration.
        path: String,
    },

    /// A configured plugin name is not known.
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    /// A plugin needs a response cache but none is configured.
    #[error("plugin '{0}' requires a response cache")]
    CacheRequired(String),
}

/// Entry path and plugins used at compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Prefix under which every route except `/health` is mounted.
    pub entry: String,
    /// Plugins to apply.
    pub plugins: Vec<PluginConfig>,
}

impl From<&HttpSection> for CompileOptions {
    fn from(section: &HttpSection) -> Self {
        Self {
            entry: section.entry.clone(),
            plugins: section.plugins.clone(),
        }
    }
}

struct CompiledRoute {
    method: Method,
    path: String,
    segments: Vec<PathSegment>,
    literals: usize,
    chain: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Endpoint>,
}

/// The compiled, immutable HTTP handler graph.
pub struct HttpApp {
    routes: Vec<CompiledRoute>,
}

impl fmt::Debug for HttpApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApp")
            .field("routes", &self.routes().collect::<Vec<_>>())
            .finish()
    }
}

/// Compiles `table` into an [`HttpApp`].
///
/// `cache` is shared by every route the `cache` plugin applies to.
pub fn compile(
    table: RouteTable,
    options: &CompileOptions,
    cache: Option<Arc<dyn ResponseCache>>,
) -> Result<HttpApp, CompileError> {
    if !options.entry.is_empty() && !options.entry.starts_with('/') {
        return Err(CompileError::InvalidEntry(options.entry.clone()));
    }

    let plugins = options
        .plugins
        .iter()
        .map(|p| ResolvedPlugin::resolve(p, cache.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let RouteTable { middleware, routes } = table;
    let mut seen = HashSet::new();
    let mut compiled = Vec::with_capacity(routes.len());

    for def in routes {
        let kind = def.endpoint.kind();
        let path = if kind == EndpointKind::Health {
            def.path.clone()
        } else {
            join_path(&options.entry, &def.path)
        };

        let segments = parse_segments(&path).map_err(|reason| CompileError::InvalidPath {
            path: def.path.clone(),
            reason,
        })?;

        if !seen.insert((def.method.clone(), shape_key(&segments))) {
            return Err(CompileError::DuplicateRoute {
                method: def.method,
                path,
            });
        }

        let mut chain = middleware.clone();
        chain.extend(
            plugins
                .iter()
                .filter(|p| p.applies_to(&def.path, &path, kind))
                .map(ResolvedPlugin::middleware),
        );
        chain.extend(def.group_middleware);
        chain.extend(def.middleware);

        let literals = segments
            .iter()
            .filter(|s| matches!(s, PathSegment::Literal(_)))
            .count();

        compiled.push(CompiledRoute {
            method: def.method,
            path,
            segments,
            literals,
            chain,
            endpoint: def.endpoint,
        });
    }

    // Literal segments win over parameters when both match.
    compiled.sort_by(|a, b| b.literals.cmp(&a.literals));

    tracing::debug!(routes = compiled.len(), entry = %options.entry, "Compiled HTTP routes");
    Ok(HttpApp { routes: compiled })
}

impl HttpApp {
    /// Dispatches a request through its route's chain.
    ///
    /// An unmatched path yields `404`; a path matched only under another
    /// method yields `405`.
    pub async fn handle(&self, mut request: HttpRequest) -> HttpResponse {
        let path = request.uri().path().to_string();
        let mut wrong_method = false;

        for route in &self.routes {
            let Some(params) = match_path(&route.segments, &path) else {
                continue;
            };
            if route.method != *request.method() {
                wrong_method = true;
                continue;
            }

            request.extensions_mut().insert(PathParams(params));
            return Next::new(&route.chain, route.endpoint.as_ref())
                .run(request)
                .await;
        }

        if wrong_method {
            error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_NOT_ALLOWED",
                &format!("{} is not allowed on {}", request.method(), path),
            )
        } else {
            not_found(&path)
        }
    }

    /// Iterates over the compiled routes, most specific first.
    pub fn routes(&self) -> impl Iterator<Item = RouteInfo> + '_ {
        self.routes.iter().map(|r| RouteInfo {
            method: r.method.clone(),
            path: r.path.clone(),
            kind: r.endpoint.kind(),
        })
    }

    /// Returns the number of compiled routes.
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::health::add_health_route;
    use crate::middleware::endpoint_fn;
    use crate::middleware::tests::Trace;
    use crate::types::response;
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;

    fn echo_param(name: &'static str) -> Arc<dyn Endpoint> {
        endpoint_fn(move |req| {
            Box::pin(async move {
                let value = req
                    .extensions()
                    .get::<PathParams>()
                    .and_then(|p| p.get(name))
                    .unwrap_or("-")
                    .to_string();
                response(StatusCode::OK, "text/plain", value)
            })
        })
    }

    fn fixed(body: &'static str) -> Arc<dyn Endpoint> {
        endpoint_fn(move |_req| Box::pin(async move { response(StatusCode::OK, "text/plain", body) }))
    }

    fn request(method: Method, path: &str) -> HttpRequest {
        http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap()
    }

    async fn body_of(response: HttpResponse) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_entry_prefix_and_health_path() {
        let mut table = RouteTable::new();
        table.post("/echo", Vec::new(), fixed("echo"));
        add_health_route(&mut table);

        let options = CompileOptions {
            entry: "/api".to_string(),
            plugins: Vec::new(),
        };
        let app = compile(table, &options, None).unwrap();

        let paths: Vec<_> = app.routes().map(|r| r.path).collect();
        assert!(paths.contains(&"/api/echo".to_string()));
        assert!(paths.contains(&"/health".to_string()));

        let response = app.handle(request(Method::POST, "/api/echo")).await;
        assert_eq!(body_of(response).await, "echo");

        let response = app.handle(request(Method::POST, "/echo")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.handle(request(Method::GET, "/health")).await;
        assert_eq!(body_of(response).await, "OK");
    }

    #[tokio::test]
    async fn test_literal_wins_over_param() {
        let mut table = RouteTable::new();
        table.get("/users/{id}", Vec::new(), echo_param("id"));
        table.get("/users/me", Vec::new(), fixed("me"));

        let app = compile(table, &CompileOptions::default(), None).unwrap();

        assert_eq!(body_of(app.handle(request(Method::GET, "/users/me")).await).await, "me");
        assert_eq!(body_of(app.handle(request(Method::GET, "/users/7")).await).await, "7");
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let mut table = RouteTable::new();
        table.post("/echo", Vec::new(), fixed("echo"));
        let app = compile(table, &CompileOptions::default(), None).unwrap();

        let response = app.handle(request(Method::GET, "/echo")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_chain_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let trace = |name| -> Arc<dyn Middleware> { Arc::new(Trace { name, log: log.clone() }) };

        let mut table = RouteTable::new();
        table.use_middleware(trace("global"));
        table
            .group("/g", vec![trace("group")])
            .post("/m", vec![trace("method")], fixed("ok"));

        let app = compile(table, &CompileOptions::default(), None).unwrap();
        let response = app.handle(request(Method::POST, "/g/m")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*log.lock(), vec!["global", "group", "method"]);
    }

    #[test]
    fn test_duplicate_routes_rejected() {
        let mut table = RouteTable::new();
        table.get("/users/{id}", Vec::new(), fixed("a"));
        table.get("/users/{userId}", Vec::new(), fixed("b"));

        let err = compile(table, &CompileOptions::default(), None).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateRoute { .. }));
    }

    #[test]
    fn test_same_path_different_methods_allowed() {
        let mut table = RouteTable::new();
        table.get("/items", Vec::new(), fixed("a"));
        table.post("/items", Vec::new(), fixed("b"));

        let app = compile(table, &CompileOptions::default(), None).unwrap();
        assert_eq!(app.route_count(), 2);
    }

    #[test]
    fn test_invalid_entry_and_path() {
        let options = CompileOptions {
            entry: "api".to_string(),
            plugins: Vec::new(),
        };
        let err = compile(RouteTable::new(), &options, None).unwrap_err();
        assert!(matches!(err, CompileError::InvalidEntry(_)));

        let mut table = RouteTable::new();
        table.get("/users/{", Vec::new(), fixed("a"));
        let err = compile(table, &CompileOptions::default(), None).unwrap_err();
        assert!(matches!(err, CompileError::InvalidPath { .. }));
    }

    #[test]
    fn test_cache_plugin_requires_cache() {
        let options = CompileOptions {
            entry: String::new(),
            plugins: vec![PluginConfig::new("cache", Vec::new())],
        };
        let err = compile(RouteTable::new(), &options, None).unwrap_err();
        assert!(matches!(err, CompileError::CacheRequired(_)));

        let cache: Arc<dyn ResponseCache> = Arc::new(MemoryCache::new(Duration::from_secs(1), 10));
        assert!(compile(RouteTable::new(), &options, Some(cache)).is_ok());
    }

    #[test]
    fn test_options_from_section() {
        let section = HttpSection {
            entry: "/v1".to_string(),
            plugins: vec![PluginConfig::new("access-log", Vec::new())],
            ..Default::default()
        };
        let options = CompileOptions::from(&section);
        assert_eq!(options.entry, "/v1");
        assert_eq!(options.plugins.len(), 1);
    }
}

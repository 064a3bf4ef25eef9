//! Route table and path matching.
//!
//! A [`RouteTable`] is the mutable, declaration-time view of the HTTP
//! surface: global middleware, groups with their own prefix and middleware,
//! and POST/GET routes bound to endpoints. [`compile`](crate::compile)
//! turns it into an immutable [`HttpApp`](crate::HttpApp).
//!
//! Paths are `/`-separated; a segment written `{name}` captures a parameter.
//!
//! # Example
//!
//! ```rust
//! use janus_server::{endpoint_fn, response, RouteTable};
//! use http::StatusCode;
//!
//! let mut table = RouteTable::new();
//! let hello = endpoint_fn(|_req| Box::pin(async { response(StatusCode::OK, "text/plain", "hi") }));
//!
//! table.group("/users", Vec::new()).get("/{id}", Vec::new(), hello);
//! assert_eq!(table.routes().next().unwrap().path, "/users/{id}");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::Method;

use crate::middleware::{Endpoint, EndpointKind, Middleware};

/// Describes a declared or compiled route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// HTTP method.
    pub method: Method,
    /// Path pattern.
    pub path: String,
    /// Endpoint kind.
    pub kind: EndpointKind,
}

pub(crate) struct RouteDef {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) group_middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) endpoint: Arc<dyn Endpoint>,
}

/// Declaration-time HTTP routes.
#[derive(Default)]
pub struct RouteTable {
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
    pub(crate) routes: Vec<RouteDef>,
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("middleware", &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("routes", &self.routes().collect::<Vec<_>>())
            .finish()
    }
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends middleware applied to every route.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Opens a group: routes added through it are mounted under `prefix`
    /// and run `middleware` before their own.
    pub fn group(&mut self, prefix: &str, middleware: Vec<Arc<dyn Middleware>>) -> Group<'_> {
        Group {
            table: self,
            prefix: prefix.to_string(),
            middleware,
        }
    }

    /// Adds a POST route.
    pub fn post(
        &mut self,
        path: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        endpoint: Arc<dyn Endpoint>,
    ) -> &mut Self {
        self.route(Method::POST, path, Vec::new(), middleware, endpoint)
    }

    /// Adds a GET route.
    pub fn get(
        &mut self,
        path: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        endpoint: Arc<dyn Endpoint>,
    ) -> &mut Self {
        self.route(Method::GET, path, Vec::new(), middleware, endpoint)
    }

    fn route(
        &mut self,
        method: Method,
        path: &str,
        group_middleware: Vec<Arc<dyn Middleware>>,
        middleware: Vec<Arc<dyn Middleware>>,
        endpoint: Arc<dyn Endpoint>,
    ) -> &mut Self {
        self.routes.push(RouteDef {
            method,
            path: path.to_string(),
            group_middleware,
            middleware,
            endpoint,
        });
        self
    }

    /// Iterates over the declared routes.
    pub fn routes(&self) -> impl Iterator<Item = RouteInfo> + '_ {
        self.routes.iter().map(|r| RouteInfo {
            method: r.method.clone(),
            path: r.path.clone(),
            kind: r.endpoint.kind(),
        })
    }

    /// Returns the number of declared routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns `true` if no route is declared.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A route group borrowed from a [`RouteTable`].
pub struct Group<'t> {
    table: &'t mut RouteTable,
    prefix: String,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Group<'_> {
    /// Adds a POST route under the group prefix.
    pub fn post(
        &mut self,
        path: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        endpoint: Arc<dyn Endpoint>,
    ) -> &mut Self {
        self.add(Method::POST, path, middleware, endpoint)
    }

    /// Adds a GET route under the group prefix.
    pub fn get(
        &mut self,
        path: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        endpoint: Arc<dyn Endpoint>,
    ) -> &mut Self {
        self.add(Method::GET, path, middleware, endpoint)
    }

    fn add(
        &mut self,
        method: Method,
        path: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        endpoint: Arc<dyn Endpoint>,
    ) -> &mut Self {
        let full = join_path(&self.prefix, path);
        let group_middleware = self.middleware.clone();
        self.table
            .route(method, &full, group_middleware, middleware, endpoint);
        self
    }
}

/// Joins two path fragments with exactly one `/` between them.
///
/// The result always starts with `/` and never ends with one, except for
/// the root path itself.
pub fn join_path(prefix: &str, path: &str) -> String {
    let joined = format!(
        "/{}/{}",
        prefix.trim_matches('/'),
        path.trim_start_matches('/')
    );
    let mut normalized = String::with_capacity(joined.len());
    for segment in joined.split('/').filter(|s| !s.is_empty()) {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// One segment of a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathSegment {
    Literal(String),
    Param(String),
}

/// Parses a path pattern, rejecting malformed parameter segments.
pub(crate) fn parse_segments(pattern: &str) -> Result<Vec<PathSegment>, String> {
    if !pattern.starts_with('/') {
        return Err("path must start with '/'".to_string());
    }

    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(format!("invalid parameter segment '{s}'"));
                }
                Ok(PathSegment::Param(name.to_string()))
            } else if s.contains(['{', '}']) {
                Err(format!("unbalanced braces in segment '{s}'"))
            } else {
                Ok(PathSegment::Literal(s.to_string()))
            }
        })
        .collect()
}

/// Matches a concrete path against parsed segments.
pub(crate) fn match_path(segments: &[PathSegment], path: &str) -> Option<HashMap<String, String>> {
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if path_segments.len() != segments.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (pattern, actual) in segments.iter().zip(path_segments.iter()) {
        match pattern {
            PathSegment::Literal(expected) => {
                if expected != actual {
                    return None;
                }
            }
            PathSegment::Param(name) => {
                params.insert(name.clone(), (*actual).to_string());
            }
        }
    }

    Some(params)
}

/// Returns a key under which two patterns that match the same paths collide.
pub(crate) fn shape_key(segments: &[PathSegment]) -> String {
    let mut key = String::new();
    for segment in segments {
        key.push('/');
        match segment {
            PathSegment::Literal(s) => key.push_str(s),
            PathSegment::Param(_) => key.push_str("{}"),
        }
    }
    key
}

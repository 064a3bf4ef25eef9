//! Service and method declarations.
//!
//! A declared service optionally carries an RPC service and an HTTP route
//! group. Each of its methods maps to at most one unary POST route and at
//! most one upgraded GET route, both backed by the same adapter.

use std::fmt;
use std::sync::Arc;

use janus_server::{MethodAdapter, Middleware};

use crate::error::OrchestratorError;
use crate::rpc::RpcServices;

/// Mounts a declared RPC service when the server is built.
pub(crate) type RpcMount = Box<dyn FnOnce(&mut RpcServices) -> Result<(), OrchestratorError> + Send>;

/// A path and the middleware bound to it.
#[derive(Clone)]
pub(crate) struct RouteSpec {
    pub(crate) path: String,
    pub(crate) middleware: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.middleware.iter().map(|m| m.name()).collect();
        f.debug_struct("RouteSpec")
            .field("path", &self.path)
            .field("middleware", &names)
            .finish()
    }
}

pub(crate) struct MethodDescriptor {
    pub(crate) tag: String,
    pub(crate) adapter: Arc<dyn MethodAdapter>,
    pub(crate) unary: Option<RouteSpec>,
    pub(crate) socket: Option<RouteSpec>,
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("tag", &self.tag)
            .field("unary", &self.unary)
            .field("socket", &self.socket)
            .finish_non_exhaustive()
    }
}

pub(crate) struct ServiceDescriptor {
    pub(crate) name: String,
    pub(crate) rpc: Option<RpcMount>,
    pub(crate) group: Option<RouteSpec>,
    pub(crate) methods: Vec<MethodDescriptor>,
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("rpc", &self.rpc.is_some())
            .field("group", &self.group)
            .field("methods", &self.methods)
            .finish()
    }
}

impl ServiceDescriptor {
    pub(crate) fn new(name: impl Into<String>, rpc: Option<RpcMount>) -> Self {
        Self {
            name: name.into(),
            rpc,
            group: None,
            methods: Vec::new(),
        }
    }
}

/// Attaches HTTP exposure to a declared service.
///
/// Returned by [`Orchestrator::declare_service`](crate::Orchestrator::declare_service).
#[derive(Debug)]
pub struct ServiceHandle<'o> {
    service: &'o mut ServiceDescriptor,
}

impl<'o> ServiceHandle<'o> {
    pub(crate) fn new(service: &'o mut ServiceDescriptor) -> Self {
        Self { service }
    }

    /// Returns the service name.
    pub fn name(&self) -> &str {
        &self.service.name
    }

    /// Mounts the service's HTTP routes under `path` with `middleware`.
    ///
    /// Without a group, routes are mounted at the entry root.
    pub fn group(&mut self, path: impl Into<String>, middleware: Vec<Arc<dyn Middleware>>) -> &mut Self {
        self.service.group = Some(RouteSpec {
            path: path.into(),
            middleware,
        });
        self
    }

    /// Declares a method served by `adapter`.
    pub fn method(&mut self, tag: impl Into<String>, adapter: Arc<dyn MethodAdapter>) -> MethodHandle<'_> {
        self.service.methods.push(MethodDescriptor {
            tag: tag.into(),
            adapter,
            unary: None,
            socket: None,
        });
        let index = self.service.methods.len() - 1;
        MethodHandle {
            method: &mut self.service.methods[index],
        }
    }
}

/// Binds a declared method to HTTP paths.
///
/// Each setter replaces the previous path of the same style.
#[derive(Debug)]
pub struct MethodHandle<'s> {
    method: &'s mut MethodDescriptor,
}

impl MethodHandle<'_> {
    /// Returns the method tag.
    pub fn tag(&self) -> &str {
        &self.method.tag
    }

    /// Exposes the method as a unary `POST path`.
    pub fn handle(&mut self, path: impl Into<String>) -> &mut Self {
        self.handle_with(path, Vec::new())
    }

    /// Exposes the method as a unary `POST path` behind `middleware`.
    pub fn handle_with(&mut self, path: impl Into<String>, middleware: Vec<Arc<dyn Middleware>>) -> &mut Self {
        self.method.unary = Some(RouteSpec {
            path: path.into(),
            middleware,
        });
        self
    }

    /// Exposes the method as an upgraded `GET path`.
    pub fn socket(&mut self, path: impl Into<String>) -> &mut Self {
        self.socket_with(path, Vec::new())
    }

    /// Exposes the method as an upgraded `GET path` behind `middleware`.
    pub fn socket_with(&mut self, path: impl Into<String>, middleware: Vec<Arc<dyn Middleware>>) -> &mut Self {
        self.method.socket = Some(RouteSpec {
            path: path.into(),
            middleware,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_server::FnAdapter;

    #[test]
    fn test_paths_are_replaced_not_appended() {
        let mut service = ServiceDescriptor::new("orders", None);
        let adapter: Arc<dyn MethodAdapter> = Arc::new(FnAdapter::new());

        let mut handle = ServiceHandle::new(&mut service);
        handle.group("/orders", Vec::new());
        handle
            .method("Get", Arc::clone(&adapter))
            .handle("/old")
            .handle("/get")
            .socket("/watch");

        assert_eq!(service.group.as_ref().unwrap().path, "/orders");
        assert_eq!(service.methods.len(), 1);

        let method = &service.methods[0];
        assert_eq!(method.tag, "Get");
        assert_eq!(method.unary.as_ref().unwrap().path, "/get");
        assert_eq!(method.socket.as_ref().unwrap().path, "/watch");
    }

    #[test]
    fn test_method_without_paths_has_no_routes() {
        let mut service = ServiceDescriptor::new("orders", None);
        ServiceHandle::new(&mut service).method("RpcOnly", Arc::new(FnAdapter::new()));

        assert!(service.methods[0].unary.is_none());
        assert!(service.methods[0].socket.is_none());
    }
}

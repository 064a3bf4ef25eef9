//! Turns declared services into an HTTP route table.

use std::sync::Arc;

use janus_config::SocketConfig;
use janus_server::{Middleware, RouteTable, SocketEndpoint, SocketUpgrader, UnaryEndpoint};

use crate::service::ServiceDescriptor;

/// A route table plus how many upgrade factories it took to build it.
#[derive(Debug)]
pub(crate) struct AssembledRoutes {
    pub(crate) table: RouteTable,
    pub(crate) upgraders_built: usize,
}

/// Registers global middleware, then one group per service with its
/// unary and socket routes.
///
/// Socket routes share one [`SocketUpgrader`], built on the first socket
/// route and never when there is none.
pub(crate) fn assemble(
    services: Vec<ServiceDescriptor>,
    middleware: Vec<Arc<dyn Middleware>>,
    socket: &SocketConfig,
) -> AssembledRoutes {
    let mut table = RouteTable::new();
    for m in middleware {
        table.use_middleware(m);
    }

    let mut upgrader: Option<Arc<SocketUpgrader>> = None;
    let mut upgraders_built = 0;

    for service in services {
        let (prefix, group_middleware) = service
            .group
            .map(|g| (g.path, g.middleware))
            .unwrap_or_default();
        let mut group = table.group(&prefix, group_middleware);

        for method in service.methods {
            if let Some(route) = method.unary {
                let endpoint = UnaryEndpoint::new(method.tag.clone(), Arc::clone(&method.adapter));
                group.post(&route.path, route.middleware, Arc::new(endpoint));
            }

            if let Some(route) = method.socket {
                let shared = upgrader.get_or_insert_with(|| {
                    upgraders_built += 1;
                    Arc::new(SocketUpgrader::new(socket))
                });
                let endpoint = SocketEndpoint::new(
                    method.tag.clone(),
                    Arc::clone(&method.adapter),
                    Arc::clone(shared),
                );
                group.get(&route.path, route.middleware, Arc::new(endpoint));
            }
        }
    }

    AssembledRoutes {
        table,
        upgraders_built,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceHandle;
    use http::Method;
    use janus_server::{compile, CompileOptions, EndpointKind, FnAdapter, MethodAdapter};

    fn adapter() -> Arc<dyn MethodAdapter> {
        Arc::new(FnAdapter::new())
    }

    #[test]
    fn test_method_with_both_styles_adds_exactly_two_routes() {
        let mut service = ServiceDescriptor::new("svc", None);
        ServiceHandle::new(&mut service)
            .method("M", adapter())
            .handle("/m")
            .socket("/m/ws");

        let assembled = assemble(vec![service], Vec::new(), &SocketConfig::default());
        assert_eq!(assembled.upgraders_built, 1);

        let app = compile(assembled.table, &CompileOptions::default(), None).unwrap();
        let mut routes: Vec<_> = app
            .routes()
            .map(|r| (r.method, r.path, r.kind))
            .collect();
        routes.sort_by(|a, b| a.1.cmp(&b.1));

        assert_eq!(
            routes,
            vec![
                (Method::POST, "/m".to_string(), EndpointKind::Unary),
                (Method::GET, "/m/ws".to_string(), EndpointKind::Socket),
            ]
        );
    }

    #[test]
    fn test_socket_routes_share_one_upgrader() {
        let mut chat = ServiceDescriptor::new("chat", None);
        let mut handle = ServiceHandle::new(&mut chat);
        handle.group("/chat", Vec::new());
        handle.method("Join", adapter()).socket("/join");
        handle.method("Watch", adapter()).socket("/watch");

        let mut feed = ServiceDescriptor::new("feed", None);
        ServiceHandle::new(&mut feed).method("Tail", adapter()).socket("/tail");

        let assembled = assemble(vec![chat, feed], Vec::new(), &SocketConfig::default());
        assert_eq!(assembled.upgraders_built, 1);
        assert_eq!(assembled.table.len(), 3);
    }

    #[test]
    fn test_unary_only_builds_no_upgrader() {
        let mut service = ServiceDescriptor::new("svc", None);
        let mut handle = ServiceHandle::new(&mut service);
        handle.group("/orders", Vec::new());
        handle.method("List", adapter()).handle("/list");
        handle.method("RpcOnly", adapter());

        let assembled = assemble(vec![service], Vec::new(), &SocketConfig::default());
        assert_eq!(assembled.upgraders_built, 0);

        let paths: Vec<_> = assembled.table.routes().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/orders/list".to_string()]);
    }
}

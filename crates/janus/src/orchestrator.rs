//! The orchestrator: declarations in, two listeners out.

use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use janus_config::{CacheConfig, ConfigLoader, HttpSection, JanusConfig, ServiceSection};
use janus_registry::{
    records_for, ConsulRegistry, Endpoint, HealthCheck, Registrations, Registry, ServiceKind,
};
use janus_server::{
    add_health_route, compile, load_tls_acceptor, new_cache, CompileOptions, HttpListener,
    Middleware, ResponseCache, RouteTable, ServeError, ShutdownReason, ShutdownSignal, TlsAcceptor,
};
use janus_telemetry::LogConfig;
use tonic::body::BoxBody;
use tonic::codegen::Service;
use tonic::server::NamedService;
use tracing::{debug, error, info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::health::{health_service, HEALTH_SERVICE_NAME};
use crate::lifecycle::{PendingHttp, Resources};
use crate::restart;
use crate::routes;
use crate::rpc::{build_router, tcp_nodelay, PendingRpc, RpcServices, ServerOption};
use crate::service::{RpcMount, ServiceDescriptor, ServiceHandle};

/// Environment variable naming the config file read by [`Orchestrator::serve`].
pub const CONFIG_PATH_ENV: &str = "JANUS_CONFIG";

/// Config file read by [`Orchestrator::serve`] when `JANUS_CONFIG` is unset.
pub const DEFAULT_CONFIG_FILE: &str = "janus.toml";

/// Prefix of environment overrides, as in `JANUS__HTTP__PORT`.
pub const ENV_PREFIX: &str = "JANUS";

/// Manual adjustment of the HTTP route table, run after declared routes.
pub type RoutesAugmentor = Box<dyn FnOnce(&mut RouteTable) + Send>;

/// Manual adjustment of the RPC service set, run after declared services.
pub type RpcAugmentor = Box<dyn FnOnce(&mut RpcServices) -> OrchestratorResult + Send>;

/// Builds the response cache from `[http.cache]`.
pub type CacheFactory = Box<dyn FnOnce(&CacheConfig) -> Option<Arc<dyn ResponseCache>> + Send>;

/// Declares RPC services and their HTTP exposure, then serves both
/// protocols as one unit.
///
/// Declarations happen on `&mut self`; [`serve`](Self::serve) and
/// [`serve_with`](Self::serve_with) consume the orchestrator, so nothing can
/// be declared once serving starts.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use janus::prelude::*;
///
/// # async fn run() -> Result<(), OrchestratorError> {
/// let mut orchestrator = Orchestrator::new();
///
/// let echo = FnAdapter::new().unary(|_ctx, body| async move { Ok(body) });
/// orchestrator
///     .declare_http_service("echo")
///     .method("Echo", Arc::new(echo))
///     .handle("/echo");
///
/// orchestrator.serve().await
/// # }
/// ```
#[derive(Default)]
pub struct Orchestrator {
    services: Vec<ServiceDescriptor>,
    options: Vec<ServerOption>,
    middleware: Vec<Arc<dyn Middleware>>,
    routes_augmentor: Option<RoutesAugmentor>,
    rpc_augmentor: Option<RpcAugmentor>,
    once: HashSet<String>,
    registry: Option<Arc<dyn Registry>>,
    cache_factory: Option<CacheFactory>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("services", &self.services)
            .field("options", &self.options)
            .field("middleware", &self.middleware.len())
            .field("routes_augmentor", &self.routes_augmentor.is_some())
            .field("rpc_augmentor", &self.rpc_augmentor.is_some())
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator with nothing declared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `registry` instead of the Consul agent at `service.registry_address`.
    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses `factory` instead of the built-in cache for `[http.cache]`.
    pub fn with_cache_factory(
        mut self,
        factory: impl FnOnce(&CacheConfig) -> Option<Arc<dyn ResponseCache>> + Send + 'static,
    ) -> Self {
        self.cache_factory = Some(Box::new(factory));
        self
    }

    /// Appends an RPC server option. Options apply in declaration order.
    pub fn add_server_option(&mut self, option: ServerOption) -> &mut Self {
        self.options.push(option);
        self
    }

    /// Appends HTTP middleware that wraps every route.
    pub fn add_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Declares an RPC service, mounted when the RPC listener is enabled.
    ///
    /// Declaring the same service twice is not prevented here; mounting it
    /// fails with [`OrchestratorError::DuplicateRpcService`].
    pub fn declare_service<S>(&mut self, service: S) -> ServiceHandle<'_>
    where
        S: Service<http::Request<BoxBody>, Response = http::Response<BoxBody>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        let mount: RpcMount = Box::new(move |rpc: &mut RpcServices| rpc.add_service(service).map(|_| ()));
        self.push_service(ServiceDescriptor::new(S::NAME, Some(mount)))
    }

    /// Declares a service with HTTP routes only.
    pub fn declare_http_service(&mut self, name: impl Into<String>) -> ServiceHandle<'_> {
        self.push_service(ServiceDescriptor::new(name, None))
    }

    fn push_service(&mut self, service: ServiceDescriptor) -> ServiceHandle<'_> {
        self.services.push(service);
        let index = self.services.len() - 1;
        ServiceHandle::new(&mut self.services[index])
    }

    /// Sets the callback run on the route table after declared routes.
    /// Replaces any previous one.
    pub fn set_routes_augmentor(&mut self, augmentor: impl FnOnce(&mut RouteTable) + Send + 'static) -> &mut Self {
        self.routes_augmentor = Some(Box::new(augmentor));
        self
    }

    /// Sets the callback run on the RPC services after declared services.
    /// Replaces any previous one.
    pub fn set_rpc_augmentor(
        &mut self,
        augmentor: impl FnOnce(&mut RpcServices) -> OrchestratorResult + Send + 'static,
    ) -> &mut Self {
        self.rpc_augmentor = Some(Box::new(augmentor));
        self
    }

    /// Runs `init` unless a block with the same `key` already ran.
    ///
    /// Returns `true` if `init` ran.
    pub fn run_once(&mut self, key: impl Into<String>, init: impl FnOnce(&mut Self)) -> bool {
        if !self.once.insert(key.into()) {
            return false;
        }
        init(self);
        true
    }

    /// Returns the number of declared services.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Loads configuration, initializes logging and serves until an OS signal.
    ///
    /// Configuration comes from the file named by `JANUS_CONFIG` (default
    /// `janus.toml`, optional), then `.env`, then `JANUS__*` variables.
    /// `SIGTERM`/`SIGINT` shut down; `SIGHUP`/`SIGUSR2` restart.
    pub async fn serve(self) -> OrchestratorResult {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let config = ConfigLoader::new()
            .with_optional_file(&path)?
            .with_dotenv()?
            .with_env_prefix(ENV_PREFIX)
            .load()?;

        if let Err(e) = janus_telemetry::init_logging(&LogConfig::from(&config.logging)) {
            debug!(error = %e, "Logging already initialized");
        }

        self.serve_with(config, ShutdownSignal::with_os_signals()).await
    }

    /// Serves with `config` until `shutdown` fires.
    ///
    /// Both listeners are fully set up (registered, compiled, bound) before
    /// either accepts a connection; any setup failure is returned after
    /// teardown. When `shutdown` fires, teardown runs in a fixed order:
    /// deregister, stop RPC, stop HTTP, close the cache. A restart request
    /// then starts a fresh copy of the process.
    ///
    /// With both ports at zero this returns `Ok(())` without doing anything.
    pub async fn serve_with(self, config: JanusConfig, shutdown: ShutdownSignal) -> OrchestratorResult {
        let config = config.merged();
        if !config.any_listener_enabled() {
            debug!("No listener port configured, nothing to serve");
            return Ok(());
        }

        let registry = self.registry.clone();
        let mut resources = Resources::new(
            registrations_for(&config.service, registry),
            config.service.shutdown_timeout(),
        );

        let outcome = self.run(&config, &shutdown, &mut resources).await;
        resources.teardown().await;

        match outcome {
            Ok(ShutdownReason::Shutdown) => {
                info!(service = %config.service.name, "Shutdown complete");
                Ok(())
            }
            Ok(ShutdownReason::Restart) => restart::spawn_replacement().map(drop),
            Err(e) => {
                error!(service = %config.service.name, error = %e, "Setup failed");
                janus_telemetry::flush();
                Err(e)
            }
        }
    }

    async fn run(
        self,
        config: &JanusConfig,
        shutdown: &ShutdownSignal,
        resources: &mut Resources,
    ) -> OrchestratorResult<ShutdownReason> {
        config.validate()?;

        let Self {
            mut services,
            mut options,
            middleware,
            routes_augmentor,
            rpc_augmentor,
            cache_factory,
            ..
        } = self;
        let service = &config.service;

        if config.grpc.is_enabled() {
            if let Some(interval) = config.grpc.keep_alive() {
                options.push(ServerOption::Http2KeepaliveInterval(interval));
            }

            let mut rpc = RpcServices::new();
            for declared in &mut services {
                if let Some(mount) = declared.rpc.take() {
                    mount(&mut rpc)?;
                }
            }
            if let Some(augment) = rpc_augmentor {
                augment(&mut rpc)?;
            }
            if service.is_named() && !rpc.contains(HEALTH_SERVICE_NAME) {
                rpc.add_service(health_service())?;
            }
            debug!(services = ?rpc.names(), "RPC services mounted");
            let router = build_router(&options, rpc);

            if service.is_named() {
                let endpoint = Endpoint::new(
                    &service.name,
                    service.advertised_host(&config.grpc.host),
                    config.grpc.port,
                );
                let check = HealthCheck::grpc(
                    &endpoint.addr(),
                    secs(config.grpc.check_timeout_secs),
                    secs(config.grpc.check_interval_secs),
                )
                .with_deregister_after(secs(service.deregister_after_secs));
                resources
                    .register(records_for(ServiceKind::Grpc, &endpoint, &check))
                    .await;
            }

            let pending = PendingRpc::bind(&config.grpc.bind_addr(), router, tcp_nodelay(&options)).await?;
            resources.set_rpc(pending);
        }

        if config.http.is_enabled() {
            let assembled = routes::assemble(std::mem::take(&mut services), middleware, &config.http.socket);
            let mut table = assembled.table;
            debug!(
                routes = table.len(),
                upgraders = assembled.upgraders_built,
                "HTTP routes assembled"
            );

            if let Some(augment) = routes_augmentor {
                augment(&mut table);
            }

            if service.is_named() {
                add_health_route(&mut table);

                let endpoint = Endpoint::new(
                    &service.name,
                    service.advertised_host(&config.http.host),
                    config.http.port,
                );
                let check = HealthCheck::http(
                    &endpoint.addr(),
                    config.http.tls_enabled(),
                    secs(config.http.check_timeout_secs),
                    secs(config.http.check_interval_secs),
                )
                .with_deregister_after(secs(service.deregister_after_secs));
                resources
                    .register(records_for(ServiceKind::Http, &endpoint, &check))
                    .await;
            }

            let cache = match cache_factory {
                Some(factory) => factory(&config.http.cache),
                None => new_cache(&config.http.cache),
            };
            resources.set_cache(cache);

            let app = compile(table, &CompileOptions::from(&config.http), resources.cache())?;
            let tls = tls_acceptor(&config.http)?;

            let addr = config.http.bind_addr();
            let listener = HttpListener::bind(&addr, config.http.keep_alive(), tls)
                .await
                .map_err(|e| match e {
                    ServeError::Bind { source, .. } | ServeError::Accept(source) => {
                        OrchestratorError::ListenerBind {
                            protocol: "http",
                            addr: addr.clone(),
                            source,
                        }
                    }
                })?;
            info!(addr = %listener.local_addr(), routes = app.route_count(), "HTTP listener bound");
            resources.set_http(PendingHttp::new(listener, app, service.shutdown_timeout()));
        }

        // Only the compiled graphs are kept from here on.
        drop(services);

        resources.start();
        info!(service = %service.name, "Janus serving");

        let reason = shutdown.recv().await;
        info!(?reason, "Stop requested");
        Ok(reason)
    }
}

/// The registry ledger for a named service; `None` when unnamed.
///
/// A registry that cannot be built leaves the service undiscoverable but
/// still serving.
fn registrations_for(service: &ServiceSection, registry: Option<Arc<dyn Registry>>) -> Option<Registrations> {
    if !service.is_named() {
        return None;
    }

    let registry = match registry {
        Some(registry) => registry,
        None => match ConsulRegistry::new(&service.registry_address) {
            Ok(consul) => Arc::new(consul),
            Err(e) => {
                warn!(
                    addr = %service.registry_address,
                    error = %e,
                    "Service registry unavailable, continuing without discovery"
                );
                return None;
            }
        },
    };
    Some(Registrations::new(registry))
}

fn tls_acceptor(http: &HttpSection) -> OrchestratorResult<Option<TlsAcceptor>> {
    if !http.tls_enabled() {
        return Ok(None);
    }
    let cert = http.cert_file.as_deref().unwrap_or_default();
    let key = http.key_file.as_deref().unwrap_or_default();
    Ok(Some(load_tls_acceptor(cert, key)?))
}

const fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use janus_registry::MemoryRegistry;
    use janus_server::FnAdapter;

    fn declare_chat(orchestrator: &mut Orchestrator) {
        let mut chat = orchestrator.declare_http_service("chat");
        chat.group("/chat", Vec::new());
        chat.method("Join", Arc::new(FnAdapter::new())).socket("/join");
    }

    #[test]
    fn test_run_once_runs_each_key_once() {
        let mut orchestrator = Orchestrator::new();

        assert!(orchestrator.run_once("chat", declare_chat));
        assert!(!orchestrator.run_once("chat", declare_chat));
        assert!(orchestrator.run_once("other", |_| {}));

        assert_eq!(orchestrator.service_count(), 1);
    }

    #[test]
    fn test_repeated_guarded_declaration_builds_one_upgrader() {
        let mut orchestrator = Orchestrator::new();
        orchestrator.run_once("chat", declare_chat);
        orchestrator.run_once("chat", declare_chat);

        let assembled = routes::assemble(
            orchestrator.services,
            orchestrator.middleware,
            &janus_config::SocketConfig::default(),
        );
        assert_eq!(assembled.upgraders_built, 1);
        assert_eq!(assembled.table.len(), 1);
    }

    #[test]
    fn test_last_augmentor_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut orchestrator = Orchestrator::new();

        let first = Arc::clone(&calls);
        orchestrator.set_routes_augmentor(move |_| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = Arc::clone(&calls);
        orchestrator.set_routes_augmentor(move |_| {
            second.fetch_add(10, Ordering::SeqCst);
        });

        let augment = orchestrator.routes_augmentor.take().unwrap();
        augment(&mut RouteTable::new());
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_server_options_keep_order() {
        let mut orchestrator = Orchestrator::new();
        orchestrator
            .add_server_option(ServerOption::TcpNodelay(false))
            .add_server_option(ServerOption::ConcurrencyLimit(4))
            .add_server_option(ServerOption::TcpNodelay(false));

        let rendered: Vec<_> = orchestrator.options.iter().map(|o| format!("{o:?}")).collect();
        assert_eq!(rendered, ["TcpNodelay(false)", "ConcurrencyLimit(4)", "TcpNodelay(false)"]);
    }

    #[test]
    fn test_unnamed_service_has_no_registrations() {
        let registry: Arc<dyn Registry> = Arc::new(MemoryRegistry::new());
        assert!(registrations_for(&ServiceSection::default(), Some(registry)).is_none());
    }

    #[test]
    fn test_named_service_defaults_to_consul() {
        let service = ServiceSection {
            name: "svc".to_string(),
            ..ServiceSection::default()
        };
        assert!(registrations_for(&service, None).is_some());
    }

    #[tokio::test]
    async fn test_no_ports_is_a_no_op() {
        let registry = Arc::new(MemoryRegistry::new());
        let mut config = JanusConfig::default();
        config.service.name = "svc".to_string();

        Orchestrator::new()
            .with_registry(registry.clone())
            .serve_with(config, ShutdownSignal::new())
            .await
            .unwrap();

        assert!(registry.events().is_empty());
    }

    #[test]
    fn test_tls_disabled_without_cert() {
        assert!(tls_acceptor(&HttpSection::default()).unwrap().is_none());
    }
}

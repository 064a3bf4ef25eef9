//! RPC-side behavior of a served orchestrator.

mod common;

use std::sync::Arc;
use std::time::Duration;

use janus::prelude::*;
use janus::registry::{HealthProbe, MemoryRegistry, ServiceKind};
use tonic::transport::Channel;
use tonic::{Request, Response, Status};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};

/// A user-supplied health service that disagrees with the built-in one.
#[derive(Debug, Clone, Copy)]
struct NotServing;

#[tonic::async_trait]
impl Health for NotServing {
    async fn check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(HealthCheckResponse {
            status: ServingStatus::NotServing as i32,
        }))
    }

    type WatchStream = tokio_stream::Empty<Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        Err(Status::unimplemented("watch"))
    }
}

async fn check(port: u16) -> i32 {
    let channel = Channel::from_shared(format!("http://127.0.0.1:{port}"))
        .unwrap()
        .connect()
        .await
        .unwrap();
    let mut client = HealthClient::new(channel);
    client
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .unwrap()
        .into_inner()
        .status
}

#[tokio::test]
async fn test_health_check_and_single_registration() {
    let port = common::free_port();
    let registry = Arc::new(MemoryRegistry::new());

    let mut orchestrator = Orchestrator::new().with_registry(registry.clone());
    orchestrator
        .add_server_option(ServerOption::Timeout(Duration::from_secs(5)))
        .add_server_option(ServerOption::ConcurrencyLimit(16));

    let (shutdown, handle) = common::spawn(orchestrator, common::config("svc", port, 0));
    common::wait_for(port).await;

    assert_eq!(check(port).await, ServingStatus::Serving as i32);

    let records = registry.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "svc.grpc");
    assert_eq!(records[0].kind, ServiceKind::Grpc);
    assert_eq!(records[0].tags, ["grpc", "svc", "svc.grpc"]);
    assert_eq!(
        records[0].check.probe,
        HealthProbe::Grpc(format!("127.0.0.1:{port}"))
    );

    common::stop(shutdown, handle).await;

    assert!(registry.is_empty());
    assert!(!common::is_listening(port));
}

#[tokio::test]
async fn test_declared_service_takes_precedence_over_builtin_health() {
    let port = common::free_port();

    let mut orchestrator = Orchestrator::new().with_registry(Arc::new(MemoryRegistry::new()));
    let handle = orchestrator.declare_service(HealthServer::new(NotServing));
    assert_eq!(handle.name(), "grpc.health.v1.Health");

    let (shutdown, handle) = common::spawn(orchestrator, common::config("svc", port, 0));
    common::wait_for(port).await;

    assert_eq!(check(port).await, ServingStatus::NotServing as i32);

    common::stop(shutdown, handle).await;
}

#[tokio::test]
async fn test_rpc_augmentor_mounts_services() {
    let port = common::free_port();

    let mut orchestrator = Orchestrator::new();
    orchestrator.set_rpc_augmentor(|rpc| {
        rpc.add_service(HealthServer::new(NotServing))?;
        Ok(())
    });

    // Unnamed, so only the augmentor's service answers.
    let (shutdown, handle) = common::spawn(orchestrator, common::config("", port, 0));
    common::wait_for(port).await;

    assert_eq!(check(port).await, ServingStatus::NotServing as i32);

    common::stop(shutdown, handle).await;
}

#[tokio::test]
async fn test_duplicate_rpc_service_fails_setup() {
    let port = common::free_port();
    let registry = Arc::new(MemoryRegistry::new());

    let mut orchestrator = Orchestrator::new().with_registry(registry.clone());
    orchestrator.declare_service(HealthServer::new(NotServing));
    orchestrator.declare_service(HealthServer::new(NotServing));

    let err = orchestrator
        .serve_with(common::config("svc", port, 0), ShutdownSignal::new())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::DuplicateRpcService(name) if name == "grpc.health.v1.Health"));
    assert!(registry.events().is_empty());
    assert!(!common::is_listening(port));
}

//! `grpc.health.v1.Health` responder.
//!
//! A liveness check: whenever the process can answer, it answers `SERVING`,
//! whatever service name the probe asks about.

use tokio_stream::Once;
use tonic::server::NamedService;
use tonic::{Request, Response, Status};
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_server::{Health, HealthServer};
use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};

/// Fully qualified name of the health service.
pub const HEALTH_SERVICE_NAME: &str = <HealthServer<HealthResponder> as NamedService>::NAME;

/// Always reports `SERVING`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthResponder;

fn serving() -> HealthCheckResponse {
    HealthCheckResponse {
        status: ServingStatus::Serving as i32,
    }
}

#[tonic::async_trait]
impl Health for HealthResponder {
    async fn check(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(serving()))
    }

    type WatchStream = Once<Result<HealthCheckResponse, Status>>;

    async fn watch(
        &self,
        _request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        Ok(Response::new(tokio_stream::once(Ok(serving()))))
    }
}

/// Returns the responder wrapped as a mountable service.
pub fn health_service() -> HealthServer<HealthResponder> {
    HealthServer::new(HealthResponder)
}

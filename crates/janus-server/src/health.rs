//! Liveness endpoint.
//!
//! `GET /health` answers `200 OK` with the body `OK` for as long as the
//! process can answer at all. It is a liveness probe only: readiness of the
//! service's own dependencies is not checked here.

use std::sync::Arc;

use http::StatusCode;

use crate::middleware::{Endpoint, EndpointKind};
use crate::router::RouteTable;
use crate::types::{response, BoxFuture, HttpRequest, HttpResponse};

/// Path of the liveness endpoint. Never prefixed with the entry path.
pub const HEALTH_PATH: &str = "/health";

/// The liveness endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthEndpoint;

impl Endpoint for HealthEndpoint {
    fn call(&self, _request: HttpRequest) -> BoxFuture<'_, HttpResponse> {
        Box::pin(async { response(StatusCode::OK, "text/plain; charset=utf-8", "OK") })
    }

    fn kind(&self) -> EndpointKind {
        EndpointKind::Health
    }
}

/// Adds `GET /health` to `table`.
pub fn add_health_route(table: &mut RouteTable) {
    table.get(HEALTH_PATH, Vec::new(), Arc::new(HealthEndpoint));
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let request = http::Request::builder()
            .uri(HEALTH_PATH)
            .body(Bytes::new())
            .unwrap();

        let response = HealthEndpoint.call(request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[test]
    fn test_add_health_route() {
        let mut table = RouteTable::new();
        add_health_route(&mut table);

        let route = table.routes().next().unwrap();
        assert_eq!(route.method, http::Method::GET);
        assert_eq!(route.path, "/health");
        assert_eq!(route.kind, EndpointKind::Health);
    }
}

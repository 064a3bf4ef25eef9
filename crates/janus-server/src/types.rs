//! Request and response types shared by the HTTP engine.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::{header, Response, StatusCode};
use http_body_util::Full;

/// A boxed future used across the engine's trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An inbound request with its body fully collected.
///
/// Extensions survive collection, so upgrade handles installed by hyper are
/// still reachable through [`hyper::upgrade::on`].
pub type HttpRequest = http::Request<Bytes>;

/// Response body type.
pub type ResponseBody = Full<Bytes>;

/// An outbound response.
pub type HttpResponse = Response<ResponseBody>;

/// Path parameters captured by the route match, stored in request extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(pub HashMap<String, String>);

impl PathParams {
    /// Returns a captured parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// Builds a response with the given status, content type and body.
pub fn response(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    response
}

/// Builds an `application/json` response.
pub fn json_response(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    response(status, "application/json", body)
}

/// Builds a JSON error response: `{"error": {"code": .., "message": ..}}`.
pub fn error_response(status: StatusCode, code: &str, message: &str) -> HttpResponse {
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": message
        }
    });
    json_response(status, body.to_string())
}

/// Builds the 404 response for an unmatched path.
pub fn not_found(path: &str) -> HttpResponse {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path
    });
    json_response(StatusCode::NOT_FOUND, body.to_string())
}

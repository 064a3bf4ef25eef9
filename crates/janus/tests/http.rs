//! HTTP-side behavior of a served orchestrator.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use http::{HeaderValue, StatusCode};
use janus::config::{CacheConfig, PluginConfig};
use janus::prelude::*;
use janus::registry::{MemoryRegistry, ServiceKind};
use janus::server::{endpoint_fn, response, BoxFuture, HttpRequest, HttpResponse, CACHE_HIT_HEADER};
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn test_echo_service_with_health_and_dual_registration() {
    let port = common::free_port();
    let registry = Arc::new(MemoryRegistry::new());

    let mut orchestrator = Orchestrator::new().with_registry(registry.clone());
    orchestrator
        .declare_http_service("echo")
        .method("Echo", common::echo())
        .handle("/echo");

    let (shutdown, handle) = common::spawn(orchestrator, common::config("svc", 0, port));
    common::wait_for(port).await;

    let client = reqwest::Client::new();
    let health = client
        .get(format!("http://127.0.0.1:{port}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.text().await.unwrap(), "OK");

    let echoed = client
        .post(format!("http://127.0.0.1:{port}/echo"))
        .body("hello janus")
        .send()
        .await
        .unwrap();
    assert_eq!(echoed.status(), StatusCode::OK);
    assert_eq!(echoed.text().await.unwrap(), "hello janus");

    let records = registry.records();
    let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["svc.http", "svc"]);
    assert!(records.iter().all(|r| r.kind == ServiceKind::Http && r.port == port));

    common::stop(shutdown, handle).await;

    assert!(registry.is_empty());
    assert!(!common::is_listening(port));
}

#[tokio::test]
async fn test_unary_and_socket_routes_on_one_method() {
    let port = common::free_port();

    let mut orchestrator = Orchestrator::new();
    orchestrator
        .declare_http_service("m")
        .method("M", common::echo())
        .handle("/m")
        .socket("/m/ws");

    let (shutdown, handle) = common::spawn(orchestrator, common::config("", 0, port));
    common::wait_for(port).await;

    let client = reqwest::Client::new();
    let unary = client
        .post(format!("http://127.0.0.1:{port}/m"))
        .body("unary")
        .send()
        .await
        .unwrap();
    assert_eq!(unary.text().await.unwrap(), "unary");

    let (mut ws, upgrade) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/m/ws"))
        .await
        .unwrap();
    assert_eq!(upgrade.status(), StatusCode::SWITCHING_PROTOCOLS);

    ws.send(Message::text("over the socket")).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply.to_text().unwrap(), "over the socket");
    ws.close(None).await.unwrap();

    let plain_get = client
        .get(format!("http://127.0.0.1:{port}/m/ws"))
        .send()
        .await
        .unwrap();
    assert_eq!(plain_get.status(), StatusCode::BAD_REQUEST);

    let wrong_method = client
        .get(format!("http://127.0.0.1:{port}/m"))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);

    // Unnamed: no health route.
    let health = client
        .get(format!("http://127.0.0.1:{port}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::NOT_FOUND);

    common::stop(shutdown, handle).await;
}

#[tokio::test]
async fn test_entry_prefix_and_cache_plugin() {
    let port = common::free_port();
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = Arc::clone(&calls);
    let adapter = FnAdapter::new().unary(move |_ctx, body| {
        let counted = Arc::clone(&counted);
        async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(body)
        }
    });

    let mut orchestrator = Orchestrator::new().with_registry(Arc::new(MemoryRegistry::new()));
    let mut service = orchestrator.declare_http_service("echo");
    service.group("/echo", Vec::new());
    service.method("Say", Arc::new(adapter)).handle("/say");

    let mut config = common::config("svc", 0, port);
    config.http.entry = "/api".to_string();
    config.http.cache = CacheConfig::memory(Duration::from_secs(60));
    config.http.plugins = vec![PluginConfig::new("cache", vec!["/echo/say".to_string()])];

    let (shutdown, handle) = common::spawn(orchestrator, config);
    common::wait_for(port).await;

    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/api/echo/say");

    let first = client.post(&url).body("same").send().await.unwrap();
    assert!(first.headers().get(CACHE_HIT_HEADER).is_none());
    assert_eq!(first.text().await.unwrap(), "same");

    let second = client.post(&url).body("same").send().await.unwrap();
    assert_eq!(second.headers()[CACHE_HIT_HEADER], "HIT");
    assert_eq!(second.text().await.unwrap(), "same");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let unprefixed = client
        .post(format!("http://127.0.0.1:{port}/echo/say"))
        .send()
        .await
        .unwrap();
    assert_eq!(unprefixed.status(), StatusCode::NOT_FOUND);

    let health = client
        .get(format!("http://127.0.0.1:{port}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    common::stop(shutdown, handle).await;
}

struct Stamp;

impl Middleware for Stamp {
    fn name(&self) -> &'static str {
        "stamp"
    }

    fn process<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> BoxFuture<'a, HttpResponse> {
        Box::pin(async move {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("x-stamp", HeaderValue::from_static("janus"));
            response
        })
    }
}

#[tokio::test]
async fn test_global_middleware_and_routes_augmentor() {
    let port = common::free_port();

    let mut orchestrator = Orchestrator::new();
    orchestrator.add_middleware(Arc::new(Stamp));
    orchestrator
        .declare_http_service("echo")
        .method("Echo", common::echo())
        .handle("/echo");
    orchestrator.set_routes_augmentor(|table| {
        table.get(
            "/version",
            Vec::new(),
            endpoint_fn(|_request| {
                Box::pin(async { response(StatusCode::OK, "text/plain; charset=utf-8", "1.0") })
            }),
        );
    });

    let (shutdown, handle) = common::spawn(orchestrator, common::config("", 0, port));
    common::wait_for(port).await;

    let client = reqwest::Client::new();
    let version = client
        .get(format!("http://127.0.0.1:{port}/version"))
        .send()
        .await
        .unwrap();
    assert_eq!(version.headers()["x-stamp"], "janus");
    assert_eq!(version.text().await.unwrap(), "1.0");

    let echoed = client
        .post(format!("http://127.0.0.1:{port}/echo"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(echoed.headers()["x-stamp"], "janus");

    common::stop(shutdown, handle).await;
}

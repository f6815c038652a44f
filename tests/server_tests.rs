//! Requests over a real socket against `HttpServer`.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use ssr_dispatch::build::ServerMode;
use ssr_dispatch::config::ServerConfig;
use ssr_dispatch::data::{AppLoadContext, InitialContext};
use ssr_dispatch::{HttpServer, RequestHandler, Shutdown};

mod common;
use common::{RenderBehavior, Reported};

async fn start(server: HttpServer) -> (SocketAddr, Shutdown, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            server.run(listener, shutdown).await.unwrap();
        })
    };
    (addr, shutdown, handle)
}

fn server() -> HttpServer {
    let reported = Reported::default();
    let handler = RequestHandler::new(common::build(RenderBehavior::Echo, &reported), ServerMode::Test);
    HttpServer::new(&ServerConfig::default(), handler)
}

#[tokio::test]
async fn test_serves_documents_and_data() {
    let (addr, shutdown, handle) = start(server()).await;
    let client = reqwest::Client::new();

    let res = client.get(format!("http://{addr}/page")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["loaderData"]["routes/page"], json!({ "title": "Page" }));

    let res = client.get(format!("http://{addr}/page.data")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "text/x-script");
    let text = res.text().await.unwrap();
    let first: Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(first["routes/page"]["data"]["title"], "Page");

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_request_id_is_issued_and_propagated() {
    let (addr, shutdown, handle) = start(server()).await;
    let client = reqwest::Client::new();

    let res = client.get(format!("http://{addr}/text")).send().await.unwrap();
    let issued = res.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(issued.len(), 36);

    let res = client
        .get(format!("http://{addr}/text"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "abc-123");
    assert_eq!(res.text().await.unwrap(), "ok");

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_context_factory_is_applied() {
    let reported = Reported::default();
    let build = common::build(RenderBehavior::Echo, &reported).with_middleware(true);
    let handler = RequestHandler::new(build, ServerMode::Test);
    // A legacy context on a middleware build is a configuration error.
    let server = HttpServer::new(&ServerConfig::default(), handler)
        .with_context(|_| InitialContext::Legacy(AppLoadContext::default()));
    let (addr, shutdown, handle) = start(server).await;

    let res = reqwest::get(format!("http://{addr}/page")).await.unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(reported.len(), 1);

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_server() {
    let (addr, shutdown, handle) = start(server()).await;

    let res = reqwest::get(format!("http://{addr}/text")).await.unwrap();
    assert_eq!(res.status(), 200);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(reqwest::get(format!("http://{addr}/text")).await.is_err());
}

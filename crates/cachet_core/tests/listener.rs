//! The listener over real TCP: connection handling, routing of every method
//! and path through the pipeline, and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cachet_cache::MemoryCacheStore;
use cachet_config::CachetConfig;
use cachet_core::{build_pipeline, Master, TokenBucket};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::Span;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(origin: &MockServer) -> CachetConfig {
    let mut cfg = CachetConfig::default();
    cfg.server.port = Some(0);
    cfg.server.shutdown_grace_secs = 1;
    cfg.origin.url = Some(origin.uri());
    cfg
}

fn client() -> Client<HttpConnector, Full<Bytes>> {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

async fn send(
    client: &Client<HttpConnector, Full<Bytes>>,
    method: Method,
    url: &str,
) -> (StatusCode, Option<String>, Bytes) {
    let req = Request::builder()
        .method(method)
        .uri(url)
        .body(Full::new(Bytes::new()))
        .unwrap();
    let res = client.request(req).await.unwrap();
    let status = res.status();
    let x_cache = res
        .headers()
        .get("x-cache")
        .map(|v| v.to_str().unwrap().to_string());
    let body = res.into_body().collect().await.unwrap().to_bytes();
    (status, x_cache, body)
}

struct Running {
    base: String,
    stop: oneshot::Sender<()>,
    server: tokio::task::JoinHandle<anyhow::Result<()>>,
}

async fn start(cfg: CachetConfig, capacity: u64) -> Running {
    let bucket = Arc::new(TokenBucket::new(
        capacity,
        0,
        Duration::from_secs(3600),
        Span::none(),
    ));
    let pipeline = build_pipeline(&cfg, bucket, Arc::new(MemoryCacheStore::default())).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    let (stop, stopped) = oneshot::channel::<()>();
    let master = Master::new(cfg, pipeline);
    let server = tokio::spawn(master.serve(listener, async move {
        let _ = stopped.await;
    }));

    Running { base, stop, server }
}

#[tokio::test]
async fn serves_misses_then_hits_over_tcp() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&origin)
        .await;

    let running = start(config_for(&origin), 10).await;
    let client = client();

    let (status, x_cache, body) = send(&client, Method::GET, &format!("{}/a?x=2&x=1", running.base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache.as_deref(), Some("MISS"));
    assert_eq!(body, Bytes::from_static(b"hello"));

    let (status, x_cache, body) = send(&client, Method::GET, &format!("{}/a?x=1&x=2", running.base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache.as_deref(), Some("HIT"));
    assert_eq!(body, Bytes::from_static(b"hello"));

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn every_method_goes_through_the_pipeline() {
    let origin = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&origin)
        .await;

    let running = start(config_for(&origin), 1).await;
    let client = client();

    let (status, x_cache, body) =
        send(&client, Method::DELETE, &format!("{}/anything/at/all", running.base)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(x_cache.as_deref(), Some("MISS"));
    assert!(body.is_empty());

    let (status, _, _) = send(&client, Method::GET, &format!("{}/", running.base)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let origin = MockServer::start().await;
    let running = start(config_for(&origin), 10).await;
    let addr = running.base.trim_start_matches("http://").to_string();

    running.stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running.server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    assert!(tokio::net::TcpStream::connect(&addr).await.is_err());
}

#[tokio::test]
async fn idle_connection_does_not_hold_the_only_slot() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("served"))
        .expect(1)
        .mount(&origin)
        .await;

    let mut cfg = config_for(&origin);
    cfg.server.max_connections = 1;
    cfg.server.client_read_timeout_secs = 1;
    let running = start(cfg, 10).await;
    let addr = running.base.trim_start_matches("http://").to_string();

    // Takes the only permit and never sends a request.
    let mut idle = TcpStream::connect(&addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (status, _, body) = tokio::time::timeout(
        Duration::from_secs(5),
        send(&client(), Method::GET, &format!("{}/", running.base)),
    )
    .await
    .expect("second client starved by an idle connection");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from_static(b"served"));

    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), idle.read(&mut buf))
        .await
        .expect("idle connection was not closed");
    assert!(matches!(read, Ok(0) | Err(_)));

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn stalled_body_over_tcp_gets_400() {
    let origin = MockServer::start().await;
    let mut cfg = config_for(&origin);
    cfg.server.client_read_timeout_secs = 1;
    let running = start(cfg, 10).await;
    let addr = running.base.trim_start_matches("http://").to_string();

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(b"POST /upload HTTP/1.1\r\nHost: cachet\r\nContent-Length: 10\r\n\r\nabc")
        .await
        .unwrap();

    let mut buf = vec![0u8; 1024];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("no response to a stalled body")
        .unwrap();
    let head = String::from_utf8_lossy(&buf[..n]);
    assert!(head.starts_with("HTTP/1.1 400"), "{head}");

    running.stop.send(()).unwrap();
    running.server.await.unwrap().unwrap();
}

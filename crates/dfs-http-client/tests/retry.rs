//! Retry behaviour against a scripted HTTP server.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use dfs_http_client::{Client, ClientConfig, RetryPolicy};
use dfs_http_core::{Cancellation, ErrorCode};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

struct Scripted {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<Bytes>>>,
}

/// Serves `script` in order, repeating the last entry once it runs out.
async fn scripted(script: Vec<(u16, &'static str)>) -> Scripted {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let script = Arc::new(script);

    let (server_hits, server_bodies) = (Arc::clone(&hits), Arc::clone(&bodies));
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            let (hits, bodies, script) = (Arc::clone(&server_hits), Arc::clone(&server_bodies), Arc::clone(&script));
            tokio::spawn(async move {
                let service = service_fn(move |request: hyper::Request<hyper::body::Incoming>| {
                    let (hits, bodies, script) = (Arc::clone(&hits), Arc::clone(&bodies), Arc::clone(&script));
                    async move {
                        let index = hits.fetch_add(1, Ordering::SeqCst).min(script.len() - 1);
                        let body = request.into_body().collect().await.unwrap().to_bytes();
                        bodies.lock().unwrap().push(body.clone());
                        let (status, reply) = script[index];
                        let reply = if reply == "echo" { body } else { Bytes::from_static(reply.as_bytes()) };
                        let response = hyper::Response::builder()
                            .status(status)
                            .header("content-type", "application/json")
                            .body(Full::new(reply))
                            .unwrap();
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    Scripted { addr, hits, bodies }
}

fn client(addr: SocketAddr, retries: u32) -> Client {
    let policy = RetryPolicy::new(retries, Duration::from_millis(10), Duration::from_millis(100)).unwrap();
    Client::new(ClientConfig::builder(format!("http://{addr}")).retry(policy).build()).unwrap()
}

const UNAVAILABLE: &str = r#"{"success":false,"error":{"code":"UNAVAILABLE","message":"try later"}}"#;
const INTERNAL: &str = r#"{"success":false,"error":{"code":"INTERNAL","message":"disk on fire"}}"#;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Entry {
    path: String,
    size: u64,
}

#[tokio::test]
async fn test_retry_until_success() {
    let server = scripted(vec![(503, UNAVAILABLE), (503, UNAVAILABLE), (200, r#"{"success":true,"data":{"status":"ok"}}"#)]).await;

    let value: serde_json::Value = client(server.addr, 3).get_json("/api/status").await.unwrap();
    assert_eq!(value, serde_json::json!({ "status": "ok" }));
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_persistent_failure_is_attempted_max_retries_plus_one() {
    let server = scripted(vec![(500, INTERNAL)]).await;

    let err = client(server.addr, 2).get_json::<serde_json::Value>("/api/status").await.unwrap_err();
    assert!(err.is_code(ErrorCode::Internal));
    assert_eq!(err.message(), "disk on fire");
    assert_eq!(err.metadata()["status"], 500);
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = scripted(vec![(404, r#"{"success":false,"error":{"code":"NOT_FOUND","message":"no such file"}}"#)]).await;

    let err = client(server.addr, 3).get_json::<Entry>("/api/v1/files/x").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_body_is_replayed_on_retry() {
    let server = scripted(vec![(503, UNAVAILABLE), (201, "echo")]).await;
    let entry = Entry { path: "/a".into(), size: 3 };

    let echoed: Entry = client(server.addr, 3).post_json("/api/v1/files", &entry).await.unwrap();
    assert_eq!(echoed, entry);

    let bodies = server.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn test_cancel_during_backoff() {
    let server = scripted(vec![(503, UNAVAILABLE)]).await;
    let policy = RetryPolicy::new(3, Duration::from_secs(30), Duration::from_secs(30)).unwrap();
    let client = Client::new(ClientConfig::builder(format!("http://{}", server.addr)).retry(policy).build()).unwrap();

    let cancellation = Cancellation::new();
    let canceller = cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = client
        .get("/api/status")
        .cancellation(cancellation)
        .send()
        .await
        .unwrap_err();
    assert!(err.is_code(ErrorCode::Cancelled));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr, 1).get_json::<serde_json::Value>("/api/status").await.unwrap_err();
    assert!(err.is_code(ErrorCode::NetworkError));
}

#[tokio::test]
async fn test_delete_with_empty_body() {
    let server = scripted(vec![(200, "")]).await;
    client(server.addr, 0).delete_json::<()>("/api/v1/files/a").await.unwrap();
}

#[tokio::test]
async fn test_delete_with_null_data_envelope() {
    let server = scripted(vec![(200, r#"{"success":true,"data":null}"#)]).await;
    client(server.addr, 0).delete_json::<()>("/api/v1/files/a").await.unwrap();
    let gone: Option<Entry> = client(server.addr, 0).get_json("/api/v1/files/a").await.unwrap();
    assert_eq!(gone, None);
}

#[tokio::test]
async fn test_custom_predicate_retries_throttled_responses() {
    let throttled = r#"{"success":false,"error":{"code":"RATE_LIMIT_EXCEEDED","message":"slow down"}}"#;
    let server = scripted(vec![(429, throttled), (429, throttled), (200, r#"{"success":true,"data":{"status":"ok"}}"#)]).await;

    // The default policy gives up on 429 immediately.
    let err = client(server.addr, 3).get_json::<serde_json::Value>("/api/status").await.unwrap_err();
    assert!(err.is_code(ErrorCode::RateLimitExceeded));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);

    let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100))
        .unwrap()
        .with_should_retry(|response, error| {
            response.map_or(error.is_some(), |r| r.status() == http::StatusCode::TOO_MANY_REQUESTS)
        });
    let value: serde_json::Value = Client::new(ClientConfig::builder(format!("http://{}", server.addr)).build())
        .unwrap()
        .get("/api/status")
        .retry(policy)
        .send_json()
        .await
        .unwrap();
    assert_eq!(value, serde_json::json!({ "status": "ok" }));
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}

//! A complete service assembled from the facade: middleware stack, auth,
//! namespace and cluster routes, driven through the client.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use dfs_http::core::services::{FileInfo, NodeInfo};
use dfs_http::core::BoxFuture;
use dfs_http::prelude::*;
use dfs_http::routes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

/// Flat namespace keyed by absolute path.
struct Namespace {
    entries: Mutex<BTreeMap<String, FileInfo>>,
}

impl Namespace {
    fn new() -> Self {
        let root = entry("/", true);
        Self {
            entries: Mutex::new(BTreeMap::from([(root.path.clone(), root)])),
        }
    }
}

fn entry(path: &str, is_dir: bool) -> FileInfo {
    FileInfo {
        path: path.to_string(),
        size: 0,
        is_dir,
        replicas: 3,
        modified_at: Utc::now(),
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

impl MetaStore for Namespace {
    fn stat<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<FileInfo>> {
        Box::pin(async move {
            self.entries
                .lock()
                .get(path)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("{path} does not exist")))
        })
    }

    fn list<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<FileInfo>>> {
        Box::pin(async move {
            let entries = self.entries.lock();
            match entries.get(path) {
                None => Err(Error::not_found(format!("{path} does not exist"))),
                Some(info) if !info.is_dir => Err(Error::invalid_argument(format!("{path} is not a directory"))),
                Some(_) => Ok(entries
                    .values()
                    .filter(|e| e.path != path && parent_of(&e.path) == path)
                    .cloned()
                    .collect()),
            }
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<FileInfo>> {
        Box::pin(async move {
            let mut entries = self.entries.lock();
            if entries.contains_key(path) {
                return Err(Error::already_exists(format!("{path} already exists")));
            }
            let info = entry(path, true);
            entries.insert(path.to_string(), info.clone());
            Ok(info)
        })
    }

    fn remove<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries
                .lock()
                .remove(path)
                .map(|_| ())
                .ok_or_else(|| Error::not_found(format!("{path} does not exist")))
        })
    }
}

struct ThreeNodes;

impl ClusterManager for ThreeNodes {
    fn nodes(&self) -> BoxFuture<'_, Result<Vec<NodeInfo>>> {
        Box::pin(async {
            Ok((1..=3)
                .map(|i| NodeInfo {
                    id: format!("node-{i}"),
                    address: format!("10.0.0.{i}:9000"),
                    healthy: i != 3,
                })
                .collect())
        })
    }

    fn leader(&self) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async { Ok(Some("node-1".to_string())) })
    }
}

struct Service {
    server: Server,
    client: Client,
}

async fn start() -> Service {
    let tokens = TokenMaker::new(SECRET).unwrap();
    let users = Arc::new(InMemoryUserStore::new());
    users
        .insert("alice", "correct-horse", BTreeSet::from([Role::User]))
        .unwrap();
    let collector = Arc::new(InMemoryCollector::new());

    let mut router = Router::new();
    router
        .use_middleware(RequestIdMiddleware::new())
        .use_middleware(RecoveryMiddleware::new())
        .use_middleware(MetricsMiddleware::new(collector.clone()))
        .use_middleware(AuthMiddleware::new(tokens.clone()).with_user_manager(users.clone()));

    routes::health(&mut router).unwrap();
    routes::metrics(&mut router, collector).unwrap();
    routes::auth(&mut router, AuthService::new(tokens, users)).unwrap();
    routes::files(&mut router, Arc::new(Namespace::new())).unwrap();
    routes::cluster(&mut router, Arc::new(ThreeNodes)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(ServerConfig::builder().build(), router);
    tokio::spawn({
        let server = server.clone();
        async move { server.serve(listener).await }
    });
    for _ in 0..200 {
        if server.is_running() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let client = Client::new(
        ClientConfig::builder(format!("http://{addr}"))
            .retry(RetryPolicy::none())
            .build(),
    )
    .unwrap();
    Service { server, client }
}

async fn login(client: &Client) -> String {
    let issued: Value = client
        .post_json(
            "/api/v1/auth/login",
            &serde_json::json!({ "username": "alice", "password": "correct-horse" }),
        )
        .await
        .unwrap();
    issued["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoints_are_public() {
    let svc = start().await;

    let health: Value = svc.client.get_json("/health").await.unwrap();
    assert_eq!(health["status"], "ok");

    let status: Value = svc.client.get_json("/status").await.unwrap();
    assert_eq!(status["version"], env!("CARGO_PKG_VERSION"));

    let metrics: Value = svc.client.get_json("/metrics").await.unwrap();
    assert!(metrics["http"]["requests"].as_u64().unwrap() >= 2);
    assert!(metrics["system"].is_null());
}

#[tokio::test]
async fn test_files_require_a_token() {
    let svc = start().await;

    let err = svc.client.get("/api/v1/files?path=/").send().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unauthenticated);
}

#[tokio::test]
async fn test_namespace_round_trip() {
    let svc = start().await;
    let token = login(&svc.client).await;

    let created: FileInfo = svc
        .client
        .post("/api/v1/files/mkdir")
        .bearer_token(&token)
        .json(&serde_json::json!({ "path": "/logs" }))
        .send_json()
        .await
        .unwrap();
    assert!(created.is_dir);

    let listing: Vec<FileInfo> = svc
        .client
        .get("/api/v1/files/list?path=/")
        .bearer_token(&token)
        .send_json()
        .await
        .unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].path, "/logs");

    let duplicate = svc
        .client
        .post("/api/v1/files/mkdir")
        .bearer_token(&token)
        .json(&serde_json::json!({ "path": "/logs" }))
        .send()
        .await
        .unwrap_err();
    assert!(duplicate.is_already_exists());

    let removed = svc
        .client
        .delete("/api/v1/files?path=/logs")
        .bearer_token(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status().as_u16(), 204);

    let gone = svc
        .client
        .get("/api/v1/files?path=/logs")
        .bearer_token(&token)
        .send()
        .await
        .unwrap_err();
    assert!(gone.is_not_found());
}

#[tokio::test]
async fn test_relative_path_rejected() {
    let svc = start().await;
    let token = login(&svc.client).await;

    let err = svc
        .client
        .get("/api/v1/files?path=logs")
        .bearer_token(&token)
        .send()
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn test_cluster_views() {
    let svc = start().await;
    let token = login(&svc.client).await;

    let nodes: Vec<NodeInfo> = svc
        .client
        .get("/api/v1/cluster/nodes")
        .bearer_token(&token)
        .send_json()
        .await
        .unwrap();
    assert_eq!(nodes.iter().filter(|n| n.healthy).count(), 2);

    let leader: Value = svc
        .client
        .get("/api/v1/cluster/leader")
        .bearer_token(&token)
        .send_json()
        .await
        .unwrap();
    assert_eq!(leader["leader"], "node-1");
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let svc = start().await;
    let token = login(&svc.client).await;

    let me: UserInfo = svc
        .client
        .get("/api/v1/auth/me")
        .bearer_token(&token)
        .send_json()
        .await
        .unwrap();
    assert_eq!(me.username, "alice");

    svc.client
        .post("/api/v1/auth/logout")
        .bearer_token(&token)
        .send()
        .await
        .unwrap();

    let err = svc
        .client
        .get("/api/v1/auth/me")
        .bearer_token(&token)
        .send()
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidToken);
    assert_eq!(err.http_status().as_u16(), 401);

    svc.server.shutdown(std::time::Duration::from_secs(1)).await.unwrap();
}

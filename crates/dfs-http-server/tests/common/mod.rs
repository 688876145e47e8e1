//! Shared harness for server integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use dfs_http_client::{Client, ClientConfig, RetryPolicy};
use dfs_http_core::services::TransactionManager;
use dfs_http_core::BoxFuture;
use dfs_http_server::{Router, Server, ServerConfig};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct Running {
    pub server: Server,
    pub addr: SocketAddr,
    pub task: JoinHandle<dfs_http_core::Result<()>>,
}

impl Running {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn client(&self) -> Client {
        self.client_with(RetryPolicy::none())
    }

    pub fn client_with(&self, retry: RetryPolicy) -> Client {
        Client::new(ClientConfig::builder(format!("http://{}", self.addr)).retry(retry).build()).unwrap()
    }
}

pub fn config() -> dfs_http_server::ServerConfigBuilder {
    ServerConfig::builder().bind_addr("127.0.0.1:0")
}

pub async fn spawn(router: Router) -> Running {
    spawn_with(config().build(), router).await
}

pub async fn spawn_with(config: ServerConfig, router: Router) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(config, router);
    let task = tokio::spawn({
        let server = server.clone();
        async move { server.serve(listener).await }
    });
    wait_until(|| server.is_running()).await;
    Running { server, addr, task }
}

pub async fn wait_until(mut ready: impl FnMut() -> bool) {
    for _ in 0..200 {
        if ready() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// Records transaction calls in order.
#[derive(Default)]
pub struct Ledger {
    events: Mutex<Vec<String>>,
}

impl Ledger {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl TransactionManager for Ledger {
    fn begin(&self) -> BoxFuture<'_, dfs_http_core::Result<String>> {
        Box::pin(async move {
            let mut events = self.events.lock();
            let id = format!("tx-{}", events.len());
            events.push(format!("begin:{id}"));
            Ok(id)
        })
    }

    fn commit<'a>(&'a self, id: &'a str) -> BoxFuture<'a, dfs_http_core::Result<()>> {
        Box::pin(async move {
            self.events.lock().push(format!("commit:{id}"));
            Ok(())
        })
    }

    fn rollback<'a>(&'a self, id: &'a str) -> BoxFuture<'a, dfs_http_core::Result<()>> {
        Box::pin(async move {
            self.events.lock().push(format!("rollback:{id}"));
            Ok(())
        })
    }
}

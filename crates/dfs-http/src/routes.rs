//! Standard endpoints of a DFS HTTP service.
//!
//! Each function registers one family of routes on a [`Router`]:
//!
//! | Function | Routes |
//! |---|---|
//! | [`health`] | `GET /health`, `GET /status` |
//! | [`metrics`] | `GET /metrics` |
//! | [`auth`] | `POST /api/v1/auth/{login,register,refresh,logout}`, `GET /api/v1/auth/me` |
//! | [`files`] | `GET/DELETE /api/v1/files?path=`, `GET /api/v1/files/list?path=`, `POST /api/v1/files/mkdir` |
//! | [`cluster`] | `GET /api/v1/cluster/nodes`, `GET /api/v1/cluster/leader` |

use std::sync::Arc;
use std::time::Instant;

use dfs_http_auth::AuthService;
use dfs_http_core::services::{ClusterManager, MetaStore};
use dfs_http_core::{json_body, response, Error, HandlerResult, Request, RequestContext, Result};
use dfs_http_server::Router;
use dfs_http_telemetry::MetricsCollector;
use serde::Deserialize;
use serde_json::json;

/// Path parameter carried in the query string or a JSON body.
#[derive(Debug, Deserialize)]
struct PathArg {
    path: String,
}

impl PathArg {
    fn from_query(request: &Request) -> Result<Self> {
        let query = request.uri().query().unwrap_or_default();
        let arg: Self = serde_urlencoded::from_str(query)
            .map_err(|_| Error::invalid_argument("query parameter 'path' is required"))?;
        arg.checked()
    }

    fn checked(self) -> Result<Self> {
        if self.path.starts_with('/') {
            Ok(self)
        } else {
            Err(Error::invalid_argument("path must be absolute").with_field("path", self.path))
        }
    }
}

/// Liveness and status endpoints.
///
/// # Errors
///
/// `AlreadyExists` when the routes are already registered.
pub fn health(router: &mut Router) -> Result<()> {
    let started = Instant::now();
    router.get("/health", |_ctx: RequestContext, _req: Request| async move {
        HandlerResult::Ok(response::ok(json!({ "status": "ok" })))
    })?;
    router.get("/status", move |_ctx: RequestContext, _req: Request| async move {
        HandlerResult::Ok(response::ok(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_secs": started.elapsed().as_secs(),
        })))
    })?;
    Ok(())
}

/// Request summary and the latest host sample from `collector`.
///
/// # Errors
///
/// `AlreadyExists` when the route is already registered.
pub fn metrics(router: &mut Router, collector: Arc<dyn MetricsCollector>) -> Result<()> {
    router.get("/metrics", move |_ctx: RequestContext, _req: Request| {
        let collector = Arc::clone(&collector);
        async move {
            let system = collector.system_metrics().pop();
            HandlerResult::Ok(response::ok(json!({
                "http": collector.http_summary(),
                "system": system,
            })))
        }
    })?;
    Ok(())
}

/// Login, registration and session endpoints backed by `service`.
///
/// # Errors
///
/// `AlreadyExists` when the routes are already registered.
pub fn auth(router: &mut Router, service: AuthService) -> Result<()> {
    let mut group = router.group("/api/v1/auth");
    let svc = service.clone();
    group.post("/login", move |ctx: RequestContext, req: Request| {
        let svc = svc.clone();
        async move { svc.login(ctx, req).await }
    })?;
    let svc = service.clone();
    group.post("/register", move |ctx: RequestContext, req: Request| {
        let svc = svc.clone();
        async move { svc.register(ctx, req).await }
    })?;
    let svc = service.clone();
    group.post("/refresh", move |ctx: RequestContext, req: Request| {
        let svc = svc.clone();
        async move { svc.refresh(ctx, req).await }
    })?;
    let svc = service.clone();
    group.post("/logout", move |ctx: RequestContext, req: Request| {
        let svc = svc.clone();
        async move { svc.logout(ctx, req).await }
    })?;
    group.get("/me", move |ctx: RequestContext, req: Request| {
        let svc = service.clone();
        async move { svc.me(ctx, req).await }
    })?;
    Ok(())
}

/// Namespace operations forwarded to the metadata engine.
///
/// # Errors
///
/// `AlreadyExists` when the routes are already registered.
pub fn files(router: &mut Router, store: Arc<dyn MetaStore>) -> Result<()> {
    let mut group = router.group("/api/v1/files");

    let meta = Arc::clone(&store);
    group.get("", move |_ctx: RequestContext, req: Request| {
        let meta = Arc::clone(&meta);
        async move {
            let arg = PathArg::from_query(&req)?;
            HandlerResult::Ok(response::ok(meta.stat(&arg.path).await?))
        }
    })?;

    let meta = Arc::clone(&store);
    group.get("/list", move |_ctx: RequestContext, req: Request| {
        let meta = Arc::clone(&meta);
        async move {
            let arg = PathArg::from_query(&req)?;
            HandlerResult::Ok(response::ok(meta.list(&arg.path).await?))
        }
    })?;

    let meta = Arc::clone(&store);
    group.post("/mkdir", move |_ctx: RequestContext, req: Request| {
        let meta = Arc::clone(&meta);
        async move {
            let arg = json_body::<PathArg>(req).await?.checked()?;
            let created = meta.mkdir(&arg.path).await?;
            tracing::info!(path = %created.path, "directory created");
            HandlerResult::Ok(response::created(created))
        }
    })?;

    group.delete("", move |_ctx: RequestContext, req: Request| {
        let meta = Arc::clone(&store);
        async move {
            let arg = PathArg::from_query(&req)?;
            meta.remove(&arg.path).await?;
            tracing::info!(path = %arg.path, "entry removed");
            HandlerResult::Ok(response::no_content())
        }
    })?;
    Ok(())
}

/// Cluster membership views.
///
/// # Errors
///
/// `AlreadyExists` when the routes are already registered.
pub fn cluster(router: &mut Router, manager: Arc<dyn ClusterManager>) -> Result<()> {
    let mut group = router.group("/api/v1/cluster");

    let nodes = Arc::clone(&manager);
    group.get("/nodes", move |_ctx: RequestContext, _req: Request| {
        let nodes = Arc::clone(&nodes);
        async move { HandlerResult::Ok(response::ok(nodes.nodes().await?)) }
    })?;

    group.get("/leader", move |_ctx: RequestContext, _req: Request| {
        let manager = Arc::clone(&manager);
        async move {
            let leader = manager.leader().await?;
            HandlerResult::Ok(response::ok(json!({ "leader": leader })))
        }
    })?;
    Ok(())
}

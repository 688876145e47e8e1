//! HTTP server.
//!
//! One tokio task per connection, HTTP/1.1 through hyper. Each request is
//! buffered (up to the configured body limit), given a fresh
//! [`RequestContext`] whose cancellation signal descends from the server's,
//! and dispatched through the [`Router`].
//!
//! Timeouts:
//!
//! - read: hyper's header read timer
//! - write: body read, middleware and handler must finish in time, or the
//!   request is cancelled and answered with `DEADLINE_EXCEEDED`
//! - idle: keep-alive connections with no request in flight are closed
//!
//! # Example
//!
//! ```rust,no_run
//! use dfs_http_core::{response, HandlerResult, Request, RequestContext};
//! use dfs_http_server::{Router, Server, ServerConfig};
//!
//! async fn status(_ctx: RequestContext, _req: Request) -> HandlerResult {
//!     Ok(response::ok(serde_json::json!({ "status": "ok" })))
//! }
//!
//! # async fn run() -> dfs_http_core::Result<()> {
//! let mut router = Router::new();
//! router.get("/api/status", status)?;
//!
//! let server = Server::new(ServerConfig::builder().bind_addr("0.0.0.0:8080").build(), router);
//! server.run().await
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dfs_http_core::{response, Cancellation, Domain, Error, ErrorCode, RequestContext, Response, Result};
use dfs_http_middleware::stages::REQUEST_ID_HEADER;
use http::{HeaderMap, HeaderValue};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_rustls::TlsAcceptor;

use crate::config::{ServerConfig, TlsFiles};
use crate::router::Router;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::tls;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// How long force-closed connections get to unwind after the drain deadline.
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// The HTTP server. Cloning is cheap; clones control the same server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServerConfig,
    router: Router,
    shutdown: ShutdownSignal,
    requests: Cancellation,
    connections: ConnectionTracker,
    phase: AtomicU8,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Creates a server that will dispatch through `router`.
    #[must_use]
    pub fn new(config: ServerConfig, router: Router) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                router,
                shutdown: ShutdownSignal::new(),
                requests: Cancellation::new(),
                connections: ConnectionTracker::new(),
                phase: AtomicU8::new(IDLE),
                local_addr: Mutex::new(None),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Returns the router.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Address the server is listening on, once bound.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    /// Returns `true` while the accept loop runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.phase.load(Ordering::SeqCst) == RUNNING
    }

    /// Number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.inner.connections.active()
    }

    /// Binds the configured address and serves until [`shutdown`](Self::shutdown).
    ///
    /// Serves TLS when the configuration carries [`TlsFiles`].
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a malformed address, `Unavailable` (network
    /// domain) when binding fails or the server was shut down,
    /// `AlreadyExists` when it is already running.
    pub async fn start(&self) -> Result<()> {
        if let Some(files) = self.inner.config.tls() {
            let files = files.clone();
            return self.start_tls(&files).await;
        }
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Like [`start`](Self::start), always over TLS with `files`.
    ///
    /// # Errors
    ///
    /// As [`start`](Self::start), plus `InvalidArgument` for unusable TLS files.
    pub async fn start_tls(&self, files: &TlsFiles) -> Result<()> {
        let acceptor = tls::load_acceptor(files)?;
        let listener = self.bind().await?;
        self.serve_tls(listener, acceptor).await
    }

    /// Serves plain HTTP on an already bound listener.
    ///
    /// # Errors
    ///
    /// `Unavailable` after shutdown, `AlreadyExists` when already running.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        Arc::clone(&self.inner).accept_loop(listener, None).await
    }

    /// Serves TLS on an already bound listener.
    ///
    /// # Errors
    ///
    /// As [`serve`](Self::serve).
    pub async fn serve_tls(&self, listener: TcpListener, acceptor: TlsAcceptor) -> Result<()> {
        Arc::clone(&self.inner).accept_loop(listener, Some(acceptor)).await
    }

    /// Starts the server and shuts it down gracefully on `SIGINT`/`SIGTERM`,
    /// waiting up to the configured shutdown timeout.
    ///
    /// # Errors
    ///
    /// Startup errors from [`start`](Self::start), or `Unavailable` when
    /// connections had to be force-closed.
    pub async fn run(&self) -> Result<()> {
        let signal = ShutdownSignal::with_os_signals();
        let serving = self.start();
        tokio::pin!(serving);
        tokio::select! {
            result = &mut serving => result,
            () = signal.triggered() => {
                let drained = self.shutdown(self.inner.config.shutdown_timeout()).await;
                serving.await?;
                drained
            }
        }
    }

    /// Stops accepting, lets open connections finish their in-flight
    /// requests and close, and waits up to `deadline` for that to happen.
    ///
    /// Past the deadline every request context is cancelled and the
    /// remaining connections are closed. Later `start` calls fail.
    ///
    /// # Errors
    ///
    /// `Unavailable` ("shutdown deadline exceeded") when connections had to
    /// be force-closed.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        let inner = &self.inner;
        inner.phase.store(STOPPED, Ordering::SeqCst);
        inner.shutdown.trigger();
        tracing::info!(
            connections = inner.connections.active(),
            deadline_ms = deadline.as_millis() as u64,
            "shutting down"
        );

        if tokio::time::timeout(deadline, inner.connections.drained()).await.is_ok() {
            tracing::info!("server stopped");
            return Ok(());
        }

        let remaining = inner.connections.active();
        tracing::warn!(connections = remaining, "shutdown deadline exceeded, closing connections");
        inner.requests.cancel();
        let _ = tokio::time::timeout(FORCE_CLOSE_GRACE, inner.connections.drained()).await;
        Err(Error::unavailable("shutdown deadline exceeded")
            .with_domain(Domain::Network)
            .with_field("connections", remaining))
    }

    async fn bind(&self) -> Result<TcpListener> {
        let config = &self.inner.config;
        let addr = config.socket_addr().map_err(|e| {
            Error::wrap(e, ErrorCode::InvalidArgument, format!("invalid bind address {:?}", config.bind_addr()))
        })?;
        TcpListener::bind(addr).await.map_err(|e| {
            Error::wrap(e, ErrorCode::Unavailable, format!("failed to bind {addr}"))
                .with_domain(Domain::Network)
        })
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.inner.config)
            .field("local_addr", &self.local_addr())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn accept_loop(self: Arc<Self>, listener: TcpListener, acceptor: Option<TlsAcceptor>) -> Result<()> {
        if let Err(phase) = self
            .phase
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
        {
            return Err(if phase == RUNNING {
                Error::already_exists("server is already running")
            } else {
                Error::unavailable("server has been shut down").with_domain(Domain::Network)
            });
        }

        let local_addr = listener.local_addr().ok();
        *self.local_addr.lock() = local_addr;
        tracing::info!(addr = ?local_addr, tls = acceptor.is_some(), "server listening");

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.triggered() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let guard = self.connections.acquire();
                        let inner = Arc::clone(&self);
                        let acceptor = acceptor.clone();
                        tokio::spawn(async move {
                            match acceptor {
                                Some(acceptor) => inner.serve_tls_connection(acceptor, stream, remote).await,
                                None => inner.serve_connection(TokioIo::new(stream), remote).await,
                            }
                            drop(guard);
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
                },
            }
        }

        tracing::info!("accept loop stopped");
        Ok(())
    }

    async fn serve_tls_connection(self: Arc<Self>, acceptor: TlsAcceptor, stream: tokio::net::TcpStream, remote: SocketAddr) {
        let handshake = tokio::time::timeout(self.config.read_timeout(), acceptor.accept(stream));
        let stream = tokio::select! {
            () = self.requests.cancelled() => return,
            result = handshake => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::debug!(%remote, error = %e, "TLS handshake failed");
                    return;
                }
                Err(_) => {
                    tracing::debug!(%remote, "TLS handshake timed out");
                    return;
                }
            },
        };
        self.serve_connection(TokioIo::new(stream), remote).await;
    }

    async fn serve_connection<I>(self: Arc<Self>, io: I, remote: SocketAddr)
    where
        I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        let activity = Arc::new(Activity::new());
        let service = {
            let inner = Arc::clone(&self);
            let activity = Arc::clone(&activity);
            service_fn(move |request: http::Request<Incoming>| {
                let inner = Arc::clone(&inner);
                let busy = activity.begin();
                async move {
                    let response = inner.handle(request, remote).await;
                    drop(busy);
                    Ok::<_, Infallible>(response)
                }
            })
        };

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.read_timeout())
            .keep_alive(true);
        let connection = builder.serve_connection(io, service);
        tokio::pin!(connection);

        let idle = self.config.idle_timeout();
        let mut draining = false;
        loop {
            tokio::select! {
                result = connection.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(%remote, error = %e, "connection error");
                    }
                    break;
                }
                () = self.shutdown.triggered(), if !draining => {
                    connection.as_mut().graceful_shutdown();
                    draining = true;
                }
                () = activity.idle_for(idle), if !draining && !idle.is_zero() => {
                    tracing::debug!(%remote, "closing idle connection");
                    connection.as_mut().graceful_shutdown();
                    draining = true;
                }
                () = self.requests.cancelled() => {
                    tracing::debug!(%remote, "connection force-closed");
                    break;
                }
            }
        }
    }

    async fn handle(&self, request: http::Request<Incoming>, remote: SocketAddr) -> Response {
        let mut ctx = RequestContext::with_cancellation(self.requests.child()).with_remote_addr(remote);
        let cancellation = ctx.cancellation().clone();
        // Cancels the request if hyper drops this future (peer gone).
        let on_drop = cancellation.drop_guard();

        let write_timeout = self.config.write_timeout();
        let response = match tokio::time::timeout(write_timeout, self.process(&mut ctx, request)).await {
            Ok(response) => response,
            Err(_) => {
                cancellation.cancel();
                tracing::warn!(
                    request_id = ctx.request_id().unwrap_or("-"),
                    %remote,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "request exceeded write timeout"
                );
                let err = Error::new(ErrorCode::DeadlineExceeded, "request timed out");
                with_request_id(response::error(&err, ctx.request_id()), ctx.request_id())
            }
        };
        on_drop.disarm();
        response
    }

    async fn process(&self, ctx: &mut RequestContext, request: http::Request<Incoming>) -> Response {
        let (parts, body) = request.into_parts();
        let limit = self.config.max_body_bytes();

        if declared_length(&parts.headers).is_some_and(|length| length > limit) {
            return reject(ctx, &parts.headers, too_large(limit));
        }

        let bytes = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return reject(ctx, &parts.headers, too_large(limit));
            }
            Err(e) => {
                let err = Error::wrap(e, ErrorCode::InvalidArgument, "failed to read request body");
                return reject(ctx, &parts.headers, err);
            }
        };

        let request = http::Request::from_parts(parts, Full::new(bytes));
        self.router.dispatch(ctx, request).await
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn too_large(limit: usize) -> Error {
    Error::resource_exhausted(format!("request body exceeds {limit} bytes")).with_field("limit", limit)
}

/// Answers a request rejected before dispatch, keeping the request id contract.
fn reject(ctx: &mut RequestContext, headers: &HeaderMap, err: Error) -> Response {
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_owned);
    ctx.set_request_id(request_id.as_str());
    tracing::debug!(request_id = %request_id, code = %err.code(), "request rejected before dispatch");
    with_request_id(response::error(&err, Some(&request_id)), Some(&request_id))
}

fn with_request_id(mut response: Response, request_id: Option<&str>) -> Response {
    if let Some(value) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Tracks in-flight requests and the last activity on one connection.
struct Activity {
    in_flight: AtomicUsize,
    last: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            last: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    fn begin(self: &Arc<Self>) -> Busy {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        Busy {
            activity: Arc::clone(self),
        }
    }

    /// Completes once no request has been in flight for `idle`.
    async fn idle_for(&self, idle: Duration) {
        loop {
            let busy = self.in_flight.load(Ordering::SeqCst) > 0;
            let quiet = self.last.lock().elapsed();
            if !busy && quiet >= idle {
                return;
            }
            let wait = if busy { idle } else { idle - quiet };
            tokio::time::sleep(wait).await;
        }
    }
}

struct Busy {
    activity: Arc<Activity>,
}

impl Drop for Busy {
    fn drop(&mut self) {
        self.activity.touch();
        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

//! Panic recovery.
//!
//! A panic anywhere inside the wrapped chain is caught, logged with its
//! message and a backtrace, and answered with a neutral 500 error envelope.
//! Nothing about the panic reaches the client.
//!
//! The backtrace has to be taken while the panicking frames are still on the
//! stack, so [`RecoveryMiddleware::new`] installs a process-wide panic hook
//! that records it in a thread local before chaining to the previous hook.
//! The future is polled on the panicking thread, so the record is there
//! when `catch_unwind` returns.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use dfs_http_core::{response, BoxFuture, Error, Request, RequestContext, Response};
use futures_util::FutureExt;

use crate::middleware::{Middleware, Next};

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs the backtrace-recording panic hook once per process.
fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            previous(info);
        }));
    });
}

/// Takes the backtrace recorded for the last panic on this thread.
fn take_panic_backtrace() -> Option<Backtrace> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// Converts panics into 500 responses.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryMiddleware {
    _private: (),
}

impl RecoveryMiddleware {
    /// Creates the middleware and installs the panic hook.
    #[must_use]
    pub fn new() -> Self {
        install_panic_hook();
        Self { _private: () }
    }
}

impl Default for RecoveryMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            match AssertUnwindSafe(next.run(ctx, request)).catch_unwind().await {
                Ok(response) => response,
                Err(payload) => {
                    let backtrace = take_panic_backtrace()
                        .map_or_else(|| "unavailable".to_owned(), |backtrace| backtrace.to_string());
                    tracing::error!(
                        request_id = ctx.request_id().unwrap_or("-"),
                        method = %method,
                        path = %path,
                        panic = panic_message(payload.as_ref()),
                        backtrace = %backtrace,
                        "handler panicked"
                    );
                    response::error(&Error::internal("internal server error"), ctx.request_id())
                }
            }
        })
    }
}

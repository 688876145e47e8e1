//! Transaction boundaries around write requests.
//!
//! For `POST`, `PUT`, `PATCH` and `DELETE` the middleware begins a
//! transaction, exposes its id through [`RequestContext::transaction_id`],
//! and after the handler:
//!
//! - commits when the status is 2xx or 3xx, answering `500` if the commit fails
//! - rolls back otherwise, logging a failed rollback
//!
//! A panic in the handler rolls back once and then resumes unwinding. A
//! request dropped mid-flight (timeout, client gone) is rolled back by a
//! guard on a spawned task.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dfs_http_core::services::TransactionManager;
use dfs_http_core::{response, BoxFuture, Error, Request, RequestContext, Response};
use futures_util::FutureExt;
use http::Method;

use crate::middleware::{Middleware, Next};

/// Returns `true` for methods that run inside a transaction.
#[must_use]
pub fn is_write_method(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Rolls back on drop unless disarmed.
struct RollbackGuard {
    manager: Arc<dyn TransactionManager>,
    transaction_id: Option<String>,
}

impl RollbackGuard {
    fn disarm(mut self) -> String {
        self.transaction_id.take().unwrap_or_default()
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        let Some(transaction_id) = self.transaction_id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(%transaction_id, "transaction abandoned outside a runtime");
            return;
        };
        let manager = Arc::clone(&self.manager);
        runtime.spawn(async move {
            match manager.rollback(&transaction_id).await {
                Ok(()) => tracing::warn!(%transaction_id, "abandoned transaction rolled back"),
                Err(err) => tracing::error!(%transaction_id, error = %err, "rollback failed"),
            }
        });
    }
}

/// Wraps write requests in a transaction.
#[derive(Clone)]
pub struct TransactionMiddleware {
    manager: Arc<dyn TransactionManager>,
}

impl TransactionMiddleware {
    /// Uses `manager` to begin, commit and roll back.
    #[must_use]
    pub fn new(manager: Arc<dyn TransactionManager>) -> Self {
        Self { manager }
    }

    async fn rollback(&self, transaction_id: &str, request_id: Option<&str>) {
        if let Err(err) = self.manager.rollback(transaction_id).await {
            tracing::error!(
                request_id = request_id.unwrap_or("-"),
                transaction_id,
                error = %err,
                "rollback failed"
            );
        }
    }
}

impl std::fmt::Debug for TransactionMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for TransactionMiddleware {
    fn name(&self) -> &'static str {
        "transaction"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if !is_write_method(request.method()) {
                return next.run(ctx, request).await;
            }

            let request_id = ctx.request_id().map(str::to_owned);
            let transaction_id = match self.manager.begin().await {
                Ok(id) => id,
                Err(err) => {
                    tracing::error!(
                        request_id = request_id.as_deref().unwrap_or("-"),
                        error = %err,
                        "failed to begin transaction"
                    );
                    return response::error(&err, request_id.as_deref());
                }
            };
            ctx.set_transaction_id(transaction_id.clone());
            let guard = RollbackGuard {
                manager: Arc::clone(&self.manager),
                transaction_id: Some(transaction_id),
            };

            let outcome = AssertUnwindSafe(next.run(ctx, request)).catch_unwind().await;
            let transaction_id = guard.disarm();

            let response = match outcome {
                Ok(response) => response,
                Err(panic) => {
                    self.rollback(&transaction_id, request_id.as_deref()).await;
                    std::panic::resume_unwind(panic);
                }
            };

            let status = response.status().as_u16();
            if (200..400).contains(&status) {
                if let Err(err) = self.manager.commit(&transaction_id).await {
                    tracing::error!(
                        request_id = request_id.as_deref().unwrap_or("-"),
                        transaction_id = %transaction_id,
                        error = %err,
                        "commit failed"
                    );
                    let err = Error::internal("failed to commit transaction").with_cause(err);
                    return response::error(&err, request_id.as_deref());
                }
                tracing::debug!(transaction_id = %transaction_id, "transaction committed");
            } else {
                self.rollback(&transaction_id, request_id.as_deref()).await;
                tracing::debug!(transaction_id = %transaction_id, status, "transaction rolled back");
            }
            response
        })
    }
}

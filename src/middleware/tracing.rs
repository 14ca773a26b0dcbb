use std::time::Duration;

use tracing::info;

use super::Middleware;
use crate::dispatcher::{DispatchResult, HandlerRequest};

/// Emits a structured event per dispatched request with its final status
/// and handler latency.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn after(&self, req: &HandlerRequest, res: &mut DispatchResult, latency: Duration) {
        match res {
            DispatchResult::Respond(wire) => info!(
                method = %req.method,
                path = %req.path,
                status = wire.status,
                latency_ms = latency.as_millis() as u64,
                "request completed"
            ),
            DispatchResult::Rewrite(location) => info!(
                method = %req.method,
                path = %req.path,
                location = %location,
                "request rewritten"
            ),
        }
    }
}

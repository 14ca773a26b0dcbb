use std::time::Duration;

use crate::dispatcher::{DispatchResult, HandlerRequest, WireResponse};

/// Hooks applied around every dispatch, in registration order.
///
/// `before` may short-circuit the handler by returning an early response;
/// `after` observes (and may mutate) the outgoing result.
pub trait Middleware: Send + Sync {
    fn before(&self, _req: &HandlerRequest) -> Option<WireResponse> {
        None
    }
    fn after(&self, _req: &HandlerRequest, _res: &mut DispatchResult, _latency: Duration) {}
}

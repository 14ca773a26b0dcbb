//! # Dispatcher Module
//!
//! Coroutine-based handler dispatch.
//!
//! Each registered handler owns a long-lived `may` coroutine fed by an MPSC
//! channel. Dispatching a matched request sends a job down that channel and
//! blocks the calling coroutine on a one-shot reply channel until the
//! handler terminates the exchange through its [`Reply`].
//!
//! A handler terminates with exactly one of the reply operations: `send`,
//! `not_found`, `server_error`, `redirect`, `render`, or `inner_redirect`.
//! The first five produce a wire response; `inner_redirect` produces a
//! rewrite that the server loop feeds back into route scanning on the same
//! exchange.
//!
//! Handler panics are caught and converted to 500 responses so one failing
//! handler cannot take down the server.

mod core;

pub use core::{
    BodyMode, DispatchResult, Dispatcher, Handler, HandlerJob, HandlerRequest, HandlerSender,
    Reply, WireResponse,
};

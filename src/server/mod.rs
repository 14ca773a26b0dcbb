//! HTTP server built on `may_minihttp`.
//!
//! [`Server`] is the embedding application's entry point: it owns the
//! settings, route table, and dispatcher (no ambient globals), exposes the
//! registration API, and turns into an [`AppService`] when started. The
//! service parses each inbound request, runs the dispatch loop (including
//! internal redirects and the static-file fallback), writes the wire
//! response, and records the access-log line exactly once per exchange.

pub mod access_log;
mod core;
pub mod http_server;
pub mod request;
pub mod response;
mod service;

pub use access_log::{AccessLog, LogSink};
pub use core::Server;
pub use http_server::{HttpServer, ServerHandle};
pub use request::{parse_cookies, parse_request, ParsedRequest};
pub use service::AppService;

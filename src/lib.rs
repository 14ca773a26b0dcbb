//! # basehttp
//!
//! A small coroutine-powered HTTP application server built on the `may`
//! runtime: regex-routed dispatch, per-handler coroutines, generated CRUD
//! resource controllers, template rendering, signed cookies, and a
//! static-file fallback.
//!
//! ## Architecture
//!
//! - **[`router`]** - anchored regex path matching, first-match-wins scan
//! - **[`dispatcher`]** - per-handler coroutines and the [`dispatcher::Reply`]
//!   response augmenter
//! - **[`server`]** - the [`server::Server`] registration API and the
//!   `may_minihttp` service loop
//! - **[`resource`]** - generated index/show/create/update/destroy handlers
//!   over a shared store
//! - **[`multipart`]** - multipart/form-data parsing for form submissions
//! - **[`templates`]** - file-based template rendering
//! - **[`cookies`]** - cookie parsing and HMAC-signed cookies
//! - **[`static_files`]** - filesystem fallback for unmatched GET/HEAD
//! - **[`middleware`]** - before/after hooks around every dispatch
//! - **[`config`]** - the immutable per-server [`config::Settings`] bag
//!
//! ## Example
//!
//! ```no_run
//! use basehttp::config::Settings;
//! use basehttp::dispatcher::{BodyMode, HandlerRequest, Reply};
//! use basehttp::server::Server;
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut server = Server::new(Settings::builder().static_path("public").build());
//!     server.get(
//!         "/hello/{name}",
//!         Arc::new(|req: HandlerRequest, reply: Reply| {
//!             let name = req.capture(0).unwrap_or("world");
//!             reply.send(200, Value::String(format!("hi {name}")), "text/plain", None);
//!         }),
//!     )?;
//!     server.resource_controller("items", BodyMode::Json, None)?;
//!     let handle = server.start("0.0.0.0:8080")?;
//!     handle.join().ok();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cookies;
pub mod dispatcher;
pub mod middleware;
pub mod multipart;
pub mod resource;
pub mod router;
pub mod server;
pub mod static_files;
pub mod templates;

pub use config::{Settings, SettingsBuilder, TlsOptions};
pub use dispatcher::{
    BodyMode, DispatchResult, Dispatcher, Handler, HandlerRequest, Reply, WireResponse,
};
pub use resource::{OnChange, ResourceController, ResourceStore};
pub use router::{PathPattern, Route, RouteMatch, Router};
pub use server::{AppService, HttpServer, Server, ServerHandle};

//! # Router Module
//!
//! Path matching and route-table bookkeeping.
//!
//! Route patterns are compiled once at registration into anchored regexes and
//! scanned linearly at request time. The scan is first-match-wins in
//! registration order: no priority or specificity ranking exists, and a route
//! that is fully shadowed by an earlier identical pattern is simply
//! unreachable. That is accepted behavior, not an error.
//!
//! ## Pattern forms
//!
//! Two pattern forms are supported:
//!
//! 1. **Segment placeholders** - `/pets/{id}` matches one path segment per
//!    placeholder and captures it.
//! 2. **Regex source** - any other string is compiled as a regex over the
//!    whole path (`/items/(\w+)`), with its capture groups extracted in
//!    order. Multi-segment captures like `(.*)` are allowed.
//!
//! Both forms are anchored at both ends; partial matches never succeed.
//! Captures are URL-unescaped before they reach a handler.

mod core;

pub use core::{PathPattern, Route, RouteMatch, Router};

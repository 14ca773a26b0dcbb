use crate::dispatcher::BodyMode;
use http::Method;
use regex::Regex;
use tracing::{debug, info, warn};

/// A compiled matching rule over a path string.
///
/// Compiled once at registration; matching at dispatch time produces the
/// ordered capture groups or a no-match signal. The capture count is fixed
/// when the pattern is compiled.
#[derive(Debug, Clone)]
pub struct PathPattern {
    regex: Regex,
    source: String,
    capture_count: usize,
}

impl PathPattern {
    /// Compile a pattern string.
    ///
    /// A pattern containing `{name}` segments is treated as a placeholder
    /// path where each placeholder matches a single segment. Any other
    /// string is compiled as a regex over the whole path. Either way the
    /// result is anchored at both ends.
    ///
    /// # Errors
    ///
    /// Returns an error when the regex source does not compile. Surfacing
    /// this at registration keeps dispatch infallible.
    pub fn compile(pattern: &str) -> anyhow::Result<Self> {
        let body = if has_placeholders(pattern) {
            placeholders_to_regex(pattern)
        } else {
            pattern.to_string()
        };
        let anchored = format!("^{body}$");
        let regex = Regex::new(&anchored)
            .map_err(|e| anyhow::anyhow!("invalid route pattern {pattern:?}: {e}"))?;
        let capture_count = regex.captures_len() - 1;
        Ok(Self {
            regex,
            source: pattern.to_string(),
            capture_count,
        })
    }

    /// The pattern string this matcher was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of capture groups every successful match produces.
    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.capture_count
    }

    /// Match a path, returning the ordered, URL-unescaped captures.
    ///
    /// A match whose consumed span has zero length is treated as no match;
    /// an `^$`-style pattern must not accidentally claim a request. Captures
    /// that matched an empty span come through as empty strings, and groups
    /// that did not participate come through as empty strings as well.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(path)?;
        let whole = caps.get(0)?;
        if whole.as_str().is_empty() {
            return None;
        }
        let captured = caps
            .iter()
            .skip(1)
            .map(|m| {
                let raw = m.map(|m| m.as_str()).unwrap_or("");
                urlencoding::decode(raw)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| raw.to_string())
            })
            .collect();
        Some(captured)
    }
}

fn has_placeholders(pattern: &str) -> bool {
    pattern
        .split('/')
        .any(|seg| seg.len() > 2 && seg.starts_with('{') && seg.ends_with('}'))
}

/// Convert a placeholder path like `/pets/{id}` into a regex body,
/// escaping literal segments and turning each placeholder into `([^/]+)`.
fn placeholders_to_regex(path: &str) -> String {
    let mut pattern = String::with_capacity(path.len() + 8);
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        pattern.push('/');
        if segment.starts_with('{') && segment.ends_with('}') {
            pattern.push_str("([^/]+)");
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }
    if pattern.is_empty() {
        pattern.push('/');
    }
    pattern
}

/// A single route record: method, compiled matcher, body mode, and the id of
/// the handler the dispatcher invokes on a match. Immutable once appended.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    pub pattern: PathPattern,
    pub body_mode: BodyMode,
    pub handler_id: usize,
}

/// Result of successfully matching a request path to a route.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// Id of the handler registered for the matched route.
    pub handler_id: usize,
    /// Body acquisition mode declared at registration.
    pub body_mode: BodyMode,
    /// Ordered captures extracted from the path, already URL-unescaped.
    pub captures: Vec<String>,
    /// Pattern source of the matched route, for logging.
    pub pattern: String,
}

/// Insertion-ordered route table.
///
/// Append-only at setup time, read-only (scanned linearly) at request time.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Registration order is preserved; no de-duplication or
    /// conflict detection happens here - a later identical pattern is simply
    /// shadowed.
    ///
    /// # Errors
    ///
    /// Returns an error when the pattern does not compile.
    pub fn add_route(
        &mut self,
        method: Method,
        pattern: &str,
        body_mode: BodyMode,
        handler_id: usize,
    ) -> anyhow::Result<()> {
        let pattern = PathPattern::compile(pattern)?;
        info!(
            method = %method,
            pattern = %pattern.source(),
            body_mode = ?body_mode,
            handler_id,
            total_routes = self.routes.len() + 1,
            "Route registered"
        );
        self.routes.push(Route {
            method,
            pattern,
            body_mode,
            handler_id,
        });
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Scan the table in registration order for the first route whose method
    /// equals the request method and whose matcher succeeds.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        debug!(method = %method, path = %path, "Route match attempt");
        for route in &self.routes {
            if route.method != *method {
                continue;
            }
            if let Some(captures) = route.pattern.match_path(path) {
                info!(
                    method = %method,
                    path = %path,
                    pattern = %route.pattern.source(),
                    captures = ?captures,
                    "Route matched"
                );
                return Some(RouteMatch {
                    handler_id: route.handler_id,
                    body_mode: route.body_mode,
                    captures,
                    pattern: route.pattern.source().to_string(),
                });
            }
        }
        warn!(method = %method, path = %path, "No route matched");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_pattern_captures_segment() {
        let p = PathPattern::compile("/pets/{id}").unwrap();
        assert_eq!(p.capture_count(), 1);
        assert_eq!(p.match_path("/pets/123"), Some(vec!["123".to_string()]));
        assert_eq!(p.match_path("/pets/123/extra"), None);
    }

    #[test]
    fn test_regex_pattern_is_anchored() {
        let p = PathPattern::compile(r"/items/(\w+)").unwrap();
        assert_eq!(p.match_path("/items/5"), Some(vec!["5".to_string()]));
        assert_eq!(p.match_path("/items/5/extra"), None);
        assert_eq!(p.match_path("/prefix/items/5"), None);
    }

    #[test]
    fn test_empty_consumed_span_is_no_match() {
        let p = PathPattern::compile(r"(x?)").unwrap();
        assert_eq!(p.match_path(""), None);
    }

    #[test]
    fn test_captures_are_unescaped() {
        let p = PathPattern::compile("/files/([^/]+)").unwrap();
        assert_eq!(
            p.match_path("/files/a%20b"),
            Some(vec!["a b".to_string()])
        );
    }

    #[test]
    fn test_optional_group_yields_empty_capture() {
        let p = PathPattern::compile(r"/opt(/\w+)?").unwrap();
        assert_eq!(p.match_path("/opt"), Some(vec![String::new()]));
    }

    #[test]
    fn test_first_match_wins() {
        let mut router = Router::new();
        router
            .add_route(Method::GET, r"/a/(\w+)", BodyMode::None, 0)
            .unwrap();
        router
            .add_route(Method::GET, r"/a/(\w+)", BodyMode::None, 1)
            .unwrap();
        let m = router.route(&Method::GET, "/a/x").unwrap();
        assert_eq!(m.handler_id, 0);
    }

    #[test]
    fn test_method_mismatch_skips_route() {
        let mut router = Router::new();
        router
            .add_route(Method::POST, "/only-post", BodyMode::Json, 0)
            .unwrap();
        assert!(router.route(&Method::GET, "/only-post").is_none());
        assert!(router.route(&Method::POST, "/only-post").is_some());
    }

    #[test]
    fn test_literal_segments_are_escaped_in_placeholder_form() {
        let p = PathPattern::compile("/v1.0/{id}").unwrap();
        assert!(p.match_path("/v1.0/7").is_some());
        assert!(p.match_path("/v1x0/7").is_none());
    }
}

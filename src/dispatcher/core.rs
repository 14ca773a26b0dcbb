use crate::config::Settings;
use crate::cookies::CookieJar;
use crate::middleware::Middleware;
use crate::multipart::FormData;
use crate::templates::{self, RenderError};
use http::Method;
use may::coroutine;
use may::sync::mpsc;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How the request payload is acquired before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// No body acquisition was requested. POST requests in this mode are
    /// still treated as form submissions; every other method invokes the
    /// handler immediately with only the path captures.
    None,
    /// Buffer the full body as text, URL-unescape it, parse it as JSON.
    /// Parse failure yields no body to the handler rather than an error.
    Json,
    /// Hand the buffered body to the multipart form parser.
    Multipart,
}

/// Request data passed to a handler coroutine.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request path, query string stripped.
    pub path: String,
    /// Ordered captures from the matched pattern, URL-unescaped.
    pub captures: Vec<String>,
    /// HTTP headers (lowercase keys).
    pub headers: HashMap<String, String>,
    /// Cookie jar, signature-aware when cookie keys are configured.
    pub cookies: CookieJar,
    /// JSON body for `BodyMode::Json` routes. `None` when the body was
    /// missing or failed to parse; the handler decides what to do about it.
    pub body: Option<Value>,
    /// Field/file maps for form submissions.
    pub form: Option<FormData>,
}

impl HandlerRequest {
    /// Positional capture by index, if present.
    #[must_use]
    pub fn capture(&self, index: usize) -> Option<&str> {
        self.captures.get(index).map(String::as_str)
    }

    /// Header by name (case-insensitive keys are lowercased at parse time).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// A fully materialized HTTP response, ready to be written to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Body bytes are withheld on the wire for HEAD exchanges.
    pub head_only: bool,
}

impl WireResponse {
    /// Plain-text response with Content-Type/Content-Length set.
    #[must_use]
    pub fn text(status: u16, message: &str) -> Self {
        Self {
            status,
            headers: vec![
                ("Content-Type".to_string(), "text/plain".to_string()),
                ("Content-Length".to_string(), message.len().to_string()),
            ],
            body: message.as_bytes().to_vec(),
            head_only: false,
        }
    }
}

/// Outcome of one dispatch: either a response to write, or an internal
/// redirect to re-scan under a new path on the same exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Respond(WireResponse),
    Rewrite(String),
}

/// The response augmenter handed to every handler.
///
/// Wraps the reply channel with the convenience operations a handler uses to
/// terminate the exchange. Each terminal operation consumes the `Reply`, so
/// a handler answers exactly once by construction.
pub struct Reply {
    tx: mpsc::Sender<DispatchResult>,
    is_head: bool,
    settings: Arc<Settings>,
    jar: CookieJar,
    pending_headers: Vec<(String, String)>,
}

impl Reply {
    #[must_use]
    pub fn new(
        tx: mpsc::Sender<DispatchResult>,
        is_head: bool,
        settings: Arc<Settings>,
        jar: CookieJar,
    ) -> Self {
        Self {
            tx,
            is_head,
            settings,
            jar,
            pending_headers: Vec::new(),
        }
    }

    fn raw_sender(&self) -> mpsc::Sender<DispatchResult> {
        self.tx.clone()
    }

    fn finish(self, mut wire: WireResponse) {
        wire.head_only = self.is_head;
        wire.headers.extend(self.pending_headers);
        let _ = self.tx.send(DispatchResult::Respond(wire));
    }

    /// Queue a `Set-Cookie` header (plus its signature companion when
    /// cookie keys are configured) on the eventual response.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        for header in self.jar.set_cookie_headers(name, value) {
            self.pending_headers.push(("Set-Cookie".to_string(), header));
        }
    }

    /// Write a response: sets `Content-Type` and `Content-Length`, writes
    /// the body (suppressed for HEAD requests), ends the exchange.
    ///
    /// The body must be a string value. Anything else is handler misuse and
    /// overrides the response with a plain-text 500, regardless of the
    /// requested status code.
    pub fn send(
        self,
        status: u16,
        body: Value,
        content_type: &str,
        extra_headers: Option<Vec<(String, String)>>,
    ) {
        let Value::String(text) = body else {
            warn!(status, "non-string body passed to send, overriding with 500");
            self.finish(WireResponse::text(500, "Internal Server Error"));
            return;
        };
        let mut headers = extra_headers.unwrap_or_default();
        headers.push(("Content-Type".to_string(), content_type.to_string()));
        headers.push(("Content-Length".to_string(), text.len().to_string()));
        self.finish(WireResponse {
            status,
            headers,
            body: text.into_bytes(),
            head_only: false,
        });
    }

    /// 404 with an optional plain-text message.
    pub fn not_found(self, message: Option<&str>) {
        let message = message.unwrap_or("Not Found");
        self.send(404, Value::String(message.to_string()), "text/plain", None);
    }

    /// 500 with an optional plain-text message.
    pub fn server_error(self, message: Option<&str>) {
        let message = message.unwrap_or("Internal Server Error");
        self.send(500, Value::String(message.to_string()), "text/plain", None);
    }

    /// 302 to `location`; an empty location is handler misuse and becomes a
    /// 500 instead.
    pub fn redirect(self, location: &str) {
        if location.is_empty() {
            self.server_error(Some("Redirect Error"));
            return;
        }
        self.finish(WireResponse {
            status: 302,
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
            head_only: false,
        });
    }

    /// Re-enter route scanning under `location` on the same exchange,
    /// without a new transport-level request. The server loop bounds the
    /// rewrite depth, so a redirect cycle terminates with a 500.
    pub fn inner_redirect(self, location: &str) {
        if location.is_empty() {
            self.server_error(Some("Inner Redirect Error"));
            return;
        }
        info!(location = %location, "Internal redirect");
        let _ = self.tx.send(DispatchResult::Rewrite(location.to_string()));
    }

    /// Render a template resolved against the configured template root.
    /// Missing template is a 404, render failure a 500, success a 200
    /// `text/html` response.
    pub fn render(self, filepath: &str, vars: Option<Value>) {
        let vars = vars.unwrap_or_else(|| Value::Object(Default::default()));
        let root = self.settings.template_path().map(Path::to_path_buf);
        match templates::render_file(Path::new(filepath), &vars, root.as_deref()) {
            Ok(html) => self.send(200, Value::String(html), "text/html", None),
            Err(RenderError::NotFound(path)) => {
                debug!(path = %path.display(), "template not found");
                self.not_found(None);
            }
            Err(RenderError::Render(detail)) => {
                error!(error = %detail, "template render failed");
                self.server_error(Some(&format!("Template Error: {detail}")));
            }
        }
    }
}

/// A job sent to a handler coroutine: the parsed request plus the reply
/// the handler must consume.
pub struct HandlerJob {
    pub request: HandlerRequest,
    pub reply: Reply,
}

/// Type alias for a channel sender that feeds a handler coroutine.
pub type HandlerSender = mpsc::Sender<HandlerJob>;

/// Handler function invoked with the request and its reply.
pub type Handler = Arc<dyn Fn(HandlerRequest, Reply) + Send + Sync>;

/// Dispatcher owning one channel sender per registered handler, indexed by
/// the handler id recorded in the route table, plus the middleware chain
/// applied around every dispatch.
#[derive(Clone, Default)]
pub struct Dispatcher {
    senders: Vec<HandlerSender>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.middlewares.push(mw);
    }

    /// Spawn a coroutine for the handler and return its id.
    ///
    /// The coroutine drains its channel for the lifetime of the dispatcher.
    /// Panics inside the handler are caught and converted to 500 replies.
    ///
    /// # Safety
    ///
    /// `may::coroutine::Builder::spawn` is unsafe in the `may` runtime; the
    /// caller must ensure the runtime is initialized before registration.
    pub unsafe fn register_handler(&mut self, handler_fn: Handler) -> usize {
        let (tx, rx) = mpsc::channel::<HandlerJob>();
        let handler_id = self.senders.len();

        let stack_size = std::env::var("BASEHTTP_STACK_SIZE")
            .ok()
            .and_then(|s| {
                if let Some(hex) = s.strip_prefix("0x") {
                    usize::from_str_radix(hex, 16).ok()
                } else {
                    s.parse().ok()
                }
            })
            .unwrap_or(0x10000);

        // SAFETY: spawn is unsafe per the may runtime, not this logic. The
        // closure is Send + 'static and replies flow through the channel.
        let spawn_result = unsafe {
            coroutine::Builder::new()
                .stack_size(stack_size)
                .spawn(move || {
                    debug!(handler_id, stack_size, "Handler coroutine start");
                    for job in rx.iter() {
                        let reply_tx = job.reply.raw_sender();
                        let path = job.request.path.clone();
                        if let Err(panic) =
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                                handler_fn(job.request, job.reply);
                            }))
                        {
                            error!(handler_id, path = %path, panic = ?panic, "Handler panicked");
                            let _ = reply_tx.send(DispatchResult::Respond(WireResponse::text(
                                500,
                                "Internal Server Error",
                            )));
                        }
                    }
                })
        };

        if let Err(e) = spawn_result {
            error!(handler_id, error = %e, "Failed to spawn handler coroutine");
        }

        self.senders.push(tx);
        handler_id
    }

    /// Send the request to its handler coroutine and wait for the outcome.
    ///
    /// Runs middleware `before` hooks first (any of which may short-circuit
    /// with an early response) and `after` hooks on the way out. Returns
    /// `None` only when the handler id is unknown or its channel is gone.
    #[must_use]
    pub fn dispatch(
        &self,
        handler_id: usize,
        request: HandlerRequest,
        settings: &Arc<Settings>,
    ) -> Option<DispatchResult> {
        let tx = match self.senders.get(handler_id) {
            Some(tx) => tx,
            None => {
                error!(handler_id, "Handler not registered");
                return None;
            }
        };

        // First short-circuit wins; later before hooks never see the
        // request. Every after hook still observes the outcome.
        let mut early: Option<WireResponse> = None;
        for mw in &self.middlewares {
            early = mw.before(&request);
            if early.is_some() {
                break;
            }
        }

        let (mut result, latency) = if let Some(wire) = early {
            (DispatchResult::Respond(wire), Duration::from_millis(0))
        } else {
            let (reply_tx, reply_rx) = mpsc::channel();
            let reply = Reply::new(
                reply_tx,
                request.method == Method::HEAD,
                Arc::clone(settings),
                request.cookies.clone(),
            );
            let start = Instant::now();
            debug!(handler_id, path = %request.path, "Request dispatched to handler");
            if tx
                .send(HandlerJob {
                    request: request.clone(),
                    reply,
                })
                .is_err()
            {
                error!(handler_id, "Handler channel closed");
                return None;
            }
            let result = match reply_rx.recv() {
                Ok(r) => r,
                Err(e) => {
                    error!(handler_id, error = %e, "Handler reply channel closed");
                    return None;
                }
            };
            (result, start.elapsed())
        };

        for mw in &self.middlewares {
            mw.after(&request, &mut result, latency);
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_request(method: Method) -> HandlerRequest {
        HandlerRequest {
            method,
            path: "/x".to_string(),
            captures: Vec::new(),
            headers: HashMap::new(),
            cookies: CookieJar::new(HashMap::new(), &[]),
            body: None,
            form: None,
        }
    }

    fn recv_wire(rx: &mpsc::Receiver<DispatchResult>) -> WireResponse {
        match rx.recv().unwrap() {
            DispatchResult::Respond(w) => w,
            DispatchResult::Rewrite(p) => panic!("unexpected rewrite to {p}"),
        }
    }

    #[test]
    fn test_send_sets_length_and_type() {
        let (tx, rx) = mpsc::channel();
        let reply = Reply::new(
            tx,
            false,
            Arc::new(Settings::default()),
            CookieJar::new(HashMap::new(), &[]),
        );
        reply.send(200, Value::String("body".into()), "text/plain", None);
        let wire = recv_wire(&rx);
        assert_eq!(wire.status, 200);
        assert_eq!(wire.body, b"body");
        assert!(wire
            .headers
            .contains(&("Content-Length".to_string(), "4".to_string())));
    }

    #[test]
    fn test_non_string_body_forces_500() {
        let (tx, rx) = mpsc::channel();
        let reply = Reply::new(
            tx,
            false,
            Arc::new(Settings::default()),
            CookieJar::new(HashMap::new(), &[]),
        );
        reply.send(200, serde_json::json!({"a": 1}), "application/json", None);
        let wire = recv_wire(&rx);
        assert_eq!(wire.status, 500);
        assert_eq!(wire.body, b"Internal Server Error");
    }

    #[test]
    fn test_head_suppression_marks_response() {
        let (tx, rx) = mpsc::channel();
        let reply = Reply::new(
            tx,
            true,
            Arc::new(Settings::default()),
            CookieJar::new(HashMap::new(), &[]),
        );
        reply.send(200, Value::String("body".into()), "text/plain", None);
        let wire = recv_wire(&rx);
        assert!(wire.head_only);
        assert!(wire
            .headers
            .contains(&("Content-Length".to_string(), "4".to_string())));
    }

    #[test]
    fn test_empty_redirect_is_server_error() {
        let (tx, rx) = mpsc::channel();
        let reply = Reply::new(
            tx,
            false,
            Arc::new(Settings::default()),
            CookieJar::new(HashMap::new(), &[]),
        );
        reply.redirect("");
        let wire = recv_wire(&rx);
        assert_eq!(wire.status, 500);
        assert_eq!(wire.body, b"Redirect Error");
    }

    #[test]
    fn test_inner_redirect_yields_rewrite() {
        let (tx, rx) = mpsc::channel();
        let reply = Reply::new(
            tx,
            false,
            Arc::new(Settings::default()),
            CookieJar::new(HashMap::new(), &[]),
        );
        reply.inner_redirect("/elsewhere");
        assert_eq!(
            rx.recv().unwrap(),
            DispatchResult::Rewrite("/elsewhere".to_string())
        );
    }

    #[test]
    fn test_dispatch_round_trip() {
        may::config().set_stack_size(0x10000);
        let mut dispatcher = Dispatcher::new();
        let id = unsafe {
            dispatcher.register_handler(Arc::new(|req: HandlerRequest, reply: Reply| {
                reply.send(
                    200,
                    Value::String(format!("saw {}", req.path)),
                    "text/plain",
                    None,
                );
            }))
        };
        let settings = Arc::new(Settings::default());
        let result = dispatcher
            .dispatch(id, test_request(Method::GET), &settings)
            .unwrap();
        match result {
            DispatchResult::Respond(wire) => assert_eq!(wire.body, b"saw /x"),
            DispatchResult::Rewrite(_) => panic!("unexpected rewrite"),
        }
    }

    #[test]
    fn test_unknown_handler_id_is_none() {
        let dispatcher = Dispatcher::new();
        let settings = Arc::new(Settings::default());
        assert!(dispatcher
            .dispatch(7, test_request(Method::GET), &settings)
            .is_none());
    }
}

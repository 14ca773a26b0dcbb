use super::access_log::AccessLog;
use super::request::{parse_cookies, parse_request};
use super::response::write_wire_response;
use crate::config::Settings;
use crate::cookies::CookieJar;
use crate::dispatcher::{BodyMode, DispatchResult, Dispatcher, HandlerRequest, WireResponse};
use crate::multipart::{self, FormData};
use crate::router::{RouteMatch, Router};
use crate::static_files::StaticFiles;
use http::Method;
use may_minihttp::{HttpService, Request, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use tracing::{error, warn};

/// Upper bound on same-exchange internal redirects. A handler that keeps
/// rewriting the path back onto itself terminates with a 500 instead of
/// recursing forever.
const MAX_REWRITE_DEPTH: usize = 8;

/// The request-serving half of the server: shared, read-only routing state
/// plus per-request dispatch.
#[derive(Clone)]
pub struct AppService {
    pub(crate) settings: Arc<Settings>,
    pub(crate) router: Arc<Router>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) static_files: Option<Arc<StaticFiles>>,
    pub(crate) access_log: AccessLog,
}

enum AcquiredBody {
    Payload(Option<Value>, Option<FormData>),
    Failed(WireResponse),
}

impl AppService {
    /// Resolve the request payload for a matched route.
    ///
    /// JSON-mode parse failures become a missing body for the handler to
    /// reject; multipart parse failures abort the exchange with a 500
    /// before the handler runs.
    fn acquire_body(
        &self,
        route: &RouteMatch,
        method: &Method,
        headers: &HashMap<String, String>,
        body: &[u8],
    ) -> AcquiredBody {
        match route.body_mode {
            BodyMode::Json => {
                let text = String::from_utf8_lossy(body);
                let unescaped = urlencoding::decode(&text)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| text.clone().into_owned());
                let parsed = serde_json::from_str(&unescaped).ok();
                if parsed.is_none() && !body.is_empty() {
                    warn!(pattern = %route.pattern, "JSON body failed to parse, handler sees no body");
                }
                AcquiredBody::Payload(parsed, None)
            }
            BodyMode::Multipart => self.parse_form(headers, body),
            // A POST that never asked for a body mode is a form submission
            // by convention; everything else carries captures only.
            BodyMode::None if *method == Method::POST => self.parse_form(headers, body),
            BodyMode::None => AcquiredBody::Payload(None, None),
        }
    }

    fn parse_form(&self, headers: &HashMap<String, String>, body: &[u8]) -> AcquiredBody {
        let content_type = headers.get("content-type").map(String::as_str).unwrap_or("");
        match multipart::parse_form(content_type, body) {
            Ok(form) => AcquiredBody::Payload(None, Some(form)),
            Err(err) => {
                error!(error = %err, "multipart parse failed, aborting exchange");
                AcquiredBody::Failed(WireResponse::text(500, "Internal Server Error"))
            }
        }
    }

    fn static_fallback(&self, method: &Method, path: &str) -> Option<WireResponse> {
        if *method != Method::GET && *method != Method::HEAD {
            return None;
        }
        let sf = self.static_files.as_ref()?;
        let (bytes, content_type) = sf.load(path).ok()?;
        Some(WireResponse {
            status: 200,
            headers: vec![
                ("Content-Type".to_string(), content_type.to_string()),
                ("Content-Length".to_string(), bytes.len().to_string()),
            ],
            body: bytes,
            head_only: false,
        })
    }

    /// Drive one exchange to a final wire response: scan, acquire body,
    /// dispatch, and loop on internal redirects up to the depth bound.
    ///
    /// This is the whole request pipeline minus the transport, so tests can
    /// exercise routing and handlers without opening a socket.
    pub fn respond(
        &self,
        method: &Method,
        initial_path: &str,
        headers: &HashMap<String, String>,
        cookies: &HashMap<String, String>,
        body: &[u8],
    ) -> WireResponse {
        let mut path = initial_path.to_string();
        let mut depth = 0usize;
        loop {
            let Some(route) = self.router.route(method, &path) else {
                if let Some(wire) = self.static_fallback(method, &path) {
                    return wire;
                }
                return WireResponse::text(404, "Not Found");
            };

            let (json_body, form) = match self.acquire_body(&route, method, headers, body) {
                AcquiredBody::Payload(json_body, form) => (json_body, form),
                AcquiredBody::Failed(wire) => return wire,
            };

            let request = HandlerRequest {
                method: method.clone(),
                path: path.clone(),
                captures: route.captures.clone(),
                headers: headers.clone(),
                cookies: CookieJar::new(cookies.clone(), self.settings.cookie_keys()),
                body: json_body,
                form,
            };

            match self.dispatcher.dispatch(route.handler_id, request, &self.settings) {
                Some(DispatchResult::Respond(wire)) => return wire,
                Some(DispatchResult::Rewrite(location)) => {
                    depth += 1;
                    if depth > MAX_REWRITE_DEPTH {
                        error!(
                            path = %path,
                            location = %location,
                            depth,
                            "internal redirect depth exceeded"
                        );
                        return WireResponse::text(500, "Internal Server Error");
                    }
                    path = location;
                }
                None => return WireResponse::text(500, "Internal Server Error"),
            }
        }
    }
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let parsed = parse_request(req);

        let Ok(method) = parsed.method.parse::<Method>() else {
            let wire = WireResponse::text(400, "Bad Request");
            let status = wire.status;
            write_wire_response(res, wire);
            self.access_log.record(&parsed, status);
            return Ok(());
        };

        let cookies = parse_cookies(&parsed.headers);
        let mut wire =
            self.respond(&method, &parsed.path, &parsed.headers, &cookies, &parsed.body);
        if method == Method::HEAD {
            wire.head_only = true;
        }
        let status = wire.status;
        write_wire_response(res, wire);
        // Exactly one log line per exchange, with the final status.
        self.access_log.record(&parsed, status);
        Ok(())
    }
}

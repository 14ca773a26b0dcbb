mod common;

use basehttp::config::Settings;
use basehttp::cookies::CookieJar;
use basehttp::dispatcher::{
    DispatchResult, Dispatcher, HandlerRequest, Reply, WireResponse,
};
use basehttp::middleware::Middleware;
use http::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn request(path: &str) -> HandlerRequest {
    HandlerRequest {
        method: Method::GET,
        path: path.to_string(),
        captures: Vec::new(),
        headers: HashMap::new(),
        cookies: CookieJar::new(HashMap::new(), &[]),
        body: None,
        form: None,
    }
}

fn respond(result: DispatchResult) -> WireResponse {
    match result {
        DispatchResult::Respond(wire) => wire,
        DispatchResult::Rewrite(p) => panic!("unexpected rewrite to {p}"),
    }
}

#[test]
fn test_handler_panic_becomes_500() {
    common::setup_may_runtime();
    let mut dispatcher = Dispatcher::new();
    let id = unsafe {
        dispatcher.register_handler(Arc::new(|_req: HandlerRequest, _reply: Reply| {
            panic!("boom");
        }))
    };
    let settings = Arc::new(Settings::default());
    let wire = respond(dispatcher.dispatch(id, request("/x"), &settings).unwrap());
    assert_eq!(wire.status, 500);
    assert_eq!(wire.body, b"Internal Server Error");
}

#[test]
fn test_handler_survives_after_panic() {
    common::setup_may_runtime();
    let mut dispatcher = Dispatcher::new();
    let id = unsafe {
        dispatcher.register_handler(Arc::new(|req: HandlerRequest, reply: Reply| {
            if req.path == "/panic" {
                panic!("boom");
            }
            reply.send(200, Value::String("ok".into()), "text/plain", None);
        }))
    };
    let settings = Arc::new(Settings::default());
    let wire = respond(
        dispatcher
            .dispatch(id, request("/panic"), &settings)
            .unwrap(),
    );
    assert_eq!(wire.status, 500);
    // The coroutine keeps draining its channel after the panic.
    let wire = respond(dispatcher.dispatch(id, request("/ok"), &settings).unwrap());
    assert_eq!(wire.status, 200);
    assert_eq!(wire.body, b"ok");
}

struct Deny;

impl Middleware for Deny {
    fn before(&self, _req: &HandlerRequest) -> Option<WireResponse> {
        Some(WireResponse::text(401, "Unauthorized"))
    }
}

struct CountingDeny {
    calls: Arc<AtomicUsize>,
    status: u16,
}

impl Middleware for CountingDeny {
    fn before(&self, _req: &HandlerRequest) -> Option<WireResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(WireResponse::text(self.status, "denied"))
    }
}

struct CountAfter(Arc<AtomicUsize>);

impl Middleware for CountAfter {
    fn after(&self, _req: &HandlerRequest, _res: &mut DispatchResult, _latency: Duration) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_middleware_before_short_circuits() {
    common::setup_may_runtime();
    let handled = Arc::new(AtomicUsize::new(0));
    let saw_handler = Arc::clone(&handled);
    let mut dispatcher = Dispatcher::new();
    let id = unsafe {
        dispatcher.register_handler(Arc::new(move |_req: HandlerRequest, reply: Reply| {
            saw_handler.fetch_add(1, Ordering::SeqCst);
            reply.send(200, Value::String("ok".into()), "text/plain", None);
        }))
    };
    let after_calls = Arc::new(AtomicUsize::new(0));
    dispatcher.add_middleware(Arc::new(Deny));
    dispatcher.add_middleware(Arc::new(CountAfter(Arc::clone(&after_calls))));

    let settings = Arc::new(Settings::default());
    let wire = respond(dispatcher.dispatch(id, request("/x"), &settings).unwrap());
    assert_eq!(wire.status, 401);
    assert_eq!(handled.load(Ordering::SeqCst), 0);
    // After hooks still run on a short-circuited dispatch.
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_first_before_short_circuit_wins() {
    common::setup_may_runtime();
    let mut dispatcher = Dispatcher::new();
    let id = unsafe {
        dispatcher.register_handler(Arc::new(|_req: HandlerRequest, reply: Reply| {
            reply.send(200, Value::String("ok".into()), "text/plain", None);
        }))
    };
    let first_calls = Arc::new(AtomicUsize::new(0));
    let second_calls = Arc::new(AtomicUsize::new(0));
    dispatcher.add_middleware(Arc::new(CountingDeny {
        calls: Arc::clone(&first_calls),
        status: 401,
    }));
    dispatcher.add_middleware(Arc::new(CountingDeny {
        calls: Arc::clone(&second_calls),
        status: 403,
    }));

    let settings = Arc::new(Settings::default());
    let wire = respond(dispatcher.dispatch(id, request("/x"), &settings).unwrap());
    // The first denial answers; the second before hook never runs, so its
    // response cannot be dropped on the floor.
    assert_eq!(wire.status, 401);
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_set_cookie_headers_ride_the_response() {
    common::setup_may_runtime();
    let mut dispatcher = Dispatcher::new();
    let id = unsafe {
        dispatcher.register_handler(Arc::new(|_req: HandlerRequest, mut reply: Reply| {
            reply.set_cookie("session", "abc");
            reply.send(200, Value::String("ok".into()), "text/plain", None);
        }))
    };
    let settings = Arc::new(Settings::builder().cookie_key("k1").build());
    let mut req = request("/x");
    req.cookies = CookieJar::new(HashMap::new(), settings.cookie_keys());
    let wire = respond(dispatcher.dispatch(id, req, &settings).unwrap());
    let set_cookies: Vec<&str> = wire
        .headers
        .iter()
        .filter(|(n, _)| n == "Set-Cookie")
        .map(|(_, v)| v.as_str())
        .collect();
    // Value cookie plus its signature companion.
    assert_eq!(set_cookies.len(), 2);
    assert!(set_cookies[0].starts_with("session=abc"));
    assert!(set_cookies[1].starts_with("session.sig="));
}

#[test]
fn test_render_missing_template_is_404() {
    common::setup_may_runtime();
    let mut dispatcher = Dispatcher::new();
    let id = unsafe {
        dispatcher.register_handler(Arc::new(|_req: HandlerRequest, reply: Reply| {
            reply.render("/no/such/template.html", None);
        }))
    };
    let settings = Arc::new(Settings::default());
    let wire = respond(dispatcher.dispatch(id, request("/x"), &settings).unwrap());
    assert_eq!(wire.status, 404);
}

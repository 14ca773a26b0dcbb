//! Resource controllers: five CRUD handlers generated over a named
//! collection.
//!
//! The backing store is an explicit id → item map with a monotonic next-id
//! counter, so deletion is true removal rather than a hole in a sparse
//! array. The store is shared behind a mutex; that lock is the
//! serialization point for interleaved writers on overlapping requests.

use crate::dispatcher::{Handler, HandlerRequest, Reply};
use crate::multipart::FormData;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Change-notification callback, invoked with the affected id after every
/// successful mutation.
pub type OnChange = Arc<dyn Fn(u64) + Send + Sync>;

/// Id-keyed item store with a monotonic id counter.
#[derive(Debug, Default)]
pub struct ResourceStore {
    items: BTreeMap<u64, Value>,
    next_id: u64,
}

impl ResourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item under the next id and return that id.
    pub fn insert(&mut self, item: Value) -> u64 {
        let id = self.next_id;
        self.items.insert(id, item);
        self.next_id += 1;
        id
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<&Value> {
        self.items.get(&id)
    }

    /// Overwrite slot `id`, creating it if absent. The id counter advances
    /// past `id` so later inserts never collide with it.
    pub fn set(&mut self, id: u64, item: Value) {
        self.items.insert(id, item);
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    /// Remove slot `id`. Returns whether anything was there.
    pub fn remove(&mut self, id: u64) -> bool {
        self.items.remove(&id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The whole collection as a JSON object keyed by decimal id.
    #[must_use]
    pub fn as_value(&self) -> Value {
        Value::Object(
            self.items
                .iter()
                .map(|(id, item)| (id.to_string(), item.clone()))
                .collect(),
        )
    }
}

/// Generates the five standard handlers (index/show/create/update/destroy)
/// over a shared store.
///
/// The caller owns the store; handlers only read and write through the
/// mutex and invoke `on_change(id)` after each successful mutation when a
/// callback was supplied.
#[derive(Clone)]
pub struct ResourceController {
    name: String,
    store: Arc<Mutex<ResourceStore>>,
    on_change: Option<OnChange>,
}

/// Fold submitted form fields into a JSON object (first value per name),
/// so form-mode create/update sees the same shape as JSON-mode.
fn form_to_value(form: &FormData) -> Value {
    Value::Object(
        form.fields
            .iter()
            .filter_map(|(k, vs)| vs.first().map(|v| (k.clone(), Value::String(v.clone()))))
            .collect(),
    )
}

/// The "missing or unusable item" check for create/update. Mirrors the
/// original falsy rejection: absent, null, false, zero, or empty string.
fn is_rejected(item: &Value) -> bool {
    match item {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Extract the item from a request payload: `body.content` when the body is
/// an object carrying one, otherwise the body itself.
fn extract_item(req: &HandlerRequest) -> Option<Value> {
    let body = req
        .body
        .clone()
        .or_else(|| req.form.as_ref().map(form_to_value))?;
    match &body {
        Value::Object(map) => match map.get("content") {
            Some(content) => Some(content.clone()),
            None => Some(body),
        },
        _ => Some(body),
    }
}

impl ResourceController {
    #[must_use]
    pub fn new(
        name: &str,
        store: Arc<Mutex<ResourceStore>>,
        on_change: Option<OnChange>,
    ) -> Self {
        Self {
            name: name.to_string(),
            store,
            on_change,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn self_url(&self, id: Option<u64>) -> String {
        match id {
            Some(id) => format!("/{}/{}", self.name, id),
            None => format!("/{}", self.name),
        }
    }

    fn notify(&self, id: u64) {
        if let Some(on_change) = &self.on_change {
            on_change(id);
        }
    }

    fn send_envelope(
        &self,
        reply: Reply,
        status: u16,
        content: Value,
        id: Option<u64>,
        extra_headers: Option<Vec<(String, String)>>,
    ) {
        let envelope = json!({ "content": content, "self": self.self_url(id) });
        reply.send(
            status,
            Value::String(envelope.to_string()),
            "application/json",
            extra_headers,
        );
    }

    /// `GET /name` - the entire collection.
    #[must_use]
    pub fn index(&self) -> Handler {
        let ctrl = self.clone();
        Arc::new(move |_req: HandlerRequest, reply: Reply| {
            let content = match ctrl.store.lock() {
                Ok(store) => store.as_value(),
                Err(_) => return reply.server_error(None),
            };
            ctrl.send_envelope(reply, 200, content, None, None);
        })
    }

    /// `GET /name/{id}` - one item or 404.
    #[must_use]
    pub fn show(&self) -> Handler {
        let ctrl = self.clone();
        Arc::new(move |req: HandlerRequest, reply: Reply| {
            let Some(id) = req.capture(0).and_then(|c| c.parse::<u64>().ok()) else {
                return reply.not_found(None);
            };
            let item = match ctrl.store.lock() {
                Ok(store) => store.get(id).cloned(),
                Err(_) => return reply.server_error(None),
            };
            match item {
                Some(item) => ctrl.send_envelope(reply, 200, item, Some(id), None),
                None => reply.not_found(None),
            }
        })
    }

    /// `POST /name` - append the submitted item, 201 with a Location
    /// header. A missing or empty item is rejected with 404.
    #[must_use]
    pub fn create(&self) -> Handler {
        let ctrl = self.clone();
        Arc::new(move |req: HandlerRequest, reply: Reply| {
            let item = match extract_item(&req) {
                Some(item) if !is_rejected(&item) => item,
                _ => return reply.not_found(None),
            };
            let id = match ctrl.store.lock() {
                Ok(mut store) => store.insert(item.clone()),
                Err(_) => return reply.server_error(None),
            };
            debug!(resource = %ctrl.name, id, "resource created");
            ctrl.notify(id);
            let location = ctrl.self_url(Some(id));
            ctrl.send_envelope(
                reply,
                201,
                item,
                Some(id),
                Some(vec![("Location".to_string(), location)]),
            );
        })
    }

    /// `PUT /name/{id}` - overwrite slot `id`, creating it if out of range.
    #[must_use]
    pub fn update(&self) -> Handler {
        let ctrl = self.clone();
        Arc::new(move |req: HandlerRequest, reply: Reply| {
            let Some(id) = req.capture(0).and_then(|c| c.parse::<u64>().ok()) else {
                return reply.not_found(None);
            };
            let item = match extract_item(&req) {
                Some(item) if !is_rejected(&item) => item,
                _ => return reply.not_found(None),
            };
            match ctrl.store.lock() {
                Ok(mut store) => store.set(id, item.clone()),
                Err(_) => return reply.server_error(None),
            }
            debug!(resource = %ctrl.name, id, "resource updated");
            ctrl.notify(id);
            ctrl.send_envelope(reply, 200, item, Some(id), None);
        })
    }

    /// `DELETE /name/{id}` - remove the slot. Always answers 200, whether
    /// or not the slot existed.
    #[must_use]
    pub fn destroy(&self) -> Handler {
        let ctrl = self.clone();
        Arc::new(move |req: HandlerRequest, reply: Reply| {
            let Some(id) = req.capture(0).and_then(|c| c.parse::<u64>().ok()) else {
                return reply.not_found(None);
            };
            let removed = match ctrl.store.lock() {
                Ok(mut store) => store.remove(id),
                Err(_) => return reply.server_error(None),
            };
            // Removing an empty slot is not a mutation; no notification.
            if removed {
                debug!(resource = %ctrl.name, id, "resource destroyed");
                ctrl.notify(id);
            }
            reply.send(
                200,
                Value::String("200 Destroyed".to_string()),
                "text/plain",
                None,
            );
        })
    }
}

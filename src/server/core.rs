use super::access_log::{AccessLog, LogSink};
use super::http_server::{HttpServer, ServerHandle};
use super::service::AppService;
use crate::config::Settings;
use crate::dispatcher::{BodyMode, Dispatcher, Handler};
use crate::middleware::Middleware;
use crate::resource::{OnChange, ResourceController, ResourceStore};
use crate::router::Router;
use crate::static_files::StaticFiles;
use http::Method;
use std::io;
use std::net::ToSocketAddrs;
use std::sync::{Arc, Mutex};
use tracing::info;

/// The application-facing entry point.
///
/// Owns the settings, route table, and dispatcher. Routes are registered up
/// front, then [`Server::start`] freezes everything into a shared
/// [`AppService`] and binds the listener. There is no ambient global state;
/// two servers in one process do not interfere.
pub struct Server {
    settings: Arc<Settings>,
    router: Router,
    dispatcher: Dispatcher,
    access_log: AccessLog,
}

impl Server {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            router: Router::new(),
            dispatcher: Dispatcher::new(),
            access_log: AccessLog::default(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Register a route: spawns the handler coroutine and appends the route
    /// to the table. Registration order is match order.
    ///
    /// # Errors
    ///
    /// Returns an error when the pattern does not compile.
    pub fn route(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
        body_mode: BodyMode,
    ) -> anyhow::Result<()> {
        // SAFETY: handler registration spawns a may coroutine; the runtime
        // is initialized lazily by may itself before the first spawn.
        let handler_id = unsafe { self.dispatcher.register_handler(handler) };
        self.router.add_route(method, pattern, body_mode, handler_id)
    }

    /// # Errors
    ///
    /// Returns an error when the pattern does not compile.
    pub fn get(&mut self, pattern: &str, handler: Handler) -> anyhow::Result<()> {
        self.route(Method::GET, pattern, handler, BodyMode::None)
    }

    /// # Errors
    ///
    /// Returns an error when the pattern does not compile.
    pub fn post(&mut self, pattern: &str, handler: Handler) -> anyhow::Result<()> {
        self.route(Method::POST, pattern, handler, BodyMode::None)
    }

    /// # Errors
    ///
    /// Returns an error when the pattern does not compile.
    pub fn put(&mut self, pattern: &str, handler: Handler) -> anyhow::Result<()> {
        self.route(Method::PUT, pattern, handler, BodyMode::None)
    }

    /// # Errors
    ///
    /// Returns an error when the pattern does not compile.
    pub fn del(&mut self, pattern: &str, handler: Handler) -> anyhow::Result<()> {
        self.route(Method::DELETE, pattern, handler, BodyMode::None)
    }

    /// # Errors
    ///
    /// Returns an error when the pattern does not compile.
    pub fn head(&mut self, pattern: &str, handler: Handler) -> anyhow::Result<()> {
        self.route(Method::HEAD, pattern, handler, BodyMode::None)
    }

    /// Register the five standard routes for a resource controller, in the
    /// usual order: index, show, create, update, destroy.
    ///
    /// `body_mode` applies to create and update; form-mode resources pass
    /// [`BodyMode::None`] and rely on the POST form convention.
    ///
    /// # Errors
    ///
    /// Returns an error when a generated pattern does not compile, which
    /// only happens for a resource name that breaks the regex.
    pub fn resource(
        &mut self,
        controller: &ResourceController,
        body_mode: BodyMode,
    ) -> anyhow::Result<()> {
        let name = controller.name();
        let collection = format!("/{name}");
        let member = format!("/{name}/([^/]+)");
        self.route(Method::GET, &collection, controller.index(), BodyMode::None)?;
        self.route(Method::GET, &member, controller.show(), BodyMode::None)?;
        self.route(Method::POST, &collection, controller.create(), body_mode)?;
        self.route(Method::PUT, &member, controller.update(), body_mode)?;
        self.route(Method::DELETE, &member, controller.destroy(), BodyMode::None)?;
        info!(resource = %name, "Resource routes registered");
        Ok(())
    }

    /// Build a controller over a fresh empty store and register its routes.
    ///
    /// # Errors
    ///
    /// Returns an error when a generated pattern does not compile.
    pub fn resource_controller(
        &mut self,
        name: &str,
        body_mode: BodyMode,
        on_change: Option<OnChange>,
    ) -> anyhow::Result<ResourceController> {
        let store = Arc::new(Mutex::new(ResourceStore::new()));
        let controller = ResourceController::new(name, store, on_change);
        self.resource(&controller, body_mode)?;
        Ok(controller)
    }

    pub fn add_middleware(&mut self, mw: Arc<dyn Middleware>) {
        self.dispatcher.add_middleware(mw);
    }

    /// Replace the access-log sink (the default forwards to `tracing`).
    pub fn set_log_sink(&mut self, sink: LogSink) {
        self.access_log = AccessLog::new(sink);
    }

    /// Freeze the registered state into the request-serving service.
    #[must_use]
    pub fn into_service(self) -> AppService {
        let static_files = self
            .settings
            .static_path()
            .map(|root| Arc::new(StaticFiles::new(root)));
        AppService {
            settings: self.settings,
            router: Arc::new(self.router),
            dispatcher: Arc::new(self.dispatcher),
            static_files,
            access_log: self.access_log,
        }
    }

    /// Start serving on `addr`. Consumes the server; no routes can be added
    /// after this point.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        if let Some(tls) = self.settings.tls() {
            // Encryption is delegated to a terminating proxy; the material
            // is advertised so operators can wire that proxy up.
            info!(
                key = %tls.key_path.display(),
                cert = %tls.cert_path.display(),
                "TLS material configured, expecting external termination"
            );
        }
        let scheme = self.settings.scheme();
        let handle = HttpServer(self.into_service()).start(addr)?;
        info!(scheme, "Server started");
        Ok(handle)
    }
}

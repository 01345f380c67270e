//! Application bootstrap
//!
//! Collects global middleware and routes at startup, then freezes them into
//! a [`Dispatcher`] and serves it over HTTP/1.1.
//!
//! ```ignore
//! let mut app = App::with_config(config);
//! app.use_middleware(from_fn(|_req| Ok(Next::proceed())));
//! app.controller(Controller::new("/v1").route(RouteDef::get("/ping", ping)));
//! app.listen(3000).await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::handler::{DispatchSettings, Dispatcher, Middleware, SharedMiddleware};
use crate::logger;
use crate::routing::{Controller, Route, RouteDef, RouteRegistry};
use crate::server::{self, ServeSettings};

pub struct App {
    config: Config,
    registry: RouteRegistry,
    global: Vec<SharedMiddleware>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            registry: RouteRegistry::new(),
            global: Vec::new(),
        }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Register a global middleware, run for every request before lookup
    pub fn use_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.global.push(Arc::new(middleware));
        self
    }

    pub fn controller(&mut self, controller: Controller) -> &mut Self {
        self.registry.extend(controller.into_routes());
        self
    }

    /// Register a single route without a prefix
    pub fn route(&mut self, route: RouteDef) -> &mut Self {
        self.registry.register(route.build("", &[]));
        self
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        self.registry.routes()
    }

    /// Freeze registration
    pub fn into_dispatcher(self) -> Dispatcher {
        let settings = DispatchSettings::from(&self.config);
        Dispatcher::new(self.registry, settings).with_global_shared(self.global)
    }

    /// Bind `port` on the configured host and serve until SIGINT/SIGTERM
    pub async fn listen(self, port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.socket_addr_for(port)?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, server::shutdown_signal()).await?;
        Ok(())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<S>(self, listener: TcpListener, shutdown: S) -> std::io::Result<()>
    where
        S: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        logger::log_server_start(&addr, &self.config, self.registry.len());

        let settings = Arc::new(ServeSettings::from(&self.config));
        let dispatcher = Arc::new(self.into_dispatcher());
        server::start_server_loop(listener, dispatcher, settings, shutdown).await
    }
}

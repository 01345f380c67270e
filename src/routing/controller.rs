//! Route declaration
//!
//! A [`Controller`] groups routes under a shared path prefix and shared
//! middleware. Each route is described by a [`RouteDef`]; turning a
//! controller into routes concatenates the controller's middleware with the
//! route's own, in declaration order.

use super::pattern::PathPattern;
use super::registry::{Route, RouteMethod};
use crate::handler::binding::{ArgBinding, Extractor};
use crate::handler::middleware::{Middleware, SharedMiddleware};
use crate::handler::{Args, Handler, HandlerResult, SharedHandler};
use std::future::Future;
use std::sync::Arc;

/// One route as declared by application code
pub struct RouteDef {
    method: RouteMethod,
    path: String,
    name: Option<String>,
    handler: SharedHandler,
    middleware: Vec<SharedMiddleware>,
    bindings: Vec<ArgBinding>,
}

macro_rules! method_ctor {
    ($($fn_name:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $fn_name<F, Fut>(path: impl Into<String>, handler: F) -> Self
            where
                F: Fn(Args) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = HandlerResult> + Send + 'static,
            {
                Self::new(RouteMethod::$variant, path, handler)
            }
        )*
    };
}

impl RouteDef {
    pub fn new<F, Fut>(method: RouteMethod, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::with_handler(method, path, handler)
    }

    /// Declare a route served by any [`Handler`] implementation
    pub fn with_handler(method: RouteMethod, path: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            method,
            path: path.into(),
            name: None,
            handler: Arc::new(handler),
            middleware: Vec::new(),
            bindings: Vec::new(),
        }
    }

    method_ctor! {
        get => Get,
        post => Post,
        put => Put,
        patch => Patch,
        delete => Delete,
        mixed => Mixed,
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append route-level middleware
    #[must_use]
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    #[must_use]
    pub fn with_shared(mut self, middleware: SharedMiddleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Bind handler argument `position` to `extractor`
    #[must_use]
    pub fn arg(mut self, position: usize, extractor: Extractor) -> Self {
        self.bindings.push(ArgBinding::new(position, extractor));
        self
    }

    /// Resolve into a registrable [`Route`]
    pub fn build(self, prefix: &str, shared: &[SharedMiddleware]) -> Route {
        let pattern = PathPattern::compile(&join_path(prefix, &self.path));
        let name = self
            .name
            .unwrap_or_else(|| format!("{} {}", self.method, pattern.template()));
        let middleware = shared.iter().cloned().chain(self.middleware).collect();

        Route {
            method: self.method,
            pattern,
            name,
            handler: self.handler,
            middleware,
            bindings: self.bindings,
        }
    }
}

/// Routes sharing a path prefix and middleware
#[derive(Default)]
pub struct Controller {
    prefix: String,
    middleware: Vec<SharedMiddleware>,
    routes: Vec<RouteDef>,
}

impl Controller {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Middleware run before every route of this controller
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    #[must_use]
    pub fn route(mut self, route: RouteDef) -> Self {
        self.routes.push(route);
        self
    }

    pub fn into_routes(self) -> Vec<Route> {
        let Self {
            prefix,
            middleware,
            routes,
        } = self;
        routes
            .into_iter()
            .map(|route| route.build(&prefix, &middleware))
            .collect()
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    let joined = format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

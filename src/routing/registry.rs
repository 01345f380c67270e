//! Route registry
//!
//! Routes are appended at startup and resolved on every request by a linear
//! scan in registration order. The first route whose method and template
//! both match wins; there is no most-specific-match policy.

use super::pattern::PathPattern;
use crate::handler::binding::ArgBinding;
use crate::handler::middleware::SharedMiddleware;
use crate::handler::SharedHandler;
use hyper::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Method a route answers to. `Mixed` accepts any request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Mixed,
}

impl RouteMethod {
    pub fn accepts(self, method: &Method) -> bool {
        match self {
            Self::Mixed => true,
            Self::Get => method == Method::GET,
            Self::Post => method == Method::POST,
            Self::Put => method == Method::PUT,
            Self::Patch => method == Method::PATCH,
            Self::Delete => method == Method::DELETE,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Mixed => "MIXED",
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered route; immutable once registered
pub struct Route {
    pub method: RouteMethod,
    pub pattern: PathPattern,
    pub name: String,
    pub handler: SharedHandler,
    /// Controller-level middleware followed by route-level middleware
    pub middleware: Vec<SharedMiddleware>,
    pub bindings: Vec<ArgBinding>,
}

impl Route {
    pub fn path(&self) -> &str {
        self.pattern.template()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path())
            .field("name", &self.name)
            .field("middleware", &self.middleware.len())
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

/// Result of a successful lookup
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Arc<Route>,
    pub params: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: Vec<Arc<Route>>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, route: Route) {
        tracing::debug!(
            method = %route.method,
            path = route.path(),
            name = %route.name,
            "route registered"
        );
        self.routes.push(Arc::new(route));
    }

    pub fn extend(&mut self, routes: impl IntoIterator<Item = Route>) {
        for route in routes {
            self.register(route);
        }
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the first route for `method` + `path`
    ///
    /// Pure lookup: the extracted params are returned, not stored.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            if !route.method.accepts(method) {
                return None;
            }
            route
                .pattern
                .matches(path)
                .map(|params| RouteMatch { route, params })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RouteDef;

    fn make_route(method: RouteMethod, path: &str, name: &str) -> Route {
        RouteDef::new(method, path, |_args| async { Ok(None) })
            .name(name)
            .build("", &[])
    }

    #[test]
    fn test_method_accepts() {
        assert!(RouteMethod::Get.accepts(&Method::GET));
        assert!(!RouteMethod::Get.accepts(&Method::POST));
        assert!(RouteMethod::Mixed.accepts(&Method::OPTIONS));
        assert!(RouteMethod::Patch.accepts(&Method::PATCH));
        assert!(!RouteMethod::Delete.accepts(&Method::HEAD));
    }

    #[test]
    fn test_resolve_distinct_routes() {
        let mut registry = RouteRegistry::new();
        registry.register(make_route(RouteMethod::Get, "/test", "get_test"));
        registry.register(make_route(RouteMethod::Post, "/test", "post_test"));
        registry.register(make_route(RouteMethod::Get, "/users/:id", "user"));
        assert_eq!(registry.len(), 3);

        let hit = registry.resolve(&Method::GET, "/test").unwrap();
        assert_eq!(hit.route.name, "get_test");
        let hit = registry.resolve(&Method::POST, "/test").unwrap();
        assert_eq!(hit.route.name, "post_test");
        let hit = registry.resolve(&Method::GET, "/users/42").unwrap();
        assert_eq!(hit.route.name, "user");
        assert_eq!(hit.params["id"], "42");

        assert!(registry.resolve(&Method::PUT, "/test").is_none());
        assert!(registry.resolve(&Method::GET, "/users/42/extra").is_none());
    }

    #[test]
    fn test_first_registered_wins() {
        let mut registry = RouteRegistry::new();
        registry.register(make_route(RouteMethod::Get, "/users/:id", "by_id"));
        registry.register(make_route(RouteMethod::Get, "/users/me", "me"));

        let hit = registry.resolve(&Method::GET, "/users/me").unwrap();
        assert_eq!(hit.route.name, "by_id");
        assert_eq!(hit.params["id"], "me");
    }

    #[test]
    fn test_mixed_matches_any_method() {
        let mut registry = RouteRegistry::new();
        registry.register(make_route(RouteMethod::Mixed, "/any", "any"));
        for method in [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS] {
            assert_eq!(registry.resolve(&method, "/any").unwrap().route.name, "any");
        }
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut registry = RouteRegistry::new();
        registry.register(make_route(RouteMethod::Get, "/a/:x", "a"));
        registry.register(make_route(RouteMethod::Get, "/a/b", "b"));

        let first = registry.resolve(&Method::GET, "/a/b").unwrap();
        let second = registry.resolve(&Method::GET, "/a/b").unwrap();
        assert!(Arc::ptr_eq(first.route, second.route));
        assert_eq!(first.params, second.params);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_empty_registry() {
        let registry = RouteRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.resolve(&Method::GET, "/").is_none());
    }
}

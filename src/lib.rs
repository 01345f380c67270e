//! Request-dispatch core for HTTP servers
//!
//! Maps requests to handlers through `:param` path templates, runs global
//! and per-route middleware with explicit continuation control, binds
//! handler arguments from request data and writes the handler's reply.
//! Socket handling is left to `hyper`; see [`App::listen`].

pub mod app;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod routing;
pub mod server;

pub use app::App;
pub use error::DispatchError;
pub use handler::{
    from_fn, halt_with, Args, Dispatcher, Extractor, HandlerResult, JsonBody, Middleware, Next,
};
pub use http::{Message, Reply, RequestContext, ResponseHandle};
pub use routing::{Controller, RouteDef, RouteMethod, RouteRegistry};

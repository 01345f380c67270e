//! Routing module
//!
//! Provides request-to-route resolution:
//! - Path templates with `:name` captures
//! - An ordered, first-match-wins route registry
//! - Controller/route declaration builders

mod controller;
mod pattern;
mod registry;

pub use controller::{Controller, RouteDef};
pub use pattern::{strip_query, strip_trailing_slash, PathPattern};
pub use registry::{Route, RouteMatch, RouteMethod, RouteRegistry};

//! Handler argument binding
//!
//! A route declares an ordered list of [`ArgBinding`]s; before each call the
//! binder runs every extractor against the live request and hands the
//! results to the handler as [`Args`]. Extractors only read the request.

use crate::http::context::map_to_value;
use crate::http::{RequestContext, ResponseHandle};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type CustomExtractor = Arc<dyn Fn(&RequestContext) -> Value + Send + Sync>;

/// How to compute one handler argument
#[derive(Clone)]
pub enum Extractor {
    /// The whole request context
    Request,
    /// The request's response handle, for handlers that write themselves
    Response,
    /// One path parameter, or all of them as an object
    Param(Option<String>),
    /// One query value, or the whole query map as an object
    Query(Option<String>),
    /// Parsed body (`null` when no middleware parsed one)
    Body,
    /// Payload accumulated from middleware continuations
    Next,
    Header(String),
    Custom(CustomExtractor),
}

impl Extractor {
    pub fn param(name: impl Into<String>) -> Self {
        Self::Param(Some(name.into()))
    }

    pub const fn params() -> Self {
        Self::Param(None)
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::Query(Some(name.into()))
    }

    pub const fn queries() -> Self {
        Self::Query(None)
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::Header(name.into())
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> Value + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Compute the argument for `req`. Missing keys yield `null`.
    pub fn extract(&self, req: &RequestContext) -> Arg {
        let text = |v: Option<&str>| v.map_or(Value::Null, |s| Value::String(s.to_string()));

        match self {
            Self::Request => Arg::Request(Box::new(req.clone())),
            Self::Response => Arg::Response(req.response().clone()),
            Self::Param(Some(name)) => Arg::Value(text(req.param(name))),
            Self::Param(None) => Arg::Value(map_to_value(&req.params)),
            Self::Query(Some(name)) => Arg::Value(text(req.query_value(name))),
            Self::Query(None) => Arg::Value(map_to_value(&req.query)),
            Self::Body => Arg::Value(req.body.clone().unwrap_or(Value::Null)),
            Self::Next => Arg::Value(req.next.clone()),
            Self::Header(name) => Arg::Value(text(req.header(name))),
            Self::Custom(f) => Arg::Value(f(req)),
        }
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("Request"),
            Self::Response => f.write_str("Response"),
            Self::Param(key) => f.debug_tuple("Param").field(key).finish(),
            Self::Query(key) => f.debug_tuple("Query").field(key).finish(),
            Self::Body => f.write_str("Body"),
            Self::Next => f.write_str("Next"),
            Self::Header(name) => f.debug_tuple("Header").field(name).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Declared at registration, evaluated per request
#[derive(Debug, Clone)]
pub struct ArgBinding {
    pub position: usize,
    pub extractor: Extractor,
}

impl ArgBinding {
    pub const fn new(position: usize, extractor: Extractor) -> Self {
        Self {
            position,
            extractor,
        }
    }
}

/// A single bound argument
#[derive(Debug, Clone)]
pub enum Arg {
    Request(Box<RequestContext>),
    Response(ResponseHandle),
    Value(Value),
}

/// Arguments passed to a handler, in position order
#[derive(Debug, Clone, Default)]
pub struct Args(Vec<Arg>);

impl Args {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.0.get(index)
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.0.get(index)? {
            Arg::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn str(&self, index: usize) -> Option<&str> {
        self.value(index)?.as_str()
    }

    pub fn request(&self, index: usize) -> Option<&RequestContext> {
        match self.0.get(index)? {
            Arg::Request(req) => Some(&**req),
            _ => None,
        }
    }

    pub fn response(&self, index: usize) -> Option<&ResponseHandle> {
        match self.0.get(index)? {
            Arg::Response(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn into_vec(self) -> Vec<Arg> {
        self.0
    }
}

impl From<Vec<Arg>> for Args {
    fn from(args: Vec<Arg>) -> Self {
        Self(args)
    }
}

/// Build the handler's arguments
///
/// Bindings are evaluated in position order regardless of declaration
/// order (ties keep declaration order). With no bindings the handler gets a
/// single argument: the whole request.
pub fn bind_arguments(bindings: &[ArgBinding], req: &RequestContext) -> Args {
    if bindings.is_empty() {
        return Args(vec![Arg::Request(Box::new(req.clone()))]);
    }

    let mut ordered: Vec<&ArgBinding> = bindings.iter().collect();
    ordered.sort_by_key(|binding| binding.position);
    Args(
        ordered
            .into_iter()
            .map(|binding| binding.extractor.extract(req))
            .collect(),
    )
}

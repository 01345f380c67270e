//! Middleware chains
//!
//! A middleware either continues with [`Next::Proceed`], optionally carrying a
//! payload for later stages, or stops the request with [`Next::Halt`] after
//! writing a response through [`RequestContext::response`]. Errors are not
//! caught here; they travel up to the dispatcher.
//!
//! Two execution modes exist:
//! - [`run_global`]: every middleware starts at once on its own copy of the
//!   request; once all have finished their changes are folded back into the
//!   live request in registration order
//! - [`run_chain`]: one after another on the live request

use super::BoxFuture;
use crate::error::DispatchError;
use crate::http::{Reply, RequestContext};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Outcome of one middleware invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    Proceed(Value),
    Halt,
}

impl Next {
    /// Continue with an empty payload
    pub fn proceed() -> Self {
        Self::Proceed(Value::Object(Map::new()))
    }

    pub const fn with(payload: Value) -> Self {
        Self::Proceed(payload)
    }

    pub const fn is_proceed(&self) -> bool {
        matches!(self, Self::Proceed(_))
    }
}

pub type MiddlewareResult = Result<Next, DispatchError>;

pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(&'a self, req: &'a mut RequestContext) -> BoxFuture<'a, MiddlewareResult>;
}

/// Shared middleware as stored in chains
pub type SharedMiddleware = Arc<dyn Middleware>;

/// Adapter for synchronous closures, see [`from_fn`]
pub struct FnMiddleware<F>(F);

/// Build a middleware from a synchronous closure
///
/// ```ignore
/// let audit = from_fn(|req| {
///     tracing::info!(path = %req.path, "audit");
///     Ok(Next::proceed())
/// });
/// ```
pub const fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&mut RequestContext) -> MiddlewareResult + Send + Sync + 'static,
{
    FnMiddleware(f)
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut RequestContext) -> MiddlewareResult + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, req: &'a mut RequestContext) -> BoxFuture<'a, MiddlewareResult> {
        let outcome = (self.0)(req);
        Box::pin(async move { outcome })
    }
}

/// Parses a JSON request body into [`RequestContext::body`]
///
/// Empty bodies are left as `None`. A body that is not valid JSON raises a
/// middleware error.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBody;

impl Middleware for JsonBody {
    fn handle<'a>(&'a self, req: &'a mut RequestContext) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            if !req.raw_body.is_empty() {
                let value: Value = serde_json::from_slice(&req.raw_body)
                    .map_err(|e| DispatchError::middleware(format!("Invalid JSON body: {e}")))?;
                req.body = Some(value);
            }
            Ok(Next::proceed())
        })
    }
}

/// Short-circuit helper: write `reply` and halt
pub fn halt_with(req: &RequestContext, reply: Reply) -> MiddlewareResult {
    req.response().write(reply)?;
    Ok(Next::Halt)
}

/// Run global middleware concurrently
///
/// Each middleware works on its own copy of the request, so they can run side
/// by side without observing one another. Once all have finished the outcomes
/// are read in registration order: the first error is returned, otherwise any
/// halt stops the request, otherwise every copy's changes are applied to `req`
/// in registration order together with its continuation payload. When several
/// middleware touch the same field, the later registration wins.
///
/// Returns whether the request should proceed.
pub async fn run_global(
    chain: &[SharedMiddleware],
    req: &mut RequestContext,
) -> Result<bool, DispatchError> {
    if chain.is_empty() {
        return Ok(true);
    }

    let base = req.clone();
    let mut copies: Vec<RequestContext> = chain.iter().map(|_| base.clone()).collect();
    let outcomes = join_all(
        chain
            .iter()
            .zip(copies.iter_mut())
            .map(|(middleware, copy)| middleware.handle(copy)),
    )
    .await;

    let mut payloads = Vec::with_capacity(outcomes.len());
    let mut halted = false;
    for outcome in outcomes {
        match outcome? {
            Next::Proceed(payload) => payloads.push(payload),
            Next::Halt => halted = true,
        }
    }
    if halted {
        return Ok(false);
    }

    for (copy, payload) in copies.into_iter().zip(payloads) {
        apply_changes(req, &base, copy);
        req.store_next(payload);
    }
    Ok(true)
}

/// Copy every field `changed` modified relative to `base` onto `req`
fn apply_changes(req: &mut RequestContext, base: &RequestContext, changed: RequestContext) {
    if changed.body != base.body {
        req.body = changed.body;
    }
    if changed.raw_body != base.raw_body {
        req.raw_body = changed.raw_body;
    }
    for (name, value) in changed.params {
        if base.params.get(&name) != Some(&value) {
            req.params.insert(name, value);
        }
    }
    for (name, value) in changed.query {
        if base.query.get(&name) != Some(&value) {
            req.query.insert(name, value);
        }
    }
    for name in changed.headers.keys() {
        if changed.headers.get_all(name) != base.headers.get_all(name) {
            req.headers.remove(name);
            for value in changed.headers.get_all(name) {
                req.headers.append(name.clone(), value.clone());
            }
        }
    }
}

/// Run a route's middleware one at a time, stopping at the first halt
///
/// Returns whether the request should proceed.
pub async fn run_chain(
    chain: &[SharedMiddleware],
    req: &mut RequestContext,
) -> Result<bool, DispatchError> {
    for middleware in chain {
        match middleware.handle(req).await? {
            Next::Proceed(payload) => req.store_next(payload),
            Next::Halt => return Ok(false),
        }
    }
    Ok(true)
}

//! Request handler module
//!
//! Everything between "a request arrived" and "a reply is ready":
//! middleware chains, argument binding, handler invocation and the
//! dispatcher that drives the request lifecycle.

pub mod binding;
pub mod dispatch;
pub mod middleware;

use crate::error::DispatchError;
use crate::http::Reply;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub use binding::{bind_arguments, Arg, ArgBinding, Args, Extractor};
pub use dispatch::{DispatchSettings, Dispatcher, Stage};
pub use middleware::{
    from_fn, halt_with, run_chain, run_global, JsonBody, Middleware, MiddlewareResult, Next,
    SharedMiddleware,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `None` means the handler produced no reply of its own
pub type HandlerResult = Result<Option<Reply>, DispatchError>;

pub trait Handler: Send + Sync + 'static {
    fn call(&self, args: Args) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, args: Args) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(args))
    }
}

pub type SharedHandler = Arc<dyn Handler>;

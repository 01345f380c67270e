//! Request dispatch
//!
//! Drives one request through its lifecycle:
//!
//! ```text
//! INIT -> GLOBAL_MIDDLEWARE -> ROUTE_LOOKUP -> ROUTE_MIDDLEWARE
//!      -> ARGUMENT_BINDING -> HANDLER_INVOKE -> RESPONSE_WRITE -> DONE
//! ```
//!
//! Any stage may fail; failures are caught in one place, [`Dispatcher::dispatch`],
//! and turned into a JSON error reply.

use super::binding::bind_arguments;
use super::middleware::{run_chain, run_global, Middleware, SharedMiddleware};
use crate::config::Config;
use crate::error::DispatchError;
use crate::http::{render, Reply, RequestContext, ResponseBody};
use crate::routing::RouteRegistry;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::http::request::Parts;
use hyper::{Request, Response};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle states, used for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    GlobalMiddleware,
    RouteLookup,
    RouteMiddleware,
    ArgumentBinding,
    HandlerInvoke,
    ResponseWrite,
    Done,
    Error,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::GlobalMiddleware => "global middleware",
            Self::RouteLookup => "route lookup",
            Self::RouteMiddleware => "route middleware",
            Self::ArgumentBinding => "argument binding",
            Self::HandlerInvoke => "handler",
            Self::ResponseWrite => "response write",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

/// Per-dispatcher knobs
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub server_name: String,
    pub max_body_size: u64,
    /// Bound for each middleware chain and the handler; `None` waits forever
    pub stage_timeout: Option<Duration>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for DispatchSettings {
    fn from(config: &Config) -> Self {
        Self {
            server_name: config.http.server_name.clone(),
            max_body_size: config.http.max_body_size,
            stage_timeout: config.performance.stage_timeout_ms.map(Duration::from_millis),
        }
    }
}

pub struct Dispatcher {
    registry: RouteRegistry,
    global: Vec<SharedMiddleware>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(registry: RouteRegistry, settings: DispatchSettings) -> Self {
        Self {
            registry,
            global: Vec::new(),
            settings,
        }
    }

    /// Register a global middleware
    #[must_use]
    pub fn with_global(mut self, middleware: impl Middleware) -> Self {
        self.global.push(Arc::new(middleware));
        self
    }

    #[must_use]
    pub fn with_global_shared(mut self, middleware: Vec<SharedMiddleware>) -> Self {
        self.global.extend(middleware);
        self
    }

    pub const fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    pub const fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Serve one request from the transport
    ///
    /// Never fails: every error becomes a well-formed JSON response.
    pub async fn dispatch<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        trace_stage(Stage::Init);
        let (parts, body) = req.into_parts();
        match self.init(parts, body).await {
            Ok(ctx) => self.dispatch_context(ctx).await,
            Err(err) => {
                trace_stage(Stage::Error);
                tracing::warn!(error = %err, "request rejected during init");
                render(Reply::from_error(&err), &self.settings.server_name)
            }
        }
    }

    /// Run an already initialised request through the remaining stages
    pub async fn dispatch_context(&self, mut ctx: RequestContext) -> Response<ResponseBody> {
        let handle = ctx.response().clone();

        if let Err(err) = self.run(&mut ctx).await {
            trace_stage(Stage::Error);
            tracing::warn!(
                method = %ctx.method,
                url = %ctx.url,
                error = %err,
                "request failed"
            );
            if handle.write(Reply::from_error(&err)).is_err() {
                tracing::debug!("reply already written; error reply discarded");
            }
        }

        let reply = handle
            .take()
            .unwrap_or_else(|| Reply::from_error(&DispatchError::NoResponse));
        trace_stage(Stage::Done);
        render(reply, &self.settings.server_name)
    }

    /// Read the body and build the request context
    async fn init<B>(&self, parts: Parts, body: B) -> Result<RequestContext, DispatchError>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let max = self.settings.max_body_size;
        check_body_size(&parts, max)?;

        let limit = usize::try_from(max).unwrap_or(usize::MAX);
        let bytes = Limited::new(body, limit)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    DispatchError::PayloadTooLarge(max)
                } else {
                    DispatchError::BodyRead(e.to_string())
                }
            })?
            .to_bytes();

        Ok(RequestContext::new(
            parts.method,
            &parts.uri,
            parts.headers,
            bytes,
        ))
    }

    async fn run(&self, ctx: &mut RequestContext) -> Result<(), DispatchError> {
        trace_stage(Stage::GlobalMiddleware);
        let proceed = self
            .bounded(Stage::GlobalMiddleware, run_global(&self.global, ctx))
            .await?;
        if !proceed {
            return halted(ctx);
        }

        trace_stage(Stage::RouteLookup);
        let found = self
            .registry
            .resolve(&ctx.method, &ctx.path)
            .ok_or(DispatchError::InvalidRoute)?;
        let route = Arc::clone(found.route);
        ctx.params.extend(found.params);
        ctx.route = Some(Arc::clone(&route));
        tracing::debug!(route = %route.name, "route resolved");

        trace_stage(Stage::RouteMiddleware);
        let proceed = self
            .bounded(Stage::RouteMiddleware, run_chain(&route.middleware, ctx))
            .await?;
        if !proceed {
            return halted(ctx);
        }

        trace_stage(Stage::ArgumentBinding);
        let args = bind_arguments(&route.bindings, ctx);

        trace_stage(Stage::HandlerInvoke);
        let result = self
            .bounded(Stage::HandlerInvoke, route.handler.call(args))
            .await?;

        trace_stage(Stage::ResponseWrite);
        match result {
            Some(reply) => ctx.response().write(reply),
            None if ctx.response().is_written() => Ok(()),
            None => Err(DispatchError::NoResponse),
        }
    }

    /// Apply the optional stage timeout
    async fn bounded<T, F>(&self, stage: Stage, fut: F) -> Result<T, DispatchError>
    where
        F: Future<Output = Result<T, DispatchError>>,
    {
        match self.settings.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| DispatchError::StageTimeout(stage.as_str()))?,
            None => fut.await,
        }
    }
}

/// A chain stopped without continuing; someone must have written a reply
fn halted(ctx: &RequestContext) -> Result<(), DispatchError> {
    if ctx.response().is_written() {
        Ok(())
    } else {
        Err(DispatchError::NoResponse)
    }
}

/// Reject early when Content-Length already exceeds the limit
fn check_body_size(parts: &Parts, max_body_size: u64) -> Result<(), DispatchError> {
    let Some(content_length) = parts.headers.get(hyper::header::CONTENT_LENGTH) else {
        return Ok(());
    };
    match content_length.to_str().map(str::parse::<u64>) {
        Ok(Ok(size)) if size > max_body_size => {
            tracing::warn!("Request body too large: {size} bytes (max: {max_body_size})");
            Err(DispatchError::PayloadTooLarge(max_body_size))
        }
        Ok(Ok(_)) => Ok(()),
        _ => {
            tracing::warn!("Invalid Content-Length header, skipping size check");
            Ok(())
        }
    }
}

fn trace_stage(stage: Stage) {
    tracing::trace!(stage = stage.as_str(), "dispatch stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::binding::Extractor;
    use crate::handler::middleware::{from_fn, halt_with, Next};
    use crate::handler::{Args, BoxFuture, HandlerResult, MiddlewareResult};
    use crate::routing::{Controller, RouteDef};
    use http_body_util::Full;
    use hyper::body::Bytes;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn request(method: &str, uri: &str, body: &'static str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Full<Bytes>> {
        request("GET", uri, "")
    }

    async fn body_json(resp: Response<ResponseBody>) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn dispatcher(routes: Vec<crate::routing::Route>) -> Dispatcher {
        let mut registry = RouteRegistry::new();
        registry.extend(routes);
        Dispatcher::new(registry, DispatchSettings::default())
    }

    async fn ok_handler(_args: Args) -> HandlerResult {
        Ok(Some(Reply::json(200, json!({"ok": true}))))
    }

    /// Middleware that never continues
    struct Stall;

    impl Middleware for Stall {
        fn handle<'a>(&'a self, _req: &'a mut RequestContext) -> BoxFuture<'a, MiddlewareResult> {
            Box::pin(std::future::pending())
        }
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let d = dispatcher(vec![RouteDef::get("/ok", ok_handler).build("", &[])]);
        let resp = d.dispatch(get("/ok")).await;
        assert_eq!(resp.status(), 200);
        let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.contains("application/json"));
        assert_eq!(body_json(resp).await, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_invalid_route() {
        let d = dispatcher(vec![RouteDef::get("/ok", ok_handler).build("", &[])]);

        let resp = d.dispatch(get("/missing")).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(body_json(resp).await, json!({"error": "Invalid route"}));

        let resp = d.dispatch(request("POST", "/ok", "")).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(body_json(resp).await, json!({"error": "Invalid route"}));
    }

    #[tokio::test]
    async fn test_no_response() {
        let d = dispatcher(vec![RouteDef::get("/silent", |_args| async { Ok(None) }).build("", &[])]);
        let resp = d.dispatch(get("/silent")).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(body_json(resp).await, json!({"error": "No response"}));
    }

    #[tokio::test]
    async fn test_handler_error_is_caught() {
        let d = dispatcher(vec![RouteDef::get("/fail", |_args| async {
            Err(DispatchError::handler("database unavailable"))
        })
        .build("", &[])]);
        let resp = d.dispatch(get("/fail")).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(body_json(resp).await, json!({"error": "database unavailable"}));
    }

    #[tokio::test]
    async fn test_controller_params_and_next_payload() {
        // Route middleware converts the param and passes data forward
        let get_number = from_fn(|req| {
            let number: i64 = req
                .param("number")
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| DispatchError::middleware("number expected"))?;
            assert_eq!(number, 10);
            Ok(Next::with(json!({"hello": 5})))
        });

        let routes = Controller::new("/foo")
            .route(
                RouteDef::get("/test/:number", |args: Args| async move {
                    let req = args.request(0).expect("request bound");
                    let number: i64 = args.str(1).and_then(|n| n.parse().ok()).unwrap_or_default();
                    let hello = args.value(2).and_then(|n| n["hello"].as_i64()).unwrap_or_default();
                    assert_eq!(req.param("number"), Some("10"));
                    assert_eq!(hello, number - hello);
                    Ok(Some(Reply::json(200, json!({"hello": hello, "number": number}))))
                })
                .with(get_number)
                .arg(0, Extractor::Request)
                .arg(1, Extractor::param("number"))
                .arg(2, Extractor::Next),
            )
            .into_routes();

        let d = dispatcher(routes).with_global(from_fn(|_req| Ok(Next::proceed())));
        let resp = d.dispatch(get("/foo/test/10")).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(body_json(resp).await, json!({"hello": 5, "number": 10}));
    }

    #[tokio::test]
    async fn test_query_bindings_through_dispatch() {
        let routes = vec![RouteDef::get("/posts/:category", |args: Args| async move {
            Ok(Some(Reply::json(
                200,
                json!({"count": args.value(0), "all": args.value(1)}),
            )))
        })
        .arg(0, Extractor::query("count"))
        .arg(1, Extractor::queries())
        .build("", &[])];

        let resp = dispatcher(routes).dispatch(get("/posts/tech?count=3")).await;
        assert_eq!(
            body_json(resp).await,
            json!({"count": "3", "all": {"count": "3"}})
        );
    }

    #[tokio::test]
    async fn test_global_stall_never_reaches_handler() {
        let invoked = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&invoked);
        let routes = vec![RouteDef::get("/guarded", move |_args| {
            seen.store(true, Ordering::SeqCst);
            async { Ok(Some(Reply::text(200, "reached"))) }
        })
        .build("", &[])];

        let d = dispatcher(routes).with_global(Stall);
        let outcome = tokio::time::timeout(Duration::from_millis(200), d.dispatch(get("/guarded"))).await;
        assert!(outcome.is_err(), "dispatch should stall");
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stage_timeout_hardening() {
        let routes = vec![RouteDef::get("/guarded", ok_handler).build("", &[])];
        let settings = DispatchSettings {
            stage_timeout: Some(Duration::from_millis(50)),
            ..DispatchSettings::default()
        };
        let mut registry = RouteRegistry::new();
        registry.extend(routes);
        let d = Dispatcher::new(registry, settings).with_global(Stall);

        let resp = d.dispatch(get("/guarded")).await;
        assert_eq!(resp.status(), 504);
        assert_eq!(
            body_json(resp).await,
            json!({"error": "global middleware timed out"})
        );
    }

    #[tokio::test]
    async fn test_global_halt_owns_response() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let routes = vec![RouteDef::get("/private", move |_args| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Some(Reply::text(200, "secret"))) }
        })
        .build("", &[])];

        let d = dispatcher(routes).with_global(from_fn(|req| {
            if req.header("authorization").is_some() {
                Ok(Next::proceed())
            } else {
                halt_with(req, Reply::json(401, json!({"error": "unauthorized"})))
            }
        }));

        let resp = d.dispatch(get("/private")).await;
        assert_eq!(resp.status(), 401);
        assert_eq!(body_json(resp).await, json!({"error": "unauthorized"}));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let authorized = Request::builder()
            .uri("/private")
            .header("authorization", "Bearer t")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = d.dispatch(authorized).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_halt_without_reply_is_no_response() {
        let routes = vec![RouteDef::get("/x", ok_handler)
            .with(from_fn(|_req| Ok(Next::Halt)))
            .build("", &[])];
        let resp = dispatcher(routes).dispatch(get("/x")).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(body_json(resp).await, json!({"error": "No response"}));
    }

    #[tokio::test]
    async fn test_handler_writes_through_response_binding() {
        let routes = vec![RouteDef::get("/self", |args: Args| async move {
            let res = args.response(0).expect("response bound");
            res.write(Reply::json(202, json!({"accepted": true})))?;
            Ok(None)
        })
        .arg(0, Extractor::Response)
        .build("", &[])];

        let resp = dispatcher(routes).dispatch(get("/self")).await;
        assert_eq!(resp.status(), 202);
        assert_eq!(body_json(resp).await, json!({"accepted": true}));
    }

    #[tokio::test]
    async fn test_double_write_keeps_first_reply() {
        let routes = vec![RouteDef::get("/twice", |args: Args| async move {
            let res = args.response(0).expect("response bound");
            res.write(Reply::json(200, json!({"first": true})))?;
            Ok(Some(Reply::json(500, json!({"second": true}))))
        })
        .arg(0, Extractor::Response)
        .build("", &[])];

        let resp = dispatcher(routes).dispatch(get("/twice")).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(body_json(resp).await, json!({"first": true}));
    }

    #[tokio::test]
    async fn test_body_parsed_by_middleware() {
        let routes = vec![RouteDef::post("/items", |args: Args| async move {
            Ok(Some(Reply::json(201, args.value(0).cloned().unwrap_or_default())))
        })
        .with(crate::handler::JsonBody)
        .arg(0, Extractor::Body)
        .build("", &[])];

        let resp = dispatcher(routes)
            .dispatch(request("POST", "/items", r#"{"name":"pen"}"#))
            .await;
        assert_eq!(resp.status(), 201);
        assert_eq!(body_json(resp).await, json!({"name": "pen"}));
    }

    #[tokio::test]
    async fn test_global_body_parser() {
        let routes = vec![RouteDef::post("/items", |args: Args| async move {
            Ok(Some(Reply::json(
                201,
                json!({"body": args.value(0), "next": args.value(1)}),
            )))
        })
        .arg(0, Extractor::Body)
        .arg(1, Extractor::Next)
        .build("", &[])];

        let d = dispatcher(routes).with_global(crate::handler::JsonBody);
        let resp = d.dispatch(request("POST", "/items", r#"{"name":"pen"}"#)).await;
        assert_eq!(resp.status(), 201);
        assert_eq!(
            body_json(resp).await,
            json!({"body": {"name": "pen"}, "next": {}})
        );
    }

    #[tokio::test]
    async fn test_next_payload_is_replaced() {
        let routes = vec![RouteDef::get("/me", |args: Args| async move {
            Ok(Some(Reply::json(200, json!({"next": args.value(0)}))))
        })
        .with(from_fn(|_req| Ok(Next::with(json!({"user": "ann"})))))
        .with(from_fn(|_req| Ok(Next::proceed())))
        .arg(0, Extractor::Next)
        .build("", &[])];

        let resp = dispatcher(routes).dispatch(get("/me")).await;
        assert_eq!(body_json(resp).await, json!({"next": {}}));
    }

    #[tokio::test]
    async fn test_middleware_error_is_caught() {
        let routes = vec![RouteDef::get("/locked", ok_handler)
            .with(from_fn(|_req| Err(DispatchError::middleware("locked out"))))
            .build("", &[])];
        let resp = dispatcher(routes).dispatch(get("/locked")).await;
        assert_eq!(resp.status(), 404);
        assert_eq!(body_json(resp).await, json!({"error": "locked out"}));

        let routes = vec![RouteDef::post("/items", ok_handler).build("", &[])];
        let d = dispatcher(routes).with_global(crate::handler::JsonBody);
        let resp = d.dispatch(request("POST", "/items", "{nope")).await;
        assert_eq!(resp.status(), 404);
        let body = body_json(resp).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn test_payload_too_large() {
        let mut registry = RouteRegistry::new();
        registry.register(RouteDef::post("/upload", ok_handler).build("", &[]));
        let settings = DispatchSettings {
            max_body_size: 4,
            ..DispatchSettings::default()
        };
        let d = Dispatcher::new(registry, settings);

        let resp = d.dispatch(request("POST", "/upload", "way too long")).await;
        assert_eq!(resp.status(), 413);

        let resp = d.dispatch(request("POST", "/upload", "ok")).await;
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn test_trailing_slash_and_no_bindings() {
        let routes = vec![RouteDef::get("/users/:id", |args: Args| async move {
            let req = args.request(0).expect("implicit request");
            Ok(Some(Reply::json(200, json!({"id": req.param("id")}))))
        })
        .build("", &[])];

        let resp = dispatcher(routes).dispatch(get("/users/42/")).await;
        assert_eq!(body_json(resp).await, json!({"id": "42"}));
    }
}

use rust_dispatch::config::Config;
use rust_dispatch::handler::{BoxFuture, MiddlewareResult};
use rust_dispatch::{
    from_fn, logger, App, Args, Controller, Extractor, HandlerResult, Middleware, Next, Reply,
    RequestContext, RouteDef,
};
use serde_json::json;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg.logging)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let port = cfg.server.port;
    let mut app = App::with_config(cfg);

    app.use_middleware(from_fn(|req| {
        tracing::debug!(method = %req.method, url = %req.url, "incoming request");
        Ok(Next::proceed())
    }))
    .controller(hello_controller());

    app.listen(port).await
}

/// Delays every request of the controller before letting it through
struct Throttle(Duration);

impl Middleware for Throttle {
    fn handle<'a>(&'a self, _req: &'a mut RequestContext) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            tokio::time::sleep(self.0).await;
            Ok(Next::proceed())
        })
    }
}

/// GET /v1 and GET /v1/:name
fn hello_controller() -> Controller {
    Controller::new("/v1")
        .middleware(Throttle(Duration::from_millis(200)))
        .route(RouteDef::get("/", world).name("world"))
        .route(
            RouteDef::get("/:name", echo)
                .name("echo")
                .with(from_fn(|_req| Ok(Next::with(json!({ "hello": "world" })))))
                .arg(0, Extractor::param("name"))
                .arg(1, Extractor::Next),
        )
}

async fn world(_args: Args) -> HandlerResult {
    Ok(Some(Reply::json(200, json!({ "message": "Hello world" }))))
}

async fn echo(args: Args) -> HandlerResult {
    let name = args.str(0).unwrap_or_default();
    Ok(Some(Reply::json(
        200,
        json!({ "message": format!("Hello {name}"), "next": args.value(1) }),
    )))
}

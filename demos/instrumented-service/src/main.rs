//! Instrumented Service Example
//!
//! Builds a full stratum pipeline around a few handlers, drives requests
//! through it in-process and prints the scrape output.
//!
//! Set `RUST_LOG=stratum=info` to see the request log records, and
//! `LOG_FORMAT=json` for JSON output.

// Example-specific lint allowances
#![allow(missing_docs)]
#![allow(clippy::print_stdout)]
#![allow(clippy::unused_async)]

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use stratum::middleware::{LoggingLayer, RecoverLayer, ScrapeHandler, traced_with_stats};
use stratum::mock::MockTracer;
use stratum::prelude::*;
use stratum::stats::{HttpStats, Registry};
use stratum::{SpanReference, inject_span};
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Handlers
// ============================================================================

async fn hello(req: Request) -> Response {
    if let Some(logger) = logger_from(req.context()) {
        logger.debug("saying hello");
    }
    let trace_id = trace_id_from(req.context()).map_or_else(String::new, ToString::to_string);
    Response::text(format!("hello from trace {trace_id}\n"))
}

async fn missing(_req: Request) -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn explode(_req: Request) -> Response {
    panic!("handler exploded");
}

// ============================================================================
// Setup
// ============================================================================

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn instrument(
    name: &str,
    stats: &HttpStats,
    tracer: &Arc<MockTracer>,
    base: BoxHandler,
) -> Result<BoxHandler> {
    let pipeline = Pipeline::new()
        .middleware(traced_with_stats(name, stats.clone(), tracer.clone())?)
        .layer(LoggingLayer::builder().header("x-request-id").build()?)
        .layer(RecoverLayer::builder().stats(stats.clone()).build());
    Ok(pipeline.build(base))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let registry = Registry::new(recorder);
    let stats = HttpStats::new(registry.clone());
    let tracer = Arc::new(MockTracer::new());

    let hello_route = instrument("hello", &stats, &tracer, BoxHandler::new(handler_fn(hello)))?;
    let missing_route =
        instrument("missing", &stats, &tracer, BoxHandler::new(handler_fn(missing)))?;
    let explode_route =
        instrument("explode", &stats, &tracer, BoxHandler::new(handler_fn(explode)))?;
    let scrape = ScrapeHandler::new(handle).registry(registry);

    // A request continuing an upstream trace
    let upstream = tracer.start_span("upstream", SpanReference::Root);
    let upstream_context = Context::new().with::<stratum::SpanKey>(upstream.clone());
    let mut headers = stratum::HeaderMap::new();
    inject_span(&upstream_context, tracer.as_ref(), &mut headers)?;

    let mut traced = Request::builder(Method::GET, "/hello").header("x-request-id", "demo-1");
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            traced = traced.header(name.as_str(), value);
        }
    }

    let requests = [
        (hello_route.clone(), traced.build()?),
        (hello_route, Request::builder(Method::GET, "/hello").build()?),
        (missing_route, Request::builder(Method::GET, "/nowhere").build()?),
        (explode_route, Request::builder(Method::POST, "/explode").build()?),
    ];
    for (handler, request) in requests {
        let path = request.path().to_string();
        let Ok(response) = handler.oneshot(request).await;
        let body = String::from_utf8_lossy(response.body());
        println!("{path} -> {}: {}", response.status(), body.trim());
    }
    upstream.finish();

    for span in tracer.finished_spans() {
        println!(
            "span {} trace={} parent={:?}",
            span.operation_name, span.trace_id, span.parent_id
        );
    }

    let Ok(scraped) = scrape.oneshot(Request::builder(Method::GET, "/metrics").build()?).await;
    println!("\n{}", String::from_utf8_lossy(scraped.body()));

    Ok(())
}

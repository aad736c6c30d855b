//! Integration tests for the middleware layers composed into pipelines.

use std::sync::Arc;

use assert2::{check, let_assert};
use stratum::middleware::{LoggingLayer, MetricsLayer, RecoverLayer, TraceLayer, traced_with_stats};
use stratum::mock::MockTracer;
use stratum::stats::CANCELLED_CODE;
use stratum::testing::{MemoryLog, isolated as isolated_stats, sample};
use stratum::{
    LogGetter, Logger, Method, Pipeline, Request, Response, SpanReference, Tracer, handler_fn,
    logger_from, span_from,
};
use tower::{Service, ServiceExt};
use tracing::Level;

fn getter(sink: &MemoryLog) -> LogGetter {
    let sink = sink.clone();
    Arc::new(move || Ok(Logger::new(sink.clone())))
}

fn get(path: &str) -> Request {
    Request::builder(Method::GET, path)
        .build()
        .expect("valid request")
}

#[allow(clippy::unused_async)]
async fn boom(_req: Request) -> Response {
    panic!("doh!");
}

/// Recovery placed last contains panics from every inner layer.
#[tokio::test]
async fn test_recovery_outermost_returns_500() {
    let (stats, handle) = isolated_stats();
    let handler = Pipeline::new()
        .layer(
            MetricsLayer::builder()
                .name("boom")
                .stats(stats.clone())
                .build()
                .expect("valid layer"),
        )
        .layer(RecoverLayer::builder().stats(stats).build())
        .build(handler_fn(boom));

    let Ok(response) = handler.oneshot(get("/boom")).await;

    check!(response.status() == 500);
    check!(response.body() == "500 - Internal Server Error\n".as_bytes());
    check!(response.header("x-content-type-options") == Some("nosniff"));

    let rendered = handle.render();
    check!(sample(&rendered, "http_panics_caught_total", &[]) == Some(1.0));
    // The metrics layer was unwound by the panic before recording.
    check!(sample(&rendered, "http_requests_total", &[]).is_none());
}

/// Panics in concurrent requests are each counted once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_panics_are_counted() {
    const REQUESTS: usize = 32;

    let (stats, handle) = isolated_stats();
    let handler = Pipeline::new()
        .layer(RecoverLayer::builder().stats(stats).build())
        .build(handler_fn(boom));

    let tasks: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let handler = handler.clone();
            tokio::spawn(async move { handler.oneshot(get("/boom")).await })
        })
        .collect();

    for task in tasks {
        let_assert!(Ok(Ok(response)) = task.await);
        check!(response.status() == 500);
    }

    #[allow(clippy::cast_precision_loss)]
    let expected = REQUESTS as f64;
    check!(sample(&handle.render(), "http_panics_caught_total", &[]) == Some(expected));
}

/// Running the same request M times counts M requests.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_request_counter_matches_request_count() {
    const REQUESTS: usize = 50;

    let (stats, handle) = isolated_stats();
    let handler = Pipeline::new()
        .layer(
            MetricsLayer::builder()
                .name("count")
                .stats(stats)
                .build()
                .expect("valid layer"),
        )
        .build(handler_fn(|_req: Request| async { "counted" }));

    let tasks: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let handler = handler.clone();
            tokio::spawn(async move { handler.oneshot(get("/count")).await })
        })
        .collect();
    for task in tasks {
        let_assert!(Ok(Ok(_)) = task.await);
    }

    #[allow(clippy::cast_precision_loss)]
    let expected = REQUESTS as f64;
    let rendered = handle.render();
    check!(
        sample(&rendered, "http_requests_total", &[("code", "200"), ("method", "GET")])
            == Some(expected)
    );
    check!(
        sample(
            &rendered,
            "http_handler_statuses_total",
            &[("status_bucket", "2xx"), ("handler_name", "count")]
        ) == Some(expected)
    );
}

/// The header `Goo: boo` configured for logging yields `request_header_goo=boo`.
#[tokio::test]
async fn test_logging_copies_configured_headers() {
    let sink = MemoryLog::default();
    let handler = Pipeline::new()
        .layer(
            LoggingLayer::builder()
                .header("Goo")
                .log_getter(getter(&sink))
                .build()
                .expect("valid layer"),
        )
        .build(handler_fn(|req: Request| async move {
            let logger = logger_from(req.context()).cloned();
            match logger {
                Some(logger) => {
                    logger.info("handled");
                    Response::text("ok")
                }
                None => Response::status_only(500),
            }
        }));

    let request = Request::builder(Method::GET, "/hello")
        .header("Goo", "boo")
        .header("Other", "ignored")
        .build()
        .expect("valid request");
    let Ok(response) = handler.oneshot(request).await;
    check!(response.status() == 200);

    let records = sink.records();
    let messages: Vec<&str> = records.iter().map(|record| record.message.as_str()).collect();
    check!(messages == ["incoming request", "handled", "response generated"]);
    for record in &records {
        check!(record.field("request_header_goo") == Some("boo"));
        check!(record.field("request_header_other").is_none());
    }
    check!(records[2].field("status") == Some("200"));
}

/// Recovery inside logging logs the panic with the request logger.
#[tokio::test]
async fn test_panic_logged_with_request_logger() {
    let (stats, _handle) = isolated_stats();
    let sink = MemoryLog::default();
    let handler = Pipeline::new()
        .layer(RecoverLayer::builder().stats(stats).build())
        .layer(
            LoggingLayer::builder()
                .header("x-request-id")
                .log_getter(getter(&sink))
                .build()
                .expect("valid layer"),
        )
        .build(handler_fn(boom));

    let request = Request::builder(Method::GET, "/boom")
        .header("X-Request-Id", "req-1")
        .build()
        .expect("valid request");
    let Ok(response) = handler.oneshot(request).await;
    check!(response.status() == 500);

    let records = sink.records();
    let_assert!(Some(error) = records.iter().find(|record| record.level == Level::ERROR));
    check!(error.message == "panic during request handling");
    check!(error.field("err") == Some("doh!"));
    check!(error.field("request_header_x-request-id") == Some("req-1"));

    let_assert!(Some(last) = records.last());
    check!(last.message == "response generated");
    check!(last.field("status") == Some("500"));
}

/// A propagated span context yields a child span, otherwise a root span.
#[tokio::test]
async fn test_child_and_root_spans() {
    let tracer = MockTracer::new();
    let handler = Pipeline::new()
        .layer(TraceLayer::builder(tracer.clone()).name("api").build())
        .build(handler_fn(|req: Request| async move {
            if span_from(req.context()).is_some() {
                "traced"
            } else {
                "untraced"
            }
        }));

    let Ok(response) = handler.clone().oneshot(get("/root")).await;
    check!(response.body() == "traced".as_bytes());

    let parent = tracer.start_span("upstream", SpanReference::Root);
    let mut headers = stratum::HeaderMap::new();
    tracer
        .inject(&parent.context(), &mut headers)
        .expect("inject");
    let mut builder = Request::builder(Method::GET, "/child");
    for (name, value) in &headers {
        builder = builder.header(name.as_str(), value.to_str().expect("ascii"));
    }
    let Ok(_) = handler.oneshot(builder.build().expect("valid request")).await;

    let spans = tracer.finished_spans();
    check!(spans.len() == 2);
    check!(spans[0].parent_id.is_none());
    check!(spans[0].tags.get("http.url").map(String::as_str) == Some("/root"));

    let parent_context = parent.context();
    let parent_span_id = spans[1].parent_id.map(|id| id.to_string());
    let trace_id = spans[1].trace_id.to_string();
    check!(parent_span_id.as_deref() == Some(parent_context.span_id()));
    check!(parent_context.trace_id().map(|id| id.as_str()) == Some(trace_id.as_str()));
}

/// Layers run from the last added (outermost) to the first added.
#[tokio::test]
async fn test_full_stack_ordering() {
    let (stats, handle) = isolated_stats();
    let tracer = MockTracer::new();
    let sink = MemoryLog::default();

    let handler = Pipeline::new()
        .middleware(
            traced_with_stats("orders", stats.clone(), Arc::new(tracer.clone()))
                .expect("valid middleware"),
        )
        .layer(
            LoggingLayer::builder()
                .log_getter(getter(&sink))
                .build()
                .expect("valid layer"),
        )
        .layer(RecoverLayer::builder().stats(stats).build())
        .build(handler_fn(|req: Request| async move {
            // Logging is outside tracing: the span is visible, so is the logger.
            match (logger_from(req.context()), span_from(req.context())) {
                (Some(_), Some(_)) => Response::text("created").with_status(201),
                _ => Response::status_only(500),
            }
        }));

    let Ok(response) = handler.oneshot(get("/orders")).await;
    check!(response.status() == 201);

    check!(tracer.finished_spans().len() == 1);
    let_assert!(Some(last) = sink.records().pop());
    check!(last.field("status") == Some("201"));

    let rendered = handle.render();
    check!(sample(&rendered, "http_requests_total", &[("code", "201")]) == Some(1.0));
    check!(sample(&rendered, "http_panics_caught_total", &[]).is_none());
}

/// Every described series is exposed with its kind once recorded.
#[tokio::test]
async fn test_exposed_series_shape() {
    let (stats, handle) = isolated_stats();
    let handler = Pipeline::new()
        .layer(
            MetricsLayer::builder()
                .name("shape")
                .stats(stats.clone())
                .build()
                .expect("valid layer"),
        )
        .build(handler_fn(|_req: Request| async { "ok" }));
    let Ok(_) = handler.oneshot(get("/shape")).await;
    stats.record_panic();

    let rendered = handle.render();
    let mut types: Vec<&str> = rendered
        .lines()
        .filter(|line| line.starts_with("# TYPE"))
        .collect();
    types.sort_unstable();

    insta::assert_snapshot!(types.join("\n"), @r"
    # TYPE http_handler_duration_seconds summary
    # TYPE http_handler_statuses_total counter
    # TYPE http_panics_caught_total counter
    # TYPE http_request_duration_seconds summary
    # TYPE http_request_size_bytes summary
    # TYPE http_requests_total counter
    # TYPE http_response_size_bytes summary
    # TYPE http_time_to_write_seconds summary
    ");
}

/// A request abandoned by its caller still shows up in the series.
#[tokio::test]
async fn test_abandoned_request_is_recorded() {
    let (stats, handle) = isolated_stats();
    let mut handler = Pipeline::new()
        .layer(
            MetricsLayer::builder()
                .name("stalled")
                .stats(stats)
                .build()
                .expect("valid layer"),
        )
        .build(handler_fn(|_req: Request| async {
            std::future::pending::<Response>().await
        }));

    let Ok(ready) = handler.ready().await;
    let call = ready.call(get("/stalled"));
    let outcome = tokio::time::timeout(std::time::Duration::from_millis(10), call).await;
    check!(outcome.is_err());

    let rendered = handle.render();
    check!(sample(&rendered, "http_requests_total", &[("code", CANCELLED_CODE)]) == Some(1.0));
    check!(
        sample(
            &rendered,
            "http_handler_statuses_total",
            &[("status_bucket", "unknown"), ("handler_name", "stalled")]
        ) == Some(1.0)
    );
}

//! Composable HTTP middleware for logging, metrics, tracing and panic recovery.
//!
//! Handlers are [`tower`] services from [`Request`] to [`Response`]; each
//! concern is a layer in [`middleware`], and a [`Pipeline`] stacks them with
//! the last layer outermost.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use metrics_exporter_prometheus::PrometheusBuilder;
//! use stratum::middleware::{LoggingLayer, RecoverLayer, traced_with_stats};
//! use stratum::mock::MockTracer;
//! use stratum::prelude::*;
//! use stratum::stats::{HttpStats, Registry};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> stratum::Result<()> {
//! use tower::ServiceExt;
//!
//! let recorder = PrometheusBuilder::new().build_recorder();
//! let stats = HttpStats::new(Registry::new(recorder));
//!
//! let handler = Pipeline::new()
//!     .middleware(traced_with_stats("hello", stats.clone(), Arc::new(MockTracer::new()))?)
//!     .layer(LoggingLayer::builder().header("x-request-id").build()?)
//!     .layer(RecoverLayer::builder().stats(stats).build())
//!     .build(handler_fn(|_req: Request| async { "hello" }));
//!
//! let request = Request::builder(Method::GET, "/hello").build()?;
//! let Ok(response) = handler.oneshot(request).await;
//! assert_eq!(response.status(), 200);
//! # Ok(())
//! # }
//! ```

mod logger;
pub mod middleware;
pub mod mock;
pub mod prelude;
mod span;
pub mod stats;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use logger::{Log, LogGetter, Logger, LoggerKey, TracingLog, default_log_getter, logger_from};
pub use span::{
    Span, SpanContext, SpanHandle, SpanKey, SpanReference, TraceId, TraceIdKey, Tracer,
    inject_span, span_from, trace_id_from,
};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use stratum_core::{
    BoxHandler, Context, ContextKey, DEFAULT_STATUS, Error, HandlerFn, HandlerFuture,
    INTERNAL_SERVER_ERROR_BODY, IntoResponse, Middleware, Pipeline, Request, RequestBuilder,
    Response, Result, StatusBucket, StatusRecord, compose, handler_fn,
};

// Re-export http types for methods, status codes and headers
pub use stratum_core::{HeaderMap, Method, StatusCode, header};

//! Tower middleware layers for stratum handlers.
//!
//! Every layer wraps a handler (`Service<Request, Response = Response,
//! Error = Infallible>`) and can be turned into a [`Middleware`] for
//! [`stratum_core::compose`] or [`stratum_core::Pipeline`]. The last
//! middleware of a pipeline is the outermost one.
//!
//! # Available Layers
//!
//! - [`LoggingLayer`] - Request logger in the context, "incoming request" and "response generated" records
//! - [`TraceLayer`] - Span per request, child of the propagated context when there is one
//! - [`MetricsLayer`] - HTTP request series under a handler name
//! - [`RecoverLayer`] - Panics become `500` responses
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `prometheus` | [`ScrapeHandler`] serving a Prometheus handle |
//!
//! # Example
//!
//! ```
//! use metrics_exporter_prometheus::PrometheusBuilder;
//! use stratum::middleware::{LoggingLayer, MetricsLayer, RecoverLayer};
//! use stratum::stats::{HttpStats, Registry};
//! use stratum::{Pipeline, Request, handler_fn};
//!
//! let recorder = PrometheusBuilder::new().build_recorder();
//! let stats = HttpStats::new(Registry::new(recorder));
//!
//! let handler = Pipeline::new()
//!     .layer(MetricsLayer::builder().name("hello").stats(stats.clone()).build()?)
//!     .layer(LoggingLayer::new())
//!     .layer(RecoverLayer::builder().stats(stats).build())
//!     .build(handler_fn(|_req: Request| async { "hello" }));
//! # let _ = handler;
//! # Ok::<(), stratum::Error>(())
//! ```

#[cfg(feature = "prometheus")]
mod exposition;
mod logging;
mod metrics;
mod recover;
mod trace;

use std::sync::Arc;

#[cfg(feature = "prometheus")]
pub use exposition::{SCRAPE_IN_FLIGHT, SCRAPE_REQUESTS_TOTAL, ScrapeHandler};
pub use logging::{Logging, LoggingLayer, LoggingLayerBuilder};
pub use self::metrics::{Metrics, MetricsLayer, MetricsLayerBuilder};
pub use recover::{Recover, RecoverLayer, RecoverLayerBuilder};
pub use trace::{DEFAULT_OPERATION_NAME, TraceLayer, TraceLayerBuilder, Traced};

use stratum_core::{BoxHandler, Middleware, Result};
use tower::Layer;

use crate::span::Tracer;
use crate::stats::HttpStats;

/// Metrics then tracing under one handler name.
///
/// The metrics layer sits inside the span, so the span covers the time spent
/// recording series.
///
/// # Errors
///
/// Returns [`stratum_core::Error::MissingHandlerName`] if `name` is empty.
pub fn traced_with_stats(name: &str, stats: HttpStats, tracer: Arc<dyn Tracer>) -> Result<Middleware> {
    let metrics = MetricsLayer::builder().name(name).stats(stats).build()?;
    let trace = TraceLayerBuilder::new(tracer).name(name).build();

    Ok(Middleware::new(move |next| {
        BoxHandler::new(trace.layer(metrics.layer(next)))
    }))
}

//! HTTP metrics middleware.
//!
//! Records the series described in [`crate::stats`] for every request that
//! goes through the wrapped handler.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use stratum_core::{Error, HandlerFuture, Request, Response, Result, StatusRecord};
use tower::{Layer, Service};

use crate::stats::{HttpStats, Observation};

/// Layer that records HTTP metrics under a handler name.
///
/// # Example
///
/// ```
/// use stratum::middleware::MetricsLayer;
///
/// let layer = MetricsLayer::builder().name("users").build();
/// assert!(layer.is_ok());
///
/// let missing = MetricsLayer::builder().build();
/// assert!(missing.is_err());
/// ```
#[derive(Debug, Clone)]
pub struct MetricsLayer {
    handler_name: Arc<str>,
    stats: HttpStats,
}

impl MetricsLayer {
    /// Layer recording into the process-wide recorder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHandlerName`] if `handler_name` is empty.
    pub fn new(handler_name: impl Into<String>) -> Result<Self> {
        Self::builder().name(handler_name).build()
    }

    /// Start configuring a layer.
    #[must_use]
    pub fn builder() -> MetricsLayerBuilder {
        MetricsLayerBuilder::default()
    }

    /// Handler name label.
    #[must_use]
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = Metrics<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Metrics {
            inner,
            handler_name: Arc::clone(&self.handler_name),
            stats: self.stats.clone(),
        }
    }
}

/// Builder for [`MetricsLayer`].
#[derive(Debug, Clone, Default)]
pub struct MetricsLayerBuilder {
    handler_name: String,
    stats: Option<HttpStats>,
}

impl MetricsLayerBuilder {
    /// Handler name label. Mandatory.
    #[must_use]
    pub fn name(mut self, handler_name: impl Into<String>) -> Self {
        self.handler_name = handler_name.into();
        self
    }

    /// Record into `stats` instead of the process-wide recorder.
    #[must_use]
    pub fn stats(mut self, stats: HttpStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Build the layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingHandlerName`] if no name was given.
    pub fn build(self) -> Result<MetricsLayer> {
        if self.handler_name.is_empty() {
            return Err(Error::MissingHandlerName);
        }
        let stats = self.stats.unwrap_or_else(HttpStats::global);
        tracing::debug!(handler = %self.handler_name, "metrics layer configured");
        Ok(MetricsLayer {
            handler_name: self.handler_name.into(),
            stats,
        })
    }
}

/// Service that records HTTP metrics.
#[derive(Debug, Clone)]
pub struct Metrics<S> {
    inner: S,
    handler_name: Arc<str>,
    stats: HttpStats,
}

impl<S> Service<Request> for Metrics<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let start = Instant::now();
        let guard = InFlight {
            stats: self.stats.clone(),
            handler_name: Arc::clone(&self.handler_name),
            method: request.method().to_string(),
            request_size: request.approximate_size(),
            start,
            done: false,
        };

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut record = StatusRecord::starting_at(start);
            let response = record.capture(inner.call(request)).await?;
            guard.finish(&record);
            Ok(response)
        })
    }
}

/// Request seen by the metrics layer and not yet answered.
///
/// Dropped unanswered (the caller gave up on the future), it records the
/// request-side series under [`CANCELLED_CODE`](crate::stats::CANCELLED_CODE).
/// Nothing is recorded while unwinding: the recovery layer counts panics.
struct InFlight {
    stats: HttpStats,
    handler_name: Arc<str>,
    method: String,
    request_size: usize,
    start: Instant,
    done: bool,
}

impl InFlight {
    fn finish(mut self, record: &StatusRecord) {
        self.done = true;
        let duration = self.start.elapsed();
        self.stats.record(&Observation {
            method: &self.method,
            code: record.status(),
            handler_name: &self.handler_name,
            duration,
            request_size: self.request_size,
            response_size: record.bytes_written(),
            time_to_write: record.time_to_first_byte().unwrap_or(duration),
        });
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.done || std::thread::panicking() {
            return;
        }
        tracing::debug!(handler = %self.handler_name, "request dropped before a response");
        self.stats.record_cancelled(
            &self.method,
            &self.handler_name,
            self.start.elapsed(),
            self.request_size,
        );
    }
}

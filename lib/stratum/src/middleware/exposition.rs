//! Prometheus scrape endpoint.
//!
//! [`ScrapeHandler`] is a base handler serving the text exposition of a
//! [`PrometheusHandle`]. It instruments itself: scrapes are counted by status
//! code and the number of scrapes being served is tracked in a gauge.

use std::convert::Infallible;
use std::task::{Context, Poll};

use http::header::{CONTENT_TYPE, HeaderValue};
use metrics::Unit;
use metrics_exporter_prometheus::PrometheusHandle;
use stratum_core::{HandlerFuture, Request, Response};
use tower::Service;

use crate::stats::Registry;

/// Scrapes served, by status code.
pub const SCRAPE_REQUESTS_TOTAL: &str = "promhttp_metric_handler_requests_total";
/// Scrapes currently being served.
pub const SCRAPE_IN_FLIGHT: &str = "promhttp_metric_handler_requests_in_flight";

const CONTENT_TYPE_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Handler rendering a Prometheus handle.
///
/// # Example
///
/// ```
/// use metrics_exporter_prometheus::PrometheusBuilder;
/// use stratum::middleware::ScrapeHandler;
/// use stratum::stats::Registry;
///
/// let recorder = PrometheusBuilder::new().build_recorder();
/// let handler = ScrapeHandler::new(recorder.handle()).registry(Registry::new(recorder));
/// # let _ = handler;
/// ```
#[derive(Debug, Clone)]
pub struct ScrapeHandler {
    handle: PrometheusHandle,
    registry: Registry,
}

impl ScrapeHandler {
    /// Serve `handle`, counting scrapes in the process-wide recorder.
    #[must_use]
    pub fn new(handle: PrometheusHandle) -> Self {
        let registry = Registry::global();
        registry.scope(describe);
        Self { handle, registry }
    }

    /// Count scrapes in `registry` instead.
    #[must_use]
    pub fn registry(mut self, registry: Registry) -> Self {
        registry.scope(describe);
        self.registry = registry;
        self
    }

    fn scrape(&self) -> Response {
        self.registry
            .scope(|| metrics::gauge!(SCRAPE_IN_FLIGHT).increment(1.0));

        let mut response = Response::text(self.handle.render());
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_TEXT));

        let code = response.status().to_string();
        self.registry.scope(|| {
            metrics::gauge!(SCRAPE_IN_FLIGHT).decrement(1.0);
            metrics::counter!(SCRAPE_REQUESTS_TOTAL, "code" => code).increment(1);
        });
        response
    }
}

fn describe() {
    metrics::describe_counter!(
        SCRAPE_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of scrapes by HTTP status code."
    );
    metrics::describe_gauge!(
        SCRAPE_IN_FLIGHT,
        Unit::Count,
        "Current number of scrapes being served."
    );
}

impl Service<Request> for ScrapeHandler {
    type Response = Response;
    type Error = Infallible;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _request: Request) -> Self::Future {
        let response = self.scrape();
        Box::pin(async move { Ok(response) })
    }
}

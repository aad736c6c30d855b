//! HTTP metrics series.
//!
//! Series are recorded through the [`metrics`] facade. A [`Registry`] decides
//! where they land: the process-wide recorder by default, or an explicit
//! recorder so independent pipelines (and tests) never share a series.
//!
//! | Series | Kind | Labels |
//! |--------|------|--------|
//! | `http_requests_total` | counter | `code`, `method` |
//! | `http_request_duration_seconds` | histogram | `code`, `method` |
//! | `http_response_size_bytes` | histogram | `code`, `method` |
//! | `http_request_size_bytes` | histogram | `code`, `method` |
//! | `http_time_to_write_seconds` | histogram | `code`, `method` |
//! | `http_handler_duration_seconds` | histogram | `code`, `method`, `handler_name` |
//! | `http_handler_statuses_total` | counter | `method`, `status_bucket`, `handler_name` |
//! | `http_panics_caught_total` | counter | |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use metrics::{Recorder, Unit};
use stratum_core::StatusBucket;

/// Total requests.
pub const REQUESTS_TOTAL: &str = "http_requests_total";
/// Request duration, layer entry to exit.
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";
/// Response body size.
pub const RESPONSE_SIZE: &str = "http_response_size_bytes";
/// Inbound request size.
pub const REQUEST_SIZE: &str = "http_request_size_bytes";
/// Time until the response head was available.
pub const TIME_TO_WRITE: &str = "http_time_to_write_seconds";
/// Request duration per handler.
pub const HANDLER_DURATION: &str = "http_handler_duration_seconds";
/// Requests per handler and status bucket.
pub const HANDLER_STATUSES: &str = "http_handler_statuses_total";
/// Panics contained by the recovery layer.
pub const PANICS_CAUGHT: &str = "http_panics_caught_total";

/// `code` label of requests dropped before the handler answered.
pub const CANCELLED_CODE: &str = "cancelled";

const LABEL_CODE: &str = "code";
const LABEL_METHOD: &str = "method";
const LABEL_HANDLER: &str = "handler_name";
const LABEL_BUCKET: &str = "status_bucket";

/// Destination of recorded series.
#[derive(Clone, Default)]
pub struct Registry {
    recorder: Option<Arc<dyn Recorder + Send + Sync>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("global", &self.recorder.is_none())
            .finish()
    }
}

impl Registry {
    /// Registry forwarding to the process-wide recorder.
    ///
    /// Nothing is recorded until a recorder is installed with
    /// [`metrics::set_global_recorder`] (or an exporter that does it).
    #[must_use]
    pub fn global() -> Self {
        Self::default()
    }

    /// Registry writing into `recorder` only.
    ///
    /// ```
    /// use metrics_exporter_prometheus::PrometheusBuilder;
    /// use stratum::stats::Registry;
    ///
    /// let recorder = PrometheusBuilder::new().build_recorder();
    /// let handle = recorder.handle();
    /// let registry = Registry::new(recorder);
    ///
    /// registry.scope(|| metrics::counter!("jobs_total").increment(1));
    /// assert!(handle.render().contains("jobs_total 1"));
    /// ```
    #[must_use]
    pub fn new<R>(recorder: R) -> Self
    where
        R: Recorder + Send + Sync + 'static,
    {
        Self {
            recorder: Some(Arc::new(recorder)),
        }
    }

    /// Returns `true` when forwarding to the process-wide recorder.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        self.recorder.is_none()
    }

    /// Run `f` with this registry as the active recorder.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.recorder {
            Some(recorder) => metrics::with_local_recorder(&**recorder, f),
            None => f(),
        }
    }
}

/// One finished request, as seen by the metrics layer.
#[derive(Debug, Clone)]
pub struct Observation<'a> {
    /// Request method.
    pub method: &'a str,
    /// Final status code.
    pub code: u16,
    /// Handler name label.
    pub handler_name: &'a str,
    /// Layer entry to exit.
    pub duration: Duration,
    /// Inbound request size in bytes.
    pub request_size: usize,
    /// Response body size in bytes.
    pub response_size: usize,
    /// Time until the response head was available.
    pub time_to_write: Duration,
}

/// The HTTP series, bound to a [`Registry`].
#[derive(Debug, Clone)]
pub struct HttpStats {
    registry: Registry,
}

impl Default for HttpStats {
    fn default() -> Self {
        Self::global()
    }
}

impl HttpStats {
    /// Series recorded into `registry`.
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        registry.scope(describe);
        Self { registry }
    }

    /// Series recorded into the process-wide recorder.
    #[must_use]
    pub fn global() -> Self {
        Self::new(Registry::global())
    }

    /// Registry the series are recorded into.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record every request series for one finished request.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&self, observation: &Observation<'_>) {
        let code = observation.code.to_string();
        let method = observation.method.to_string();
        let handler = observation.handler_name.to_string();
        let bucket = StatusBucket::classify(observation.code).as_str();
        let duration = observation.duration.as_secs_f64();

        self.registry.scope(|| {
            metrics::histogram!(RESPONSE_SIZE, LABEL_CODE => code.clone(), LABEL_METHOD => method.clone())
                .record(observation.response_size as f64);
            metrics::counter!(REQUESTS_TOTAL, LABEL_CODE => code.clone(), LABEL_METHOD => method.clone())
                .increment(1);
            metrics::histogram!(REQUEST_DURATION, LABEL_CODE => code.clone(), LABEL_METHOD => method.clone())
                .record(duration);
            metrics::histogram!(
                HANDLER_DURATION,
                LABEL_CODE => code.clone(),
                LABEL_METHOD => method.clone(),
                LABEL_HANDLER => handler.clone()
            )
            .record(duration);
            metrics::histogram!(REQUEST_SIZE, LABEL_CODE => code.clone(), LABEL_METHOD => method.clone())
                .record(observation.request_size as f64);
            metrics::histogram!(TIME_TO_WRITE, LABEL_CODE => code, LABEL_METHOD => method.clone())
                .record(observation.time_to_write.as_secs_f64());
            metrics::counter!(
                HANDLER_STATUSES,
                LABEL_METHOD => method,
                LABEL_BUCKET => bucket,
                LABEL_HANDLER => handler
            )
            .increment(1);
        });
    }

    /// Record what is known of a request dropped before its handler answered.
    ///
    /// The request is counted under `code="cancelled"` with its size and the
    /// time it was in flight. No response size or time to write is recorded.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_cancelled(
        &self,
        method: &str,
        handler_name: &str,
        in_flight: Duration,
        request_size: usize,
    ) {
        let method = method.to_string();
        let handler = handler_name.to_string();
        let bucket = StatusBucket::Unknown.as_str();
        let duration = in_flight.as_secs_f64();

        self.registry.scope(|| {
            metrics::counter!(REQUESTS_TOTAL, LABEL_CODE => CANCELLED_CODE, LABEL_METHOD => method.clone())
                .increment(1);
            metrics::histogram!(REQUEST_DURATION, LABEL_CODE => CANCELLED_CODE, LABEL_METHOD => method.clone())
                .record(duration);
            metrics::histogram!(
                HANDLER_DURATION,
                LABEL_CODE => CANCELLED_CODE,
                LABEL_METHOD => method.clone(),
                LABEL_HANDLER => handler.clone()
            )
            .record(duration);
            metrics::histogram!(REQUEST_SIZE, LABEL_CODE => CANCELLED_CODE, LABEL_METHOD => method.clone())
                .record(request_size as f64);
            metrics::counter!(
                HANDLER_STATUSES,
                LABEL_METHOD => method,
                LABEL_BUCKET => bucket,
                LABEL_HANDLER => handler
            )
            .increment(1);
        });
    }

    /// Count one contained panic.
    pub fn record_panic(&self) {
        self.registry
            .scope(|| metrics::counter!(PANICS_CAUGHT).increment(1));
    }
}

fn describe() {
    metrics::describe_counter!(
        REQUESTS_TOTAL,
        Unit::Count,
        "Total number of HTTP requests made."
    );
    metrics::describe_histogram!(
        REQUEST_DURATION,
        Unit::Seconds,
        "The HTTP request latencies in seconds."
    );
    metrics::describe_histogram!(
        RESPONSE_SIZE,
        Unit::Bytes,
        "The HTTP response sizes in bytes."
    );
    metrics::describe_histogram!(
        REQUEST_SIZE,
        Unit::Bytes,
        "The HTTP request sizes in bytes."
    );
    metrics::describe_histogram!(
        TIME_TO_WRITE,
        Unit::Seconds,
        "Time until the response header was written, in seconds."
    );
    metrics::describe_histogram!(
        HANDLER_DURATION,
        Unit::Seconds,
        "The HTTP request latencies per handler, in seconds."
    );
    metrics::describe_counter!(
        HANDLER_STATUSES,
        Unit::Count,
        "Total number of HTTP requests per handler and status bucket."
    );
    metrics::describe_counter!(
        PANICS_CAUGHT,
        Unit::Count,
        "Total number of panics contained while handling HTTP requests."
    );
}

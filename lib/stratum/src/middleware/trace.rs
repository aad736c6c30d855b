//! Span-per-request middleware.
//!
//! Each request runs inside a span started from the configured [`Tracer`]:
//! a server-side child of the context propagated in the request headers, or
//! a new root span when the headers carry none. The span (and the trace id,
//! when the tracer exposes one) is stored in the request context.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use stratum_core::{HandlerFuture, Request, Response};
use tower::{Layer, Service};

use crate::span::{SpanHandle, SpanKey, SpanReference, TraceIdKey, Tracer};

/// Operation name used when none is configured.
pub const DEFAULT_OPERATION_NAME: &str = "unknown";

const TAG_SPAN_KIND: &str = "span.kind";
const TAG_HTTP_METHOD: &str = "http.method";
const TAG_HTTP_URL: &str = "http.url";

#[derive(Default)]
struct TraceConfig {
    prefix: String,
    name: String,
    baggage: BTreeMap<String, String>,
    tags: BTreeMap<String, String>,
    logs: BTreeMap<String, String>,
}

/// Layer that traces every request.
///
/// # Example
///
/// ```
/// use stratum::middleware::TraceLayer;
/// use stratum::mock::MockTracer;
///
/// let layer = TraceLayer::builder(MockTracer::new())
///     .prefix("api.")
///     .name("users")
///     .tag("component", "users")
///     .build();
///
/// assert_eq!(layer.operation_name(), "api.users");
/// ```
#[derive(Clone)]
pub struct TraceLayer {
    tracer: Arc<dyn Tracer>,
    config: Arc<TraceConfig>,
}

impl std::fmt::Debug for TraceLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLayer")
            .field("operation_name", &self.operation_name())
            .finish_non_exhaustive()
    }
}

impl TraceLayer {
    /// Layer tracing with `tracer` under the default operation name.
    #[must_use]
    pub fn new(tracer: impl Tracer) -> Self {
        Self::builder(tracer).build()
    }

    /// Start configuring a layer tracing with `tracer`.
    #[must_use]
    pub fn builder(tracer: impl Tracer) -> TraceLayerBuilder {
        TraceLayerBuilder::new(Arc::new(tracer))
    }

    /// Operation name of the spans started by this layer.
    #[must_use]
    pub fn operation_name(&self) -> String {
        let name = if self.config.name.is_empty() {
            DEFAULT_OPERATION_NAME
        } else {
            &self.config.name
        };
        format!("{}{name}", self.config.prefix)
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = Traced<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Traced {
            inner,
            tracer: Arc::clone(&self.tracer),
            config: Arc::clone(&self.config),
            operation_name: self.operation_name().into(),
        }
    }
}

/// Builder for [`TraceLayer`].
pub struct TraceLayerBuilder {
    tracer: Arc<dyn Tracer>,
    config: TraceConfig,
}

impl std::fmt::Debug for TraceLayerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLayerBuilder")
            .field("prefix", &self.config.prefix)
            .field("name", &self.config.name)
            .finish_non_exhaustive()
    }
}

impl TraceLayerBuilder {
    /// Builder tracing with a shared tracer.
    #[must_use]
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Self {
            tracer,
            config: TraceConfig::default(),
        }
    }

    /// Handler name, second part of the operation name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Prefix of the operation name.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Baggage item set on every span. Skipped when `value` is empty.
    #[must_use]
    pub fn baggage_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.baggage.insert(key.into(), value.into());
        self
    }

    /// Tag set on every span. Skipped when `value` is empty.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.tags.insert(key.into(), value.into());
        self
    }

    /// Key/value logged on every span. Skipped when `value` is empty.
    #[must_use]
    pub fn log_kv(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.logs.insert(key.into(), value.into());
        self
    }

    /// Build the layer.
    #[must_use]
    pub fn build(self) -> TraceLayer {
        let layer = TraceLayer {
            tracer: self.tracer,
            config: Arc::new(self.config),
        };
        tracing::debug!(operation = %layer.operation_name(), "trace layer configured");
        layer
    }
}

/// Service that traces every request.
#[derive(Clone)]
pub struct Traced<S> {
    inner: S,
    tracer: Arc<dyn Tracer>,
    config: Arc<TraceConfig>,
    operation_name: Arc<str>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Traced<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traced")
            .field("inner", &self.inner)
            .field("operation_name", &self.operation_name)
            .finish_non_exhaustive()
    }
}

impl<S> Traced<S> {
    fn start_span(&self, request: &Request) -> SpanHandle {
        let span = match self.tracer.extract(request.headers()) {
            Some(parent) => {
                let span = self
                    .tracer
                    .start_span(&self.operation_name, SpanReference::ServerChildOf(parent));
                span.set_tag(TAG_SPAN_KIND, "server");
                span
            }
            None => self
                .tracer
                .start_span(&self.operation_name, SpanReference::Root),
        };

        span.set_tag(TAG_HTTP_METHOD, request.method().as_str());
        span.set_tag(TAG_HTTP_URL, request.path());

        for (key, value) in non_empty(&self.config.baggage) {
            span.set_baggage_item(key, value);
        }
        for (key, value) in non_empty(&self.config.tags) {
            span.set_tag(key, value);
        }
        for (key, value) in non_empty(&self.config.logs) {
            span.log_kv(key, value);
        }
        span
    }
}

fn non_empty(items: &BTreeMap<String, String>) -> impl Iterator<Item = (&str, &str)> {
    items
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key.as_str(), value.as_str()))
}

/// Finishes the span when dropped, so cancelled or unwinding calls finish too.
struct FinishGuard(SpanHandle);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

impl<S> Service<Request> for Traced<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let span = self.start_span(&request);
        let guard = FinishGuard(Arc::clone(&span));

        let mut context = request.context().with::<SpanKey>(span.clone());
        if let Some(trace_id) = span.context().trace_id() {
            context = context.with::<TraceIdKey>(trace_id.clone());
        }
        let request = request.with_context(context);

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let _guard = guard;
            inner.call(request).await
        })
    }
}

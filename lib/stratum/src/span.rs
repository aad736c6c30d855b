//! Distributed-tracing capability contract.
//!
//! stratum does not implement trace propagation itself. A [`Tracer`] knows
//! how to read and write span contexts in HTTP headers and how to start
//! spans; a [`Span`] is one unit of work. Adapters for concrete backends
//! implement both traits. [`crate::mock::MockTracer`] is an in-memory
//! implementation for tests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use derive_more::Display;
use http::HeaderMap;
use stratum_core::{Context, ContextKey, Result};

/// Trace identifier shared by every span of one trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct TraceId(String);

impl From<String> for TraceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for TraceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl TraceId {
    /// Identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Propagated identity of a span.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpanContext {
    trace_id: Option<TraceId>,
    span_id: String,
    baggage: BTreeMap<String, String>,
}

impl SpanContext {
    /// Span context with the given span id and no trace id.
    #[must_use]
    pub fn new(span_id: impl Into<String>) -> Self {
        Self {
            trace_id: None,
            span_id: span_id.into(),
            baggage: BTreeMap::new(),
        }
    }

    /// Attach a trace id.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<TraceId>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Attach a baggage item.
    #[must_use]
    pub fn with_baggage_item(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.baggage.insert(key.into(), value.into());
        self
    }

    /// Trace id, when the tracer exposes one.
    #[must_use]
    pub const fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    /// Span id.
    #[must_use]
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// Baggage carried with the trace.
    #[must_use]
    pub const fn baggage(&self) -> &BTreeMap<String, String> {
        &self.baggage
    }
}

/// Relationship of a new span to an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanReference {
    /// Start a new trace.
    Root,
    /// Server-side child of a span extracted from an inbound request.
    ServerChildOf(SpanContext),
}

/// A traced unit of work.
///
/// Methods take `&self`: a span is shared between the layer that owns it
/// and the handlers reading it from the request context.
pub trait Span: fmt::Debug + Send + Sync + 'static {
    /// Current identity, baggage included.
    fn context(&self) -> SpanContext;

    /// Set a tag.
    fn set_tag(&self, key: &str, value: &str);

    /// Add a baggage item propagated to descendants.
    fn set_baggage_item(&self, key: &str, value: &str);

    /// Log one key/value pair on the span.
    fn log_kv(&self, key: &str, value: &str);

    /// End the span.
    fn finish(&self);
}

/// Shared span handle.
pub type SpanHandle = Arc<dyn Span>;

/// Tracer capability.
pub trait Tracer: Send + Sync + 'static {
    /// Read a span context from inbound headers.
    ///
    /// Absent or malformed propagation headers yield `None`.
    fn extract(&self, headers: &HeaderMap) -> Option<SpanContext>;

    /// Write a span context into outbound headers.
    fn inject(&self, context: &SpanContext, headers: &mut HeaderMap) -> Result<()>;

    /// Start a span.
    fn start_span(&self, operation_name: &str, reference: SpanReference) -> SpanHandle;
}

/// Context key of the current span.
#[derive(Debug)]
pub struct SpanKey;

impl ContextKey for SpanKey {
    type Value = SpanHandle;
}

/// Context key of the current trace id.
#[derive(Debug)]
pub struct TraceIdKey;

impl ContextKey for TraceIdKey {
    type Value = TraceId;
}

/// Span stored by the trace layer, if any.
#[must_use]
pub fn span_from(context: &Context) -> Option<&SpanHandle> {
    context.get::<SpanKey>()
}

/// Trace id stored by the trace layer, if the tracer exposed one.
#[must_use]
pub fn trace_id_from(context: &Context) -> Option<&TraceId> {
    context.get::<TraceIdKey>()
}

/// Propagate the current span onto outbound headers.
///
/// Returns `Ok(false)` when the context holds no span.
pub fn inject_span(context: &Context, tracer: &dyn Tracer, headers: &mut HeaderMap) -> Result<bool> {
    let Some(span) = span_from(context) else {
        return Ok(false);
    };
    tracer.inject(&span.context(), headers)?;
    Ok(true)
}

//! In-memory [`Tracer`] for tests.
//!
//! [`MockTracer`] hands out sequential ids, remembers every finished span
//! and propagates through plain headers:
//!
//! | Header | Content |
//! |--------|---------|
//! | `mockpfx-ids-traceid` | trace id (decimal) |
//! | `mockpfx-ids-spanid` | span id (decimal) |
//! | `mockpfx-baggage-<key>` | baggage item |
//!
//! ```
//! use stratum::mock::MockTracer;
//! use stratum::{SpanReference, Tracer};
//!
//! let tracer = MockTracer::new();
//! let span = tracer.start_span("work", SpanReference::Root);
//! span.finish();
//!
//! assert_eq!(tracer.finished_spans()[0].operation_name, "work");
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use stratum_core::{Error, Result};

use crate::span::{Span, SpanContext, SpanHandle, SpanReference, Tracer};

const TRACE_ID_HEADER: &str = "mockpfx-ids-traceid";
const SPAN_ID_HEADER: &str = "mockpfx-ids-spanid";
const BAGGAGE_PREFIX: &str = "mockpfx-baggage-";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Snapshot of a finished span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSpan {
    /// Operation name given at start.
    pub operation_name: String,
    /// Trace id.
    pub trace_id: u64,
    /// Span id.
    pub span_id: u64,
    /// Span id of the parent, `None` for a root span.
    pub parent_id: Option<u64>,
    /// Tags.
    pub tags: BTreeMap<String, String>,
    /// Baggage items.
    pub baggage: BTreeMap<String, String>,
    /// Logged key/value pairs, in order.
    pub logs: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct Recorder {
    next_id: AtomicU64,
    finished: Mutex<Vec<FinishedSpan>>,
}

impl Recorder {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Tracer recording spans in memory.
#[derive(Debug, Clone, Default)]
pub struct MockTracer {
    recorder: Arc<Recorder>,
}

impl MockTracer {
    /// New tracer with no recorded span.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spans finished so far, in finishing order.
    #[must_use]
    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        lock(&self.recorder.finished).clone()
    }

    /// Forget every finished span.
    pub fn reset(&self) {
        lock(&self.recorder.finished).clear();
    }
}

impl Tracer for MockTracer {
    fn extract(&self, headers: &HeaderMap) -> Option<SpanContext> {
        let read_id = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
        };
        let trace_id = read_id(TRACE_ID_HEADER)?;
        let span_id = read_id(SPAN_ID_HEADER)?;

        let mut context = SpanContext::new(span_id.to_string()).with_trace_id(trace_id.to_string());
        for (name, value) in headers {
            if let Some(key) = name.as_str().strip_prefix(BAGGAGE_PREFIX)
                && let Ok(value) = value.to_str()
            {
                context = context.with_baggage_item(key, value);
            }
        }
        Some(context)
    }

    fn inject(&self, context: &SpanContext, headers: &mut HeaderMap) -> Result<()> {
        let trace_id = context
            .trace_id()
            .ok_or_else(|| Error::propagation("span context has no trace id"))?;

        let mut insert = |name: &str, value: &str| -> Result<()> {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| Error::propagation(err.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|err| Error::propagation(err.to_string()))?;
            headers.insert(name, value);
            Ok(())
        };

        insert(TRACE_ID_HEADER, trace_id.as_str())?;
        insert(SPAN_ID_HEADER, context.span_id())?;
        for (key, value) in context.baggage() {
            insert(&format!("{BAGGAGE_PREFIX}{key}"), value.as_str())?;
        }
        Ok(())
    }

    fn start_span(&self, operation_name: &str, reference: SpanReference) -> SpanHandle {
        let span_id = self.recorder.next_id();
        let (trace_id, parent_id, baggage) = match reference {
            SpanReference::Root => (self.recorder.next_id(), None, BTreeMap::new()),
            SpanReference::ServerChildOf(parent) => {
                let trace_id = parent
                    .trace_id()
                    .and_then(|id| id.as_str().parse().ok())
                    .unwrap_or_else(|| self.recorder.next_id());
                let parent_id = parent.span_id().parse().ok();
                (trace_id, parent_id, parent.baggage().clone())
            }
        };

        Arc::new(MockSpan {
            recorder: Arc::clone(&self.recorder),
            finished: AtomicBool::new(false),
            state: Mutex::new(FinishedSpan {
                operation_name: operation_name.to_string(),
                trace_id,
                span_id,
                parent_id,
                tags: BTreeMap::new(),
                baggage,
                logs: Vec::new(),
            }),
        })
    }
}

/// Span produced by [`MockTracer`].
#[derive(Debug)]
pub struct MockSpan {
    recorder: Arc<Recorder>,
    finished: AtomicBool,
    state: Mutex<FinishedSpan>,
}

impl Span for MockSpan {
    fn context(&self) -> SpanContext {
        let state = lock(&self.state);
        state.baggage.iter().fold(
            SpanContext::new(state.span_id.to_string()).with_trace_id(state.trace_id.to_string()),
            |context, (key, value)| context.with_baggage_item(key, value),
        )
    }

    fn set_tag(&self, key: &str, value: &str) {
        lock(&self.state).tags.insert(key.to_string(), value.to_string());
    }

    fn set_baggage_item(&self, key: &str, value: &str) {
        lock(&self.state)
            .baggage
            .insert(key.to_string(), value.to_string());
    }

    fn log_kv(&self, key: &str, value: &str) {
        lock(&self.state)
            .logs
            .push((key.to_string(), value.to_string()));
    }

    fn finish(&self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let snapshot = lock(&self.state).clone();
        lock(&self.recorder.finished).push(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_span_has_no_parent() {
        let tracer = MockTracer::new();
        let span = tracer.start_span("root", SpanReference::Root);
        span.finish();

        let spans = tracer.finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].operation_name, "root");
        assert!(spans[0].parent_id.is_none());
    }

    #[test]
    fn child_span_inherits_trace_and_baggage() {
        let tracer = MockTracer::new();
        let parent = tracer.start_span("parent", SpanReference::Root);
        parent.set_baggage_item("tenant", "acme");

        let child = tracer.start_span("child", SpanReference::ServerChildOf(parent.context()));
        child.finish();
        parent.finish();

        let spans = tracer.finished_spans();
        assert_eq!(spans[0].operation_name, "child");
        assert_eq!(spans[0].trace_id, spans[1].trace_id);
        assert_eq!(spans[0].parent_id, Some(spans[1].span_id));
        assert_eq!(spans[0].baggage.get("tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn finish_is_recorded_once() {
        let tracer = MockTracer::new();
        let span = tracer.start_span("once", SpanReference::Root);
        span.finish();
        span.finish();

        assert_eq!(tracer.finished_spans().len(), 1);
    }

    #[test]
    fn tags_and_logs_are_recorded() {
        let tracer = MockTracer::new();
        let span = tracer.start_span("op", SpanReference::Root);
        span.set_tag("component", "test");
        span.log_kv("event", "started");
        span.finish();

        let spans = tracer.finished_spans();
        assert_eq!(spans[0].tags.get("component").map(String::as_str), Some("test"));
        assert_eq!(spans[0].logs, [("event".to_string(), "started".to_string())]);
    }

    #[test]
    fn inject_then_extract() {
        let tracer = MockTracer::new();
        let span = tracer.start_span("op", SpanReference::Root);
        span.set_baggage_item("user", "bob");

        let mut headers = HeaderMap::new();
        tracer.inject(&span.context(), &mut headers).expect("inject");
        let extracted = tracer.extract(&headers).expect("extract");

        assert_eq!(extracted, span.context());
    }

    #[test]
    fn extract_rejects_missing_or_malformed_headers() {
        let tracer = MockTracer::new();
        assert!(tracer.extract(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(TRACE_ID_HEADER, HeaderValue::from_static("not-a-number"));
        headers.insert(SPAN_ID_HEADER, HeaderValue::from_static("1"));
        assert!(tracer.extract(&headers).is_none());
    }

    #[test]
    fn reset_forgets_spans() {
        let tracer = MockTracer::new();
        tracer.start_span("op", SpanReference::Root).finish();
        tracer.reset();

        assert!(tracer.finished_spans().is_empty());
    }
}

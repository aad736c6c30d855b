//! Test helpers for code built on these layers.
//!
//! Enabled by the `test-util` feature: an in-memory [`Log`] sink and a
//! private Prometheus recorder with a reader for its text output.
//!
//! ```
//! use stratum::testing::{MemoryLog, isolated, sample};
//!
//! let sink = MemoryLog::default();
//! let logger = stratum::Logger::new(sink.clone());
//! logger.with("user", "ada").info("signed in");
//! assert_eq!(sink.records()[0].field("user"), Some("ada"));
//!
//! let (stats, handle) = isolated();
//! stats.record_panic();
//! assert_eq!(sample(&handle.render(), "http_panics_caught_total", &[]), Some(1.0));
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::Level;

use crate::logger::Log;
use crate::stats::{HttpStats, Registry};

/// One captured log record.
#[derive(Debug, Clone)]
pub struct Record {
    /// Severity.
    pub level: Level,
    /// Message.
    pub message: String,
    /// Fields in insertion order.
    pub fields: Vec<(String, String)>,
}

impl Record {
    /// Value of the field `key`, if present.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sink keeping every record in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemoryLog {
    /// Records captured so far, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Log for MemoryLog {
    fn log(&self, level: Level, message: &str, fields: &[(String, String)]) {
        self.lock().push(Record {
            level,
            message: message.to_string(),
            fields: fields.to_vec(),
        });
    }
}

/// Stats backed by a private Prometheus recorder.
#[must_use]
pub fn isolated() -> (HttpStats, PrometheusHandle) {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    (HttpStats::new(Registry::new(recorder)), handle)
}

/// Value of the sample `name` carrying every `labels` pair.
#[must_use]
pub fn sample(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .find(|line| {
            labels
                .iter()
                .all(|(key, value)| line.contains(&format!("{key}=\"{value}\"")))
        })
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

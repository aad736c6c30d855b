//! Request-scoped structured logger.
//!
//! A [`Logger`] is a cheap, cloneable handle over a [`Log`] sink plus a list
//! of key/value fields. [`Logger::with`] never mutates: it returns a new
//! handle with one more field, so a logger enriched for one request never
//! leaks fields into another.
//!
//! The default sink, [`TracingLog`], forwards records to the `tracing`
//! facade; installing a `tracing-subscriber` (JSON, pretty, ...) picks the
//! output format.

use std::fmt;
use std::sync::Arc;

use stratum_core::{Context, ContextKey, Result};
use tracing::Level;

/// Destination of log records.
pub trait Log: Send + Sync + 'static {
    /// Emit one record.
    fn log(&self, level: Level, message: &str, fields: &[(String, String)]);
}

/// Sink forwarding records to the `tracing` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl Log for TracingLog {
    fn log(&self, level: Level, message: &str, fields: &[(String, String)]) {
        let fields = DisplayFields(fields);
        match level {
            Level::ERROR => tracing::error!(target: "stratum::request", fields = %fields, "{message}"),
            Level::WARN => tracing::warn!(target: "stratum::request", fields = %fields, "{message}"),
            Level::INFO => tracing::info!(target: "stratum::request", fields = %fields, "{message}"),
            Level::DEBUG => tracing::debug!(target: "stratum::request", fields = %fields, "{message}"),
            _ => tracing::trace!(target: "stratum::request", fields = %fields, "{message}"),
        }
    }
}

struct DisplayFields<'a>(&'a [(String, String)]);

impl fmt::Display for DisplayFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (key, value)) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

/// Structured logger handle.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Log>,
    fields: Arc<[(String, String)]>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(TracingLog)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Logger writing to `sink`, without fields.
    #[must_use]
    pub fn new(sink: impl Log) -> Self {
        Self {
            sink: Arc::new(sink),
            fields: Arc::from(Vec::new()),
        }
    }

    /// A new handle carrying one more field.
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        let mut fields = self.fields.to_vec();
        fields.push((key.into(), value.to_string()));
        Self {
            sink: Arc::clone(&self.sink),
            fields: fields.into(),
        }
    }

    /// Fields attached to this handle, oldest first.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of a field, if attached.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    }

    /// Log at debug level.
    pub fn debug(&self, message: &str) {
        self.sink.log(Level::DEBUG, message, &self.fields);
    }

    /// Log at info level.
    pub fn info(&self, message: &str) {
        self.sink.log(Level::INFO, message, &self.fields);
    }

    /// Log at error level.
    pub fn error(&self, message: &str) {
        self.sink.log(Level::ERROR, message, &self.fields);
    }
}

/// Logger acquisition capability.
pub type LogGetter = Arc<dyn Fn() -> Result<Logger> + Send + Sync>;

/// Acquisition used when none is configured: a [`TracingLog`] logger.
#[must_use]
pub fn default_log_getter() -> LogGetter {
    Arc::new(|| Ok(Logger::default()))
}

/// Context key of the request logger.
#[derive(Debug)]
pub struct LoggerKey;

impl ContextKey for LoggerKey {
    type Value = Logger;
}

/// Logger stored by the logging layer, if any.
#[must_use]
pub fn logger_from(context: &Context) -> Option<&Logger> {
    context.get::<LoggerKey>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryLog;

    #[test]
    fn with_returns_new_handle() {
        let base = Logger::new(MemoryLog::default());
        let enriched = base.with("user", "alice");

        assert!(base.fields().is_empty());
        assert_eq!(enriched.field("user"), Some("alice"));
    }

    #[test]
    fn records_carry_level_and_fields() {
        let sink = MemoryLog::default();
        let logger = Logger::new(sink.clone()).with("status", 200);

        logger.debug("first");
        logger.info("second");
        logger.error("third");

        let records = sink.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].level, Level::DEBUG);
        assert_eq!(records[1].message, "second");
        assert_eq!(records[2].level, Level::ERROR);
        assert_eq!(records[2].field("status"), Some("200"));
    }

    #[test]
    fn display_fields_renders_pairs() {
        let fields = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ];
        assert_eq!(DisplayFields(&fields).to_string(), "a=1 b=2");
    }

    #[test]
    fn logger_lookup_without_layer_is_absent() {
        assert!(logger_from(&Context::new()).is_none());
    }

    #[test]
    fn default_getter_succeeds() {
        let getter = default_log_getter();
        assert!(getter().is_ok());
    }
}

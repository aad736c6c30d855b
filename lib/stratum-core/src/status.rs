//! Response status capture.
//!
//! Outer layers need the final status of a call (logging writes it, metrics
//! label by it) but only see the response once the inner handler is done.
//! A [`StatusRecord`] is owned by one in-flight call, sits as the innermost
//! observer of the inner future and remembers what it saw: the first status,
//! the bytes written and how long it took until the response head existed.

use std::convert::Infallible;
use std::future::Future;
use std::time::{Duration, Instant};

use derive_more::Display;

use crate::Response;

/// Status reported when no status was ever set explicitly.
pub const DEFAULT_STATUS: u16 = 200;

/// Per-call record of the response status.
#[derive(Debug, Clone)]
pub struct StatusRecord {
    status: Option<u16>,
    started: Instant,
    time_to_first_byte: Option<Duration>,
    bytes_written: usize,
}

impl Default for StatusRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRecord {
    /// Fresh record; the clock for time to first byte starts now.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Fresh record measuring time to first byte from `started`.
    #[must_use]
    pub const fn starting_at(started: Instant) -> Self {
        Self {
            status: None,
            started,
            time_to_first_byte: None,
            bytes_written: 0,
        }
    }

    /// Record a status. Only the first call is kept.
    ///
    /// Returns `true` when this call was the one captured.
    pub fn set_status(&mut self, status: u16) -> bool {
        if self.status.is_some() {
            return false;
        }
        self.status = Some(status);
        self.time_to_first_byte = Some(self.started.elapsed());
        true
    }

    /// Captured status, or `200` if none was set.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status.unwrap_or(DEFAULT_STATUS)
    }

    /// Returns `true` if a status was set explicitly.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.status.is_some()
    }

    /// Elapsed time between record creation and the first status.
    #[must_use]
    pub const fn time_to_first_byte(&self) -> Option<Duration> {
        self.time_to_first_byte
    }

    /// Number of body bytes observed.
    #[must_use]
    pub const fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    /// Record a body write.
    pub fn record_write(&mut self, len: usize) {
        self.bytes_written = self.bytes_written.saturating_add(len);
    }

    /// Drive `call` to completion and record the response it produced.
    pub async fn capture<F>(&mut self, call: F) -> Result<Response, Infallible>
    where
        F: Future<Output = Result<Response, Infallible>>,
    {
        let response = call.await?;
        self.set_status(response.status());
        self.record_write(response.body().len());
        Ok(response)
    }
}

/// Coarse status classes used to label per-handler counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum StatusBucket {
    /// 200-299.
    #[display("2xx")]
    Success,
    /// 300-399.
    #[display("3xx")]
    Redirection,
    /// 400-499.
    #[display("4xx")]
    ClientError,
    /// 500-599.
    #[display("5xx")]
    ServerError,
    /// Anything else, including zero and negative codes.
    #[display("unknown")]
    Unknown,
}

impl StatusBucket {
    /// Classify a status code.
    #[must_use]
    pub fn classify(code: impl Into<i64>) -> Self {
        match code.into() {
            200..=299 => Self::Success,
            300..=399 => Self::Redirection,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Label value of this bucket.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "2xx",
            Self::Redirection => "3xx",
            Self::ClientError => "4xx",
            Self::ServerError => "5xx",
            Self::Unknown => "unknown",
        }
    }
}

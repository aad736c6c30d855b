//! Error types for stratum.
//!
//! Every variant is a setup-time fault: builders return them from `build()`
//! so a misconfigured pipeline never serves a request. Per-request paths are
//! infallible (see [`crate::BoxHandler`]).

use derive_more::{Display, Error, From};

/// Main error type for stratum operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// A layer that labels its series by handler name was built without one.
    #[display("handler name is not specified - cannot gather http metrics")]
    #[from(skip)]
    MissingHandlerName,

    /// The logger acquisition capability failed.
    #[display("could not acquire a logger: {_0}")]
    #[from(skip)]
    LoggerUnavailable(#[error(not(source))] String),

    /// A configured header name is not a valid HTTP header name.
    #[display("invalid header name: {_0}")]
    #[from(skip)]
    InvalidHeaderName(#[error(not(source))] String),

    /// Span context could not be written into outbound headers.
    #[display("trace propagation error: {_0}")]
    #[from(skip)]
    Propagation(#[error(not(source))] String),

    /// The inbound body could not be collected.
    #[display("body error: {_0}")]
    #[from(skip)]
    Body(#[error(not(source))] String),

    /// Invalid HTTP parts while converting to or from the `http` crate types.
    #[display("http error: {_0}")]
    #[from]
    Http(http::Error),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a logger acquisition error.
    #[must_use]
    pub fn logger_unavailable(message: impl Into<String>) -> Self {
        Self::LoggerUnavailable(message.into())
    }

    /// Create an invalid header name error.
    #[must_use]
    pub fn invalid_header_name(name: impl Into<String>) -> Self {
        Self::InvalidHeaderName(name.into())
    }

    /// Create a propagation error.
    #[must_use]
    pub fn propagation(message: impl Into<String>) -> Self {
        Self::Propagation(message.into())
    }

    /// Create a body error.
    #[must_use]
    pub fn body(message: impl Into<String>) -> Self {
        Self::Body(message.into())
    }

    /// Returns `true` if this error comes from layer configuration.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingHandlerName | Self::LoggerUnavailable(_) | Self::InvalidHeaderName(_)
        )
    }
}

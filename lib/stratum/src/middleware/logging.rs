//! Request logging middleware.
//!
//! Puts a request-scoped [`Logger`] into the request context, enriched with
//! the configured headers, and logs each request on the way in and out.

use std::convert::Infallible;
use std::task::{Context, Poll};
use std::time::Instant;

use http::header::HeaderName;
use stratum_core::{Error, HandlerFuture, Request, Response, Result, StatusRecord};
use tower::{Layer, Service};

use crate::logger::{LogGetter, Logger, LoggerKey, default_log_getter};

const HEADER_FIELD_PREFIX: &str = "request_header_";

/// Layer that adds a request logger.
///
/// # Example
///
/// ```
/// use stratum::middleware::LoggingLayer;
///
/// let layer = LoggingLayer::builder()
///     .header("x-request-id")
///     .build()
///     .expect("valid configuration");
/// # let _ = layer;
/// ```
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    logger: Logger,
    headers: Vec<HeaderName>,
}

impl LoggingLayer {
    /// Layer with the default logger and no header copied.
    #[must_use]
    pub fn new() -> Self {
        Self {
            logger: Logger::default(),
            headers: Vec::new(),
        }
    }

    /// Start configuring a layer.
    #[must_use]
    pub fn builder() -> LoggingLayerBuilder {
        LoggingLayerBuilder::default()
    }

    /// Header names copied into log fields, lowercase.
    #[must_use]
    pub fn headers(&self) -> &[HeaderName] {
        &self.headers
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            logger: self.logger.clone(),
            headers: self.headers.clone(),
        }
    }
}

/// Builder for [`LoggingLayer`].
pub struct LoggingLayerBuilder {
    headers: Vec<String>,
    log_getter: LogGetter,
}

impl Default for LoggingLayerBuilder {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            log_getter: default_log_getter(),
        }
    }
}

impl std::fmt::Debug for LoggingLayerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingLayerBuilder")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl LoggingLayerBuilder {
    /// Copy one request header into a `request_header_<name>` field.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>) -> Self {
        self.headers.push(name.into());
        self
    }

    /// Replace the copied headers.
    #[must_use]
    pub fn headers<I, H>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        self.headers = names.into_iter().map(Into::into).collect();
        self
    }

    /// Acquire the logger with `getter`.
    #[must_use]
    pub fn log_getter(mut self, getter: LogGetter) -> Self {
        self.log_getter = getter;
        self
    }

    /// Acquire the logger once and validate the header names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LoggerUnavailable`] if the getter fails and
    /// [`Error::InvalidHeaderName`] if a header name is not a valid token.
    pub fn build(self) -> Result<LoggingLayer> {
        let logger = (self.log_getter)().map_err(|err| match err {
            err @ Error::LoggerUnavailable(_) => err,
            other => Error::logger_unavailable(other.to_string()),
        })?;
        let headers = self
            .headers
            .iter()
            .map(|name| {
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| Error::invalid_header_name(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(headers = ?headers, "logging layer configured");
        Ok(LoggingLayer { logger, headers })
    }
}

/// Service that adds a request logger.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    logger: Logger,
    headers: Vec<HeaderName>,
}

impl<S> Logging<S> {
    /// Wrap `inner` with the default logger and no header copied.
    pub fn new(inner: S) -> Self {
        LoggingLayer::new().layer(inner)
    }

    fn request_logger(&self, request: &Request) -> Logger {
        self.headers.iter().fold(self.logger.clone(), |logger, name| {
            match request.headers().get(name) {
                Some(value) if !value.is_empty() => {
                    if value.to_str().is_err() {
                        tracing::warn!(header = %name, "header value is not visible ASCII, copied lossily");
                    }
                    logger.with(
                        format!("{HEADER_FIELD_PREFIX}{}", name.as_str()),
                        String::from_utf8_lossy(value.as_bytes()),
                    )
                }
                _ => logger,
            }
        })
    }
}

impl<S> Service<Request> for Logging<S>
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
        let logger = self.request_logger(&request);
        let context = request.context().with::<LoggerKey>(logger.clone());
        let request = request.with_context(context);

        logger
            .with("method", request.method())
            .with("path", request.path())
            .info("incoming request");

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let start = Instant::now();
            let mut record = StatusRecord::new();
            let response = record.capture(inner.call(request)).await?;

            // Saturating conversion to u64 (truncates after ~584 years)
            let duration_ns = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
            logger
                .with("status", record.status())
                .with("duration_ns", duration_ns)
                .info("response generated");

            Ok(response)
        })
    }
}

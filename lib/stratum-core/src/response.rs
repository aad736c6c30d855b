//! Outbound HTTP response and the [`IntoResponse`] conversion trait.
//!
//! # Example
//!
//! ```
//! use stratum_core::Response;
//!
//! let response = Response::text("hello");
//! assert_eq!(response.status(), 200);
//! ```

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

/// Body written by [`Response::internal_server_error`].
pub const INTERNAL_SERVER_ERROR_BODY: &str = "500 - Internal Server Error\n";

/// HTTP response with status, headers, and body.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK.as_u16(), HeaderMap::new(), Bytes::new())
    }
}

impl Response {
    /// Creates a new response.
    #[must_use]
    pub const fn new(status: u16, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Empty response with the given status.
    #[must_use]
    pub fn status_only(status: u16) -> Self {
        Self::new(status, HeaderMap::new(), Bytes::new())
    }

    /// `200 OK` with a `text/plain` body.
    #[must_use]
    pub fn text(body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self::new(StatusCode::OK.as_u16(), headers, body.into())
    }

    /// The fixed `500` response produced when a handler fails unrecoverably.
    #[must_use]
    pub fn internal_server_error() -> Self {
        let mut response = Self::text(INTERNAL_SERVER_ERROR_BODY);
        response.status = StatusCode::INTERNAL_SERVER_ERROR.as_u16();
        response.headers.insert(
            http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        response
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Replace the status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Response headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to headers.
    #[must_use]
    pub const fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Single header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume into (status, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (u16, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// Convert into an `http` response for the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the status code is outside `100..=999`.
    pub fn into_http(self) -> crate::Result<http::Response<Full<Bytes>>> {
        let status = StatusCode::from_u16(self.status).map_err(http::Error::from)?;
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        Ok(response)
    }
}

/// Conversion of handler return values into a [`Response`].
pub trait IntoResponse {
    /// Build the response.
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Response {
        Response::status_only(self.as_u16())
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        Response::text(self)
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        Response::text(self)
    }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response {
        Response::new(StatusCode::OK.as_u16(), HeaderMap::new(), self)
    }
}

impl<R: IntoResponse> IntoResponse for (StatusCode, R) {
    fn into_response(self) -> Response {
        self.1.into_response().with_status(self.0.as_u16())
    }
}

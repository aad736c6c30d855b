//! Inbound HTTP request.
//!
//! Use [`Request::builder`] to construct requests, or [`Request::from_http`]
//! to adopt one produced by a transport.
//!
//! # Example
//!
//! ```
//! use stratum_core::{Method, Request};
//!
//! let request = Request::builder(Method::GET, "/users/42")
//!     .header("accept", "application/json")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(request.path(), "/users/42");
//! ```

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri, Version};
use http_body_util::BodyExt;

use crate::{Context, Error, Result};

/// An inbound HTTP request with its request-scoped [`Context`].
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    context: Context,
}

impl Request {
    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, uri)
    }

    /// Adopt a request produced by the `http` ecosystem, collecting its body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Body`] if reading the body fails.
    pub async fn from_http<B>(request: http::Request<B>) -> Result<Self>
    where
        B: http_body::Body,
        B::Error: std::fmt::Display,
    {
        let (parts, body) = request.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|err| Error::body(err.to_string()))?
            .to_bytes();

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            context: Context::new(),
        })
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Path component of the URI.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Protocol version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Request-scoped context.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// The same request carrying another context.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Approximate size of the request on the wire, in bytes.
    ///
    /// Counts the method, URI, protocol version, every header name and value
    /// and the body.
    #[must_use]
    pub fn approximate_size(&self) -> usize {
        let headers: usize = self
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();

        self.method.as_str().len()
            + self.uri.to_string().len()
            + version_str(self.version).len()
            + headers
            + self.body.len()
    }
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    uri: String,
    version: Version,
    headers: Vec<(String, String)>,
    body: Bytes,
    context: Context,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            version: Version::HTTP_11,
            headers: Vec::new(),
            body: Bytes::new(),
            context: Context::new(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the protocol version.
    #[must_use]
    pub const fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the initial context.
    #[must_use]
    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Builds the [`Request`].
    ///
    /// # Errors
    ///
    /// Returns an error if the URI, a header name or a header value is invalid.
    pub fn build(self) -> Result<Request> {
        let uri = self.uri.parse::<Uri>().map_err(http::Error::from)?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::invalid_header_name(name.clone()))?;
            let value = HeaderValue::from_str(&value).map_err(http::Error::from)?;
            headers.append(name, value);
        }

        Ok(Request {
            method: self.method,
            uri,
            version: self.version,
            headers,
            body: self.body,
            context: self.context,
        })
    }
}

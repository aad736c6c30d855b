//! Core types for stratum.
//!
//! This crate provides the transport-neutral building blocks the stratum
//! middleware layers are made of:
//! - [`Request`] and [`Response`] - HTTP request/response model
//! - [`Context`] and [`ContextKey`] - request-scoped, typed context overlay
//! - [`StatusRecord`] and [`StatusBucket`] - response status capture
//! - [`handler_fn`] and [`BoxHandler`] - base handlers
//! - [`Middleware`], [`compose`] and [`Pipeline`] - middleware composition
//! - [`Error`] and [`Result`] - Error handling

mod compose;
mod context;
mod error;
mod handler;
pub mod prelude;
mod request;
mod response;
mod status;

pub use compose::{Middleware, Pipeline, compose};
pub use context::{Context, ContextKey};
pub use error::{Error, Result};
pub use handler::{BoxHandler, HandlerFn, HandlerFuture, handler_fn};
pub use request::{Request, RequestBuilder};
pub use response::{INTERNAL_SERVER_ERROR_BODY, IntoResponse, Response};
pub use status::{DEFAULT_STATUS, StatusBucket, StatusRecord};

// Re-export http crate types for methods, status codes and headers
pub use http::{HeaderMap, Method, StatusCode, header};

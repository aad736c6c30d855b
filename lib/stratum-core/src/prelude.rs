//! Prelude module for convenient imports.
//!
//! ```ignore
//! use stratum_core::prelude::*;
//! ```

pub use crate::{
    BoxHandler, Context, ContextKey, Error, IntoResponse, Method, Middleware, Pipeline, Request,
    Response, Result, StatusBucket, StatusCode, StatusRecord, compose, handler_fn,
};

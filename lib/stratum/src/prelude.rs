//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and functions for
//! easy glob importing:
//!
//! ```ignore
//! use stratum::prelude::*;
//! ```

pub use crate::middleware::{LoggingLayer, MetricsLayer, RecoverLayer, TraceLayer};
pub use crate::{
    BoxHandler, Context, ContextKey, Error, IntoResponse, Logger, Method, Middleware, Pipeline,
    Request, Response, Result, StatusBucket, StatusCode, StatusRecord, Tracer, compose,
    handler_fn, logger_from, span_from, trace_id_from,
};

//! Base handlers.
//!
//! A handler is any [`tower::Service`] from [`Request`] to [`Response`] that
//! never fails: every request yields a response. [`handler_fn`] adapts a
//! plain `async fn`:
//!
//! ```
//! use stratum_core::{Request, Response, handler_fn};
//!
//! async fn hello(_req: Request) -> Response {
//!     Response::text("hello")
//! }
//!
//! let handler = handler_fn(hello);
//! # let _ = handler;
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::util::BoxCloneService;
use tower_service::Service;

use crate::{IntoResponse, Request, Response};

/// Type-erased handler, as produced by [`crate::compose`].
pub type BoxHandler = BoxCloneService<Request, Response, Infallible>;

/// Future returned by handlers and middleware services.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

/// Adapt an async function into a handler service.
pub const fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn { f }
}

/// Handler built from an async function, see [`handler_fn`].
#[derive(Debug, Clone, Copy)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Fut, R> Service<Request> for HandlerFn<F>
where
    F: Fn(Request) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    type Response = Response;
    type Error = Infallible;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let fut = (self.f)(request);
        Box::pin(async move { Ok(fut.await.into_response()) })
    }
}

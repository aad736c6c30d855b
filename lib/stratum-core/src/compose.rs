//! Middleware composition.
//!
//! A [`Middleware`] turns the next handler into a wrapped handler. Layers are
//! applied in list order by rebinding `current = layer(current)`, so the
//! **last** layer is the **outermost**: it sees the request first and
//! finishes last.
//!
//! ```text
//! compose(base, [l1, l2, l3])
//!
//!   request → l3 → l2 → l1 → base
//!  response ← l3 ← l2 ← l1 ← base
//! ```
//!
//! Order matters: a recovery layer must come after (outside of) every layer
//! whose panics it is meant to contain.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use tower::Layer;
use tower_service::Service;

use crate::{BoxHandler, Request, Response};

type WrapFn = dyn Fn(BoxHandler) -> BoxHandler + Send + Sync;

/// Type-erased, cloneable handler wrapper.
#[derive(Clone)]
pub struct Middleware {
    wrap: Arc<WrapFn>,
}

impl Middleware {
    /// Create a middleware from a wrapping function.
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(BoxHandler) -> BoxHandler + Send + Sync + 'static,
    {
        Self {
            wrap: Arc::new(wrap),
        }
    }

    /// Create a middleware from a Tower layer.
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<BoxHandler> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Infallible>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(move |next| BoxHandler::new(layer.layer(next)))
    }

    /// Wrap `next`.
    #[must_use]
    pub fn apply(&self, next: BoxHandler) -> BoxHandler {
        (self.wrap)(next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}

impl Layer<BoxHandler> for Middleware {
    type Service = BoxHandler;

    fn layer(&self, inner: BoxHandler) -> Self::Service {
        self.apply(inner)
    }
}

/// Apply `middlewares` to `base`, the last one ending up outermost.
pub fn compose<S, I>(base: S, middlewares: I) -> BoxHandler
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
    I: IntoIterator<Item = Middleware>,
{
    middlewares
        .into_iter()
        .fold(BoxHandler::new(base), |current, middleware| {
            middleware.apply(current)
        })
}

/// Ordered list of middlewares, built once and reused for every request.
///
/// ```
/// use stratum_core::{Pipeline, Request, Response, handler_fn};
///
/// let handler = Pipeline::new()
///     .build(handler_fn(|_req: Request| async { Response::text("ok") }));
/// # let _ = handler;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    middlewares: Vec<Middleware>,
}

impl Pipeline {
    /// Empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a Tower layer; it wraps everything added before it.
    #[must_use]
    pub fn layer<L>(self, layer: L) -> Self
    where
        L: Layer<BoxHandler> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Infallible>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.middleware(Middleware::from_layer(layer))
    }

    /// Append an already type-erased middleware.
    #[must_use]
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Number of middlewares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if no middleware was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Wrap `base` with every middleware.
    pub fn build<S>(&self, base: S) -> BoxHandler
    where
        S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        compose(base, self.middlewares.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::Method;
    use tower::ServiceExt;

    use super::*;
    use crate::handler_fn;

    fn tracking(name: &'static str, events: Arc<Mutex<Vec<String>>>) -> Middleware {
        Middleware::new(move |next: BoxHandler| {
            let events = Arc::clone(&events);
            BoxHandler::new(tower::service_fn(move |req: Request| {
                let events = Arc::clone(&events);
                let next = next.clone();
                async move {
                    events.lock().expect("lock").push(format!("enter {name}"));
                    let response = next.oneshot(req).await;
                    events.lock().expect("lock").push(format!("leave {name}"));
                    response
                }
            }))
        })
    }

    #[tokio::test]
    async fn last_middleware_is_outermost() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let base_events = Arc::clone(&events);
        let base = handler_fn(move |_req: Request| {
            let events = Arc::clone(&base_events);
            async move {
                events.lock().expect("lock").push("base".to_string());
                Response::default()
            }
        });

        let handler = compose(
            base,
            [
                tracking("l1", Arc::clone(&events)),
                tracking("l2", Arc::clone(&events)),
                tracking("l3", Arc::clone(&events)),
            ],
        );

        let request = Request::builder(Method::GET, "/")
            .build()
            .expect("valid request");
        let Ok(response) = handler.oneshot(request).await;
        assert_eq!(response.status(), 200);

        let events = events.lock().expect("lock").clone();
        assert_eq!(
            events,
            [
                "enter l3", "enter l2", "enter l1", "base", "leave l1", "leave l2", "leave l3"
            ]
        );
    }

    #[tokio::test]
    async fn empty_pipeline_is_base_handler() {
        let pipeline = Pipeline::new();
        assert!(pipeline.is_empty());

        let handler = pipeline.build(handler_fn(|_req: Request| async { "plain" }));
        let request = Request::builder(Method::GET, "/")
            .build()
            .expect("valid request");
        let Ok(response) = handler.oneshot(request).await;

        assert_eq!(response.body(), "plain".as_bytes());
    }

    #[tokio::test]
    async fn pipeline_is_reusable() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new().middleware(tracking("only", Arc::clone(&events)));
        assert_eq!(pipeline.len(), 1);

        let handler = pipeline.build(handler_fn(|_req: Request| async { "ok" }));
        for _ in 0..3 {
            let request = Request::builder(Method::GET, "/")
                .build()
                .expect("valid request");
            let Ok(_) = handler.clone().oneshot(request).await;
        }

        assert_eq!(events.lock().expect("lock").len(), 6);
    }
}

//! Panic recovery middleware.
//!
//! A panic raised while the inner handler runs is contained here: it is
//! counted, logged with the request logger when one is in the context, and
//! answered with a plain `500` response. Place this layer last so it wraps
//! every other layer.

use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};

use futures_util::FutureExt;
use stratum_core::{HandlerFuture, Request, Response};
use tower::{Layer, Service};

use crate::logger::logger_from;
use crate::stats::HttpStats;

/// Layer that turns panics into `500` responses.
#[derive(Debug, Clone, Default)]
pub struct RecoverLayer {
    stats: HttpStats,
}

impl RecoverLayer {
    /// Layer counting panics in the process-wide recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start configuring a layer.
    #[must_use]
    pub fn builder() -> RecoverLayerBuilder {
        RecoverLayerBuilder::default()
    }
}

impl<S> Layer<S> for RecoverLayer {
    type Service = Recover<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Recover {
            inner,
            stats: self.stats.clone(),
        }
    }
}

/// Builder for [`RecoverLayer`].
#[derive(Debug, Clone, Default)]
pub struct RecoverLayerBuilder {
    stats: Option<HttpStats>,
}

impl RecoverLayerBuilder {
    /// Count panics in `stats` instead of the process-wide recorder.
    #[must_use]
    pub fn stats(mut self, stats: HttpStats) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Build the layer.
    #[must_use]
    pub fn build(self) -> RecoverLayer {
        RecoverLayer {
            stats: self.stats.unwrap_or_else(HttpStats::global),
        }
    }
}

/// Service that turns panics into `500` responses.
#[derive(Debug, Clone)]
pub struct Recover<S> {
    inner: S,
    stats: HttpStats,
}

impl<S> Service<Request> for Recover<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let logger = logger_from(request.context()).cloned();
        let stats = self.stats.clone();

        let mut inner = self.inner.clone();
        Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { inner.call(request).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(result) => result,
                Err(panic) => {
                    stats.record_panic();
                    if let Some(logger) = logger {
                        logger
                            .with("err", panic_message(panic.as_ref()))
                            .error("panic during request handling");
                    }
                    Ok(Response::internal_server_error())
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use http::Method;
    use stratum_core::{Context as RequestContext, INTERNAL_SERVER_ERROR_BODY, handler_fn};
    use tower::ServiceExt;
    use tracing::Level;

    use super::*;
    use crate::testing::MemoryLog;
    use crate::logger::{Logger, LoggerKey};
    use crate::testing::{isolated, sample};
    use crate::stats::PANICS_CAUGHT;

    fn create_request() -> Request {
        Request::builder(Method::GET, "/boom")
            .build()
            .expect("valid request")
    }

    #[allow(clippy::unused_async)]
    async fn boom(_req: Request) -> Response {
        panic!("doh!");
    }

    fn explode() -> Response {
        let reason = String::from("formatted");
        panic!("{reason}");
    }

    #[tokio::test]
    async fn passes_through_without_panic() {
        let (stats, handle) = isolated();
        let service = RecoverLayer::builder()
            .stats(stats)
            .build()
            .layer(handler_fn(|_req: Request| async { "fine" }));

        let Ok(response) = service.oneshot(create_request()).await;

        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), "fine".as_bytes());
        assert!(sample(&handle.render(), PANICS_CAUGHT, &[]).is_none());
    }

    #[tokio::test]
    async fn panic_becomes_internal_server_error() {
        let (stats, handle) = isolated();
        let service = RecoverLayer::builder()
            .stats(stats)
            .build()
            .layer(handler_fn(boom));

        let Ok(response) = service.oneshot(create_request()).await;

        assert_eq!(response.status(), 500);
        assert_eq!(response.body(), INTERNAL_SERVER_ERROR_BODY.as_bytes());
        assert_eq!(sample(&handle.render(), PANICS_CAUGHT, &[]), Some(1.0));
    }

    #[tokio::test]
    async fn panic_is_logged_with_request_logger() {
        let (stats, _handle) = isolated();
        let sink = MemoryLog::default();
        let service = RecoverLayer::builder()
            .stats(stats)
            .build()
            .layer(handler_fn(boom));

        let context = RequestContext::new().with::<LoggerKey>(Logger::new(sink.clone()));
        let request = create_request().with_context(context);
        let Ok(response) = service.oneshot(request).await;
        assert_eq!(response.status(), 500);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::ERROR);
        assert_eq!(records[0].message, "panic during request handling");
        assert_eq!(records[0].field("err"), Some("doh!"));
    }

    #[tokio::test]
    async fn panic_without_logger_is_still_contained() {
        let (stats, handle) = isolated();
        let service = RecoverLayer::builder()
            .stats(stats)
            .build()
            .layer(handler_fn(|_req: Request| async { explode() }));

        for _ in 0..3 {
            let Ok(response) = service.clone().oneshot(create_request()).await;
            assert_eq!(response.status(), 500);
        }

        assert_eq!(sample(&handle.render(), PANICS_CAUGHT, &[]), Some(3.0));
    }

    #[test]
    fn panic_message_downcasts() {
        let from_str: Box<dyn Any + Send> = Box::new("static");
        let from_string: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(from_str.as_ref()), "static");
        assert_eq!(panic_message(from_string.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}

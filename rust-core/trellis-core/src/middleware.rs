//! # Middleware System
//!
//! Each unit of a dispatcher's chain receives the request and a [`Next`]
//! continuation. It can
//!
//! - rewrite the request and call `next.run(req)`,
//! - post-process the response returned by `next.run(req)`,
//! - answer on its own without calling `next` (the rest of the chain and
//!   the route handler never run),
//! - or hand the request to another dispatcher.
//!
//! The chain itself is never mutated: `Next` only carries a cursor, so one
//! dispatcher serves any number of concurrent requests.
//!
//! ```ignore
//! dispatcher.add_middleware(middleware::from_fn(|req, next| {
//!     Box::pin(async move {
//!         if req.header("x-api-key").is_none() {
//!             return Err(Error::unauthorised("missing API key"));
//!         }
//!         next.run(req).await
//!     })
//! }));
//! ```

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use std::time::Instant;
use tracing::info;

/// A unit of the request pipeline
pub trait Middleware: Send + Sync {
    /// Process the request, calling `next.run(req)` to continue the chain
    fn handle<'a>(&'a self, req: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>>;

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// Continuation of a middleware chain
///
/// Holds the position of the following unit. Once the chain is exhausted,
/// running it dispatches the request to the matching route.
pub struct Next<'a> {
    dispatcher: &'a Dispatcher,
    index: usize,
}

impl<'a> Next<'a> {
    pub(crate) const fn new(dispatcher: &'a Dispatcher, index: usize) -> Self {
        Self { dispatcher, index }
    }

    /// Run the rest of the chain
    pub fn run<'r>(self, req: &'r mut Request) -> BoxFuture<'r, Result<Response>>
    where
        'a: 'r,
    {
        self.dispatcher.run_chain(self.index, req)
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").field("index", &self.index).finish()
    }
}

/// Middleware built from a closure; see [`from_fn`]
pub struct FnMiddleware<F> {
    f: F,
}

/// Wrap a closure as middleware
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Request, Next<'a>) -> BoxFuture<'a, Result<Response>> + Send + Sync,
{
    FnMiddleware { f }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Request, Next<'a>) -> BoxFuture<'a, Result<Response>> + Send + Sync,
{
    fn handle<'a>(&'a self, req: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        (self.f)(req, next)
    }

    fn name(&self) -> &'static str {
        "FnMiddleware"
    }
}

/// Logging middleware - one structured line per request
#[derive(Debug, Default)]
pub struct LoggingMiddleware {
    log_headers: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable header logging
    #[must_use]
    pub const fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

impl Middleware for LoggingMiddleware {
    fn handle<'a>(&'a self, req: &'a mut Request, next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move {
            let method = req.method().clone();
            let path = req.full_uri().to_string();
            let headers = self.log_headers.then(|| format!("{:?}", req.headers()));
            let start = Instant::now();

            let result = next.run(req).await;

            let duration_ms = start.elapsed().as_millis();
            match &result {
                Ok(res) => info!(
                    method = %method,
                    path = %path,
                    status = res.status().as_u16(),
                    duration_ms = %duration_ms,
                    headers = headers.as_deref().unwrap_or("-"),
                    "Request handled"
                ),
                Err(e) => info!(
                    method = %method,
                    path = %path,
                    status = e.status_code().as_u16(),
                    duration_ms = %duration_ms,
                    headers = headers.as_deref().unwrap_or("-"),
                    "Request failed"
                ),
            }
            result
        })
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerSpec;
    use crate::services::Services;
    use hyper::StatusCode;

    fn dispatcher<M: Middleware + 'static>(middleware: M) -> Dispatcher {
        Dispatcher::new("app", Services::new())
            .with_middleware(middleware)
            .with_routes(|router, _| {
                router.route(
                    "^/hello$",
                    HandlerSpec::callable(|req, _params| {
                        Box::pin(async move {
                            Ok(Response::text(req.header("x-greeting").unwrap_or("hello")))
                        })
                    }),
                )
            })
    }

    #[tokio::test]
    async fn test_middleware_rewrites_request_before_routing() {
        let dispatcher = dispatcher(from_fn(|req, next| {
            Box::pin(async move {
                let greeting = req.option("lang").map_or("hello", |lang| match lang {
                    "fr" => "bonjour",
                    _ => "hello",
                });
                req.set_header("X-Greeting", greeting);
                next.run(req).await
            })
        }));

        let mut req = Request::get("/hello?lang=fr");
        let res = dispatcher.handle(&mut req).await.unwrap();
        assert_eq!(res.body_str(), Some("bonjour"));
    }

    #[tokio::test]
    async fn test_middleware_post_processes_response() {
        let dispatcher = dispatcher(from_fn(|req, next| {
            Box::pin(async move {
                let res = next.run(req).await?;
                Ok(res.with_header("X-Served-By", "trellis"))
            })
        }));

        let mut req = Request::get("/hello");
        let res = dispatcher.handle(&mut req).await.unwrap();
        assert_eq!(res.header("x-served-by"), Some("trellis"));
    }

    #[tokio::test]
    async fn test_logging_middleware_passes_errors_through() {
        let dispatcher = dispatcher(LoggingMiddleware::new().with_headers());
        let mut req = Request::get("/missing");
        let err = dispatcher.handle(&mut req).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_logging_middleware_name() {
        let mw = LoggingMiddleware::new();
        assert_eq!(mw.name(), "LoggingMiddleware");
    }

    #[test]
    fn test_fn_middleware_name() {
        let mw = from_fn(|req, next| next.run(req));
        assert_eq!(mw.name(), "FnMiddleware");
    }
}

//! # Application
//!
//! Front controller owning the root [`Dispatcher`] and the shared
//! [`Services`]. [`Application::handle`] is the single place where dispatch
//! errors are caught: everything below it propagates with `?`.
//!
//! ## Error pages
//!
//! Failed requests are logged (`NotFound` only at debug level, other 4xx as
//! warnings, 5xx as errors) and rendered through an [`ErrorRenderer`]. The
//! default renderer answers JSON when the client accepts it and plain text
//! otherwise. `405` responses always carry an `Allow` header.

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{join_methods, Error};
use crate::request::Request;
use crate::response::Response;
use crate::services::Services;
use hyper::body::Bytes;
use hyper::header::{ACCEPT, ALLOW, CONTENT_TYPE};
use hyper::Method;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Turns a dispatch error into the response sent to the client
pub trait ErrorRenderer: Send + Sync {
    /// Build the error page for `error`; the status is set by the caller
    fn render(&self, req: &Request, error: &Error) -> Response;
}

/// JSON or plain-text error pages
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorRenderer {
    debug: bool,
}

impl DefaultErrorRenderer {
    /// Renderer hiding internal error details
    #[must_use]
    pub const fn new() -> Self {
        Self { debug: false }
    }

    /// Include the full error message for server errors too
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn message(&self, error: &Error) -> String {
        let status = error.status_code();
        match error {
            Error::Http { message, .. } => message.clone(),
            _ if status.is_client_error() || self.debug => error.to_string(),
            _ => status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string(),
        }
    }
}

impl ErrorRenderer for DefaultErrorRenderer {
    fn render(&self, req: &Request, error: &Error) -> Response {
        let status = error.status_code();
        let message = self.message(error);

        let wants_json = req
            .header(ACCEPT.as_str())
            .is_some_and(|accept| accept.contains("json"));

        if wants_json {
            let body = serde_json::json!({
                "error": status.canonical_reason().unwrap_or("Error"),
                "status": status.as_u16(),
                "message": message,
            });
            Response::new()
                .with_header(CONTENT_TYPE.as_str(), "application/json")
                .with_body(body.to_string())
        } else {
            Response::text(format!("{status}: {message}"))
        }
    }
}

/// Application root
pub struct Application {
    dispatcher: Arc<Dispatcher>,
    services: Services,
    renderer: Arc<dyn ErrorRenderer>,
}

impl Application {
    /// Wrap the root dispatcher
    ///
    /// The application shares the dispatcher's services. Error details are
    /// shown when `app.debug` is `true` in the configuration.
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        let services = dispatcher.services().clone();
        let debug = services
            .config()
            .get("app.debug")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        Self {
            dispatcher: Arc::new(dispatcher),
            services,
            renderer: Arc::new(DefaultErrorRenderer::new().with_debug(debug)),
        }
    }

    /// Replace the error renderer
    #[must_use]
    pub fn with_error_renderer<R: ErrorRenderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    /// The root dispatcher
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Shared services
    #[must_use]
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Application configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        self.services.config()
    }

    /// Dispatch a request, turning any error into an error page
    pub async fn handle(&self, mut req: Request) -> Response {
        match self.dispatcher.handle(&mut req).await {
            Ok(response) => response,
            Err(err) => self.error_response(&req, &err),
        }
    }

    /// Log `err` and render it
    #[must_use]
    pub fn error_response(&self, req: &Request, err: &Error) -> Response {
        let status = err.status_code();
        match err {
            Error::NotFound { .. } => debug!(method = %req.method(), path = %req.full_uri(), "Not found"),
            _ if status.is_client_error() => warn!(
                method = %req.method(),
                path = %req.full_uri(),
                status = status.as_u16(),
                error = %err,
                "Request rejected"
            ),
            _ => error!(
                method = %req.method(),
                path = %req.full_uri(),
                status = status.as_u16(),
                error = %err,
                "Request failed"
            ),
        }

        let mut response = self.renderer.render(req, err);
        response.set_status(status);
        if let Some(allowed) = err.allowed_methods() {
            response.set_header(ALLOW.as_str(), &join_methods(allowed));
        }
        response
    }

    /// Execute a request directly without the network stack
    pub async fn test_request(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Response {
        let mut req = Request::new(method, uri);
        for (name, value) in headers {
            req.set_header(name, value);
        }
        if let Some(body) = body {
            req = req.with_body(body);
        }
        self.handle(req).await
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("dispatcher", &self.dispatcher)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerSpec;
    use hyper::StatusCode;

    fn app() -> Application {
        app_with(Services::new())
    }

    fn app_with(services: Services) -> Application {
        let dispatcher = Dispatcher::new("app", services).with_routes(|router, _| {
            router.route(
                r"(GET|POST):^/users/(\d+)$",
                HandlerSpec::callable(|_req, params| {
                    Box::pin(async move { Ok(Response::text(format!("user {}", params[0]))) })
                }),
            )?;
            router.route(
                "^/boom$",
                HandlerSpec::callable(|_req, _params| {
                    Box::pin(async { Err(Error::handler("database exploded")) })
                }),
            )?;
            router.route(
                "^/echo$",
                HandlerSpec::callable(|req, _params| {
                    Box::pin(async move {
                        let name = req
                            .data("name")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or("-")
                            .to_string();
                        Ok(Response::text(name))
                    })
                }),
            )
        });
        Application::new(dispatcher)
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let res = app().test_request(Method::GET, "/users/42", &[], None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body_str(), Some("user 42"));
    }

    #[tokio::test]
    async fn test_not_found_page() {
        let res = app().test_request(Method::GET, "/nothing", &[], None).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(res.body_str().unwrap().starts_with("404 Not Found"));
    }

    #[tokio::test]
    async fn test_method_not_allowed_sets_allow() {
        let res = app()
            .test_request(Method::DELETE, "/users/42", &[], None)
            .await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.header("allow"), Some("GET, POST"));
    }

    #[tokio::test]
    async fn test_json_error_page() {
        let res = app()
            .test_request(Method::GET, "/nothing", &[("Accept", "application/json")], None)
            .await;
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"], 404);
        assert_eq!(body["error"], "Not Found");
    }

    #[tokio::test]
    async fn test_server_error_hides_details() {
        let res = app().test_request(Method::GET, "/boom", &[], None).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!res.body_str().unwrap().contains("database"));
    }

    #[tokio::test]
    async fn test_debug_renderer_shows_details() {
        let app = app().with_error_renderer(DefaultErrorRenderer::new().with_debug(true));
        let res = app.test_request(Method::GET, "/boom", &[], None).await;
        assert!(res.body_str().unwrap().contains("database exploded"));
    }

    #[tokio::test]
    async fn test_custom_renderer() {
        struct Plain;
        impl ErrorRenderer for Plain {
            fn render(&self, _req: &Request, _error: &Error) -> Response {
                Response::html("<h1>Oops</h1>")
            }
        }

        let app = app().with_error_renderer(Plain);
        let res = app.test_request(Method::GET, "/nothing", &[], None).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.body_str(), Some("<h1>Oops</h1>"));
    }

    #[tokio::test]
    async fn test_request_body_is_parsed() {
        let res = app()
            .test_request(
                Method::POST,
                "/echo",
                &[("Content-Type", "application/x-www-form-urlencoded")],
                Some(Bytes::from_static(b"name=trellis")),
            )
            .await;
        assert_eq!(res.body_str(), Some("trellis"));
    }

    #[tokio::test]
    async fn test_debug_flag_from_config_shows_details() {
        let mut config = Config::new();
        config.set("app.debug", true);
        let app = app_with(Services::with_config(config));
        assert_eq!(app.config().get("app.debug"), Some(&serde_json::json!(true)));

        let res = app.test_request(Method::GET, "/boom", &[], None).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(res.body_str().unwrap().contains("database exploded"));
    }
}

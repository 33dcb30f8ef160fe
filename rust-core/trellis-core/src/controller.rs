//! # Controllers
//!
//! A controller groups named actions. Route specs such as
//! `"UserController::show"` are resolved to a controller instance plus an
//! action name; the dispatcher then calls [`Controller::call`].
//!
//! Before/after hooks are optional capabilities. A controller opts in by
//! implementing [`BeforeAction`] and/or [`AfterAction`] and returning itself
//! from [`Controller::before_hook`] / [`Controller::after_hook`]:
//!
//! ```ignore
//! impl Controller for Admin {
//!     fn actions(&self) -> &[&'static str] { &["index"] }
//!     fn call<'a>(&'a self, action: &'a str, req: &'a mut Request, params: Params)
//!         -> BoxFuture<'a, Result<Response>> { /* match action */ }
//!     fn before_hook(&self) -> Option<&dyn BeforeAction> { Some(self) }
//! }
//! ```

use crate::error::Result;
use crate::handler::{BoxFuture, Params};
use crate::request::Request;
use crate::response::Response;

/// A set of named actions
pub trait Controller: Send + Sync {
    /// Names of the actions [`Controller::call`] understands
    fn actions(&self) -> &[&'static str];

    /// Run `action` for the request with the captured route parameters
    fn call<'a>(
        &'a self,
        action: &'a str,
        req: &'a mut Request,
        params: Params,
    ) -> BoxFuture<'a, Result<Response>>;

    /// Hook run before every action, if the controller has one
    fn before_hook(&self) -> Option<&dyn BeforeAction> {
        None
    }

    /// Hook run after every action, if the controller has one
    fn after_hook(&self) -> Option<&dyn AfterAction> {
        None
    }

    /// Name used in logs
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Runs before the action; returning a response skips the action
pub trait BeforeAction: Send + Sync {
    /// `Some(response)` short-circuits the action and the after hook
    fn before_action<'a>(&'a self, req: &'a mut Request) -> BoxFuture<'a, Result<Option<Response>>>;
}

/// Post-processes the action's response
pub trait AfterAction: Send + Sync {
    /// Receives the action's response and returns the one sent
    fn after_action<'a>(
        &'a self,
        req: &'a mut Request,
        response: Response,
    ) -> BoxFuture<'a, Result<Response>>;
}

/// Run an action with the controller's hooks around it
pub(crate) async fn run_action(
    controller: &dyn Controller,
    action: &str,
    req: &mut Request,
    params: Params,
) -> Result<Response> {
    if let Some(hook) = controller.before_hook() {
        if let Some(response) = hook.before_action(req).await? {
            tracing::debug!(
                controller = controller.name(),
                action,
                "Before hook intercepted request"
            );
            return Ok(response);
        }
    }

    let response = controller.call(action, req, params).await?;

    match controller.after_hook() {
        Some(hook) => hook.after_action(req, response).await,
        None => Ok(response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Pages;

    impl Controller for Pages {
        fn actions(&self) -> &[&'static str] {
            &["about", "broken"]
        }

        fn call<'a>(
            &'a self,
            action: &'a str,
            req: &'a mut Request,
            _params: Params,
        ) -> BoxFuture<'a, Result<Response>> {
            Box::pin(async move {
                match action {
                    "about" => Ok(Response::html(format!("about {}", req.uri()))),
                    _ => Err(Error::service_unavailable("maintenance")),
                }
            })
        }
    }

    #[test]
    fn test_run_action_without_hooks() {
        let mut req = Request::get("/about");
        let res = tokio_test::block_on(run_action(&Pages, "about", &mut req, Vec::new())).unwrap();
        assert_eq!(res.body_str(), Some("about /about"));
    }

    #[test]
    fn test_action_error_propagates() {
        let mut req = Request::get("/");
        let err = tokio_test::block_on(run_action(&Pages, "broken", &mut req, Vec::new()))
            .unwrap_err();
        assert_eq!(err.status_code(), hyper::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert!(Pages.name().ends_with("Pages"));
        assert!(Pages.before_hook().is_none());
        assert!(Pages.after_hook().is_none());
    }
}

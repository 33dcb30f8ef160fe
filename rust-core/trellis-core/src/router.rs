//! # Regex Router
//!
//! Ordered route table matched by regular expression search.
//!
//! ## Matching
//!
//! - Routes are tried in registration order; the first route whose
//!   expression matches the URI *and* accepts the method wins.
//! - A route that matches the URI but not the method does not stop the
//!   scan. Its methods are remembered, and if nothing later accepts the
//!   request the result is `Error::MethodNotAllowed` listing every method
//!   that would have worked.
//! - Nothing matching the URI at all gives `Error::NotFound`.
//!
//! ```ignore
//! let mut router = Router::new();
//! router.route(r"(GET|POST):^/users/(\d+)$", "Users::show")?;
//! let m = router.match_route("/users/42", &Method::GET)?;
//! assert_eq!(m.parameters, vec!["42"]);
//! ```

use crate::error::{Error, Result};
use crate::handler::HandlerSpec;
use crate::request::Extra;
use crate::route::Route;
use hyper::Method;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Matched route, borrowed from the router for one dispatch
#[derive(Debug)]
pub struct RouteMatch<'r> {
    /// What to run
    pub handler: &'r HandlerSpec,
    /// Captured groups in order (whole match excluded)
    pub parameters: Vec<String>,
    /// Route metadata
    pub extra: &'r Extra,
}

/// Ordered regex route table
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Create a new empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route
    ///
    /// `pattern` may carry a method list: `"GET:/about"`,
    /// `"(GET|POST):/users/(\d+)"`. Registering the same pattern twice keeps
    /// both routes; the earlier one wins when both accept a request.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern is malformed
    pub fn add_route(
        &mut self,
        pattern: &str,
        handler: impl Into<HandlerSpec>,
        extra: Extra,
    ) -> Result<()> {
        let route = Route::new(pattern, handler.into(), extra)?;
        debug!(
            pattern = %route.expression(),
            methods = ?route.methods(),
            handler = %route.handler(),
            "Route registered"
        );
        self.routes.push(route);
        Ok(())
    }

    /// Register a route without metadata
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern is malformed
    pub fn route(&mut self, pattern: &str, handler: impl Into<HandlerSpec>) -> Result<()> {
        self.add_route(pattern, handler, Extra::new())
    }

    /// Convenience method to add a GET route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern is malformed
    pub fn get(&mut self, pattern: &str, handler: impl Into<HandlerSpec>) -> Result<()> {
        self.route(&format!("GET:{pattern}"), handler)
    }

    /// Convenience method to add a POST route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern is malformed
    pub fn post(&mut self, pattern: &str, handler: impl Into<HandlerSpec>) -> Result<()> {
        self.route(&format!("POST:{pattern}"), handler)
    }

    /// Convenience method to add a PUT route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern is malformed
    pub fn put(&mut self, pattern: &str, handler: impl Into<HandlerSpec>) -> Result<()> {
        self.route(&format!("PUT:{pattern}"), handler)
    }

    /// Convenience method to add a DELETE route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern is malformed
    pub fn delete(&mut self, pattern: &str, handler: impl Into<HandlerSpec>) -> Result<()> {
        self.route(&format!("DELETE:{pattern}"), handler)
    }

    /// Registered routes in matching order
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if no routes are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the route for a (prefix-stripped) URI and method
    ///
    /// # Errors
    ///
    /// Returns `Error::MethodNotAllowed` if routes matched the URI but none
    /// accepted the method, `Error::NotFound` if no route matched the URI.
    pub fn match_route(&self, uri: &str, method: &Method) -> Result<RouteMatch<'_>> {
        let mut allowed: Vec<Method> = Vec::new();
        let mut matched_uri = false;

        for route in &self.routes {
            let Some(parameters) = route.captures(uri) else {
                continue;
            };

            if route.allows(method) {
                debug!(uri, method = %method, pattern = %route.expression(), "Route matched");
                return Ok(RouteMatch {
                    handler: route.handler(),
                    parameters,
                    extra: route.extra(),
                });
            }

            matched_uri = true;
            for m in route.methods() {
                if !allowed.contains(m) {
                    allowed.push(m.clone());
                }
            }
        }

        if matched_uri {
            debug!(uri, method = %method, ?allowed, "Method not allowed");
            Err(Error::MethodNotAllowed {
                uri: uri.to_string(),
                allowed,
            })
        } else {
            debug!(uri, method = %method, "No route matched");
            Err(Error::NotFound {
                uri: uri.to_string(),
            })
        }
    }

    /// Build a URL for an action spec
    ///
    /// Uses the first route whose handler is `action`, replacing its
    /// bracketed groups with `args` in order and dropping `^`/`$` anchors.
    /// Groups beyond the supplied arguments are left as written.
    ///
    /// # Errors
    ///
    /// Returns `Error::ReverseNotFound` if no route is bound to `action`.
    pub fn reverse(&self, action: &str, args: &[&str]) -> Result<String> {
        let route = self
            .routes
            .iter()
            .find(|route| route.handler().action() == Some(action))
            .ok_or_else(|| Error::ReverseNotFound {
                handler: action.to_string(),
            })?;

        let mut url = route
            .expression()
            .trim_start_matches('^')
            .trim_end_matches('$')
            .to_string();
        for &arg in args {
            url = group_expression()
                .replacen(&url, 1, regex::NoExpand(arg))
                .into_owned();
        }
        Ok(url)
    }
}

fn group_expression() -> &'static Regex {
    static GROUP: OnceLock<Regex> = OnceLock::new();
    GROUP.get_or_init(|| Regex::new(r"\([^)]*\)").expect("group expression is valid"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::response::Response;

    fn callable(body: &'static str) -> HandlerSpec {
        HandlerSpec::Callable(handler_fn(move |_req, _params| {
            Box::pin(async move { Ok(Response::text(body)) })
        }))
    }

    fn action_of(m: &RouteMatch<'_>) -> String {
        m.handler.to_string()
    }

    #[test]
    fn test_basic_routing() {
        let mut router = Router::new();
        router.route("^/$", "Home::index").unwrap();
        router.route("^/users$", "Users::index").unwrap();

        let m = router.match_route("/", &Method::GET).unwrap();
        assert_eq!(action_of(&m), "Home::index");
        assert!(m.parameters.is_empty());

        let m = router.match_route("/users", &Method::POST).unwrap();
        assert_eq!(action_of(&m), "Users::index");
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_users_scenario() {
        let mut router = Router::new();
        router.route(r"(GET|POST):/users/(\d+)", "Users::show").unwrap();

        let m = router.match_route("/users/42", &Method::GET).unwrap();
        assert_eq!(m.parameters, vec!["42".to_string()]);

        match router.match_route("/users/42", &Method::DELETE).unwrap_err() {
            Error::MethodNotAllowed { uri, allowed } => {
                assert_eq!(uri, "/users/42");
                assert_eq!(allowed, vec![Method::GET, Method::POST]);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            router.match_route("/users/abc", &Method::GET),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_parameters_in_order() {
        let mut router = Router::new();
        router
            .route(r"^/users/(\d+)/posts/([a-z-]+)$", "Posts::show")
            .unwrap();
        let m = router
            .match_route("/users/7/posts/hello-world", &Method::GET)
            .unwrap();
        assert_eq!(m.parameters, vec!["7".to_string(), "hello-world".to_string()]);
    }

    #[test]
    fn test_scan_continues_past_method_mismatch() {
        let mut router = Router::new();
        router.route("GET:^/items$", "Items::index").unwrap();
        router.route("POST:^/items$", "Items::create").unwrap();

        let m = router.match_route("/items", &Method::POST).unwrap();
        assert_eq!(action_of(&m), "Items::create");
    }

    #[test]
    fn test_allowed_is_union_of_matching_routes() {
        let mut router = Router::new();
        router.route("(GET|HEAD):^/items$", "Items::index").unwrap();
        router.route("^/other$", "Other::index").unwrap();
        router.route("(POST|GET):^/items$", "Items::create").unwrap();

        match router.match_route("/items", &Method::DELETE).unwrap_err() {
            Error::MethodNotAllowed { allowed, .. } => {
                assert_eq!(allowed, vec![Method::GET, Method::HEAD, Method::POST]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_registered_wins() {
        let mut router = Router::new();
        router.route("/about", callable("first")).unwrap();
        router.route("/about", callable("second")).unwrap();
        assert_eq!(router.routes().len(), 2);
        let m = router.match_route("/about", &Method::GET).unwrap();
        assert!(std::ptr::eq(m.handler, router.routes()[0].handler()));
    }

    #[test]
    fn test_unanchored_search() {
        let mut router = Router::new();
        router.route("/about", "Pages::about").unwrap();
        assert!(router.match_route("/company/about/team", &Method::GET).is_ok());
    }

    #[test]
    fn test_extra_is_returned() {
        let mut router = Router::new();
        let mut extra = Extra::new();
        extra.insert("prefix".into(), "/admin".into());
        router.add_route("^/admin", "Admin::index", extra).unwrap();

        let m = router.match_route("/admin/users", &Method::GET).unwrap();
        assert_eq!(m.extra.get("prefix"), Some(&serde_json::json!("/admin")));
    }

    #[test]
    fn test_method_helpers() {
        let mut router = Router::new();
        router.get("^/a$", "A::get").unwrap();
        router.post("^/a$", "A::post").unwrap();
        router.put("^/a$", "A::put").unwrap();
        router.delete("^/a$", "A::delete").unwrap();

        let m = router.match_route("/a", &Method::PUT).unwrap();
        assert_eq!(action_of(&m), "A::put");
        assert!(matches!(
            router.match_route("/a", &Method::PATCH),
            Err(Error::MethodNotAllowed { .. })
        ));
    }

    #[test]
    fn test_empty_router_not_found() {
        let router = Router::new();
        assert!(router.is_empty());
        assert!(matches!(
            router.match_route("/", &Method::GET),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut router = Router::new();
        assert!(router.route("^/broken/(", "X::y").is_err());
        assert!(router.is_empty());
    }

    #[test]
    fn test_reverse() {
        let mut router = Router::new();
        router.route(r"GET:^/users/(\d+)/posts/(\d+)$", "Posts::show").unwrap();
        router.route(r"^/about$", "Pages::about").unwrap();

        assert_eq!(
            router.reverse("Posts::show", &["4", "2"]).unwrap(),
            "/users/4/posts/2"
        );
        assert_eq!(router.reverse("Pages::about", &[]).unwrap(), "/about");
        assert!(matches!(
            router.reverse("Missing::action", &[]),
            Err(Error::ReverseNotFound { .. })
        ));
    }

    #[test]
    fn test_reverse_literal_arguments() {
        let mut router = Router::new();
        router.route(r"^/files/(.+)$", "Files::show").unwrap();
        assert_eq!(
            router.reverse("Files::show", &["$1-report"]).unwrap(),
            "/files/$1-report"
        );
    }
}

//! # Dispatcher
//!
//! Two-layer request pipeline:
//!
//! 1. **Middleware chain** - units run in registration order, each deciding
//!    whether to continue through [`Next`].
//! 2. **Route dispatch** - once the chain is exhausted the router picks a
//!    route, the handler spec is resolved and invoked.
//!
//! A dispatcher can be mounted inside another one, either as a route handler
//! (`HandlerSpec::from(Arc<Dispatcher>)`, usually with a `"prefix"` in the
//! route extra) or as middleware. Mounted this way it acts as a module: its
//! own scope, controllers, middleware and routes, matched against the URI
//! with the parent's mount point stripped.
//!
//! ```ignore
//! let admin = Dispatcher::new("admin", services.clone())
//!     .controller("Users", |_| UsersController)
//!     .with_routes(|router, _| router.route(r"^/users/(\d+)$", "Users::show"));
//!
//! let root = Dispatcher::new("app", services).with_routes(move |router, _| {
//!     let mut extra = Extra::new();
//!     extra.insert("prefix".into(), "/admin".into());
//!     router.add_route("^/admin", Arc::clone(&admin), extra)
//! });
//! ```

use crate::controller::Controller;
use crate::error::Result;
use crate::handler::{BoxFuture, ControllerRegistry, Handler, HandlerResolver, HandlerSpec};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::services::Services;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Extra key holding the mount point pushed while a route's handler runs
pub const PREFIX_KEY: &str = "prefix";

type RouteLoader = dyn Fn(&mut Router, &Services) -> Result<()> + Send + Sync;

/// Middleware chain plus router for one scope
pub struct Dispatcher {
    scope: String,
    services: Services,
    middleware: Vec<Arc<dyn Middleware>>,
    resolver: HandlerResolver,
    loader: Box<RouteLoader>,
    router: OnceCell<Router>,
}

impl Dispatcher {
    /// Create a dispatcher for `scope` with no routes
    ///
    /// Relative controller names resolve to `<scope>::controllers::<Name>`.
    pub fn new(scope: impl Into<String>, services: Services) -> Self {
        let scope = scope.into();
        Self {
            resolver: HandlerResolver::new(scope.clone(), services.registry().clone()),
            scope,
            services,
            middleware: Vec::new(),
            loader: Box::new(no_routes),
            router: OnceCell::new(),
        }
    }

    /// Set the route loader
    ///
    /// The loader runs once, on the first request, and every action spec it
    /// registers is checked against the controller registry at that point.
    #[must_use]
    pub fn with_routes<F>(mut self, loader: F) -> Self
    where
        F: Fn(&mut Router, &Services) -> Result<()> + Send + Sync + 'static,
    {
        self.loader = Box::new(loader);
        self
    }

    /// Register a controller factory under a name relative to this scope
    ///
    /// The factory lands in the registry shared through [`Services`], so
    /// other dispatchers reach it as `::<scope>::controllers::<name>::action`.
    #[must_use]
    pub fn controller<F, C>(self, name: &str, factory: F) -> Self
    where
        F: Fn(&Services) -> C + Send + Sync + 'static,
        C: Controller + 'static,
    {
        let qualified = self.resolver.qualify(name);
        debug!(scope = %self.scope, controller = %qualified, "Controller registered");
        self.resolver.registry().register(qualified, factory);
        self
    }

    /// Add every factory of `registry` to the shared controller registry
    #[must_use]
    pub fn with_registry(self, registry: &ControllerRegistry) -> Self {
        self.resolver.registry().merge(registry);
        self
    }

    /// Append a middleware to the chain
    #[must_use]
    pub fn with_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.add_middleware(middleware);
        self
    }

    /// Append a middleware to the chain
    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        debug!(scope = %self.scope, middleware = middleware.name(), "Middleware added");
        self.middleware.push(Arc::new(middleware));
    }

    /// Scope used to qualify relative controller names
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Shared services
    #[must_use]
    pub const fn services(&self) -> &Services {
        &self.services
    }

    /// Number of middleware in the chain
    #[must_use]
    pub fn middleware_len(&self) -> usize {
        self.middleware.len()
    }

    /// The route table, once the first request has loaded it
    #[must_use]
    pub fn router(&self) -> Option<&Router> {
        self.router.get()
    }

    /// Resolve a handler spec in this dispatcher's scope
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerResolution` if the spec cannot be resolved.
    pub fn make_handler(&self, spec: &HandlerSpec) -> Result<Handler> {
        self.resolver.make_handler(spec, &self.services)
    }

    /// Run the request through the middleware chain and the router
    ///
    /// # Errors
    ///
    /// Routing, handler resolution and handler errors are returned as-is.
    pub async fn handle(&self, req: &mut Request) -> Result<Response> {
        self.ensure_init().await?;
        self.run_chain(0, req).await
    }

    /// Build a URL for an action spec from this dispatcher's routes
    ///
    /// # Errors
    ///
    /// Returns `Error::ReverseNotFound` if no route is bound to `action`, or
    /// any error raised while loading the routes.
    pub async fn reverse(&self, action: &str, args: &[&str]) -> Result<String> {
        self.ensure_init().await?.reverse(action, args)
    }

    pub(crate) fn run_chain<'r>(
        &'r self,
        index: usize,
        req: &'r mut Request,
    ) -> BoxFuture<'r, Result<Response>> {
        match self.middleware.get(index) {
            Some(middleware) => middleware.handle(req, Next::new(self, index + 1)),
            None => Box::pin(self.dispatch(req)),
        }
    }

    async fn ensure_init(&self) -> Result<&Router> {
        self.router
            .get_or_try_init(|| async { self.load_routes() })
            .await
    }

    fn load_routes(&self) -> Result<Router> {
        let mut router = Router::new();
        (self.loader)(&mut router, &self.services)?;

        for route in router.routes() {
            self.resolver.validate(route.handler(), &self.services)?;
        }

        debug!(scope = %self.scope, routes = router.len(), "Dispatcher initialised");
        Ok(router)
    }

    async fn dispatch(&self, req: &mut Request) -> Result<Response> {
        let router = self.ensure_init().await?;
        let uri = req.uri();
        let matched = router.match_route(&uri, req.method())?;
        let handler = self.make_handler(matched.handler)?;

        req.set_extra(matched.extra.clone());
        let depth = req.uri_prefix().len();
        let prefix = matched.extra.get(PREFIX_KEY).and_then(Value::as_str);
        if let Some(prefix) = prefix {
            debug!(scope = %self.scope, prefix, "Entering mount point");
            req.push_uri_prefix(prefix);
        }

        let result = handler(req, matched.parameters).await;

        if prefix.is_some() {
            req.truncate_uri_prefix(depth);
        }
        result
    }
}

fn no_routes(_router: &mut Router, _services: &Services) -> Result<()> {
    Ok(())
}

impl Middleware for Dispatcher {
    /// Runs this dispatcher's own pipeline; the outer chain stops here
    fn handle<'a>(&'a self, req: &'a mut Request, _next: Next<'a>) -> BoxFuture<'a, Result<Response>> {
        Box::pin(Dispatcher::handle(self, req))
    }

    fn name(&self) -> &'static str {
        "Dispatcher"
    }
}

impl From<Arc<Dispatcher>> for HandlerSpec {
    fn from(dispatcher: Arc<Dispatcher>) -> Self {
        Self::callable(move |req, _params| {
            let dispatcher = Arc::clone(&dispatcher);
            Box::pin(async move { dispatcher.handle(req).await })
        })
    }
}

impl From<Dispatcher> for HandlerSpec {
    fn from(dispatcher: Dispatcher) -> Self {
        Arc::new(dispatcher).into()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("scope", &self.scope)
            .field(
                "middleware",
                &self.middleware.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("resolver", &self.resolver)
            .field("router", &self.router.get())
            .finish_non_exhaustive()
    }
}

//! # Handlers and Handler Resolution
//!
//! A route's [`HandlerSpec`] says *what* to run; the [`HandlerResolver`]
//! turns it into a [`Handler`] once per dispatch.
//!
//! Spec strings name a controller and an action separated by the last `::`:
//!
//! - `"Users::show"` is relative. It resolves to a controller instance
//!   registered in [`Services`] under `Users`, or else to the factory
//!   registered as `<scope>::controllers::Users`.
//! - `"::admin::controllers::Users::show"` is fully qualified and resolves to
//!   the factory registered as `admin::controllers::Users`.
//!
//! Factories replace runtime class instantiation: every controller type a
//! dispatcher can reach is registered up front in a [`ControllerRegistry`].
//! Dispatchers take theirs from [`Services::registry`], so qualified names
//! are global to an application.

use crate::controller::{run_action, Controller};
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::services::Services;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Boxed future used by handlers, middleware and controllers
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Positional route parameters (regex capture groups, in order)
pub type Params = Vec<String>;

/// Invokable unit of work for a matched route
pub type Handler = Arc<
    dyn for<'a> Fn(&'a mut Request, Params) -> BoxFuture<'a, Result<Response>> + Send + Sync,
>;

/// Builds a controller instance for one dispatch
pub type ControllerFactory = Arc<dyn Fn(&Services) -> Arc<dyn Controller> + Send + Sync>;

const CONTROLLER_SEPARATOR: &str = "::";

/// Wrap a closure as a [`Handler`]
///
/// ```ignore
/// let show = handler_fn(|_req, params| {
///     Box::pin(async move { Ok(Response::text(format!("user {}", params[0]))) })
/// });
/// ```
pub fn handler_fn<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Request, Params) -> BoxFuture<'a, Result<Response>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// What a route runs when it matches
#[derive(Clone)]
pub enum HandlerSpec {
    /// `"Class::action"` or `"::qualified::Class::action"`
    Action(String),
    /// A ready controller instance and the action to call on it
    Controller(Arc<dyn Controller>, String),
    /// A plain invokable
    Callable(Handler),
}

impl HandlerSpec {
    /// Bind an action of an existing controller instance
    pub fn controller<C>(controller: C, action: impl Into<String>) -> Self
    where
        C: Controller + 'static,
    {
        Self::Controller(Arc::new(controller), action.into())
    }

    /// Wrap a closure; see [`handler_fn`]
    pub fn callable<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, Params) -> BoxFuture<'a, Result<Response>>
            + Send
            + Sync
            + 'static,
    {
        Self::Callable(handler_fn(f))
    }

    /// The spec string for `Action` specs
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::Action(spec) => Some(spec),
            _ => None,
        }
    }
}

impl From<&str> for HandlerSpec {
    fn from(spec: &str) -> Self {
        Self::Action(spec.to_string())
    }
}

impl From<String> for HandlerSpec {
    fn from(spec: String) -> Self {
        Self::Action(spec)
    }
}

impl From<Handler> for HandlerSpec {
    fn from(handler: Handler) -> Self {
        Self::Callable(handler)
    }
}

impl fmt::Display for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(spec) => f.write_str(spec),
            Self::Controller(controller, action) => write!(f, "{}::{action}", controller.name()),
            Self::Callable(_) => f.write_str("<callable>"),
        }
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(spec) => f.debug_tuple("Action").field(spec).finish(),
            Self::Controller(controller, action) => f
                .debug_tuple("Controller")
                .field(&controller.name())
                .field(action)
                .finish(),
            Self::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

/// Controller factories keyed by qualified name (`scope::controllers::Name`)
///
/// Cloning is cheap; clones share the same factories, so a controller
/// registered by one dispatcher is reachable by its qualified name from
/// every dispatcher built on the same [`Services`].
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    factories: Arc<RwLock<HashMap<String, ControllerFactory>>>,
}

impl ControllerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a qualified name
    ///
    /// A later registration under the same name replaces the earlier one.
    pub fn register<F, C>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Services) -> C + Send + Sync + 'static,
        C: Controller + 'static,
    {
        let factory: ControllerFactory =
            Arc::new(move |services: &Services| Arc::new(factory(services)) as Arc<dyn Controller>);
        self.write().insert(name.into(), factory);
    }

    /// Copy every factory of `other` into this registry
    ///
    /// Entries of `other` replace entries with the same name.
    pub fn merge(&self, other: &Self) {
        if Arc::ptr_eq(&self.factories, &other.factories) {
            return;
        }
        let incoming: Vec<_> = other
            .read()
            .iter()
            .map(|(name, factory)| (name.clone(), Arc::clone(factory)))
            .collect();
        self.write().extend(incoming);
    }

    /// Whether a factory exists for `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Build a fresh controller
    #[must_use]
    pub fn create(&self, name: &str, services: &Services) -> Option<Arc<dyn Controller>> {
        let factory = self.read().get(name).cloned()?;
        Some(factory(services))
    }

    /// Number of registered factories
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ControllerFactory>> {
        self.factories.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ControllerFactory>> {
        self.factories.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("controllers", &self.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Parsed `"Class::action"` spec
#[derive(Debug, PartialEq, Eq)]
struct ActionSpec<'s> {
    class: &'s str,
    action: &'s str,
    qualified: bool,
}

fn parse_action(spec: &str) -> Result<ActionSpec<'_>> {
    let (qualified, path) = match spec.strip_prefix(CONTROLLER_SEPARATOR) {
        Some(rest) => (true, rest),
        None => (false, spec),
    };

    match path.rsplit_once(CONTROLLER_SEPARATOR) {
        Some((class, action)) if !class.is_empty() && !action.is_empty() => Ok(ActionSpec {
            class,
            action,
            qualified,
        }),
        _ => Err(Error::HandlerResolution {
            spec: spec.to_string(),
            reason: "expected `Controller::action`".to_string(),
        }),
    }
}

/// Turns handler specs into handlers for one dispatcher scope
#[derive(Clone, Debug)]
pub struct HandlerResolver {
    scope: String,
    registry: ControllerRegistry,
}

impl HandlerResolver {
    /// Resolver for relative specs under `scope`
    pub fn new(scope: impl Into<String>, registry: ControllerRegistry) -> Self {
        Self {
            scope: scope.into(),
            registry,
        }
    }

    /// The scope relative controller names are qualified with
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Registry controllers are created from
    #[must_use]
    pub const fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    /// Registry key for a relative controller name
    #[must_use]
    pub fn qualify(&self, class: &str) -> String {
        if self.scope.is_empty() {
            format!("controllers::{class}")
        } else {
            format!("{}::controllers::{class}", self.scope)
        }
    }

    /// Turn `spec` into an invokable
    ///
    /// Controllers come, in order, from a named instance in `services`
    /// (relative specs only), the registry under the qualified name, or the
    /// registry under `<scope>::controllers::<Class>`. Controller handlers run
    /// the controller's before/after hooks around the action.
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerResolution` if the spec is malformed, names an
    /// unknown controller, or an action the controller does not have.
    pub fn make_handler(&self, spec: &HandlerSpec, services: &Services) -> Result<Handler> {
        match spec {
            HandlerSpec::Callable(handler) => Ok(Arc::clone(handler)),
            HandlerSpec::Controller(controller, action) => {
                check_action(controller.as_ref(), action, &spec.to_string())?;
                Ok(controller_handler(Arc::clone(controller), action))
            }
            HandlerSpec::Action(raw) => {
                let parsed = parse_action(raw)?;
                let controller = self.controller(raw, &parsed, services)?;
                check_action(controller.as_ref(), parsed.action, raw)?;
                Ok(controller_handler(controller, parsed.action))
            }
        }
    }

    /// Check that `spec` can be resolved without a named service instance
    ///
    /// Used when routes are loaded; specs that may be served by a named
    /// instance registered later are only checked for syntax.
    pub(crate) fn validate(&self, spec: &HandlerSpec, services: &Services) -> Result<()> {
        let HandlerSpec::Action(raw) = spec else {
            return Ok(());
        };
        let parsed = parse_action(raw)?;
        if !parsed.qualified && services.controller(parsed.class).is_none() {
            let name = self.qualify(parsed.class);
            if !self.registry.contains(&name) {
                return Ok(());
            }
        }
        self.make_handler(spec, services).map(|_| ())
    }

    fn controller(
        &self,
        raw: &str,
        parsed: &ActionSpec<'_>,
        services: &Services,
    ) -> Result<Arc<dyn Controller>> {
        if !parsed.qualified {
            if let Some(controller) = services.controller(parsed.class) {
                return Ok(controller);
            }
        }

        let name = if parsed.qualified {
            parsed.class.to_string()
        } else {
            self.qualify(parsed.class)
        };

        self.registry
            .create(&name, services)
            .ok_or_else(|| Error::HandlerResolution {
                spec: raw.to_string(),
                reason: format!("no controller registered as `{name}`"),
            })
    }
}

fn check_action(controller: &dyn Controller, action: &str, spec: &str) -> Result<()> {
    if controller.actions().contains(&action) {
        Ok(())
    } else {
        Err(Error::HandlerResolution {
            spec: spec.to_string(),
            reason: format!("controller `{}` has no action `{action}`", controller.name()),
        })
    }
}

fn controller_handler(controller: Arc<dyn Controller>, action: &str) -> Handler {
    let action: Arc<str> = Arc::from(action);
    handler_fn(move |req, params| {
        let controller = Arc::clone(&controller);
        let action = Arc::clone(&action);
        Box::pin(async move { run_action(controller.as_ref(), &action, req, params).await })
    })
}

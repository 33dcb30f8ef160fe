//! # Services
//!
//! Thread-safe container for application-wide resources shared by
//! controllers, middleware and nested dispatchers.
//!
//! Besides typed values, it holds named controller instances: a relative
//! handler spec such as `"Users::show"` first looks for a controller
//! registered here under `"Users"`. It also carries the application's
//! [`ControllerRegistry`], shared by every dispatcher built on it.

use crate::config::Config;
use crate::controller::Controller;
use crate::handler::ControllerRegistry;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type Values = HashMap<String, Box<dyn Any + Send + Sync>>;

/// Shared resource container
///
/// Cloning is cheap; clones share the same storage.
///
/// ```ignore
/// let services = Services::new();
/// services.set("mailer", mailer);
/// let mailer = services.get::<Mailer>("mailer");
/// ```
#[derive(Clone, Default)]
pub struct Services {
    values: Arc<RwLock<Values>>,
    controllers: Arc<RwLock<HashMap<String, Arc<dyn Controller>>>>,
    registry: ControllerRegistry,
    config: Arc<Config>,
}

impl Services {
    /// Create an empty container
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container sharing `config`
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            ..Self::default()
        }
    }

    /// Application configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Controller factories shared by every dispatcher using these services
    #[must_use]
    pub const fn registry(&self) -> &ControllerRegistry {
        &self.registry
    }

    /// Store a value with a string key
    ///
    /// Overwrites any existing value with the same key.
    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.into(), Box::new(value));
    }

    /// Get a cloned value by key
    ///
    /// Returns `None` if key doesn't exist or type doesn't match.
    #[must_use]
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values
            .get(key)
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }

    /// Check if a key exists
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.contains_key(key)
    }

    /// Remove a value by key
    pub fn remove(&self, key: &str) -> bool {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(key).is_some()
    }

    /// Get the number of stored values (controllers excluded)
    #[must_use]
    pub fn len(&self) -> usize {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.len()
    }

    /// Check if no values are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a controller instance under a relative name
    pub fn set_controller<C: Controller + 'static>(&self, name: impl Into<String>, controller: C) {
        self.set_shared_controller(name, Arc::new(controller));
    }

    /// Register an already shared controller instance
    pub fn set_shared_controller(&self, name: impl Into<String>, controller: Arc<dyn Controller>) {
        let mut controllers = self
            .controllers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        controllers.insert(name.into(), controller);
    }

    /// Controller instance registered under `name`
    #[must_use]
    pub fn controller(&self, name: &str) -> Option<Arc<dyn Controller>> {
        let controllers = self
            .controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        controllers.get(name).cloned()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let controllers = self
            .controllers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Services")
            .field("keys", &values.keys().collect::<Vec<_>>())
            .field("controllers", &controllers.keys().collect::<Vec<_>>())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::handler::{BoxFuture, Params};
    use crate::request::Request;
    use crate::response::Response;

    struct Ping;

    impl Controller for Ping {
        fn actions(&self) -> &[&'static str] {
            &["ping"]
        }

        fn call<'a>(
            &'a self,
            _action: &'a str,
            _req: &'a mut Request,
            _params: Params,
        ) -> BoxFuture<'a, Result<Response>> {
            Box::pin(async { Ok(Response::text("pong")) })
        }
    }

    #[test]
    fn test_services_set_get() {
        let services = Services::new();
        services.set("count", 42i32);
        services.set("name", "test".to_string());

        assert_eq!(services.get::<i32>("count"), Some(42));
        assert_eq!(services.get::<String>("name"), Some("test".to_string()));
    }

    #[test]
    fn test_services_type_mismatch() {
        let services = Services::new();
        services.set("count", 42i32);
        assert_eq!(services.get::<String>("count"), None);
    }

    #[test]
    fn test_services_remove() {
        let services = Services::new();
        services.set("key", "value".to_string());
        assert!(services.contains("key"));
        assert!(services.remove("key"));
        assert!(!services.contains("key"));
        assert!(services.is_empty());
    }

    #[test]
    fn test_clones_share_storage() {
        let services = Services::new();
        let clone = services.clone();
        clone.set("shared", 1u8);
        assert_eq!(services.get::<u8>("shared"), Some(1));
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_named_controller() {
        let services = Services::new();
        assert!(services.controller("Ping").is_none());
        services.set_controller("Ping", Ping);
        let controller = services.controller("Ping").unwrap();
        assert_eq!(controller.actions(), &["ping"]);
        assert!(services.is_empty());
    }

    #[test]
    fn test_clones_share_registry() {
        let services = Services::new();
        services
            .clone()
            .registry()
            .register("app::controllers::Ping", |_services: &Services| Ping);
        assert!(services.registry().contains("app::controllers::Ping"));
    }

    #[test]
    fn test_config_accessor() {
        let mut config = Config::new();
        config.set("app.name", "demo");
        let services = Services::with_config(config);
        assert_eq!(
            services.config().get("app.name"),
            Some(&serde_json::json!("demo"))
        );
    }
}

//! # Configuration
//!
//! Hierarchical configuration addressed with dotted keys
//! (`"server.address"`, `"app.name"`), backed by a JSON tree.
//!
//! ```ignore
//! let mut config = Config::load("config/app.json")?;
//! config.set("server.address", "0.0.0.0:8080");
//! let server = ServerConfig::from_config(&config)?;
//! ```

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Dotted-key configuration store
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    root: Value,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }
}

impl Config {
    /// Create an empty configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing JSON object
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `value` is not an object.
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_object() {
            Ok(Self { root: value })
        } else {
            Err(Error::Config {
                message: "configuration root must be a JSON object".to_string(),
            })
        }
    }

    /// Load a JSON file
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, `Error::Json` if it is
    /// not valid JSON and `Error::Config` if the root is not an object.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_value(serde_json::from_str(&content)?)?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Look up a dotted key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.')
            .try_fold(&self.root, |node, part| node.as_object()?.get(part))
    }

    /// Look up a dotted key, falling back to `default`
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    /// Deserialize the value at a dotted key
    ///
    /// Returns `Ok(None)` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the value has the wrong shape for `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .map(|value| {
                T::deserialize(value).map_err(|e| Error::Config {
                    message: format!("{key}: {e}"),
                })
            })
            .transpose()
    }

    /// Whether a dotted key is present
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a dotted key, creating intermediate objects
    ///
    /// Scalars found on the way are replaced by objects.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let mut node = &mut self.root;
        let mut parts = key.split('.').peekable();
        while let Some(part) = parts.next() {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else {
                return;
            };
            if parts.peek().is_none() {
                map.insert(part.to_string(), value.into());
                return;
            }
            node = map
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }

    /// Deep-merge `other` into this configuration; `other` wins on conflicts
    pub fn merge(&mut self, other: &Self) {
        merge_values(&mut self.root, &other.root);
    }

    /// The whole tree
    #[must_use]
    pub fn to_value(&self) -> Value {
        self.root.clone()
    }
}

fn merge_values(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Read `server.address`, `server.keep_alive`,
    /// `server.shutdown_timeout_secs` and `server.max_body_size`
    ///
    /// Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a key has the wrong type or the address
    /// does not parse.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut server = Self::default();

        if let Some(address) = config.get_as::<String>("server.address")? {
            server.address = address.parse().map_err(|e| Error::Config {
                message: format!("server.address: {e}"),
            })?;
        }
        if let Some(keep_alive) = config.get_as("server.keep_alive")? {
            server.keep_alive = keep_alive;
        }
        if let Some(secs) = config.get_as("server.shutdown_timeout_secs")? {
            server.shutdown_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = config.get_as("server.max_body_size")? {
            server.max_body_size = limit;
        }

        Ok(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_get() {
        let config = Config::from_value(json!({"app": {"name": "demo", "debug": true}})).unwrap();
        assert_eq!(config.get("app.name"), Some(&json!("demo")));
        assert_eq!(config.get("app.missing"), None);
        assert_eq!(config.get("app.name.deeper"), None);
        assert!(config.has("app.debug"));
    }

    #[test]
    fn test_get_or_default() {
        let config = Config::new();
        let fallback = json!(10);
        assert_eq!(config.get_or("limits.items", &fallback), &json!(10));
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut config = Config::new();
        config.set("a.b.c", 1);
        config.set("a.x", "y");
        assert_eq!(config.to_value(), json!({"a": {"b": {"c": 1}, "x": "y"}}));

        config.set("a.x.z", true);
        assert_eq!(config.get("a.x.z"), Some(&json!(true)));
    }

    #[test]
    fn test_get_as() {
        let config = Config::from_value(json!({"port": 8080, "name": "x"})).unwrap();
        assert_eq!(config.get_as::<u16>("port").unwrap(), Some(8080));
        assert_eq!(config.get_as::<u16>("missing").unwrap(), None);
        assert!(config.get_as::<u16>("name").is_err());
    }

    #[test]
    fn test_merge() {
        let mut base = Config::from_value(json!({"db": {"host": "a", "port": 1}})).unwrap();
        let local = Config::from_value(json!({"db": {"host": "b"}, "debug": true})).unwrap();
        base.merge(&local);
        assert_eq!(
            base.to_value(),
            json!({"db": {"host": "b", "port": 1}, "debug": true})
        );
    }

    #[test]
    fn test_root_must_be_object() {
        assert!(matches!(
            Config::from_value(json!([1, 2])),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/trellis.json"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.address.port(), 8000);
        assert!(config.keep_alive);
    }

    #[test]
    fn test_server_config_from_config() {
        let config = Config::from_value(json!({
            "server": {"address": "0.0.0.0:9000", "max_body_size": 10, "shutdown_timeout_secs": 5}
        }))
        .unwrap();
        let server = ServerConfig::from_config(&config).unwrap();
        assert_eq!(server.address.port(), 9000);
        assert_eq!(server.max_body_size, 10);
        assert_eq!(server.shutdown_timeout, Duration::from_secs(5));
        assert!(server.keep_alive);
    }

    #[test]
    fn test_server_config_bad_address() {
        let config = Config::from_value(json!({"server": {"address": "nowhere"}})).unwrap();
        assert!(ServerConfig::from_config(&config).is_err());
    }
}

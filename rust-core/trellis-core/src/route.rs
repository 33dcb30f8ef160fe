//! # Route Definitions
//!
//! A route binds a regular expression to a handler spec. An optional method
//! list can be written in front of the expression:
//!
//! - `"/about"` matches any method
//! - `"GET:/about"` matches GET only
//! - `"(GET|POST|DELETE):/users/(\d+)"` matches the listed methods
//!
//! A bare method must be upper case, so `"tag:(\w+)"` is an expression and
//! not a method list. A list in brackets may use any case.
//!
//! Bracketed groups in the expression become the positional parameters
//! passed to the handler. Patterns are raw regex, searched (not anchored)
//! against the request URI, so use `^` and `$` where a whole-path match is
//! wanted and escape literal metacharacters yourself.

use crate::error::{Error, Result};
use crate::handler::HandlerSpec;
use crate::request::Extra;
use hyper::Method;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// A single entry of the route table
#[derive(Clone)]
pub struct Route {
    /// Pattern as registered, including any method list
    source: String,
    /// Compiled expression (method list stripped)
    regex: Regex,
    /// Allowed methods; empty means any method
    methods: Vec<Method>,
    /// What to run when the route matches
    handler: HandlerSpec,
    /// Opaque metadata handed to the request
    extra: Extra,
}

impl Route {
    /// Build a route from a pattern such as `"(GET|POST):/users/(\d+)"`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the method list names an
    /// invalid method or the expression does not compile.
    pub fn new(pattern: &str, handler: HandlerSpec, extra: Extra) -> Result<Self> {
        let (methods, expression) = split_methods(pattern)?;

        let regex = Regex::new(expression).map_err(|e| Error::InvalidRoutePattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            methods,
            handler,
            extra,
        })
    }

    /// Pattern as registered
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Regular expression matched against the URI
    #[must_use]
    pub fn expression(&self) -> &str {
        self.regex.as_str()
    }

    /// Allowed methods (empty means any)
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Handler spec
    #[must_use]
    pub const fn handler(&self) -> &HandlerSpec {
        &self.handler
    }

    /// Route metadata
    #[must_use]
    pub const fn extra(&self) -> &Extra {
        &self.extra
    }

    /// Whether `method` may be used on this route
    #[must_use]
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// Search the URI; returns the captured groups without the whole match
    ///
    /// Optional groups that did not participate are returned as empty strings
    /// so positions stay stable.
    #[must_use]
    pub fn captures(&self, uri: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(uri)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|group| group.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        )
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.source)
            .field("methods", &self.methods)
            .field("handler", &self.handler)
            .field("extra", &self.extra)
            .finish()
    }
}

fn method_list() -> &'static Regex {
    static METHOD_LIST: OnceLock<Regex> = OnceLock::new();
    METHOD_LIST.get_or_init(|| {
        Regex::new(r"^(?:\(([A-Za-z]+(?:\|[A-Za-z]+)*)\)|([A-Z]+)):(.*)$")
            .expect("method list expression is valid")
    })
}

/// Split `"(GET|POST):/path"` into its methods and the expression
fn split_methods(pattern: &str) -> Result<(Vec<Method>, &str)> {
    let Some(caps) = method_list().captures(pattern) else {
        return Ok((Vec::new(), pattern));
    };
    let list = caps.get(1).or_else(|| caps.get(2));
    let (Some(list), Some(expression)) = (list, caps.get(3)) else {
        return Ok((Vec::new(), pattern));
    };

    let mut methods = Vec::new();
    for name in list.as_str().split('|') {
        let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes()).map_err(|e| {
            Error::InvalidRoutePattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        if !methods.contains(&method) {
            methods.push(method);
        }
    }

    Ok((methods, expression.as_str()))
}

//! # Error Handling
//!
//! Centralized error types for the trellis core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Routing and dispatch never catch these: they bubble up to the
//! [`Application`](crate::application::Application) boundary, which maps
//! each variant to an HTTP status with [`Error::status_code`].

use hyper::{Method, StatusCode};
use thiserror::Error;

/// Result type alias for trellis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error raised by handler code
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core error types for the trellis runtime
#[derive(Error, Debug)]
pub enum Error {
    /// No route matched the (prefix-stripped) request URI
    #[error("No route found for path: {uri}")]
    NotFound {
        /// The URI that wasn't matched
        uri: String,
    },

    /// At least one route matched the URI but none accepted the method
    #[error("Method not allowed for path: {uri} (allowed: {})", join_methods(.allowed))]
    MethodNotAllowed {
        /// The URI that matched
        uri: String,
        /// Union of methods accepted by every structurally matching route
        allowed: Vec<Method>,
    },

    /// A handler spec could not be turned into an invokable
    #[error("Cannot resolve handler '{spec}': {reason}")]
    HandlerResolution {
        /// The offending handler spec
        spec: String,
        /// Why resolution failed
        reason: String,
    },

    /// Error raised by a handler, controller hook or middleware
    #[error("Handler error: {0}")]
    Handler(#[source] BoxError),

    /// Application-raised HTTP error (bad request, unauthorised, ...)
    #[error("{status}: {message}")]
    Http {
        /// Status code sent to the client
        status: StatusCode,
        /// Message shown on the error page
        message: String,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// No route is bound to the action passed to reverse routing
    #[error("No route to reverse for handler: {handler}")]
    ReverseNotFound {
        /// The action spec looked up
        handler: String,
    },

    /// Configuration could not be loaded or has the wrong shape
    #[error("Invalid configuration: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Hyper(#[from] hyper::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
    },

    /// The request body could not be read
    #[error("Failed to read request body: {0}")]
    Body(#[source] BoxError),
}

impl Error {
    /// Wrap any error raised by handler code
    pub fn handler<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Handler(err.into())
    }

    /// Application error with an explicit status
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(StatusCode::BAD_REQUEST, message)
    }

    /// 401 Unauthorized
    pub fn unauthorised(message: impl Into<String>) -> Self {
        Self::http(StatusCode::UNAUTHORIZED, message)
    }

    /// 403 Forbidden
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::http(StatusCode::FORBIDDEN, message)
    }

    /// 501 Not Implemented
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::http(StatusCode::NOT_IMPLEMENTED, message)
    }

    /// 503 Service Unavailable
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::http(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// HTTP status the error boundary responds with
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Http { status, .. } => *status,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Body(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Methods to advertise in an `Allow` header, if any
    #[must_use]
    pub fn allowed_methods(&self) -> Option<&[Method]> {
        match self {
            Self::MethodNotAllowed { allowed, .. } => Some(allowed),
            _ => None,
        }
    }
}

pub(crate) fn join_methods(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = Error::NotFound {
            uri: "/unknown".to_string(),
        };
        assert!(err.to_string().contains("/unknown"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let err = Error::MethodNotAllowed {
            uri: "/users/42".to_string(),
            allowed: vec![Method::GET, Method::POST],
        };
        assert!(err.to_string().contains("GET, POST"));
        assert_eq!(err.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            err.allowed_methods(),
            Some(&[Method::GET, Method::POST][..])
        );
    }

    #[test]
    fn test_http_error_constructors() {
        assert_eq!(
            Error::bad_request("nope").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::unauthorised("who?").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::service_unavailable("later").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_handler_error_is_internal() {
        let err = Error::handler("database exploded");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("database exploded"));
    }

    #[test]
    fn test_request_body_errors() {
        let err = Error::PayloadTooLarge { limit: 16 };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(err.to_string().contains("limit=16"));

        let err = Error::Body("connection reset".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_bind_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = Error::BindError {
            address: "0.0.0.0:8000".to_string(),
            source: io_err,
        };
        assert!(err.to_string().contains("0.0.0.0:8000"));
    }
}

//! # Trellis Core
//!
//! Request routing and dispatch runtime for the Trellis web framework.
//!
//! ## Architecture
//!
//! An [`Application`] owns a root [`Dispatcher`]. Each dispatcher runs its
//! middleware chain, then matches the request against an ordered table of
//! regex routes and invokes the resolved handler. Dispatchers nest: a
//! route (or middleware) can hand the request to another dispatcher mounted
//! under a URI prefix, which then routes the remainder of the path.
//!
//! ## Modules
//!
//! - `application` - Front controller and error boundary
//! - `dispatcher` - Middleware chain plus route dispatch
//! - `router` - Ordered regex route table
//! - `route` - Single route definition and method lists
//! - `handler` - Handler specs, controller registry and resolution
//! - `controller` - Controller trait and before/after hooks
//! - `middleware` - Middleware trait and built-in middleware
//! - `request` - HTTP request with URI prefix stack
//! - `response` - HTTP response
//! - `services` - Shared service container
//! - `config` - Dotted-key configuration
//! - `server` - HTTP server built on Hyper
//! - `logging` - Tracing subscriber setup
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod application;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod logging;
pub mod middleware;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod services;

pub use application::{Application, DefaultErrorRenderer, ErrorRenderer};
pub use config::{Config, ServerConfig};
pub use controller::{AfterAction, BeforeAction, Controller};
pub use dispatcher::{Dispatcher, PREFIX_KEY};
pub use error::{Error, Result};
pub use handler::{
    handler_fn, BoxFuture, ControllerFactory, ControllerRegistry, Handler, HandlerResolver,
    HandlerSpec, Params,
};
pub use logging::init_logging;
pub use middleware::{from_fn, LoggingMiddleware, Middleware, Next};
pub use request::{Extra, Request};
pub use response::Response;
pub use route::Route;
pub use router::{RouteMatch, Router};
pub use server::Server;
pub use services::Services;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

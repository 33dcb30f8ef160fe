//! # HTTP Server
//!
//! HTTP/1 server built on Hyper and Tokio serving an [`Application`].
//! Implements graceful shutdown with signal handling.
//!
//! ## Key Features
//!
//! - Async request handling with Tokio runtime
//! - Graceful shutdown on Ctrl-C, draining active connections
//! - Connection keep-alive support
//! - Request body size limit (`413 Payload Too Large`)
//! - Request id propagation and one access-log line per request

use crate::application::Application;
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const REQUEST_ID: &str = "x-request-id";

/// HTTP server for an application
pub struct Server {
    config: ServerConfig,
    app: Arc<Application>,
}

impl Server {
    /// Create a server with the default configuration
    #[must_use]
    pub fn new(app: Application) -> Self {
        Self {
            config: ServerConfig::default(),
            app: Arc::new(app),
        }
    }

    /// Replace the configuration
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind the server to an address
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.config.address = addr;
        self
    }

    /// Set max request body size
    pub fn set_max_body_size(&mut self, bytes: usize) {
        self.config.max_body_size = bytes;
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The application being served
    #[must_use]
    pub const fn app(&self) -> &Arc<Application> {
        &self.app
    }

    /// Start the server with graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound, or
    /// `Error::Io` if accepting connections fails.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.address;
        let listener = bind(addr)?;

        info!(address = %addr, "Server listening on http://{}", addr);

        let active = Arc::new(AtomicUsize::new(0));
        let max_body_size = self.config.max_body_size;
        let keep_alive = self.config.keep_alive;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    let (stream, remote_addr) = accept_result?;
                    let io = TokioIo::new(stream);
                    let app = Arc::clone(&self.app);
                    let active = Arc::clone(&active);

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);

                        let service = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move {
                                Ok::<_, Infallible>(
                                    handle_request(req, &app, remote_addr, max_body_size).await,
                                )
                            }
                        });

                        if let Err(err) = http1::Builder::new()
                            .keep_alive(keep_alive)
                            .serve_connection(io, service)
                            .await
                        {
                            error!(remote = %remote_addr, "Error serving connection: {:?}", err);
                        }
                        active.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                () = shutdown_signal() => {
                    info!("Shutdown signal received, stopping server...");
                    break;
                }
            }
        }

        let drain = async {
            while active.load(Ordering::Relaxed) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        if tokio::time::timeout(self.config.shutdown_timeout, drain)
            .await
            .is_err()
        {
            warn!(
                active = active.load(Ordering::Relaxed),
                "Shutdown timeout reached with connections still open"
            );
        }
        info!("Server stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("app", &self.app)
            .finish()
    }
}

fn bind(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    let bind_error = |source: std::io::Error| Error::BindError {
        address: addr.to_string(),
        source,
    };

    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()
    } else {
        tokio::net::TcpSocket::new_v6()
    }
    .map_err(bind_error)?;
    socket.set_reuseaddr(true).map_err(bind_error)?;
    #[cfg(not(windows))]
    {
        socket.set_reuseport(true).map_err(bind_error)?;
    }
    socket.bind(addr).map_err(bind_error)?;
    socket.listen(1024).map_err(bind_error)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", err);
        std::future::pending::<()>().await;
    }
}

async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    app: &Application,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let version = req.version();

    let response = match Request::from_hyper(req, remote_addr, max_body_size).await {
        Ok(mut request) => {
            let request_id = request
                .header(REQUEST_ID)
                .map_or_else(generate_request_id, ToString::to_string);
            request.set_header(REQUEST_ID, &request_id);
            app.handle(request)
                .await
                .with_header(REQUEST_ID, &request_id)
        }
        Err(err @ Error::PayloadTooLarge { .. }) => {
            warn!(remote = %remote_addr, error = %err, "Request body rejected");
            Response::text("Payload Too Large").with_status(StatusCode::PAYLOAD_TOO_LARGE)
        }
        Err(err) => {
            error!(remote = %remote_addr, error = %err, "Failed to parse request");
            Response::text("Bad Request").with_status(StatusCode::BAD_REQUEST)
        }
    };

    info!(
        "    {} - \"{} {} {:?}\" {}",
        remote_addr,
        method,
        path,
        version,
        response.status()
    );
    response.into_hyper()
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

//! HTTP server exposing the metrics registry.
//!
//! Lifecycle:
//!
//! ```text
//! Created ──start()──► Listening ──stop()──► ShuttingDown ──► Stopped
//!    │
//!    └──bind error──► FailedToStart
//! ```

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use axum::Router;
use parking_lot::Mutex;
use prometheus::Registry;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dirsize_core::ConfigError;

use crate::handlers;

pub const DEFAULT_METRICS_PORT: u16 = 8080;
pub const DEFAULT_METRICS_PATH: &str = "/metrics";
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// TCP port to listen on (all interfaces, IPv6 and IPv4). 0 picks a free port.
    pub port: u16,
    /// Path serving the exposition format. Empty means the default.
    pub metrics_path: String,
    /// How long in-flight requests may drain after a shutdown request.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_METRICS_PORT,
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn metrics_path(&self) -> &str {
        if self.metrics_path.is_empty() {
            DEFAULT_METRICS_PATH
        } else {
            &self.metrics_path
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.metrics_path().starts_with('/') {
            return Err(ConfigError::InvalidMetricsPath(self.metrics_path.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    ShuttingDown,
    Stopped,
    FailedToStart,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),

    #[error("server can only be started once (state: {0:?})")]
    AlreadyStarted(ServerState),
}

/// Serves the registry over HTTP until [`MetricsServer::stop`] is called.
///
/// Signal handling is left to the caller: the binary wires SIGINT/SIGTERM
/// to `stop()`.
pub struct MetricsServer {
    config: ServerConfig,
    registry: Registry,
    shutdown: CancellationToken,
    state: Mutex<ServerState>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl MetricsServer {
    pub fn new(config: ServerConfig, registry: Registry) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            shutdown: CancellationToken::new(),
            state: Mutex::new(ServerState::Created),
            local_addr: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Address actually bound, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn router(&self) -> Router {
        handlers::router(self.config.metrics_path(), self.registry.clone())
    }

    /// Binds and serves until `stop()` is called.
    ///
    /// Returns the bind error immediately if the port cannot be bound.
    /// After a shutdown request, in-flight requests get `shutdown_timeout` to
    /// finish; the server is then torn down regardless and `Ok` is returned.
    pub async fn start(&self) -> Result<(), ServerError> {
        {
            let state = self.state.lock();
            if *state != ServerState::Created {
                return Err(ServerError::AlreadyStarted(*state));
            }
        }

        let listener = match bind_any(self.config.port).await {
            Ok(listener) => listener,
            Err(e) => {
                self.set_state(ServerState::FailedToStart);
                error!(error = %e, "failed to start HTTP server");
                return Err(e);
            }
        };
        let local = listener.local_addr().map_err(ServerError::Serve)?;
        *self.local_addr.lock() = Some(local);
        self.set_state(ServerState::Listening);
        info!(addr = %local, metrics_path = self.config.metrics_path(), "starting server");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let graceful = self.shutdown.clone().cancelled_owned();
        let mut serve = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
        });

        tokio::select! {
            joined = &mut serve => {
                // The server ended without being asked to.
                self.set_state(ServerState::Stopped);
                return flatten(joined);
            }
            _ = self.shutdown.cancelled() => {}
        }

        self.set_state(ServerState::ShuttingDown);
        info!("shutting down server");

        match tokio::time::timeout(self.config.shutdown_timeout, &mut serve).await {
            Ok(joined) => {
                if let Err(e) = flatten(joined) {
                    warn!(error = %e, "server reported an error while shutting down");
                }
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                    "graceful shutdown timed out, closing remaining connections"
                );
                serve.abort();
            }
        }

        self.set_state(ServerState::Stopped);
        info!("server stopped");
        Ok(())
    }

    /// Requests a graceful shutdown. Safe to call any number of times; when
    /// called before `start()`, the server shuts down as soon as it is listening.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!(state = ?self.state(), "shutdown requested");
        }
        self.shutdown.cancel();
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock() = state;
    }
}

/// Binds `port` on all interfaces.
///
/// The IPv6 wildcard also accepts IPv4 clients on dual-stack hosts; hosts
/// without IPv6 fall back to the IPv4 wildcard.
async fn bind_any(port: u16) -> Result<TcpListener, ServerError> {
    let v6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
    match TcpListener::bind(v6).await {
        Ok(listener) => return Ok(listener),
        Err(source) if source.kind() == io::ErrorKind::AddrInUse => {
            return Err(ServerError::Bind { addr: v6, source });
        }
        Err(e) => debug!(error = %e, "IPv6 unavailable, listening on IPv4 only"),
    }

    let v4 = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    TcpListener::bind(v4)
        .await
        .map_err(|source| ServerError::Bind { addr: v4, source })
}

fn flatten(joined: Result<io::Result<()>, tokio::task::JoinError>) -> Result<(), ServerError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServerError::Serve(e)),
        Err(e) => Err(ServerError::Serve(io::Error::other(e))),
    }
}

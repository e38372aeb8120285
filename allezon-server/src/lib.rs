//! allezon-server - HTTP server for the allezon tag analytics service
//!
//! This crate owns the application state, the HTTP routes and the stream
//! pipeline (forwarder and collector consumers plus the rollup flusher).

pub mod consumers;
mod error;
pub mod http;
mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

pub use consumers::pipeline::Pipeline;
pub use consumers::{ConsumerConfig, ConsumerError, ConsumerManager};
pub use error::{ErrorResponse, ServerError};
pub use http::create_router;
pub use state::{AppState, EngineConfig};

/// The main allezon server
pub struct AllezonServer {
    config: ServerConfig,
    engine: EngineConfig,
    state: Arc<AppState>,
}

impl AllezonServer {
    /// Create a new server with fresh in-memory state
    pub fn new(config: ServerConfig, engine: EngineConfig) -> Result<Self, ServerError> {
        let state = Arc::new(AppState::new(&engine)?);
        Ok(Self::with_state(config, engine, state))
    }

    /// Create a server with custom state (for testing)
    pub fn with_state(config: ServerConfig, engine: EngineConfig, state: Arc<AppState>) -> Self {
        Self {
            config,
            engine,
            state,
        }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server, binding to the configured address, until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        self.run_with_listener(listener, shutdown).await
    }

    /// Run the server on an already bound listener
    pub async fn run_with_listener<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("allezon server listening on {}", addr);
        }

        let pipeline = Pipeline::start(&self.state, &self.engine.log).await?;

        let router = create_router(Arc::clone(&self.state));
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        tracing::info!("HTTP server stopped, draining pipeline");
        if tokio::time::timeout(self.config.shutdown_grace, pipeline.shutdown())
            .await
            .is_err()
        {
            tracing::warn!(
                grace = ?self.config.shutdown_grace,
                "Pipeline did not drain within the shutdown grace period"
            );
        }

        served
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long shutdown waits for consumers and the final flush
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(30)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Returns the socket address string (e.g., "0.0.0.0:8080")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

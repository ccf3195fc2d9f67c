//! HTTP server lifecycle

use std::net::SocketAddr;
use std::sync::Arc;

use hearth_process::InstanceRegistry;
use tokio::net::TcpListener;
use tracing::info;

use crate::{routes, settings::Settings, state::AppState};

/// The bound API server
pub struct ApiServer {
    state: AppState,
    listener: TcpListener,
}

impl ApiServer {
    /// Bind the listen address and build the registry
    pub async fn bind(settings: &Settings) -> anyhow::Result<Self> {
        let addr = settings.bind_addr()?;
        let registry = Arc::new(InstanceRegistry::new(settings.supervisor.clone()));
        Self::with_registry(addr, registry).await
    }

    /// Bind `addr` serving an existing registry
    pub async fn with_registry(
        addr: SocketAddr,
        registry: Arc<InstanceRegistry>,
    ) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&registry.config().servers_dir).await?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            state: AppState::new(registry),
            listener,
        })
    }

    /// Actual bound address
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared application state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `POST /shutdown` or Ctrl-C, stopping every instance
    /// before the listener closes
    pub async fn run(self) -> anyhow::Result<()> {
        let Self { state, listener } = self;
        info!(addr = %listener.local_addr()?, "Hearth server listening");

        let shutdown = state.shutdown.clone();
        let registry = Arc::clone(&state.registry);
        axum::serve(listener, routes::app(state))
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::signal::ctrl_c() => info!("Interrupt received"),
                }
                // Open console streams only end once their processes are gone.
                registry.shutdown_all(None).await;
            })
            .await?;

        info!("Hearth server stopped");
        Ok(())
    }
}

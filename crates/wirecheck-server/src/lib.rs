//! HTTP server: change-event intake and read-only graph queries

pub mod handlers;
pub mod router;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use wirecheck_core::config::{ServerSettings, Settings};
use wirecheck_core::{GraphReader, ReachabilityEngine};
use wirecheck_pipeline::UpdateScheduler;

pub use router::create_router;

/// Shared state of every request handler. The store is only reachable
/// through its read-only side; writes happen in scheduled re-maps.
pub struct ServerState {
    pub store: Arc<dyn GraphReader>,
    pub scheduler: Arc<UpdateScheduler>,
    pub engine: ReachabilityEngine,
    /// Pushes to any other branch are refused.
    pub default_branch: String,
}

impl ServerState {
    pub fn new(store: Arc<dyn GraphReader>, scheduler: Arc<UpdateScheduler>, settings: &Settings) -> Self {
        ServerState {
            store,
            scheduler,
            engine: ReachabilityEngine::new(settings.analysis.max_hops),
            default_branch: settings.source.default_branch.clone(),
        }
    }
}

pub struct WirecheckServer {
    state: Arc<ServerState>,
    config: ServerSettings,
}

impl WirecheckServer {
    pub fn new(state: ServerState, config: ServerSettings) -> Self {
        WirecheckServer {
            state: Arc::new(state),
            config,
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Bind and serve until the process stops.
    pub async fn start(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.addr()).await?;
        info!("Listening on http://{}", listener.local_addr()?);
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let router = create_router(self.state);
        axum::serve(listener, router).await?;
        Ok(())
    }
}

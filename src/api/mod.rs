//! HTTP transport
//!
//! Hosts the protocol dispatcher at `/mcp`, an external sync trigger, and
//! health and metrics endpoints.

mod context;
pub mod handlers;
pub mod routes;

pub use context::{REQUEST_ID_HEADER, USER_ARN_HEADER, USER_ID_HEADER};
pub use routes::*;

use crate::capabilities::build_default_registry;
use crate::config::Config;
use crate::error::Result;
use crate::integrations::Integrations;
use crate::lifecycle::IncidentLifecycle;
use crate::protocol::{McpServer, ServerInfo};
use crate::state::{create_store, IncidentStore};
use crate::sync::{
    FilesystemObjectStore, MetricsSink, ObjectStore, PrometheusMetricsSink, SyncPipeline,
    SyncSettings,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub server: Arc<McpServer>,
    pub lifecycle: IncidentLifecycle,
    pub pipeline: SyncPipeline,
    /// Name reported by `/health`
    pub service_name: String,
    pub request_timeout: Duration,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the service around explicit collaborators
    pub fn assemble(
        config: &Config,
        store: Arc<dyn IncidentStore>,
        objects: Arc<dyn ObjectStore>,
        metrics: Arc<dyn MetricsSink>,
        integrations: Integrations,
    ) -> Result<Self> {
        let lifecycle = IncidentLifecycle::new(store.clone());
        let pipeline = SyncPipeline::new(
            store,
            objects,
            metrics,
            SyncSettings::from_config(&config.sync, &config.corpus),
        );
        let registry = build_default_registry(&lifecycle, &pipeline, &integrations)?;
        let server = McpServer::new(
            ServerInfo {
                name: config.identity.name.clone(),
                version: config.identity.version.clone(),
            },
            registry,
        );

        Ok(Self {
            server: Arc::new(server),
            lifecycle,
            pipeline,
            service_name: config.observability.service_name.clone(),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs),
            started_at: Instant::now(),
        })
    }

    /// Configured store, filesystem corpus, Prometheus sink and HTTP integrations
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = create_store(&config.state).await?;
        let objects: Arc<dyn ObjectStore> =
            Arc::new(FilesystemObjectStore::new(config.corpus.root.clone()));
        let integrations = Integrations::from_config(&config.integrations)?;
        Self::assemble(
            config,
            store,
            objects,
            Arc::new(PrometheusMetricsSink),
            integrations,
        )
    }
}

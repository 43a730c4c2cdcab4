//! The tool set exposed through the protocol dispatcher

mod args;
mod incidents;
mod similar;
mod sync;

pub use incidents::{
    CloseIncident, CreateIncident, GetIncident, ResolveIncident, SearchIncidentsByStatus,
    SearchMyIncidents, UpdateIncident,
};
pub use similar::SearchSimilarIncidents;
pub use sync::{ForceKbSync, SyncAndIngest, WorkflowStatus};

use crate::error::Result;
use crate::integrations::Integrations;
use crate::lifecycle::IncidentLifecycle;
use crate::protocol::{Capability, CapabilityRegistry};
use crate::sync::SyncPipeline;
use std::sync::Arc;

/// Every capability, in the order `tools/list` reports them
pub fn default_capabilities(
    lifecycle: &IncidentLifecycle,
    pipeline: &SyncPipeline,
    integrations: &Integrations,
) -> Vec<Arc<dyn Capability>> {
    let capabilities: Vec<Arc<dyn Capability>> = vec![
        Arc::new(CreateIncident::new(lifecycle.clone())),
        Arc::new(GetIncident::new(lifecycle.clone())),
        Arc::new(SearchMyIncidents::new(lifecycle.clone())),
        Arc::new(SearchIncidentsByStatus::new(lifecycle.clone())),
        Arc::new(UpdateIncident::new(lifecycle.clone())),
        Arc::new(ResolveIncident::new(lifecycle.clone())),
        Arc::new(CloseIncident::new(lifecycle.clone())),
        Arc::new(SearchSimilarIncidents::new(
            integrations.retrieval.clone(),
            integrations.analysis.clone(),
        )),
        Arc::new(ForceKbSync::new(pipeline.clone())),
        Arc::new(SyncAndIngest::new(
            pipeline.clone(),
            integrations.ingestion.clone(),
        )),
    ];
    capabilities
}

pub fn build_default_registry(
    lifecycle: &IncidentLifecycle,
    pipeline: &SyncPipeline,
    integrations: &Integrations,
) -> Result<CapabilityRegistry> {
    CapabilityRegistry::new(default_capabilities(lifecycle, pipeline, integrations))
}

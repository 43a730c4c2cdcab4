//! Shared fixtures for integration tests
#![allow(dead_code)]

use incident_kb_mcp::{
    capabilities::build_default_registry,
    integrations::Integrations,
    lifecycle::IncidentLifecycle,
    models::{
        CloseIncidentInput, CreateIncidentInput, Incident, ResolutionType, ResolveIncidentInput,
        SourceSystem,
    },
    protocol::{InvocationContext, McpRequest, McpResponse, McpServer, ServerInfo},
    state::{IncidentStore, InMemoryStore},
    sync::{InMemoryMetricsSink, InMemoryObjectStore, SyncPipeline, SyncSettings},
};
use serde_json::{json, Value};
use std::sync::Arc;

pub const ANALYST: &str = "analyst@example.com";

/// Minimal valid creation input for a JIRA ticket
pub fn create_input(external_id: &str) -> CreateIncidentInput {
    CreateIncidentInput {
        external_id: external_id.to_string(),
        source_system: Some(SourceSystem::Jira),
        title: format!("Checkout fails for {}", external_id),
        description: "Payment service returns 502 after deploy".to_string(),
        category: "payments".to_string(),
        assigned_to: Some(ANALYST.to_string()),
        affected_systems: vec!["checkout".to_string(), "payments-api".to_string()],
        ..Default::default()
    }
}

pub fn resolve_input(incident_id: &str) -> ResolveIncidentInput {
    ResolveIncidentInput {
        incident_id: incident_id.to_string(),
        resolved_by: ANALYST.to_string(),
        resolution_type: ResolutionType::Fixed,
        description: "Rolled back the payments deploy".to_string(),
        root_cause: Some("Connection pool exhausted".to_string()),
        solution: None,
        preventive_actions: vec!["Alert on pool saturation".to_string()],
    }
}

pub fn close_input(incident_id: &str) -> CloseIncidentInput {
    CloseIncidentInput {
        incident_id: incident_id.to_string(),
        closed_by: ANALYST.to_string(),
        notes: Some("Verified in production".to_string()),
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub lifecycle: IncidentLifecycle,
    pub objects: InMemoryObjectStore,
    pub metrics: InMemoryMetricsSink,
    pub pipeline: SyncPipeline,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(SyncSettings::default())
    }

    pub fn with_settings(settings: SyncSettings) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let objects = InMemoryObjectStore::new();
        let metrics = InMemoryMetricsSink::new();
        let pipeline = SyncPipeline::new(
            store.clone(),
            Arc::new(objects.clone()),
            Arc::new(metrics.clone()),
            settings,
        );

        Self {
            lifecycle: IncidentLifecycle::new(store.clone()),
            store,
            objects,
            metrics,
            pipeline,
        }
    }

    /// Create, resolve and close one incident
    pub async fn closed_incident(&self, external_id: &str) -> Incident {
        let created = self.lifecycle.create(create_input(external_id)).await.unwrap();
        self.lifecycle
            .resolve(resolve_input(&created.incident_id))
            .await
            .unwrap();
        self.lifecycle
            .close(close_input(&created.incident_id))
            .await
            .unwrap()
    }

    pub fn server(&self, integrations: &Integrations) -> McpServer {
        let registry =
            build_default_registry(&self.lifecycle, &self.pipeline, integrations).unwrap();
        McpServer::new(
            ServerInfo {
                name: "incident-kb-mcp".to_string(),
                version: "test".to_string(),
            },
            registry,
        )
    }

    pub async fn stored(&self, incident_id: &str) -> Incident {
        self.store.get_incident(incident_id).await.unwrap().unwrap()
    }
}

pub fn caller(user_id: &str) -> InvocationContext {
    InvocationContext::new(Some(user_id.to_string()), None, Some("req-test".to_string()))
}

pub fn tool_call(id: i64, name: &str, arguments: Value) -> McpRequest {
    McpRequest::new(
        id,
        "tools/call",
        Some(json!({"name": name, "arguments": arguments})),
    )
}

/// Decode the JSON text carried in a successful tool result
pub fn tool_payload(response: &McpResponse) -> Value {
    assert!(
        !response.is_error(),
        "unexpected error response: {:?}",
        response.error
    );
    let text = response.result.as_ref().unwrap()["content"][0]["text"]
        .as_str()
        .unwrap()
        .to_string();
    serde_json::from_str(&text).unwrap()
}

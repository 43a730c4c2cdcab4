//! Capabilities that drive the corpus sync pipeline on demand

use crate::capabilities::args::{parse, to_value};
use crate::error::Result;
use crate::integrations::{CorpusIngestion, IngestionRequest};
use crate::protocol::{Capability, InvocationContext};
use crate::sync::{SyncPipeline, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

fn default_true() -> bool {
    true
}

/// Run a pass off the request path; its outcome is only logged
fn spawn_background_pass(pipeline: SyncPipeline, request_id: String) {
    tokio::spawn(async move {
        match pipeline.run().await {
            Ok(result) => tracing::info!(
                request_id = %request_id,
                synced = result.successfully_synced,
                failed = result.failed,
                "Background sync pass finished"
            ),
            Err(e) => tracing::error!(request_id = %request_id, error = %e, "Background sync pass failed"),
        }
    });
}

pub struct ForceKbSync {
    pipeline: SyncPipeline,
}

impl ForceKbSync {
    pub fn new(pipeline: SyncPipeline) -> Self {
        Self { pipeline }
    }
}

#[derive(Deserialize)]
struct ForceKbSyncArgs {
    #[serde(default = "default_true")]
    wait_for_completion: bool,
}

#[async_trait]
impl Capability for ForceKbSync {
    fn name(&self) -> &'static str {
        "force_kb_sync"
    }

    fn description(&self) -> &'static str {
        "Sync closed incidents to the knowledge-base staging store now instead of \
         waiting for the schedule."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "wait_for_completion": {
                    "type": "boolean",
                    "description": "Wait for the pass and return its result; false starts it in the background",
                    "default": true
                }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &InvocationContext) -> Result<Value> {
        let args: ForceKbSyncArgs = parse(args)?;
        tracing::info!(request_id = %ctx.request_id, wait = args.wait_for_completion, "Forcing corpus sync");

        if !args.wait_for_completion {
            spawn_background_pass(self.pipeline.clone(), ctx.request_id.clone());
            return Ok(json!({
                "status": "success",
                "message": "Sync started in the background; check the logs for progress",
                "request_id": ctx.request_id,
            }));
        }

        match self.pipeline.run().await {
            Ok(result) => Ok(json!({
                "status": "success",
                "message": format!(
                    "Sync completed: {} synced, {} failed, {} skipped",
                    result.successfully_synced, result.failed, result.skipped
                ),
                "sync_result": to_value(&result)?,
                "request_id": ctx.request_id,
            })),
            Err(e) => Ok(json!({
                "status": "error",
                "message": "Sync failed",
                "error": e.to_string(),
                "request_id": ctx.request_id,
            })),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Success,
    PartialSuccess,
    Error,
}

#[derive(Debug, Serialize)]
struct SyncAndIngestReport {
    status: WorkflowStatus,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_result: Option<SyncResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ingestion_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ingestion_status: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
}

impl SyncAndIngestReport {
    fn new(status: WorkflowStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            sync_result: None,
            ingestion_job_id: None,
            ingestion_status: None,
            errors: Vec::new(),
        }
    }
}

pub struct SyncAndIngest {
    pipeline: SyncPipeline,
    ingestion: Option<Arc<dyn CorpusIngestion>>,
}

impl SyncAndIngest {
    pub fn new(pipeline: SyncPipeline, ingestion: Option<Arc<dyn CorpusIngestion>>) -> Self {
        Self { pipeline, ingestion }
    }

    async fn workflow(&self, args: SyncAndIngestArgs, ctx: &InvocationContext) -> SyncAndIngestReport {
        let sync_result = if args.wait_for_sync {
            match self.pipeline.run().await {
                Ok(result) if result.successfully_synced == 0 => {
                    let mut report =
                        SyncAndIngestReport::new(WorkflowStatus::Success, "No new incidents to sync");
                    report.sync_result = Some(result);
                    return report;
                }
                Ok(result) => Some(result),
                Err(e) => {
                    let mut report =
                        SyncAndIngestReport::new(WorkflowStatus::Error, "Sync to the staging store failed");
                    report.errors.push(e.to_string());
                    return report;
                }
            }
        } else {
            spawn_background_pass(self.pipeline.clone(), ctx.request_id.clone());
            None
        };

        let synced_label = sync_result
            .as_ref()
            .map(|r| r.successfully_synced.to_string())
            .unwrap_or_else(|| "new".to_string());

        let Some(ingestion) = &self.ingestion else {
            let mut report = SyncAndIngestReport::new(
                WorkflowStatus::PartialSuccess,
                "Incidents synced but corpus ingestion is not configured",
            );
            report.sync_result = sync_result;
            report.errors.push("ingestion integration is not configured".to_string());
            return report;
        };

        let request = IngestionRequest {
            description: format!("Triggered after syncing {} incidents", synced_label),
            knowledge_base_id: args.knowledge_base_id,
            data_source_id: args.data_source_id,
        };

        match ingestion.start_ingestion(&request).await {
            Ok(job) => {
                let mut report = SyncAndIngestReport::new(
                    WorkflowStatus::Success,
                    format!(
                        "{} incidents synced and ingestion job {} started ({})",
                        synced_label, job.job_id, job.status
                    ),
                );
                report.sync_result = sync_result;
                report.ingestion_job_id = Some(job.job_id);
                report.ingestion_status = Some(job.status);
                report
            }
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id, error = %e, "Ingestion job failed to start");
                let mut report = SyncAndIngestReport::new(
                    WorkflowStatus::PartialSuccess,
                    "Incidents synced but the ingestion job failed to start",
                );
                report.sync_result = sync_result;
                report.errors.push(e.to_string());
                report
            }
        }
    }
}

#[derive(Deserialize)]
struct SyncAndIngestArgs {
    #[serde(default = "default_true")]
    wait_for_sync: bool,
    #[serde(default)]
    knowledge_base_id: Option<String>,
    #[serde(default)]
    data_source_id: Option<String>,
}

#[async_trait]
impl Capability for SyncAndIngest {
    fn name(&self) -> &'static str {
        "sync_and_ingest"
    }

    fn description(&self) -> &'static str {
        "Sync closed incidents to the staging store, then start a corpus ingestion job \
         so they become searchable right away."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "wait_for_sync": {
                    "type": "boolean",
                    "description": "Finish the sync pass before starting ingestion",
                    "default": true
                },
                "knowledge_base_id": {"type": "string"},
                "data_source_id": {"type": "string"}
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &InvocationContext) -> Result<Value> {
        let args: SyncAndIngestArgs = parse(args)?;
        let report = self.workflow(args, ctx).await;
        tracing::info!(request_id = %ctx.request_id, status = ?report.status, "sync_and_ingest finished");
        to_value(&report)
    }
}

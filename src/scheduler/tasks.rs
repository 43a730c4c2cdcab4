//! Scheduled tasks

use super::jobs::{Job, JobContext, JobMetadata};
use crate::sync::SyncPipeline;
use tracing::info;

pub const KB_SYNC_JOB: &str = "kb_sync";

/// One corpus sync pass
///
/// A pass that completes with per-record failures still counts as a
/// successful run; only an aborted pass fails the job.
pub async fn run_kb_sync(pipeline: &SyncPipeline, ctx: JobContext) -> Result<(), String> {
    info!(job_id = %ctx.job_id, fired_at = %ctx.fired_at, "Starting scheduled corpus sync");

    let result = pipeline.run().await.map_err(|e| e.to_string())?;

    info!(
        job_id = %ctx.job_id,
        total_found = result.total_found,
        synced = result.successfully_synced,
        failed = result.failed,
        skipped = result.skipped,
        "Scheduled corpus sync completed"
    );
    Ok(())
}

pub fn kb_sync_job(pipeline: SyncPipeline, schedule: &str) -> Job {
    let metadata = JobMetadata::new(KB_SYNC_JOB, schedule)
        .with_description("Sync closed incidents to the knowledge-base staging store");

    Job::new(metadata, move |ctx| {
        let pipeline = pipeline.clone();
        async move { run_kb_sync(&pipeline, ctx).await }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateIncidentInput, Incident, IncidentStatus, SourceSystem};
    use crate::state::{IncidentStore, InMemoryStore};
    use crate::sync::{InMemoryMetricsSink, InMemoryObjectStore, SyncSettings};
    use chrono::Utc;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_kb_sync_job_runs_a_pass() {
        let store = InMemoryStore::new();
        let mut incident = Incident::from_input(
            CreateIncidentInput {
                external_id: "RMD-7".to_string(),
                source_system: Some(SourceSystem::Remedy),
                title: "VPN drops".to_string(),
                description: "Tunnels reset hourly".to_string(),
                category: "network".to_string(),
                ..Default::default()
            },
            Utc::now(),
        );
        incident.transition_to(IncidentStatus::Closed, incident.created_at);
        store.insert_incident(&incident).await.unwrap();

        let objects = InMemoryObjectStore::new();
        let pipeline = SyncPipeline::new(
            Arc::new(store),
            Arc::new(objects.clone()),
            Arc::new(InMemoryMetricsSink::new()),
            SyncSettings::default(),
        );

        let job = kb_sync_job(pipeline, "0 0 * * * *");
        assert!(job.execute().await.is_ok());
        assert_eq!(objects.len(), 1);

        let metadata = job.get_metadata().await;
        assert_eq!(metadata.name, KB_SYNC_JOB);
        assert_eq!(metadata.success_count, 1);
    }
}

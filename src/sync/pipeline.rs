use crate::config::{CorpusConfig, SyncConfig};
use crate::error::Result;
use crate::metrics::SYNC_PASSES_TOTAL;
use crate::models::{Incident, IncidentStatus, SyncStatus};
use crate::state::{IncidentStore, IndexName, IndexQuery, SortOrder};
use crate::sync::{
    CorpusDocument, MetricDatum, MetricsSink, ObjectStore, StoredObject, DOCUMENT_CONTENT_TYPE,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Tunables for one pipeline instance
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub batch_size: usize,
    pub max_attempts: u32,
    pub key_prefix: String,
    pub metrics_namespace: String,
}

impl SyncSettings {
    pub fn from_config(sync: &SyncConfig, corpus: &CorpusConfig) -> Self {
        Self {
            batch_size: sync.batch_size,
            max_attempts: sync.max_attempts,
            key_prefix: corpus.key_prefix.clone(),
            metrics_namespace: sync.metrics_namespace.clone(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default(), &CorpusConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncErrorEntry {
    pub incident_id: String,
    pub error: String,
}

/// Outcome of one pass; `total_found == successfully_synced + failed + skipped`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub total_found: usize,
    pub successfully_synced: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<SyncErrorEntry>,
    pub duration_ms: u64,
}

impl SyncResult {
    fn metric_data(&self) -> Vec<MetricDatum> {
        vec![
            MetricDatum::count("IncidentsFound", self.total_found),
            MetricDatum::count("IncidentsSynced", self.successfully_synced),
            MetricDatum::count("SyncErrors", self.failed),
            MetricDatum::count("IncidentsSkipped", self.skipped),
            MetricDatum::millis("SyncDuration", self.duration_ms),
        ]
    }
}

enum RecordOutcome {
    Synced,
    Skipped,
    Failed(String),
}

/// Moves closed, unsynced incidents into the corpus staging store
///
/// Each pass is a single sequential batch. Retries happen across passes
/// through the persisted attempt counter, never inside one pass.
#[derive(Clone)]
pub struct SyncPipeline {
    store: Arc<dyn IncidentStore>,
    objects: Arc<dyn ObjectStore>,
    metrics: Arc<dyn MetricsSink>,
    settings: SyncSettings,
}

impl SyncPipeline {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        objects: Arc<dyn ObjectStore>,
        metrics: Arc<dyn MetricsSink>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            objects,
            metrics,
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Run one pass; fails only if the candidate fetch fails
    pub async fn run(&self) -> Result<SyncResult> {
        let start = Instant::now();
        let mut result = SyncResult::default();

        tracing::info!(
            batch_size = self.settings.batch_size,
            max_attempts = self.settings.max_attempts,
            "Starting corpus sync pass"
        );

        let outcome = self.process(&mut result).await;
        result.duration_ms = start.elapsed().as_millis() as u64;

        self.publish_metrics(&result).await;

        match outcome {
            Ok(()) => {
                SYNC_PASSES_TOTAL.with_label_values(&["completed"]).inc();
                tracing::info!(
                    total_found = result.total_found,
                    synced = result.successfully_synced,
                    failed = result.failed,
                    skipped = result.skipped,
                    duration_ms = result.duration_ms,
                    "Corpus sync pass completed"
                );
                Ok(result)
            }
            Err(e) => {
                SYNC_PASSES_TOTAL.with_label_values(&["aborted"]).inc();
                tracing::error!(error = %e, "Corpus sync pass aborted");
                Err(e)
            }
        }
    }

    async fn process(&self, result: &mut SyncResult) -> Result<()> {
        let candidates = self.fetch_candidates().await?;
        result.total_found = candidates.len();

        if candidates.is_empty() {
            tracing::info!("No incidents to sync");
            return Ok(());
        }

        for incident in &candidates {
            match self.sync_record(incident).await {
                RecordOutcome::Synced => result.successfully_synced += 1,
                RecordOutcome::Skipped => result.skipped += 1,
                RecordOutcome::Failed(error) => {
                    result.failed += 1;
                    result.errors.push(SyncErrorEntry {
                        incident_id: incident.incident_id.clone(),
                        error,
                    });
                }
            }
        }

        Ok(())
    }

    /// Oldest closed incidents not yet marked synced, up to one batch
    async fn fetch_candidates(&self) -> Result<Vec<Incident>> {
        let query = IndexQuery::new(IndexName::StatusPriority, IncidentStatus::Closed.to_string())
            .with_limit(self.settings.batch_size)
            .with_order(SortOrder::Ascending)
            .unsynced_only();

        let page = self.store.query_index(&query).await?;
        tracing::debug!(count = page.items.len(), "Fetched sync candidates");
        Ok(page.items)
    }

    async fn sync_record(&self, incident: &Incident) -> RecordOutcome {
        let attempts = incident.sync_status.attempts;
        if attempts >= self.settings.max_attempts {
            tracing::warn!(
                incident_id = %incident.incident_id,
                attempts,
                "Skipping incident, max sync attempts reached"
            );
            return RecordOutcome::Skipped;
        }

        match self.write_document(incident).await {
            Ok(key) => {
                let status = SyncStatus::synced(Utc::now());
                if let Err(e) = self
                    .store
                    .update_sync_status(&incident.incident_id, &status)
                    .await
                {
                    tracing::error!(
                        incident_id = %incident.incident_id,
                        error = %e,
                        "Failed to mark incident synced"
                    );
                }
                tracing::info!(incident_id = %incident.incident_id, key = %key, "Incident synced to corpus");
                RecordOutcome::Synced
            }
            Err(e) => {
                let message = e.to_string();
                let status = incident.sync_status.failed(message.clone(), Utc::now());
                if let Err(update_err) = self
                    .store
                    .update_sync_status(&incident.incident_id, &status)
                    .await
                {
                    tracing::error!(
                        incident_id = %incident.incident_id,
                        error = %update_err,
                        "Failed to record sync attempt"
                    );
                }
                tracing::warn!(
                    incident_id = %incident.incident_id,
                    attempts = status.attempts,
                    error = %message,
                    "Failed to sync incident"
                );
                RecordOutcome::Failed(message)
            }
        }
    }

    async fn write_document(&self, incident: &Incident) -> Result<String> {
        let document = CorpusDocument::from_incident(incident, Utc::now());
        let key = CorpusDocument::object_key(&self.settings.key_prefix, &incident.incident_id);
        let body = serde_json::to_vec_pretty(&document)?;

        self.objects
            .put_object(StoredObject {
                key: key.clone(),
                body,
                content_type: DOCUMENT_CONTENT_TYPE.to_string(),
                metadata: document.object_metadata(),
            })
            .await?;

        Ok(key)
    }

    /// Best effort; a sink failure is logged and never reaches the caller
    async fn publish_metrics(&self, result: &SyncResult) {
        if let Err(e) = self
            .metrics
            .publish(&self.settings.metrics_namespace, &result.metric_data())
            .await
        {
            tracing::error!(error = %e, "Failed to publish sync metrics");
        }
    }
}

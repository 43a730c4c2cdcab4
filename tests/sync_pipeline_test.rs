mod common;

use async_trait::async_trait;
use common::{create_input, Harness, ANALYST};
use incident_kb_mcp::{
    models::{Incident, IncidentStatus, SyncStatus},
    state::{IncidentStore, IndexPage, IndexQuery},
    sync::{
        CorpusDocument, InMemoryMetricsSink, InMemoryObjectStore, MetricDatum, MetricsSink,
        ObjectStore, StoredObject, SyncPipeline, SyncSettings, DOCUMENT_CONTENT_TYPE,
    },
    AppError, Result,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test]
async fn test_pass_moves_closed_incidents_into_corpus() {
    let harness = Harness::new();
    let closed = harness.closed_incident("KB-1").await;
    harness.lifecycle.create(create_input("KB-OPEN")).await.unwrap();

    let result = harness.pipeline.run().await.unwrap();
    assert_eq!(result.total_found, 1);
    assert_eq!(result.successfully_synced, 1);
    assert_eq!(result.failed, 0);

    let key = format!("incidents/closed/{}.json", closed.incident_id);
    assert_eq!(harness.objects.keys(), vec![key.clone()]);

    let object = harness.objects.get_object(&key).await.unwrap().unwrap();
    assert_eq!(object.content_type, DOCUMENT_CONTENT_TYPE);
    assert_eq!(object.metadata["incident-id"], closed.incident_id);
    assert_eq!(object.metadata["status"], "closed");

    let document: CorpusDocument = serde_json::from_slice(&object.body).unwrap();
    assert_eq!(document.root_cause, "Connection pool exhausted");
    assert_eq!(document.resolution, "Rolled back the payments deploy");
    assert_eq!(document.resolved_by.as_deref(), Some(ANALYST));
    assert_eq!(document.preventive_actions, vec!["Alert on pool saturation"]);

    let stored = harness.stored(&closed.incident_id).await;
    assert!(stored.sync_status.synced);
    assert!(stored.sync_status.synced_at.is_some());
    assert_eq!(stored.status, IncidentStatus::Closed);
}

#[tokio::test]
async fn test_pass_is_idempotent() {
    let harness = Harness::new();
    harness.closed_incident("KB-2").await;

    assert_eq!(harness.pipeline.run().await.unwrap().successfully_synced, 1);
    let second = harness.pipeline.run().await.unwrap();
    assert_eq!(second.total_found, 0);
    assert_eq!(second.successfully_synced, 0);
    assert_eq!(harness.objects.len(), 1);
}

#[tokio::test]
async fn test_metrics_published_per_pass() {
    let harness = Harness::new();
    harness.closed_incident("KB-3").await;
    harness.closed_incident("KB-4").await;
    harness.pipeline.run().await.unwrap();

    let published = harness.metrics.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, harness.pipeline.settings().metrics_namespace);
    assert_eq!(harness.metrics.last_value("IncidentsFound"), Some(2.0));
    assert_eq!(harness.metrics.last_value("IncidentsSynced"), Some(2.0));
    assert_eq!(harness.metrics.last_value("SyncErrors"), Some(0.0));
}

#[tokio::test]
async fn test_batch_size_bounds_one_pass() {
    let harness = Harness::with_settings(SyncSettings {
        batch_size: 2,
        ..SyncSettings::default()
    });
    let mut ids = HashSet::new();
    for i in 0..3 {
        ids.insert(harness.closed_incident(&format!("KB-B{}", i)).await.incident_id);
    }

    let first = harness.pipeline.run().await.unwrap();
    assert_eq!(first.successfully_synced, 2);
    let second = harness.pipeline.run().await.unwrap();
    assert_eq!(second.successfully_synced, 1);

    let written: HashSet<String> = harness
        .objects
        .keys()
        .into_iter()
        .map(|key| {
            key.trim_start_matches("incidents/closed/")
                .trim_end_matches(".json")
                .to_string()
        })
        .collect();
    assert_eq!(written, ids);
}

/// Rejects every write
#[derive(Default)]
struct FailingObjectStore {
    attempts: Mutex<usize>,
}

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn put_object(&self, _object: StoredObject) -> Result<()> {
        *self.attempts.lock() += 1;
        Err(AppError::ObjectStore("bucket unavailable".to_string()))
    }

    async fn get_object(&self, _key: &str) -> Result<Option<StoredObject>> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_failed_writes_retry_until_attempts_exhausted() {
    let harness = Harness::new();
    let closed = harness.closed_incident("KB-F1").await;

    let objects = Arc::new(FailingObjectStore::default());
    let metrics = InMemoryMetricsSink::new();
    let pipeline = SyncPipeline::new(
        harness.store.clone(),
        objects.clone(),
        Arc::new(metrics.clone()),
        SyncSettings {
            max_attempts: 2,
            ..SyncSettings::default()
        },
    );

    let first = pipeline.run().await.unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(first.errors[0].incident_id, closed.incident_id);
    assert!(first.errors[0].error.contains("bucket unavailable"));

    let stored = harness.stored(&closed.incident_id).await;
    assert_eq!(stored.sync_status.attempts, 1);
    assert!(!stored.sync_status.synced);
    assert!(stored.sync_status.last_error.is_some());

    assert_eq!(pipeline.run().await.unwrap().failed, 1);

    let exhausted = pipeline.run().await.unwrap();
    assert_eq!(exhausted.total_found, 1);
    assert_eq!(exhausted.skipped, 1);
    assert_eq!(exhausted.failed, 0);
    assert_eq!(*objects.attempts.lock(), 2);
    assert_eq!(harness.stored(&closed.incident_id).await.sync_status.attempts, 2);
    assert_eq!(metrics.last_value("IncidentsSkipped"), Some(1.0));
}

#[tokio::test]
async fn test_resolved_but_open_incidents_are_not_candidates() {
    let harness = Harness::new();
    let created = harness.lifecycle.create(create_input("KB-R1")).await.unwrap();
    harness
        .lifecycle
        .resolve(common::resolve_input(&created.incident_id))
        .await
        .unwrap();

    let result = harness.pipeline.run().await.unwrap();
    assert_eq!(result.total_found, 0);
    assert!(harness.objects.is_empty());
    assert!(!harness
        .store
        .get_incident(&created.incident_id)
        .await
        .unwrap()
        .unwrap()
        .sync_status
        .synced);
}

/// Fails writes for a single key and stores everything else
struct SelectiveObjectStore {
    inner: InMemoryObjectStore,
    rejected_key: String,
}

#[async_trait]
impl ObjectStore for SelectiveObjectStore {
    async fn put_object(&self, object: StoredObject) -> Result<()> {
        if object.key == self.rejected_key {
            return Err(AppError::ObjectStore("write rejected".to_string()));
        }
        self.inner.put_object(object).await
    }

    async fn get_object(&self, key: &str) -> Result<Option<StoredObject>> {
        self.inner.get_object(key).await
    }
}

struct FailingMetricsSink;

#[async_trait]
impl MetricsSink for FailingMetricsSink {
    async fn publish(&self, _namespace: &str, _data: &[MetricDatum]) -> Result<()> {
        Err(AppError::Internal("metrics endpoint down".to_string()))
    }
}

/// Serves nothing; every query fails
struct UnreachableStore;

#[async_trait]
impl IncidentStore for UnreachableStore {
    async fn insert_incident(&self, _incident: &Incident) -> Result<()> {
        Err(AppError::Database("down".to_string()))
    }

    async fn put_incident(&self, _incident: &Incident) -> Result<()> {
        Err(AppError::Database("down".to_string()))
    }

    async fn get_incident(&self, _incident_id: &str) -> Result<Option<Incident>> {
        Err(AppError::Database("down".to_string()))
    }

    async fn find_by_natural_key(&self, _natural_key: &str) -> Result<Option<Incident>> {
        Err(AppError::Database("down".to_string()))
    }

    async fn query_index(&self, _query: &IndexQuery) -> Result<IndexPage> {
        Err(AppError::Database("down".to_string()))
    }

    async fn update_sync_status(&self, _incident_id: &str, _status: &SyncStatus) -> Result<()> {
        Err(AppError::Database("down".to_string()))
    }
}

#[tokio::test]
async fn test_one_failed_write_does_not_stop_the_batch() {
    let harness = Harness::new();
    let first = harness.closed_incident("KB-M1").await;
    let rejected = harness.closed_incident("KB-M2").await;
    let third = harness.closed_incident("KB-M3").await;

    let objects = InMemoryObjectStore::new();
    let pipeline = SyncPipeline::new(
        harness.store.clone(),
        Arc::new(SelectiveObjectStore {
            inner: objects.clone(),
            rejected_key: format!("incidents/closed/{}.json", rejected.incident_id),
        }),
        Arc::new(FailingMetricsSink),
        SyncSettings::default(),
    );

    let result = pipeline.run().await.unwrap();
    assert_eq!(
        (result.total_found, result.successfully_synced, result.failed, result.skipped),
        (3, 2, 1, 0)
    );
    assert_eq!(
        result.total_found,
        result.successfully_synced + result.failed + result.skipped
    );
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].incident_id, rejected.incident_id);

    let mut expected = vec![
        format!("incidents/closed/{}.json", first.incident_id),
        format!("incidents/closed/{}.json", third.incident_id),
    ];
    expected.sort();
    assert_eq!(objects.keys(), expected);

    assert!(harness.stored(&first.incident_id).await.sync_status.synced);
    assert!(harness.stored(&third.incident_id).await.sync_status.synced);
    let failed = harness.stored(&rejected.incident_id).await;
    assert!(!failed.sync_status.synced);
    assert_eq!(failed.sync_status.attempts, 1);
}

#[tokio::test]
async fn test_metrics_sink_failure_keeps_pass_result() {
    let harness = Harness::new();
    let closed = harness.closed_incident("KB-S1").await;

    let pipeline = SyncPipeline::new(
        harness.store.clone(),
        Arc::new(harness.objects.clone()),
        Arc::new(FailingMetricsSink),
        SyncSettings::default(),
    );

    let result = pipeline.run().await.unwrap();
    assert_eq!(result.total_found, 1);
    assert_eq!(result.successfully_synced, 1);
    assert!(harness.stored(&closed.incident_id).await.sync_status.synced);
}

#[tokio::test]
async fn test_candidate_fetch_failure_is_returned_after_metrics() {
    let metrics = InMemoryMetricsSink::new();
    let objects = InMemoryObjectStore::new();
    let pipeline = SyncPipeline::new(
        Arc::new(UnreachableStore),
        Arc::new(objects.clone()),
        Arc::new(metrics.clone()),
        SyncSettings::default(),
    );

    let err = pipeline.run().await.unwrap_err();
    assert_eq!(err.error_code(), "DATABASE_ERROR");
    assert!(err.to_string().contains("down"));
    assert!(objects.is_empty());

    assert_eq!(metrics.published().len(), 1);
    assert_eq!(metrics.last_value("IncidentsFound"), Some(0.0));
}

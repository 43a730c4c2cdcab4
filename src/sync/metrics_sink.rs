use crate::error::Result;
use crate::metrics::{SYNC_LAST_PASS_DURATION_MS, SYNC_LAST_PASS_RECORDS};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricUnit {
    Count,
    Milliseconds,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDatum {
    pub name: &'static str,
    pub value: f64,
    pub unit: MetricUnit,
}

impl MetricDatum {
    pub fn count(name: &'static str, value: usize) -> Self {
        Self {
            name,
            value: value as f64,
            unit: MetricUnit::Count,
        }
    }

    pub fn millis(name: &'static str, value: u64) -> Self {
        Self {
            name,
            value: value as f64,
            unit: MetricUnit::Milliseconds,
        }
    }
}

/// Destination for aggregate sync-pass metrics
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish(&self, namespace: &str, data: &[MetricDatum]) -> Result<()>;
}

/// Publishes pass metrics as gauges in the process Prometheus registry
#[derive(Debug, Clone, Default)]
pub struct PrometheusMetricsSink;

#[async_trait]
impl MetricsSink for PrometheusMetricsSink {
    async fn publish(&self, namespace: &str, data: &[MetricDatum]) -> Result<()> {
        for datum in data {
            match datum.unit {
                MetricUnit::Milliseconds => SYNC_LAST_PASS_DURATION_MS
                    .with_label_values(&[namespace])
                    .set(datum.value),
                MetricUnit::Count => SYNC_LAST_PASS_RECORDS
                    .with_label_values(&[namespace, datum.name])
                    .set(datum.value),
            }
        }
        Ok(())
    }
}

/// Keeps every published batch; used by tests and local runs
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetricsSink {
    published: Arc<Mutex<Vec<(String, Vec<MetricDatum>)>>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, Vec<MetricDatum>)> {
        self.published.lock().clone()
    }

    /// Value of `name` in the most recent batch
    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.published
            .lock()
            .last()
            .and_then(|(_, data)| data.iter().find(|d| d.name == name).map(|d| d.value))
    }
}

#[async_trait]
impl MetricsSink for InMemoryMetricsSink {
    async fn publish(&self, namespace: &str, data: &[MetricDatum]) -> Result<()> {
        self.published
            .lock()
            .push((namespace.to_string(), data.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prometheus_sink_sets_gauges() {
        let sink = PrometheusMetricsSink;
        sink.publish(
            "Test/Sink",
            &[
                MetricDatum::count("IncidentsFound", 4),
                MetricDatum::millis("SyncDuration", 120),
            ],
        )
        .await
        .unwrap();

        assert_eq!(
            SYNC_LAST_PASS_RECORDS
                .with_label_values(&["Test/Sink", "IncidentsFound"])
                .get(),
            4.0
        );
        assert_eq!(
            SYNC_LAST_PASS_DURATION_MS
                .with_label_values(&["Test/Sink"])
                .get(),
            120.0
        );
    }

    #[tokio::test]
    async fn test_in_memory_sink_records_batches() {
        let sink = InMemoryMetricsSink::new();
        sink.publish("ns", &[MetricDatum::count("IncidentsSynced", 2)])
            .await
            .unwrap();
        assert_eq!(sink.last_value("IncidentsSynced"), Some(2.0));
        assert_eq!(sink.published()[0].0, "ns");
    }
}

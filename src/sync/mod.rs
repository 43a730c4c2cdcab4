//! Corpus synchronization
//!
//! Closed incidents are flattened into [`CorpusDocument`]s and written to a
//! staging [`ObjectStore`], from which the corpus ingests them.

mod document;
mod metrics_sink;
mod object_store;
mod pipeline;

pub use document::{CorpusDocument, DOCUMENT_CONTENT_TYPE, NOT_SPECIFIED};
pub use metrics_sink::{
    InMemoryMetricsSink, MetricDatum, MetricUnit, MetricsSink, PrometheusMetricsSink,
};
pub use object_store::{FilesystemObjectStore, InMemoryObjectStore, ObjectStore, StoredObject};
pub use pipeline::{SyncErrorEntry, SyncPipeline, SyncResult, SyncSettings};

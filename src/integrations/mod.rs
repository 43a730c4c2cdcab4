//! Outbound integrations
//!
//! Semantic retrieval, generative analysis and corpus ingestion are external
//! services. Each sits behind a narrow trait; the default implementations
//! talk JSON over HTTP through [`HttpIntegration`].

mod analysis;
mod http;
mod ingestion;
mod retrieval;

pub use analysis::{
    extract_json_object, AnalysisOutcome, HttpIncidentAnalyzer, IncidentAnalyzer, TokenUsage,
};
pub use http::HttpIntegration;
pub use ingestion::{CorpusIngestion, HttpCorpusIngestion, IngestionJob, IngestionRequest};
pub use retrieval::{HttpSemanticRetrieval, RetrievedDocument, SemanticRetrieval};

use crate::config::{IntegrationConfig, IntegrationsConfig};
use crate::error::Result;
use std::sync::Arc;

/// The set of configured collaborators; absent ones are `None`
#[derive(Clone, Default)]
pub struct Integrations {
    pub retrieval: Option<Arc<dyn SemanticRetrieval>>,
    pub analysis: Option<Arc<dyn IncidentAnalyzer>>,
    pub ingestion: Option<Arc<dyn CorpusIngestion>>,
}

impl Integrations {
    pub fn from_config(config: &IntegrationsConfig) -> Result<Self> {
        let mut integrations = Self::default();

        if let Some(cfg) = enabled(&config.retrieval) {
            integrations.retrieval = Some(Arc::new(HttpSemanticRetrieval::new(cfg)?));
        }
        if let Some(cfg) = enabled(&config.analysis) {
            integrations.analysis = Some(Arc::new(HttpIncidentAnalyzer::new(cfg)?));
        }
        if let Some(cfg) = enabled(&config.ingestion) {
            integrations.ingestion = Some(Arc::new(HttpCorpusIngestion::new(cfg)?));
        }

        tracing::info!(
            retrieval = integrations.retrieval.is_some(),
            analysis = integrations.analysis.is_some(),
            ingestion = integrations.ingestion.is_some(),
            "Integrations configured"
        );
        Ok(integrations)
    }

    pub fn with_retrieval(mut self, retrieval: Arc<dyn SemanticRetrieval>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn with_analysis(mut self, analysis: Arc<dyn IncidentAnalyzer>) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn with_ingestion(mut self, ingestion: Arc<dyn CorpusIngestion>) -> Self {
        self.ingestion = Some(ingestion);
        self
    }
}

fn enabled(config: &Option<IntegrationConfig>) -> Option<&IntegrationConfig> {
    config.as_ref().filter(|cfg| cfg.enabled)
}

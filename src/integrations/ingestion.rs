use crate::config::IntegrationConfig;
use crate::error::{AppError, Result};
use crate::integrations::HttpIntegration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestionRequest {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: String,
    pub status: String,
}

/// Asks the corpus to re-ingest the staging object store
#[async_trait]
pub trait CorpusIngestion: Send + Sync {
    async fn start_ingestion(&self, request: &IngestionRequest) -> Result<IngestionJob>;
}

#[derive(Deserialize)]
struct StartIngestionResponse {
    ingestion_job: Option<IngestionJob>,
}

/// `POST {endpoint}/ingestion-jobs`
#[derive(Clone)]
pub struct HttpCorpusIngestion {
    http: HttpIntegration,
}

impl HttpCorpusIngestion {
    pub fn new(config: &IntegrationConfig) -> Result<Self> {
        Ok(Self {
            http: HttpIntegration::new("ingestion", config)?,
        })
    }
}

#[async_trait]
impl CorpusIngestion for HttpCorpusIngestion {
    async fn start_ingestion(&self, request: &IngestionRequest) -> Result<IngestionJob> {
        let response: StartIngestionResponse =
            self.http.post_json("ingestion-jobs", request).await?;

        let job = response
            .ingestion_job
            .ok_or_else(|| AppError::integration("ingestion", "no ingestion job returned"))?;
        tracing::info!(job_id = %job.job_id, status = %job.status, "Corpus ingestion job started");
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ingestion(url: String, token_env: Option<String>) -> HttpCorpusIngestion {
        HttpCorpusIngestion::new(&IntegrationConfig {
            enabled: true,
            endpoint: url,
            auth_token_env: token_env,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_ingestion_sends_bearer_token() {
        std::env::set_var("INCIDENT_KB_TEST_INGESTION_TOKEN", "s3cret");
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ingestion-jobs")
            .match_header("authorization", "Bearer s3cret")
            .with_header("content-type", "application/json")
            .with_body(json!({"ingestion_job": {"job_id": "job-1", "status": "STARTING"}}).to_string())
            .create_async()
            .await;

        let job = ingestion(
            server.url(),
            Some("INCIDENT_KB_TEST_INGESTION_TOKEN".to_string()),
        )
        .start_ingestion(&IngestionRequest {
            description: "after sync".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        mock.assert_async().await;
        assert_eq!(job.job_id, "job-1");
        assert_eq!(job.status, "STARTING");
    }

    #[tokio::test]
    async fn test_missing_job_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ingestion-jobs")
            .with_header("content-type", "application/json")
            .with_body(json!({"ingestion_job": null}).to_string())
            .create_async()
            .await;

        let err = ingestion(server.url(), None)
            .start_ingestion(&IngestionRequest::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no ingestion job returned"));
    }
}

use crate::config::IntegrationConfig;
use crate::error::Result;
use crate::integrations::HttpIntegration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One corpus hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: Value,
}

impl RetrievedDocument {
    /// String metadata field, if present and non-empty
    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Numeric metadata field; numeric strings are accepted
    pub fn metadata_i64(&self, field: &str) -> Option<i64> {
        match self.metadata.get(field)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Semantic search over the incident corpus
#[async_trait]
pub trait SemanticRetrieval: Send + Sync {
    async fn retrieve(&self, query: &str, max_results: usize) -> Result<Vec<RetrievedDocument>>;
}

#[derive(Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_type: &'a str,
}

#[derive(Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    results: Vec<RetrievedDocument>,
}

/// `POST {endpoint}/retrieve`
#[derive(Clone)]
pub struct HttpSemanticRetrieval {
    http: HttpIntegration,
}

impl HttpSemanticRetrieval {
    pub fn new(config: &IntegrationConfig) -> Result<Self> {
        Ok(Self {
            http: HttpIntegration::new("retrieval", config)?,
        })
    }
}

#[async_trait]
impl SemanticRetrieval for HttpSemanticRetrieval {
    async fn retrieve(&self, query: &str, max_results: usize) -> Result<Vec<RetrievedDocument>> {
        tracing::debug!(max_results, "Retrieving from corpus");
        let response: RetrieveResponse = self
            .http
            .post_json(
                "retrieve",
                &RetrieveRequest {
                    query,
                    max_results,
                    search_type: "HYBRID",
                },
            )
            .await?;

        tracing::info!(results = response.results.len(), "Corpus retrieval completed");
        Ok(response.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[test]
    fn test_metadata_accessors() {
        let doc = RetrievedDocument {
            content: "x".to_string(),
            score: 0.5,
            metadata: json!({"title": "Disk full", "blank": " ", "minutes": "42", "float": 12.6}),
        };
        assert_eq!(doc.metadata_str("title"), Some("Disk full"));
        assert_eq!(doc.metadata_str("blank"), None);
        assert_eq!(doc.metadata_i64("minutes"), Some(42));
        assert_eq!(doc.metadata_i64("float"), Some(13));
        assert_eq!(doc.metadata_i64("missing"), None);
    }

    #[tokio::test]
    async fn test_retrieve_posts_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/retrieve")
            .match_body(Matcher::PartialJson(json!({"query": "db down", "max_results": 3})))
            .with_header("content-type", "application/json")
            .with_body(
                json!({"results": [{"content": "DB failover", "score": 0.91, "metadata": {"incident_id": "INC-1"}}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let retrieval = HttpSemanticRetrieval::new(&IntegrationConfig {
            enabled: true,
            endpoint: server.url(),
            auth_token_env: None,
            timeout_secs: 5,
        })
        .unwrap();

        let results = retrieval.retrieve("db down", 3).await.unwrap();
        mock.assert_async().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata_str("incident_id"), Some("INC-1"));
    }
}

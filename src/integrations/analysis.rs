use crate::config::IntegrationConfig;
use crate::error::{AppError, Result};
use crate::integrations::{HttpIntegration, RetrievedDocument};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const ANALYSIS_MAX_TOKENS: u32 = 4096;
const ANALYSIS_TEMPERATURE: f32 = 0.7;
const OPTIMIZE_MAX_TOKENS: u32 = 500;
const OPTIMIZE_TEMPERATURE: f32 = 0.3;

static JSON_OBJECT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").ok());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Diagnosis produced over a query and its retrieved neighbours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub diagnosis: String,
    pub root_cause: String,
    pub recommended_actions: Vec<String>,
    pub confidence_score: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Generative analysis service
#[async_trait]
pub trait IncidentAnalyzer: Send + Sync {
    /// Rewrite a free-text description into a better retrieval query
    async fn optimize_query(&self, query: &str) -> Result<String>;

    async fn analyze(&self, query: &str, documents: &[RetrievedDocument])
        -> Result<AnalysisOutcome>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Default)]
struct CompletionUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    content: Vec<CompletionBlock>,
    #[serde(default)]
    usage: CompletionUsage,
}

impl CompletionResponse {
    fn text(&self) -> Option<&str> {
        self.content.first().map(|block| block.text.trim())
    }
}

#[derive(Deserialize)]
struct AnalysisBody {
    #[serde(default)]
    diagnosis: String,
    #[serde(default)]
    root_cause: String,
    #[serde(default)]
    recommended_actions: Vec<String>,
    #[serde(default)]
    confidence_score: f64,
    #[serde(default)]
    reasoning: String,
}

/// Analyzer backed by a text-completion endpoint (`POST {endpoint}/complete`)
#[derive(Clone)]
pub struct HttpIncidentAnalyzer {
    http: HttpIntegration,
}

impl HttpIncidentAnalyzer {
    pub fn new(config: &IntegrationConfig) -> Result<Self> {
        Ok(Self {
            http: HttpIntegration::new("analysis", config)?,
        })
    }

    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<CompletionResponse> {
        self.http
            .post_json(
                "complete",
                &CompletionRequest {
                    prompt,
                    max_tokens,
                    temperature,
                },
            )
            .await
    }
}

#[async_trait]
impl IncidentAnalyzer for HttpIncidentAnalyzer {
    async fn optimize_query(&self, query: &str) -> Result<String> {
        let response = self
            .complete(&optimize_prompt(query), OPTIMIZE_MAX_TOKENS, OPTIMIZE_TEMPERATURE)
            .await?;

        match response.text() {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err(AppError::integration("analysis", "empty query optimization")),
        }
    }

    async fn analyze(
        &self,
        query: &str,
        documents: &[RetrievedDocument],
    ) -> Result<AnalysisOutcome> {
        let response = self
            .complete(
                &analysis_prompt(query, documents),
                ANALYSIS_MAX_TOKENS,
                ANALYSIS_TEMPERATURE,
            )
            .await?;

        let text = response.text().unwrap_or_default();
        let body: AnalysisBody = serde_json::from_str(extract_json_object(text).ok_or_else(|| {
            AppError::integration("analysis", "could not parse analysis response")
        })?)
        .map_err(|e| AppError::integration("analysis", format!("malformed analysis: {}", e)))?;

        let usage = TokenUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        };
        tracing::info!(total_tokens = usage.total_tokens, "Incident analysis completed");

        Ok(AnalysisOutcome {
            diagnosis: body.diagnosis,
            root_cause: body.root_cause,
            recommended_actions: body.recommended_actions,
            confidence_score: body.confidence_score.clamp(0.0, 1.0),
            reasoning: body.reasoning,
            usage,
        })
    }
}

/// Outermost `{ ... }` span of a completion, tolerating surrounding prose
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.as_ref()?.find(text).map(|m| m.as_str())
}

fn optimize_prompt(query: &str) -> String {
    format!(
        "You are an expert at writing search queries for technical incidents.\n\n\
         Rewrite the following incident description so it works well as a semantic \
         search query against a knowledge base of resolved incidents. Keep the key \
         technical terms, error messages and affected components. Drop greetings and \
         filler.\n\n\
         Description:\n{}\n\n\
         Reply with the rewritten query only.",
        query
    )
}

fn analysis_prompt(query: &str, documents: &[RetrievedDocument]) -> String {
    let history: Vec<String> = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let field = |name: &str| doc.metadata_str(name).unwrap_or("N/A").to_string();
            format!(
                "### Similar incident {} (similarity {:.1}%)\n\
                 ID: {}\nTitle: {}\nDescription: {}\nRoot cause: {}\nResolution: {}\n\
                 Resolution time: {} minutes\nCategory: {}\nSeverity: {}\n",
                i + 1,
                doc.score * 100.0,
                field("incident_id"),
                field("title"),
                doc.content,
                field("root_cause"),
                field("resolution"),
                doc.metadata_i64("resolution_time_minutes")
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "N/A".to_string()),
                field("category"),
                field("severity"),
            )
        })
        .collect();

    format!(
        "You are an expert in technical incident analysis. Diagnose the incident below \
         using the similar historical incidents.\n\n\
         # INCIDENT\n{}\n\n\
         # SIMILAR HISTORICAL INCIDENTS\n{}\n\
         # INSTRUCTIONS\n\
         Provide a diagnosis, the most likely root cause, a list of concrete recommended \
         actions and your confidence between 0.0 and 1.0.\n\
         Reply ONLY with a JSON object of the form:\n\
         {{\"diagnosis\": \"...\", \"root_cause\": \"...\", \"recommended_actions\": [\"...\"], \
         \"confidence_score\": 0.85, \"reasoning\": \"...\"}}",
        query,
        history.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn analyzer(url: String) -> HttpIncidentAnalyzer {
        HttpIncidentAnalyzer::new(&IntegrationConfig {
            enabled: true,
            endpoint: url,
            auth_token_env: None,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_extract_json_object() {
        let text = "Here you go:\n{\"a\": {\"b\": 1}}\nThanks";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("no json"), None);
    }

    #[test]
    fn test_analysis_prompt_lists_documents() {
        let docs = vec![RetrievedDocument {
            content: "Pool exhausted".to_string(),
            score: 0.873,
            metadata: json!({"incident_id": "INC-7", "resolution_time_minutes": 30}),
        }];
        let prompt = analysis_prompt("API slow", &docs);
        assert!(prompt.contains("similarity 87.3%"));
        assert!(prompt.contains("ID: INC-7"));
        assert!(prompt.contains("Resolution time: 30 minutes"));
        assert!(prompt.contains("Title: N/A"));
    }

    #[tokio::test]
    async fn test_analyze_parses_embedded_json() {
        let mut server = mockito::Server::new_async().await;
        let completion = "Sure.\n{\"diagnosis\": \"Pool exhaustion\", \"root_cause\": \"Leaked connections\", \
                          \"recommended_actions\": [\"Restart\", \"Patch\"], \"confidence_score\": 0.8, \
                          \"reasoning\": \"Two close matches\"}";
        let mock = server
            .mock("POST", "/complete")
            .match_body(Matcher::PartialJson(json!({"max_tokens": 4096})))
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "content": [{"type": "text", "text": completion}],
                    "usage": {"input_tokens": 120, "output_tokens": 30}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let outcome = analyzer(server.url()).analyze("API slow", &[]).await.unwrap();
        mock.assert_async().await;
        assert_eq!(outcome.root_cause, "Leaked connections");
        assert_eq!(outcome.recommended_actions.len(), 2);
        assert_eq!(outcome.usage.total_tokens, 150);
    }

    #[tokio::test]
    async fn test_analyze_without_json_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/complete")
            .with_header("content-type", "application/json")
            .with_body(json!({"content": [{"text": "I cannot help"}]}).to_string())
            .create_async()
            .await;

        let err = analyzer(server.url()).analyze("q", &[]).await.unwrap_err();
        assert_eq!(err.error_code(), "INTEGRATION_ERROR");
    }

    #[tokio::test]
    async fn test_optimize_query_returns_trimmed_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/complete")
            .with_header("content-type", "application/json")
            .with_body(json!({"content": [{"text": "  postgres connection pool timeout \n"}]}).to_string())
            .create_async()
            .await;

        let optimized = analyzer(server.url())
            .optimize_query("hi, our db seems to time out")
            .await
            .unwrap();
        assert_eq!(optimized, "postgres connection pool timeout");
    }
}

use crate::capabilities::args::parse;
use crate::error::{AppError, Result};
use crate::integrations::{IncidentAnalyzer, RetrievedDocument, SemanticRetrieval};
use crate::protocol::{Capability, InvocationContext};
use crate::sync::NOT_SPECIFIED;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_MAX_RESULTS: usize = 5;
const MAX_RESULTS_LIMIT: usize = 10;

#[derive(Deserialize)]
struct SearchSimilarArgs {
    incident_description: String,
    #[serde(default = "default_optimize")]
    optimize_query: bool,
    #[serde(default)]
    max_results: Option<usize>,
}

fn default_optimize() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct SimilarIncident {
    incident_id: String,
    title: String,
    description: String,
    similarity_score: f64,
    resolution: String,
    resolution_time_minutes: i64,
    root_cause: String,
    category: String,
    severity: String,
}

impl From<&RetrievedDocument> for SimilarIncident {
    fn from(doc: &RetrievedDocument) -> Self {
        let field = |name: &str, fallback: &str| doc.metadata_str(name).unwrap_or(fallback).to_string();
        Self {
            incident_id: field("incident_id", "N/A"),
            title: field("title", "Untitled incident"),
            description: doc.content.clone(),
            similarity_score: doc.score,
            resolution: field("resolution", NOT_SPECIFIED),
            resolution_time_minutes: doc.metadata_i64("resolution_time_minutes").unwrap_or(0),
            root_cause: field("root_cause", NOT_SPECIFIED),
            category: field("category", "N/A"),
            severity: field("severity", "N/A"),
        }
    }
}

/// Retrieval-augmented diagnosis over closed incidents
pub struct SearchSimilarIncidents {
    retrieval: Option<Arc<dyn SemanticRetrieval>>,
    analysis: Option<Arc<dyn IncidentAnalyzer>>,
}

impl SearchSimilarIncidents {
    pub fn new(
        retrieval: Option<Arc<dyn SemanticRetrieval>>,
        analysis: Option<Arc<dyn IncidentAnalyzer>>,
    ) -> Self {
        Self { retrieval, analysis }
    }

    async fn search(&self, args: SearchSimilarArgs) -> Result<Value> {
        let retrieval = self
            .retrieval
            .as_ref()
            .ok_or_else(|| AppError::Configuration("retrieval integration is not configured".to_string()))?;
        let analysis = self
            .analysis
            .as_ref()
            .ok_or_else(|| AppError::Configuration("analysis integration is not configured".to_string()))?;

        let description = args.incident_description.trim();
        if description.is_empty() {
            return Err(AppError::InvalidArgument(
                "incident_description must not be empty".to_string(),
            ));
        }
        let max_results = args
            .max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_LIMIT);

        let start = Instant::now();

        let optimized = if args.optimize_query {
            match analysis.optimize_query(description).await {
                Ok(query) => Some(query),
                Err(e) => {
                    tracing::warn!(error = %e, "Query optimization failed, using original query");
                    Some(description.to_string())
                }
            }
        } else {
            None
        };
        let query = optimized.as_deref().unwrap_or(description);

        let retrieval_start = Instant::now();
        let documents = retrieval.retrieve(query, max_results).await?;
        let kb_query_time_ms = retrieval_start.elapsed().as_millis() as u64;

        let analysis_start = Instant::now();
        let outcome = analysis.analyze(description, &documents).await?;
        let llm_analysis_time_ms = analysis_start.elapsed().as_millis() as u64;

        let similar: Vec<SimilarIncident> = documents.iter().map(SimilarIncident::from).collect();
        tracing::info!(
            results = similar.len(),
            confidence = outcome.confidence_score,
            "Similar incident search completed"
        );

        let mut response = json!({
            "diagnosis": outcome.diagnosis,
            "root_cause": outcome.root_cause,
            "recommended_actions": outcome.recommended_actions,
            "confidence_score": outcome.confidence_score,
            "similar_incidents": similar,
            "metadata": {
                "processing_time_ms": start.elapsed().as_millis() as u64,
                "kb_query_time_ms": kb_query_time_ms,
                "llm_analysis_time_ms": llm_analysis_time_ms,
                "total_tokens": outcome.usage.total_tokens,
            }
        });
        if let Some(optimized) = optimized {
            response["original_query"] = json!(description);
            response["optimized_query"] = json!(optimized);
        }
        Ok(response)
    }
}

#[async_trait]
impl Capability for SearchSimilarIncidents {
    fn name(&self) -> &'static str {
        "search_similar_incidents"
    }

    fn description(&self) -> &'static str {
        "Find closed incidents similar to a description and produce a diagnosis, \
         probable root cause and recommended actions from them."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "incident_description": {
                    "type": "string",
                    "description": "Free-text description of the current problem"
                },
                "optimize_query": {
                    "type": "boolean",
                    "description": "Rewrite the description into a search query first",
                    "default": true
                },
                "max_results": {
                    "type": "number",
                    "description": "Number of similar incidents to retrieve",
                    "default": DEFAULT_MAX_RESULTS,
                    "minimum": 1,
                    "maximum": MAX_RESULTS_LIMIT
                }
            },
            "required": ["incident_description"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &InvocationContext) -> Result<Value> {
        let args: SearchSimilarArgs = parse(args)?;
        self.search(args).await.map_err(|e| {
            AppError::Internal(format!("Failed to search similar incidents: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::{AnalysisOutcome, TokenUsage};
    use parking_lot::Mutex;

    struct FixedRetrieval {
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl SemanticRetrieval for FixedRetrieval {
        async fn retrieve(&self, query: &str, max_results: usize) -> Result<Vec<RetrievedDocument>> {
            self.queries.lock().push((query.to_string(), max_results));
            Ok(vec![RetrievedDocument {
                content: "Checkout latency after deploy".to_string(),
                score: 0.92,
                metadata: json!({"incident_id": "INC-1-AAAAAA", "title": "Checkout slow", "resolution_time_minutes": 40}),
            }])
        }
    }

    struct FixedAnalyzer {
        optimize_fails: bool,
    }

    #[async_trait]
    impl IncidentAnalyzer for FixedAnalyzer {
        async fn optimize_query(&self, query: &str) -> Result<String> {
            if self.optimize_fails {
                Err(AppError::integration("analysis", "down"))
            } else {
                Ok(format!("optimized {}", query))
            }
        }

        async fn analyze(&self, _query: &str, documents: &[RetrievedDocument]) -> Result<AnalysisOutcome> {
            Ok(AnalysisOutcome {
                diagnosis: format!("{} matches", documents.len()),
                root_cause: "Bad deploy".to_string(),
                recommended_actions: vec!["Roll back".to_string()],
                confidence_score: 0.7,
                reasoning: String::new(),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    total_tokens: 15,
                },
            })
        }
    }

    fn capability(optimize_fails: bool) -> (SearchSimilarIncidents, Arc<FixedRetrieval>) {
        let retrieval = Arc::new(FixedRetrieval {
            queries: Mutex::new(Vec::new()),
        });
        let shared: Arc<dyn SemanticRetrieval> = retrieval.clone();
        let analyzer: Arc<dyn IncidentAnalyzer> = Arc::new(FixedAnalyzer { optimize_fails });
        let capability = SearchSimilarIncidents::new(Some(shared), Some(analyzer));
        (capability, retrieval)
    }

    #[tokio::test]
    async fn test_optimized_search() {
        let (capability, retrieval) = capability(false);
        let result = capability
            .execute(
                json!({"incident_description": "checkout slow", "max_results": 50}),
                &InvocationContext::anonymous(),
            )
            .await
            .unwrap();

        assert_eq!(
            retrieval.queries.lock()[0],
            ("optimized checkout slow".to_string(), MAX_RESULTS_LIMIT)
        );
        assert_eq!(result["optimized_query"], "optimized checkout slow");
        assert_eq!(result["original_query"], "checkout slow");
        assert_eq!(result["similar_incidents"][0]["incident_id"], "INC-1-AAAAAA");
        assert_eq!(result["similar_incidents"][0]["resolution"], NOT_SPECIFIED);
        assert_eq!(result["similar_incidents"][0]["resolution_time_minutes"], 40);
        assert_eq!(result["metadata"]["total_tokens"], 15);
    }

    #[tokio::test]
    async fn test_optimization_failure_falls_back() {
        let (capability, retrieval) = capability(true);
        let result = capability
            .execute(json!({"incident_description": "checkout slow"}), &InvocationContext::anonymous())
            .await
            .unwrap();

        assert_eq!(retrieval.queries.lock()[0], ("checkout slow".to_string(), DEFAULT_MAX_RESULTS));
        assert_eq!(result["optimized_query"], "checkout slow");
    }

    #[tokio::test]
    async fn test_unoptimized_search_omits_query_fields() {
        let (capability, _) = capability(false);
        let result = capability
            .execute(
                json!({"incident_description": "checkout slow", "optimize_query": false}),
                &InvocationContext::anonymous(),
            )
            .await
            .unwrap();
        assert!(result.get("optimized_query").is_none());
        assert!(result.get("original_query").is_none());
    }

    #[tokio::test]
    async fn test_missing_integrations_fail_with_context() {
        let err = SearchSimilarIncidents::new(None, None)
            .execute(json!({"incident_description": "x"}), &InvocationContext::anonymous())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to search similar incidents"));
    }
}

use crate::models::{
    CodeChange, Environment, Incident, Priority, ResolutionType, Severity, SourceSystem,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder for resolution text missing from every source
pub const NOT_SPECIFIED: &str = "not specified";

pub const DOCUMENT_CONTENT_TYPE: &str = "application/json";

/// Flattened, search-ready view of a closed incident
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusDocument {
    // Identification
    pub incident_id: String,
    pub external_id: String,
    pub source_system: SourceSystem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    // Problem
    pub title: String,
    pub description: String,
    pub category: String,
    pub severity: Severity,
    pub priority: Priority,

    // Technical context
    pub affected_systems: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    // Resolution
    pub root_cause: String,
    pub resolution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_type: Option<ResolutionType>,
    pub resolution_steps: Vec<String>,
    pub code_changes: Vec<CodeChange>,
    pub preventive_actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_time_minutes: Option<i64>,

    pub tags: Vec<String>,
    pub synced_to_kb_at: DateTime<Utc>,
}

impl CorpusDocument {
    /// Resolution text prefers the structured resolution, then the work log
    pub fn from_incident(incident: &Incident, synced_at: DateTime<Utc>) -> Self {
        let resolution = incident.resolution.as_ref();
        let work_log = incident.work_log.as_ref();
        let solution = work_log.and_then(|log| log.solution.as_ref());

        let root_cause = first_present([
            resolution.and_then(|r| r.root_cause.as_deref()),
            work_log
                .and_then(|log| log.analysis.as_ref())
                .and_then(|a| a.root_cause.as_deref()),
        ]);
        let resolution_text = first_present([
            resolution.map(|r| r.description.as_str()),
            solution.map(|s| s.description.as_str()),
        ]);

        Self {
            incident_id: incident.incident_id.clone(),
            external_id: incident.external_id.clone(),
            source_system: incident.source_system,
            source_url: incident.source_url.clone(),
            title: incident.title.clone(),
            description: incident.description.clone(),
            category: incident.category.clone(),
            severity: incident.severity,
            priority: incident.priority,
            affected_systems: incident.affected_systems.clone(),
            environment: incident.environment,
            error_message: incident.error_message.clone(),
            root_cause,
            resolution: resolution_text,
            resolution_type: resolution.map(|r| r.resolution_type),
            resolution_steps: solution.map(|s| s.steps.clone()).unwrap_or_default(),
            code_changes: solution.map(|s| s.code_changes.clone()).unwrap_or_default(),
            preventive_actions: resolution
                .map(|r| r.preventive_actions.clone())
                .unwrap_or_default(),
            resolved_by: resolution.map(|r| r.resolved_by.clone()),
            resolved_at: resolution.map(|r| r.resolved_at).or(incident.resolved_at),
            resolution_time_minutes: incident.resolution_time_minutes(),
            tags: incident.tags.clone(),
            synced_to_kb_at: synced_at,
        }
    }

    /// `<prefix><incident_id>.json`
    pub fn object_key(prefix: &str, incident_id: &str) -> String {
        format!("{}{}.json", prefix, incident_id)
    }

    pub fn object_metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("incident-id".to_string(), self.incident_id.clone()),
            ("synced-at".to_string(), self.synced_to_kb_at.to_rfc3339()),
            ("source".to_string(), "batch-sync".to_string()),
            ("status".to_string(), "closed".to_string()),
            ("category".to_string(), self.category.clone()),
            ("severity".to_string(), self.severity.to_string()),
        ])
    }
}

fn first_present<const N: usize>(candidates: [Option<&str>; N]) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(NOT_SPECIFIED)
        .to_string()
}

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// Separator used inside derived composite keys
pub const KEY_SEPARATOR: char = '#';

pub const DEFAULT_STATUS: IncidentStatus = IncidentStatus::New;
pub const DEFAULT_PRIORITY: Priority = Priority::P3;
pub const DEFAULT_SEVERITY: Severity = Severity::Medium;

/// Represents an incident record as persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Incident {
    /// Unique identifier, assigned once at creation
    pub incident_id: String,

    // Origin system identification
    pub external_id: String,
    pub source_system: SourceSystem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    pub title: String,
    pub description: String,
    pub category: String,
    pub severity: Severity,
    pub priority: Priority,

    pub status: IncidentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub affected_systems: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Analyst working notes accumulated by progress updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_log: Option<WorkLog>,

    /// Present if and only if status is RESOLVED or CLOSED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure: Option<Closure>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,

    #[serde(default)]
    pub sync_status: SyncStatus,

    pub last_sync_at: DateTime<Utc>,

    #[serde(default)]
    pub tags: Vec<String>,

    // Derived composite keys, see `refresh_derived_keys`
    pub status_priority_created: String,
    pub priority_created: String,
    pub source_system_external_id: String,
}

impl Incident {
    /// Build a fresh record from validated creation input
    pub fn from_input(input: CreateIncidentInput, now: DateTime<Utc>) -> Self {
        let assigned_at = input.assigned_to.as_ref().map(|_| now);
        let mut incident = Self {
            incident_id: generate_incident_id(now),
            external_id: input.external_id,
            // Validation guarantees presence
            source_system: input.source_system.unwrap_or(SourceSystem::Jira),
            source_url: input.source_url,
            title: input.title,
            description: input.description,
            category: input.category,
            severity: input.severity.unwrap_or(DEFAULT_SEVERITY),
            priority: input.priority.unwrap_or(DEFAULT_PRIORITY),
            status: input.status.unwrap_or(DEFAULT_STATUS),
            assigned_to: input.assigned_to,
            assigned_at,
            team: input.team,
            created_at: now,
            updated_at: now,
            due_date: input.due_date,
            resolved_at: None,
            affected_systems: input.affected_systems,
            environment: input.environment,
            error_message: input.error_message,
            work_log: None,
            resolution: None,
            closure: None,
            attachments: input.attachments,
            sync_status: SyncStatus::default(),
            last_sync_at: now,
            tags: input.tags,
            status_priority_created: String::new(),
            priority_created: String::new(),
            source_system_external_id: String::new(),
        };
        incident.refresh_derived_keys();
        incident
    }

    /// Recompute every derived composite key from the primary attributes
    pub fn refresh_derived_keys(&mut self) {
        let created = format_timestamp(&self.created_at);
        self.status_priority_created = status_priority_created_key(self.status, self.priority, &created);
        self.priority_created = format!("{}{}{}", self.priority, KEY_SEPARATOR, created);
        self.source_system_external_id = natural_key(self.source_system, &self.external_id);
    }

    /// Set status, bump the update timestamp and recompute derived keys
    pub fn transition_to(&mut self, status: IncidentStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        self.refresh_derived_keys();
    }

    /// Check if the incident is in a terminal or resolved state
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, IncidentStatus::Resolved | IncidentStatus::Closed)
    }

    /// Minutes between creation and resolution, if resolved
    pub fn resolution_time_minutes(&self) -> Option<i64> {
        let resolved_at = self.resolved_at?;
        let elapsed = resolved_at.signed_duration_since(self.created_at);
        Some((elapsed.num_seconds() as f64 / 60.0).round() as i64)
    }
}

/// Timestamps inside composite keys sort lexicographically in time order
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn status_priority_created_key(status: IncidentStatus, priority: Priority, created: &str) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        status,
        priority,
        created,
        sep = KEY_SEPARATOR
    )
}

/// `SOURCE#EXTERNAL_ID`
pub fn natural_key(source_system: SourceSystem, external_id: &str) -> String {
    format!("{}{}{}", source_system, KEY_SEPARATOR, external_id)
}

/// `INC-<unix-millis>-<6 uppercase alphanumerics>`
pub fn generate_incident_id(now: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_uppercase();
    format!("INC-{}-{}", now.timestamp_millis(), suffix)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceSystem {
    Jira,
    Remedy,
    #[serde(rename = "SERVICENOW")]
    #[strum(serialize = "SERVICENOW")]
    ServiceNow,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    New,
    Assigned,
    InProgress,
    Resolved,
    Closed,
}

impl IncidentStatus {
    /// Promotion applied by a progress update
    pub fn after_progress(self) -> Self {
        match self {
            IncidentStatus::New | IncidentStatus::Assigned => IncidentStatus::InProgress,
            other => other,
        }
    }

    /// States a record may be created in
    pub fn is_initial(self) -> bool {
        matches!(
            self,
            IncidentStatus::New | IncidentStatus::Assigned | IncidentStatus::InProgress
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display)]
pub enum Priority {
    P1,
    P2,
    P3,
    P4,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionType {
    Fixed,
    Workaround,
    NotReproducible,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar_incidents_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeChange {
    pub file: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Solution {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub code_changes: Vec<CodeChange>,
    #[serde(default)]
    pub commands_executed: Vec<String>,
    #[serde(default)]
    pub tests_performed: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressNote {
    pub recorded_at: DateTime<Utc>,
    pub developer: String,
    pub note: String,
}

/// Accumulating record of analyst work on an incident
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkLog {
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub developer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<Solution>,
    #[serde(default)]
    pub notes: Vec<ProgressNote>,
}

impl WorkLog {
    pub fn started(developer: String, now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            last_updated: now,
            developer,
            session_id: None,
            workspace: None,
            analysis: None,
            solution: None,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resolution {
    pub resolved_by: String,
    pub resolved_at: DateTime<Utc>,
    pub resolution_type: ResolutionType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub preventive_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Closure {
    pub closed_by: String,
    pub closed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub attachment_id: String,
    pub filename: String,
    pub storage_path: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Corpus synchronization progress, tracked apart from lifecycle status
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncStatus {
    pub synced: bool,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// State after the record (re-)enters RESOLVED or CLOSED
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn synced(now: DateTime<Utc>) -> Self {
        Self {
            synced: true,
            attempts: 0,
            synced_at: Some(now),
            last_attempt: Some(now),
            last_error: None,
        }
    }

    /// Next state after a failed corpus write
    pub fn failed(&self, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            synced: false,
            attempts: self.attempts.saturating_add(1),
            synced_at: None,
            last_attempt: Some(now),
            last_error: Some(error.into()),
        }
    }
}

/// Input for creating a new incident
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateIncidentInput {
    #[serde(default)]
    #[validate(length(min = 1, message = "External ID is required"))]
    pub external_id: String,
    #[validate(required(message = "Source system is required"))]
    pub source_system: Option<SourceSystem>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub status: Option<IncidentStatus>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub affected_systems: Vec<String>,
    #[serde(default)]
    pub environment: Option<Environment>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl CreateIncidentInput {
    /// Trim the required text fields so blank values fail the length checks
    pub fn normalized(mut self) -> Self {
        self.external_id = self.external_id.trim().to_string();
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.category = self.category.trim().to_string();
        self
    }
}

/// Input for recording progress on an incident
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProgressInput {
    pub incident_id: String,
    pub developer: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub progress_notes: Option<String>,
}

/// Input for resolving an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveIncidentInput {
    pub incident_id: String,
    pub resolved_by: String,
    pub resolution_type: ResolutionType,
    pub description: String,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub solution: Option<Solution>,
    #[serde(default)]
    pub preventive_actions: Vec<String>,
}

/// Input for closing an incident
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseIncidentInput {
    pub incident_id: String,
    pub closed_by: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Lightweight projection for listings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentSummary {
    pub incident_id: String,
    pub external_id: String,
    pub title: String,
    pub status: IncidentStatus,
    pub severity: Severity,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub category: String,
}

impl From<&Incident> for IncidentSummary {
    fn from(incident: &Incident) -> Self {
        Self {
            incident_id: incident.incident_id.clone(),
            external_id: incident.external_id.clone(),
            title: incident.title.clone(),
            status: incident.status,
            severity: incident.severity,
            priority: incident.priority,
            assigned_to: incident.assigned_to.clone(),
            created_at: incident.created_at,
            due_date: incident.due_date.clone(),
            category: incident.category.clone(),
        }
    }
}

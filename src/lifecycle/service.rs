use crate::error::{AppError, Result};
use crate::metrics::LIFECYCLE_TRANSITIONS_TOTAL;
use crate::models::{
    natural_key, CloseIncidentInput, Closure, CreateIncidentInput, Incident, IncidentStatus,
    Priority, ProgressNote, Resolution, ResolveIncidentInput, SourceSystem, SyncStatus,
    UpdateProgressInput, WorkLog,
};
use crate::state::{IncidentStore, IndexName, IndexQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use validator::Validate;

/// Order in which creation violations are reported
const CREATE_FIELDS: [&str; 5] = [
    "title",
    "description",
    "external_id",
    "source_system",
    "category",
];

/// Index mode for `search`
#[derive(Debug, Clone)]
pub enum SearchFilter {
    /// Incidents assigned to one person, optionally narrowed to a status
    Assignee {
        assignee: String,
        status: Option<IncidentStatus>,
    },
    /// Incidents in one status, optionally narrowed to a priority
    Status {
        status: IncidentStatus,
        priority: Option<Priority>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl PageRequest {
    /// Page size after applying the default and the hard maximum
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IncidentPage {
    pub items: Vec<Incident>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchCreateError {
    pub index: usize,
    pub external_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchCreateResult {
    pub created: Vec<Incident>,
    pub failed: usize,
    pub errors: Vec<BatchCreateError>,
}

/// Lifecycle manager over an incident store
///
/// Read-modify-write without versioning: two concurrent mutations of the
/// same incident both succeed and the later write replaces the earlier one.
#[derive(Clone)]
pub struct IncidentLifecycle {
    store: Arc<dyn IncidentStore>,
}

impl IncidentLifecycle {
    pub fn new(store: Arc<dyn IncidentStore>) -> Self {
        Self { store }
    }

    /// Get a reference to the incident store
    pub fn store(&self) -> &Arc<dyn IncidentStore> {
        &self.store
    }

    /// Validate, check the natural key, then persist a new incident
    pub async fn create(&self, input: CreateIncidentInput) -> Result<Incident> {
        let input = input.normalized();
        validate_create(&input)?;

        // Validation guarantees presence
        let source_system = input
            .source_system
            .ok_or_else(|| AppError::Validation(vec!["Source system is required".to_string()]))?;
        let key = natural_key(source_system, &input.external_id);
        if self.store.find_by_natural_key(&key).await?.is_some() {
            return Err(AppError::Duplicate(format!(
                "Incident with external ID {} from {} already exists",
                input.external_id, source_system
            )));
        }

        let incident = Incident::from_input(input, Utc::now());
        self.store.insert_incident(&incident).await?;
        record_transition(incident.status);

        tracing::info!(
            incident_id = %incident.incident_id,
            external_id = %incident.external_id,
            source_system = %incident.source_system,
            status = %incident.status,
            "Created new incident"
        );

        Ok(incident)
    }

    /// Create each input independently; one failure never aborts the rest
    pub async fn batch_create(&self, inputs: Vec<CreateIncidentInput>) -> BatchCreateResult {
        let mut created = Vec::new();
        let mut errors = Vec::new();

        for (index, input) in inputs.into_iter().enumerate() {
            let external_id = input.external_id.clone();
            match self.create(input).await {
                Ok(incident) => created.push(incident),
                Err(e) => {
                    tracing::warn!(index, external_id = %external_id, error = %e, "Batch create entry failed");
                    errors.push(BatchCreateError {
                        index,
                        external_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        BatchCreateResult {
            created,
            failed: errors.len(),
            errors,
        }
    }

    /// Get an incident by ID
    pub async fn get(&self, incident_id: &str) -> Result<Incident> {
        self.find(incident_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Incident {} not found", incident_id)))
    }

    pub async fn find(&self, incident_id: &str) -> Result<Option<Incident>> {
        self.store.get_incident(incident_id).await
    }

    pub async fn find_by_external_id(
        &self,
        source_system: SourceSystem,
        external_id: &str,
    ) -> Result<Option<Incident>> {
        self.store
            .find_by_natural_key(&natural_key(source_system, external_id.trim()))
            .await
    }

    /// Merge analyst progress into the work log and promote to IN_PROGRESS
    pub async fn update(&self, input: UpdateProgressInput) -> Result<Incident> {
        let developer = require_text(&input.developer, "Developer is required")?;
        let mut incident = self.get(&input.incident_id).await?;
        let previous_status = incident.status;
        let now = Utc::now();

        let work_log = incident
            .work_log
            .get_or_insert_with(|| WorkLog::started(developer.clone(), now));
        work_log.developer = developer.clone();
        work_log.last_updated = now;
        if input.session_id.is_some() {
            work_log.session_id = input.session_id;
        }
        if input.workspace.is_some() {
            work_log.workspace = input.workspace;
        }
        if input.analysis.is_some() {
            work_log.analysis = input.analysis;
        }
        if let Some(note) = input.progress_notes.filter(|n| !n.trim().is_empty()) {
            work_log.notes.push(ProgressNote {
                recorded_at: now,
                developer: developer.clone(),
                note,
            });
        }

        incident.transition_to(previous_status.after_progress(), now);
        self.store.put_incident(&incident).await?;

        if incident.status != previous_status {
            record_transition(incident.status);
        }

        tracing::info!(
            incident_id = %incident.incident_id,
            developer = %developer,
            from = %previous_status,
            status = %incident.status,
            "Incident progress updated"
        );

        Ok(incident)
    }

    /// Record the resolution and move to RESOLVED
    pub async fn resolve(&self, input: ResolveIncidentInput) -> Result<Incident> {
        let resolved_by = require_text(&input.resolved_by, "Resolved by is required")?;
        let description = require_text(&input.description, "Resolution description is required")?;
        let mut incident = self.get(&input.incident_id).await?;

        if incident.is_resolved() {
            return Err(AppError::PreconditionFailed(format!(
                "Incident {} is already {}",
                incident.incident_id, incident.status
            )));
        }

        let now = Utc::now();
        incident.resolution = Some(Resolution {
            resolved_by: resolved_by.clone(),
            resolved_at: now,
            resolution_type: input.resolution_type,
            description,
            root_cause: input.root_cause.filter(|r| !r.trim().is_empty()),
            preventive_actions: input.preventive_actions,
        });
        incident.resolved_at = Some(now);

        if let Some(solution) = input.solution {
            let work_log = incident
                .work_log
                .get_or_insert_with(|| WorkLog::started(resolved_by.clone(), now));
            work_log.last_updated = now;
            work_log.solution = Some(solution);
        }

        // Any earlier corpus copy is stale from here on
        incident.sync_status = SyncStatus::pending();
        incident.transition_to(IncidentStatus::Resolved, now);
        self.store.put_incident(&incident).await?;
        record_transition(incident.status);

        tracing::info!(
            incident_id = %incident.incident_id,
            resolved_by = %resolved_by,
            resolution_type = %input.resolution_type,
            "Incident resolved"
        );

        Ok(incident)
    }

    /// Move a RESOLVED incident to CLOSED
    pub async fn close(&self, input: CloseIncidentInput) -> Result<Incident> {
        let closed_by = require_text(&input.closed_by, "Closed by is required")?;
        let mut incident = self.get(&input.incident_id).await?;

        if incident.status != IncidentStatus::Resolved {
            return Err(AppError::PreconditionFailed(format!(
                "Incident {} must be RESOLVED before closing (current status: {})",
                incident.incident_id, incident.status
            )));
        }

        let now = Utc::now();
        incident.closure = Some(Closure {
            closed_by: closed_by.clone(),
            closed_at: now,
            notes: input.notes.filter(|n| !n.trim().is_empty()),
        });
        incident.sync_status = SyncStatus::pending();
        incident.transition_to(IncidentStatus::Closed, now);
        self.store.put_incident(&incident).await?;
        record_transition(incident.status);

        tracing::info!(
            incident_id = %incident.incident_id,
            closed_by = %closed_by,
            "Incident closed"
        );

        Ok(incident)
    }

    /// Most-recently-created first, one page at a time
    pub async fn search(&self, filter: SearchFilter, page: PageRequest) -> Result<IncidentPage> {
        let query = match filter {
            SearchFilter::Assignee { assignee, status } => {
                let assignee = require_text(&assignee, "Assignee is required")?;
                let query = IndexQuery::new(IndexName::AssignedStatus, assignee);
                match status {
                    Some(status) => query.with_prefix(format!("{}#", status)),
                    None => query,
                }
            }
            SearchFilter::Status { status, priority } => {
                let query = IndexQuery::new(IndexName::StatusPriority, status.to_string());
                match priority {
                    Some(priority) => query.with_prefix(format!("{}#", priority)),
                    None => query,
                }
            }
        };

        let query = query
            .with_limit(page.effective_limit())
            .with_cursor(page.cursor);
        let result = self.store.query_index(&query).await?;

        tracing::debug!(
            index = ?query.index,
            partition = %query.partition,
            count = result.items.len(),
            "Incident search completed"
        );

        Ok(IncidentPage {
            items: result.items,
            next_cursor: result.next_cursor,
        })
    }
}

/// Every violation of the creation contract, in field order
fn validate_create(input: &CreateIncidentInput) -> Result<()> {
    let mut violations = Vec::new();

    if let Err(errors) = input.validate() {
        let fields = errors.field_errors();
        for field in CREATE_FIELDS {
            if let Some(field_errors) = fields.get(field) {
                violations.extend(
                    field_errors
                        .iter()
                        .filter_map(|e| e.message.as_ref().map(|m| m.to_string())),
                );
            }
        }
    }

    if let Some(status) = input.status {
        if !status.is_initial() {
            violations.push(format!(
                "Initial status must be NEW, ASSIGNED or IN_PROGRESS, got {}",
                status
            ));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(violations))
    }
}

fn require_text(value: &str, message: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(AppError::Validation(vec![message.to_string()]))
    } else {
        Ok(trimmed.to_string())
    }
}

fn record_transition(status: IncidentStatus) {
    LIFECYCLE_TRANSITIONS_TOTAL
        .with_label_values(&[&status.to_string()])
        .inc();
}

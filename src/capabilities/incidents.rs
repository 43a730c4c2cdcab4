//! Capabilities backed by the incident lifecycle manager

use crate::capabilities::args::{parse, require_incident_id, to_value};
use crate::error::{AppError, Result};
use crate::lifecycle::{IncidentLifecycle, IncidentPage, PageRequest, SearchFilter};
use crate::models::{
    CloseIncidentInput, CreateIncidentInput, Incident, IncidentStatus, IncidentSummary, Priority,
    ResolveIncidentInput, UpdateProgressInput,
};
use crate::protocol::{Capability, InvocationContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

const STATUS_VALUES: [&str; 5] = ["NEW", "ASSIGNED", "IN_PROGRESS", "RESOLVED", "CLOSED"];
const PRIORITY_VALUES: [&str; 4] = ["P1", "P2", "P3", "P4"];

fn page_properties() -> Value {
    json!({
        "limit": {
            "type": "number",
            "description": "Maximum number of results (default 20, max 50)",
            "minimum": 1,
            "maximum": 50
        },
        "cursor": {
            "type": "string",
            "description": "Opaque cursor returned as next_cursor by a previous call"
        }
    })
}

fn with_page_properties(mut properties: Value) -> Value {
    if let (Some(target), Value::Object(page)) = (properties.as_object_mut(), page_properties()) {
        target.extend(page);
    }
    properties
}

fn page_response(page: IncidentPage, filters: Value) -> Value {
    let summaries: Vec<IncidentSummary> = page.items.iter().map(IncidentSummary::from).collect();
    json!({
        "incidents": summaries,
        "count": summaries.len(),
        "next_cursor": page.next_cursor,
        "filters": filters,
    })
}

fn incident_response(incident: &Incident) -> Result<Value> {
    Ok(json!({
        "incident_id": incident.incident_id,
        "status": incident.status,
        "incident": to_value(incident)?,
    }))
}

pub struct CreateIncident {
    lifecycle: IncidentLifecycle,
}

impl CreateIncident {
    pub fn new(lifecycle: IncidentLifecycle) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl Capability for CreateIncident {
    fn name(&self) -> &'static str {
        "create_incident"
    }

    fn description(&self) -> &'static str {
        "Register an incident from an external ticketing system. Rejects a second \
         incident with the same source system and external id."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "external_id": {"type": "string", "description": "Ticket id in the source system"},
                "source_system": {"type": "string", "enum": ["JIRA", "REMEDY", "SERVICENOW"]},
                "source_url": {"type": "string"},
                "title": {"type": "string"},
                "description": {"type": "string"},
                "category": {"type": "string"},
                "severity": {"type": "string", "enum": ["CRITICAL", "HIGH", "MEDIUM", "LOW"]},
                "priority": {"type": "string", "enum": PRIORITY_VALUES},
                "status": {"type": "string", "enum": ["NEW", "ASSIGNED", "IN_PROGRESS"]},
                "assigned_to": {"type": "string"},
                "team": {"type": "string"},
                "due_date": {"type": "string"},
                "affected_systems": {"type": "array", "items": {"type": "string"}},
                "environment": {"type": "string", "enum": ["PRODUCTION", "STAGING", "DEVELOPMENT"]},
                "error_message": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["external_id", "source_system", "title", "description", "category"]
        })
    }

    async fn execute(&self, args: Value, ctx: &InvocationContext) -> Result<Value> {
        let input: CreateIncidentInput = parse(args)?;
        let incident = self.lifecycle.create(input).await?;
        tracing::debug!(user_id = %ctx.user_id, incident_id = %incident.incident_id, "create_incident");
        incident_response(&incident)
    }
}

pub struct GetIncident {
    lifecycle: IncidentLifecycle,
}

impl GetIncident {
    pub fn new(lifecycle: IncidentLifecycle) -> Self {
        Self { lifecycle }
    }
}

#[derive(Deserialize)]
struct GetIncidentArgs {
    incident_id: String,
}

#[async_trait]
impl Capability for GetIncident {
    fn name(&self) -> &'static str {
        "get_incident"
    }

    fn description(&self) -> &'static str {
        "Fetch the full record of one incident, including work log and resolution."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "incident_id": {"type": "string", "description": "Incident id (INC-...)"}
            },
            "required": ["incident_id"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &InvocationContext) -> Result<Value> {
        let args: GetIncidentArgs = parse(args)?;
        match self.lifecycle.find(args.incident_id.trim()).await? {
            Some(incident) => Ok(json!({"found": true, "incident": to_value(&incident)?})),
            None => Ok(json!({"found": false, "incident_id": args.incident_id})),
        }
    }
}

pub struct SearchMyIncidents {
    lifecycle: IncidentLifecycle,
}

impl SearchMyIncidents {
    pub fn new(lifecycle: IncidentLifecycle) -> Self {
        Self { lifecycle }
    }
}

#[derive(Deserialize)]
struct SearchMyIncidentsArgs {
    #[serde(default)]
    assigned_to: Option<String>,
    #[serde(default)]
    status: Option<IncidentStatus>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    cursor: Option<String>,
}

#[async_trait]
impl Capability for SearchMyIncidents {
    fn name(&self) -> &'static str {
        "search_my_incidents"
    }

    fn description(&self) -> &'static str {
        "List incidents assigned to a person, newest first. Defaults to the calling \
         user when assigned_to is omitted."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": with_page_properties(json!({
                "assigned_to": {"type": "string", "description": "Assignee email or id"},
                "status": {"type": "string", "enum": STATUS_VALUES}
            }))
        })
    }

    async fn execute(&self, args: Value, ctx: &InvocationContext) -> Result<Value> {
        let args: SearchMyIncidentsArgs = parse(args)?;
        let assignee = args
            .assigned_to
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .or_else(|| {
                (ctx.user_id != InvocationContext::ANONYMOUS).then(|| ctx.user_id.clone())
            })
            .ok_or_else(|| AppError::InvalidArgument("assigned_to is required".to_string()))?;

        let page = self
            .lifecycle
            .search(
                SearchFilter::Assignee {
                    assignee: assignee.clone(),
                    status: args.status,
                },
                PageRequest {
                    limit: args.limit,
                    cursor: args.cursor,
                },
            )
            .await?;

        let status = args
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "ALL".to_string());
        Ok(page_response(
            page,
            json!({"assigned_to": assignee, "status": status}),
        ))
    }
}

pub struct SearchIncidentsByStatus {
    lifecycle: IncidentLifecycle,
}

impl SearchIncidentsByStatus {
    pub fn new(lifecycle: IncidentLifecycle) -> Self {
        Self { lifecycle }
    }
}

#[derive(Deserialize)]
struct SearchByStatusArgs {
    status: IncidentStatus,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    cursor: Option<String>,
}

#[async_trait]
impl Capability for SearchIncidentsByStatus {
    fn name(&self) -> &'static str {
        "search_incidents_by_status"
    }

    fn description(&self) -> &'static str {
        "List incidents in a given status, optionally narrowed to one priority, newest first."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": with_page_properties(json!({
                "status": {"type": "string", "enum": STATUS_VALUES},
                "priority": {"type": "string", "enum": PRIORITY_VALUES}
            })),
            "required": ["status"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &InvocationContext) -> Result<Value> {
        let args: SearchByStatusArgs = parse(args)?;
        let page = self
            .lifecycle
            .search(
                SearchFilter::Status {
                    status: args.status,
                    priority: args.priority,
                },
                PageRequest {
                    limit: args.limit,
                    cursor: args.cursor,
                },
            )
            .await?;

        let priority = args
            .priority
            .map(|p| p.to_string())
            .unwrap_or_else(|| "ALL".to_string());
        Ok(page_response(
            page,
            json!({"status": args.status, "priority": priority}),
        ))
    }
}

pub struct UpdateIncident {
    lifecycle: IncidentLifecycle,
}

impl UpdateIncident {
    pub fn new(lifecycle: IncidentLifecycle) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl Capability for UpdateIncident {
    fn name(&self) -> &'static str {
        "update_incident"
    }

    fn description(&self) -> &'static str {
        "Record analyst progress: session, workspace, analysis and a progress note. \
         Moves NEW or ASSIGNED incidents to IN_PROGRESS."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "incident_id": {"type": "string"},
                "developer": {"type": "string", "description": "Who is working the incident"},
                "session_id": {"type": "string"},
                "workspace": {"type": "string"},
                "analysis": {
                    "type": "object",
                    "properties": {
                        "root_cause": {"type": "string"},
                        "diagnosis": {"type": "string"},
                        "similar_incidents_count": {"type": "number"}
                    }
                },
                "progress_notes": {"type": "string"}
            },
            "required": ["incident_id", "developer"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &InvocationContext) -> Result<Value> {
        let input: UpdateProgressInput = parse(args)?;
        let incident = self.lifecycle.update(input).await?;
        incident_response(&incident)
    }
}

pub struct ResolveIncident {
    lifecycle: IncidentLifecycle,
}

impl ResolveIncident {
    pub fn new(lifecycle: IncidentLifecycle) -> Self {
        Self { lifecycle }
    }
}

#[async_trait]
impl Capability for ResolveIncident {
    fn name(&self) -> &'static str {
        "resolve_incident"
    }

    fn description(&self) -> &'static str {
        "Mark an incident RESOLVED with a structured resolution and optional solution details."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "incident_id": {"type": "string"},
                "resolved_by": {"type": "string"},
                "resolution_type": {"type": "string", "enum": ["FIXED", "WORKAROUND", "NOT_REPRODUCIBLE"]},
                "description": {"type": "string"},
                "root_cause": {"type": "string"},
                "preventive_actions": {"type": "array", "items": {"type": "string"}},
                "solution": {
                    "type": "object",
                    "properties": {
                        "description": {"type": "string"},
                        "steps": {"type": "array", "items": {"type": "string"}},
                        "code_changes": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "file": {"type": "string"},
                                    "description": {"type": "string"},
                                    "diff": {"type": "string"}
                                },
                                "required": ["file", "description"]
                            }
                        },
                        "commands_executed": {"type": "array", "items": {"type": "string"}},
                        "tests_performed": {"type": "array", "items": {"type": "string"}}
                    }
                }
            },
            "required": ["incident_id", "resolved_by", "resolution_type", "description"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &InvocationContext) -> Result<Value> {
        let input: ResolveIncidentInput = parse(args)?;
        let incident = self.lifecycle.resolve(input).await?;
        let mut response = incident_response(&incident)?;
        response["resolved_at"] = to_value(&incident.resolved_at)?;
        response["resolution_time_minutes"] = to_value(&incident.resolution_time_minutes())?;
        Ok(response)
    }
}

pub struct CloseIncident {
    lifecycle: IncidentLifecycle,
}

impl CloseIncident {
    pub fn new(lifecycle: IncidentLifecycle) -> Self {
        Self { lifecycle }
    }
}

#[derive(Deserialize, Validate)]
struct CloseIncidentArgs {
    incident_id: String,
    #[validate(email(message = "closed_by must be a valid email address"))]
    closed_by: String,
    #[serde(default)]
    closure_notes: Option<String>,
}

#[async_trait]
impl Capability for CloseIncident {
    fn name(&self) -> &'static str {
        "close_incident"
    }

    fn description(&self) -> &'static str {
        "Close a RESOLVED incident. Closed incidents are picked up by the next knowledge-base sync."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "incident_id": {"type": "string", "description": "Incident id (INC-...)"},
                "closed_by": {"type": "string", "description": "Email of the person closing the incident"},
                "closure_notes": {"type": "string"}
            },
            "required": ["incident_id", "closed_by"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &InvocationContext) -> Result<Value> {
        let args: CloseIncidentArgs = parse(args)?;
        require_incident_id(&args.incident_id)?;
        args.validate()?;

        let incident = self
            .lifecycle
            .close(CloseIncidentInput {
                incident_id: args.incident_id.trim().to_string(),
                closed_by: args.closed_by,
                notes: args.closure_notes,
            })
            .await?;

        let mut response = incident_response(&incident)?;
        response["closed_at"] = to_value(&incident.closure.as_ref().map(|c| c.closed_at))?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStore;
    use std::sync::Arc;

    fn lifecycle() -> IncidentLifecycle {
        IncidentLifecycle::new(Arc::new(InMemoryStore::new()))
    }

    fn create_args(external_id: &str) -> Value {
        json!({
            "external_id": external_id,
            "source_system": "JIRA",
            "title": "Login fails",
            "description": "SSO returns 500",
            "category": "auth",
            "assigned_to": "dev@example.com"
        })
    }

    #[tokio::test]
    async fn test_get_incident_reports_absence() {
        let get = GetIncident::new(lifecycle());
        let result = get
            .execute(json!({"incident_id": "INC-0-AAAAAA"}), &InvocationContext::anonymous())
            .await
            .unwrap();
        assert_eq!(result["found"], false);
    }

    #[tokio::test]
    async fn test_search_my_incidents_defaults_to_caller() {
        let lifecycle = lifecycle();
        let ctx = InvocationContext::new(Some("dev@example.com".to_string()), None, None);
        CreateIncident::new(lifecycle.clone())
            .execute(create_args("J-1"), &ctx)
            .await
            .unwrap();

        let result = SearchMyIncidents::new(lifecycle)
            .execute(json!({}), &ctx)
            .await
            .unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["filters"]["assigned_to"], "dev@example.com");
        assert_eq!(result["filters"]["status"], "ALL");
    }

    #[tokio::test]
    async fn test_search_my_incidents_requires_someone() {
        let err = SearchMyIncidents::new(lifecycle())
            .execute(json!({}), &InvocationContext::anonymous())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_close_incident_checks_arguments() {
        let close = CloseIncident::new(lifecycle());
        let ctx = InvocationContext::anonymous();

        let bad_id = close
            .execute(json!({"incident_id": "J-1", "closed_by": "ops@example.com"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(bad_id.error_code(), "INVALID_ARGUMENT");

        let bad_email = close
            .execute(json!({"incident_id": "INC-1-AAAAAA", "closed_by": "ops"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(bad_email.error_code(), "VALIDATION_FAILED");
        assert!(bad_email.to_string().contains("closed_by must be a valid email address"));
    }

    #[tokio::test]
    async fn test_resolution_type_must_be_known() {
        let err = ResolveIncident::new(lifecycle())
            .execute(
                json!({
                    "incident_id": "INC-1-AAAAAA",
                    "resolved_by": "dev@example.com",
                    "resolution_type": "MAGIC",
                    "description": "x"
                }),
                &InvocationContext::anonymous(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }
}

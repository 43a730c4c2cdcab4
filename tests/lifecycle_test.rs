mod common;

use common::{close_input, create_input, resolve_input, Harness, ANALYST};
use incident_kb_mcp::{
    lifecycle::{PageRequest, SearchFilter},
    models::{Analysis, CreateIncidentInput, IncidentStatus, Priority, SourceSystem, UpdateProgressInput},
};
use std::collections::HashSet;

#[tokio::test]
async fn test_full_lifecycle() {
    let harness = Harness::new();
    let created = harness.lifecycle.create(create_input("PAY-1")).await.unwrap();
    assert_eq!(created.status, IncidentStatus::New);
    assert!(created.incident_id.starts_with("INC-"));
    assert_eq!(created.assigned_at, Some(created.created_at));

    let updated = harness
        .lifecycle
        .update(UpdateProgressInput {
            incident_id: created.incident_id.clone(),
            developer: ANALYST.to_string(),
            analysis: Some(Analysis {
                root_cause: Some("Pool exhaustion".to_string()),
                ..Default::default()
            }),
            progress_notes: Some("Reproduced in staging".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.status, IncidentStatus::InProgress);
    let work_log = updated.work_log.as_ref().unwrap();
    assert_eq!(work_log.notes.len(), 1);
    assert_eq!(work_log.developer, ANALYST);

    let resolved = harness
        .lifecycle
        .resolve(resolve_input(&created.incident_id))
        .await
        .unwrap();
    assert_eq!(resolved.status, IncidentStatus::Resolved);
    assert!(resolved.resolved_at.is_some());
    assert!(resolved.resolution_time_minutes().unwrap() >= 0);

    let closed = harness
        .lifecycle
        .close(close_input(&created.incident_id))
        .await
        .unwrap();
    assert_eq!(closed.status, IncidentStatus::Closed);
    assert_eq!(closed.closure.as_ref().unwrap().closed_by, ANALYST);
    assert!(!closed.sync_status.synced);

    let stored = harness.stored(&created.incident_id).await;
    assert_eq!(stored, closed);
}

#[tokio::test]
async fn test_validation_reports_every_violation_in_order() {
    let harness = Harness::new();
    let err = harness
        .lifecycle
        .create(CreateIncidentInput {
            title: "   ".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "VALIDATION_FAILED");
    assert_eq!(
        err.to_string(),
        "Validation failed: Title is required, Description is required, External ID is required, \
         Source system is required, Category is required"
    );
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_initial_status_must_be_open() {
    let harness = Harness::new();
    let err = harness
        .lifecycle
        .create(CreateIncidentInput {
            status: Some(IncidentStatus::Closed),
            ..create_input("PAY-2")
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Initial status must be NEW, ASSIGNED or IN_PROGRESS"));
}

#[tokio::test]
async fn test_natural_key_is_unique_per_source() {
    let harness = Harness::new();
    harness.lifecycle.create(create_input("PAY-3")).await.unwrap();

    let err = harness.lifecycle.create(create_input("PAY-3")).await.unwrap_err();
    assert_eq!(err.error_code(), "DUPLICATE");

    let other_source = CreateIncidentInput {
        source_system: Some(SourceSystem::Remedy),
        ..create_input("PAY-3")
    };
    harness.lifecycle.create(other_source).await.unwrap();
    assert_eq!(harness.store.len(), 2);

    let found = harness
        .lifecycle
        .find_by_external_id(SourceSystem::Remedy, " PAY-3 ")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.source_system, SourceSystem::Remedy);
}

#[tokio::test]
async fn test_transition_preconditions() {
    let harness = Harness::new();
    let created = harness.lifecycle.create(create_input("PAY-4")).await.unwrap();

    let err = harness
        .lifecycle
        .close(close_input(&created.incident_id))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PRECONDITION_FAILED");

    harness
        .lifecycle
        .resolve(resolve_input(&created.incident_id))
        .await
        .unwrap();
    let err = harness
        .lifecycle
        .resolve(resolve_input(&created.incident_id))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PRECONDITION_FAILED");

    let missing = harness.lifecycle.get("INC-0-ZZZZZZ").await.unwrap_err();
    assert_eq!(missing.error_code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_assignee_search_pages_without_overlap() {
    let harness = Harness::new();
    for i in 0..5 {
        harness
            .lifecycle
            .create(create_input(&format!("PAY-P{}", i)))
            .await
            .unwrap();
    }

    let filter = SearchFilter::Assignee {
        assignee: ANALYST.to_string(),
        status: None,
    };
    let first = harness
        .lifecycle
        .search(
            filter.clone(),
            PageRequest {
                limit: Some(2),
                cursor: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);
    assert!(first.items[0].created_at >= first.items[1].created_at);

    let mut seen: HashSet<String> = first.items.iter().map(|i| i.incident_id.clone()).collect();
    let mut cursor = first.next_cursor;
    while let Some(token) = cursor {
        let page = harness
            .lifecycle
            .search(
                filter.clone(),
                PageRequest {
                    limit: Some(2),
                    cursor: Some(token),
                },
            )
            .await
            .unwrap();
        for item in &page.items {
            assert!(seen.insert(item.incident_id.clone()));
        }
        cursor = page.next_cursor;
    }
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn test_status_search_follows_transitions() {
    let harness = Harness::new();
    let urgent = harness
        .lifecycle
        .create(CreateIncidentInput {
            priority: Some(Priority::P1),
            ..create_input("PAY-S1")
        })
        .await
        .unwrap();
    harness.lifecycle.create(create_input("PAY-S2")).await.unwrap();

    let new_p1 = harness
        .lifecycle
        .search(
            SearchFilter::Status {
                status: IncidentStatus::New,
                priority: Some(Priority::P1),
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(new_p1.items.len(), 1);
    assert_eq!(new_p1.items[0].incident_id, urgent.incident_id);

    harness
        .lifecycle
        .resolve(resolve_input(&urgent.incident_id))
        .await
        .unwrap();

    let still_new = harness
        .lifecycle
        .search(
            SearchFilter::Status {
                status: IncidentStatus::New,
                priority: None,
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(still_new.items.len(), 1);
    assert_ne!(still_new.items[0].incident_id, urgent.incident_id);
}

#[tokio::test]
async fn test_batch_create_continues_past_failures() {
    let harness = Harness::new();
    let result = harness
        .lifecycle
        .batch_create(vec![
            create_input("PAY-B1"),
            CreateIncidentInput::default(),
            create_input("PAY-B1"),
            create_input("PAY-B2"),
        ])
        .await;

    assert_eq!(result.created.len(), 2);
    assert_eq!(result.failed, 2);
    assert_eq!(result.errors[0].index, 1);
    assert_eq!(result.errors[1].index, 2);
    assert_eq!(result.errors[1].external_id, "PAY-B1");
}

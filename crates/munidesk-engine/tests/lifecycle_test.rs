//! Integration tests for the lifecycle engine.
//!
//! Exercises the transition table end to end against Postgres: the digital
//! release branch, rejection, content overlay editing, and the audit trail
//! every transition leaves behind.

use std::sync::Arc;

use munidesk_core::{
    AuditAction, AuditEntityType, AuditLogRepository, ContentOverlayRequest, DeliveryMethod,
    DocumentTypeRepository, Error, RequestStatus,
};
use munidesk_db::test_fixtures::{admin_actor, TestDataBuilder, TestDatabase};
use munidesk_engine::{
    ClaimTicketService, LifecycleEngine, NullNotifier, NullTransport, StaticArtifactGenerator,
    TransitionCommand,
};

fn engine(td: &TestDatabase) -> LifecycleEngine {
    LifecycleEngine::new(
        td.pool.clone(),
        Arc::new(StaticArtifactGenerator),
        Arc::new(NullNotifier),
    )
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_digital_release_flow() {
    let td = TestDatabase::new().await;
    let builder = TestDataBuilder::new(&td.db);
    let doc_type = builder.digital_type("cert-digital").await;
    let request = builder.request(doc_type.id, DeliveryMethod::Digital).await;
    let engine = engine(&td);
    let admin = admin_actor();

    let request = engine
        .apply(request.id, TransitionCommand::Approve, admin)
        .await
        .expect("Approve failed");
    assert_eq!(request.status, RequestStatus::Approved);

    let request = engine
        .apply(request.id, TransitionCommand::StartProcessing, admin)
        .await
        .expect("StartProcessing failed");
    assert_eq!(request.status, RequestStatus::Processing);

    let request = engine
        .apply(request.id, TransitionCommand::GenerateArtifact, admin)
        .await
        .expect("GenerateArtifact failed");
    assert_eq!(request.status, RequestStatus::Completed);
    assert!(request.artifact_ref.is_some());

    // Digital requests never enter the pickup branch.
    let tickets = ClaimTicketService::new(
        td.pool.clone(),
        Arc::new(NullTransport),
        Arc::new(NullNotifier),
    );
    let err = tickets.issue(request.id, admin, None).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    td.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_rejection_requires_reason() {
    let td = TestDatabase::new().await;
    let builder = TestDataBuilder::new(&td.db);
    let doc_type = builder.pickup_type("cert-reject").await;
    let request = builder.request(doc_type.id, DeliveryMethod::Pickup).await;
    let engine = engine(&td);
    let admin = admin_actor();

    let err = engine
        .apply(
            request.id,
            TransitionCommand::Reject {
                reason: "  ".to_string(),
            },
            admin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let rejected = engine
        .apply(
            request.id,
            TransitionCommand::Reject {
                reason: "Incomplete supporting documents".to_string(),
            },
            admin,
        )
        .await
        .expect("Reject failed");
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("Incomplete supporting documents")
    );

    // Rejected is terminal.
    let err = engine
        .apply(request.id, TransitionCommand::Approve, admin)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    td.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_approve_refused_after_type_deactivation() {
    let td = TestDatabase::new().await;
    let builder = TestDataBuilder::new(&td.db);
    let doc_type = builder.pickup_type("cert-stale").await;
    let request = builder.request(doc_type.id, DeliveryMethod::Pickup).await;

    td.db
        .document_types
        .deactivate(doc_type.id, admin_actor())
        .await
        .expect("Failed to deactivate");

    let err = engine(&td)
        .apply(request.id, TransitionCommand::Approve, admin_actor())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    td.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_mark_ready_requires_live_ticket() {
    let td = TestDatabase::new().await;
    let builder = TestDataBuilder::new(&td.db);
    let doc_type = builder.pickup_type("cert-noticket").await;
    let request = builder.request(doc_type.id, DeliveryMethod::Pickup).await;
    let engine = engine(&td);
    let admin = admin_actor();

    engine
        .apply(request.id, TransitionCommand::Approve, admin)
        .await
        .expect("Approve failed");
    engine
        .apply(request.id, TransitionCommand::StartProcessing, admin)
        .await
        .expect("StartProcessing failed");

    let err = engine
        .apply(request.id, TransitionCommand::MarkReady, admin)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // The failed attempt did not move the request.
    let current = engine.get_request(request.id).await.expect("Fetch failed");
    assert_eq!(current.status, RequestStatus::Processing);

    td.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_content_edit_only_while_processing() {
    let td = TestDatabase::new().await;
    let builder = TestDataBuilder::new(&td.db);
    let doc_type = builder.digital_type("cert-edit").await;
    let request = builder.request(doc_type.id, DeliveryMethod::Digital).await;
    let engine = engine(&td);
    let admin = admin_actor();

    // Pending: no edits.
    let err = engine
        .edit_content(
            request.id,
            ContentOverlayRequest {
                purpose: Some("Corrected purpose".to_string()),
                ..Default::default()
            },
            admin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    engine
        .apply(request.id, TransitionCommand::Approve, admin)
        .await
        .expect("Approve failed");
    engine
        .apply(request.id, TransitionCommand::StartProcessing, admin)
        .await
        .expect("StartProcessing failed");

    // Empty edit is refused.
    let err = engine
        .edit_content(request.id, ContentOverlayRequest::default(), admin)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let edited = engine
        .edit_content(
            request.id,
            ContentOverlayRequest {
                purpose: Some("Corrected purpose".to_string()),
                ..Default::default()
            },
            admin,
        )
        .await
        .expect("Edit failed");

    // The overlay wins where set; the original survives underneath.
    let effective = edited.effective_content();
    assert_eq!(effective.purpose, "Corrected purpose");
    assert_eq!(effective.civil_status.as_deref(), Some("single"));
    assert_eq!(edited.resident_input.purpose, "Scholarship assistance");
    let overlay = edited.overlay.expect("Overlay should be stored");
    assert_eq!(overlay.edited_by, admin.id);

    // A second edit merges over the first.
    let edited = engine
        .edit_content(
            request.id,
            ContentOverlayRequest {
                remarks: Some("Verified against barangay records".to_string()),
                ..Default::default()
            },
            admin,
        )
        .await
        .expect("Second edit failed");
    let effective = edited.effective_content();
    assert_eq!(effective.purpose, "Corrected purpose");
    assert_eq!(
        effective.remarks.as_deref(),
        Some("Verified against barangay records")
    );

    td.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_every_step_is_audited() {
    let td = TestDatabase::new().await;
    let builder = TestDataBuilder::new(&td.db);
    let doc_type = builder.digital_type("cert-trail").await;
    let request = builder.request(doc_type.id, DeliveryMethod::Digital).await;
    let engine = engine(&td);
    let admin = admin_actor();

    engine
        .apply(request.id, TransitionCommand::Approve, admin)
        .await
        .expect("Approve failed");
    engine
        .apply(request.id, TransitionCommand::StartProcessing, admin)
        .await
        .expect("StartProcessing failed");
    engine
        .edit_content(
            request.id,
            ContentOverlayRequest {
                remarks: Some("Checked".to_string()),
                ..Default::default()
            },
            admin,
        )
        .await
        .expect("Edit failed");
    engine
        .apply(request.id, TransitionCommand::GenerateArtifact, admin)
        .await
        .expect("GenerateArtifact failed");

    let timeline = engine
        .audit_timeline(request.id)
        .await
        .expect("Timeline failed");
    let actions: Vec<AuditAction> = timeline.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Create,
            AuditAction::Approve,
            AuditAction::StartProcessing,
            AuditAction::ContentEdit,
            AuditAction::GenerateArtifact,
        ]
    );

    // Transitions carry from/to; the content edit does not.
    let approve = &timeline[1];
    assert_eq!(approve.from_status, Some(RequestStatus::Pending));
    assert_eq!(approve.to_status, Some(RequestStatus::Approved));
    assert_eq!(approve.actor_id, Some(admin.id));
    let edit = &timeline[3];
    assert_eq!(edit.from_status, None);
    assert_eq!(edit.to_status, None);

    td.cleanup().await;
}

#[tokio::test]
#[ignore = "requires migrated database"]
async fn test_invalid_transition_leaves_no_trace() {
    let td = TestDatabase::new().await;
    let builder = TestDataBuilder::new(&td.db);
    let doc_type = builder.pickup_type("cert-skip").await;
    let request = builder.request(doc_type.id, DeliveryMethod::Pickup).await;
    let engine = engine(&td);

    // Skipping approval is not a legal edge.
    let err = engine
        .apply(request.id, TransitionCommand::StartProcessing, admin_actor())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    let current = engine.get_request(request.id).await.expect("Fetch failed");
    assert_eq!(current.status, RequestStatus::Pending);

    let timeline = td
        .db
        .audit
        .timeline(AuditEntityType::DocumentRequest, request.id)
        .await
        .expect("Timeline failed");
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].action, AuditAction::Create);

    td.cleanup().await;
}

//! The request lifecycle engine.
//!
//! Every transition is one unit of work: the request row is locked with
//! `FOR UPDATE` (serializing concurrent administrator actions against the
//! same request), the edge is validated against the transition table, the
//! status is updated, and the audit entry is written, all in the same
//! transaction. A failed audit write rolls the transition back.
//!
//! Notifications are dispatched after commit, fire-and-forget: a dropped
//! notification is logged, never a failed transition.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sqlx::{Pool, Postgres};
use tracing::{info, warn};
use uuid::Uuid;

use munidesk_core::{
    can_edit_content, next_status, notifies, Actor, ArtifactGenerator, AuditEntityType, AuditEntry,
    AuditLogRepository, ContentOverlay, ContentOverlayRequest, CreateRequestRequest,
    DocumentRequest, Error, ListRequestsRequest, ListRequestsResponse, NewAuditEntry,
    NotificationDispatcher, RequestNotification, RequestRepository, Result, TransitionAction,
};
use munidesk_db::{
    audit::record_tx,
    document_types,
    requests::{
        fetch_for_update, store_artifact_ref_tx, store_overlay_tx, store_rejection_tx,
        update_status_tx,
    },
    tickets, PgAuditLogRepository, PgRequestRepository,
};

/// An administrator command against a request's lifecycle.
///
/// Ticket issuance and redemption are commands of the
/// [`ClaimTicketService`](crate::ClaimTicketService), which needs to
/// return secrets and snapshots rather than a bare request.
#[derive(Debug, Clone)]
pub enum TransitionCommand {
    Approve,
    StartProcessing,
    /// Digital branch: invoke the artifact generator and complete.
    GenerateArtifact,
    /// Pickup branch: open the redemption window.
    MarkReady,
    /// Decline the request. The reason is mandatory.
    Reject { reason: String },
}

impl TransitionCommand {
    fn action(&self) -> TransitionAction {
        match self {
            Self::Approve => TransitionAction::Approve,
            Self::StartProcessing => TransitionAction::StartProcessing,
            Self::GenerateArtifact => TransitionAction::GenerateArtifact,
            Self::MarkReady => TransitionAction::MarkReady,
            Self::Reject { .. } => TransitionAction::Reject,
        }
    }
}

/// The request lifecycle engine.
///
/// Owns the connection pool and the external collaborators; all status
/// changes in the system go through here (or through the ticket service's
/// redemption path).
pub struct LifecycleEngine {
    pool: Pool<Postgres>,
    requests: PgRequestRepository,
    audit: PgAuditLogRepository,
    artifacts: Arc<dyn ArtifactGenerator>,
    notifications: Arc<dyn NotificationDispatcher>,
}

impl LifecycleEngine {
    pub fn new(
        pool: Pool<Postgres>,
        artifacts: Arc<dyn ArtifactGenerator>,
        notifications: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            requests: PgRequestRepository::new(pool.clone()),
            audit: PgAuditLogRepository::new(pool.clone()),
            pool,
            artifacts,
            notifications,
        }
    }

    /// Create a new request in `pending`.
    ///
    /// Validation (active type, supported delivery method, zero-fee rule
    /// for digital) and the audit entry happen inside the repository's
    /// transaction.
    pub async fn create_request(&self, req: CreateRequestRequest) -> Result<DocumentRequest> {
        self.requests.insert(req).await
    }

    /// Apply one lifecycle transition.
    pub async fn apply(
        &self,
        request_id: Uuid,
        command: TransitionCommand,
        actor: Actor,
    ) -> Result<DocumentRequest> {
        let action = command.action();

        if let TransitionCommand::Reject { reason } = &command {
            if reason.trim().is_empty() {
                return Err(Error::Validation(
                    "a rejection reason is required".to_string(),
                ));
            }
        }

        // The artifact generator is an external collaborator; invoke it
        // before taking the row lock so a slow generator never holds up
        // other administrators. The edge is revalidated under the lock.
        let artifact_ref = if matches!(command, TransitionCommand::GenerateArtifact) {
            let request = self.requests.fetch(request_id).await?;
            next_status(request.status, action, request.delivery_method)?;
            Some(self.artifacts.generate(&request).await?)
        } else {
            None
        };

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let request = fetch_for_update(&mut tx, request_id).await?;
        let from = request.status;
        let to = next_status(from, action, request.delivery_method)?;

        let mut entry = NewAuditEntry::transition(request_id, actor, audit_action(action), from, to);

        match &command {
            TransitionCommand::Approve => {
                let document_type = document_types::get_tx(&mut tx, request.document_type_id)
                    .await?
                    .ok_or(Error::DocumentTypeNotFound(request.document_type_id))?;
                if !document_type.is_active {
                    tx.rollback().await.map_err(Error::Database)?;
                    return Err(Error::Validation(format!(
                        "document type {} is no longer active",
                        document_type.code
                    )));
                }
            }
            TransitionCommand::MarkReady => {
                let ticket = tickets::active_for_request_tx(&mut tx, request_id).await?;
                let live = ticket.map(|t| t.is_active(Utc::now())).unwrap_or(false);
                if !live {
                    tx.rollback().await.map_err(Error::Database)?;
                    return Err(Error::Validation(
                        "an unredeemed claim ticket is required before marking ready".to_string(),
                    ));
                }
            }
            TransitionCommand::GenerateArtifact => {
                // artifact_ref was produced above; record it with the entry.
                if let Some(artifact_ref) = &artifact_ref {
                    store_artifact_ref_tx(&mut tx, request_id, artifact_ref).await?;
                    entry = entry.with_metadata(json!({ "artifact_ref": artifact_ref }));
                }
            }
            TransitionCommand::Reject { reason } => {
                store_rejection_tx(&mut tx, request_id, reason.trim()).await?;
                entry = entry.with_notes(reason.trim());
            }
            TransitionCommand::StartProcessing => {}
        }

        update_status_tx(&mut tx, request_id, to).await?;
        record_tx(&mut tx, entry).await?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "engine",
            component = "lifecycle",
            op = "apply",
            request_id = %request_id,
            action = %action,
            from_status = %from,
            to_status = %to,
            actor_id = %actor.id,
            "Transition applied"
        );

        let updated = self.requests.fetch(request_id).await?;
        if notifies(action) {
            self.dispatch_notification(&updated);
        }
        Ok(updated)
    }

    /// Store an administrator content edit as an overlay.
    ///
    /// Legal only while the request is processing. Not a transition: the
    /// audit log records a `content_edit` action with no status change,
    /// and the resident's original submission survives underneath.
    pub async fn edit_content(
        &self,
        request_id: Uuid,
        edit: ContentOverlayRequest,
        actor: Actor,
    ) -> Result<DocumentRequest> {
        if edit.purpose.is_none() && edit.civil_status.is_none() && edit.remarks.is_none() {
            return Err(Error::Validation("no content fields to edit".to_string()));
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let request = fetch_for_update(&mut tx, request_id).await?;

        if !can_edit_content(request.status) {
            tx.rollback().await.map_err(Error::Database)?;
            return Err(Error::Validation(format!(
                "content can only be edited while processing, not {}",
                request.status
            )));
        }

        // Merge over any previous overlay; unset fields keep their value.
        let previous = request.overlay.clone();
        let overlay = ContentOverlay {
            purpose: edit
                .purpose
                .clone()
                .or_else(|| previous.as_ref().and_then(|o| o.purpose.clone())),
            civil_status: edit
                .civil_status
                .clone()
                .or_else(|| previous.as_ref().and_then(|o| o.civil_status.clone())),
            remarks: edit
                .remarks
                .clone()
                .or_else(|| previous.as_ref().and_then(|o| o.remarks.clone())),
            edited_by: actor.id,
            edited_at: Utc::now(),
        };

        store_overlay_tx(&mut tx, request_id, &overlay).await?;
        record_tx(
            &mut tx,
            NewAuditEntry::action(
                AuditEntityType::DocumentRequest,
                request_id,
                actor,
                munidesk_core::AuditAction::ContentEdit,
            )
            .with_metadata(json!({
                "old_values": previous,
                "new_values": overlay,
            })),
        )
        .await?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "engine",
            component = "lifecycle",
            op = "edit_content",
            request_id = %request_id,
            actor_id = %actor.id,
            "Content overlay stored"
        );

        self.requests.fetch(request_id).await
    }

    // ─── Operator-facing query surface ─────────────────────────────────────

    pub async fn get_request(&self, id: Uuid) -> Result<DocumentRequest> {
        self.requests.fetch(id).await
    }

    pub async fn get_request_by_number(&self, number: &str) -> Result<DocumentRequest> {
        self.requests.fetch_by_number(number).await
    }

    pub async fn list_requests(&self, req: ListRequestsRequest) -> Result<ListRequestsResponse> {
        self.requests.list(req).await
    }

    /// Audit timeline for a request, oldest first.
    pub async fn audit_timeline(&self, request_id: Uuid) -> Result<Vec<AuditEntry>> {
        self.audit
            .timeline(AuditEntityType::DocumentRequest, request_id)
            .await
    }

    /// Post-commit, fire-and-forget notification dispatch.
    pub(crate) fn dispatch_notification(&self, request: &DocumentRequest) {
        let dispatcher = self.notifications.clone();
        let event = RequestNotification {
            request_id: request.id,
            request_number: request.request_number.clone(),
            requester_id: request.requester_id,
            status: request.status,
            occurred_at: Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(e) = dispatcher.notify(event.clone()).await {
                warn!(
                    subsystem = "engine",
                    component = "lifecycle",
                    op = "notify",
                    request_id = %event.request_id,
                    to_status = %event.status,
                    error = %e,
                    "Notification dispatch failed"
                );
            }
        });
    }
}

/// Map a transition action to its audit action.
fn audit_action(action: TransitionAction) -> munidesk_core::AuditAction {
    use munidesk_core::AuditAction;
    match action {
        TransitionAction::Approve => AuditAction::Approve,
        TransitionAction::StartProcessing => AuditAction::StartProcessing,
        TransitionAction::GenerateArtifact => AuditAction::GenerateArtifact,
        TransitionAction::IssueTicket => AuditAction::IssueTicket,
        TransitionAction::MarkReady => AuditAction::MarkReady,
        TransitionAction::RedeemTicket => AuditAction::RedeemTicket,
        TransitionAction::Reject => AuditAction::Reject,
    }
}

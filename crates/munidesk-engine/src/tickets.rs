//! The claim ticket service.
//!
//! Issues bearer credentials proving the right to collect a ready pickup
//! request, verifies them at the counter, and consumes them exactly once
//! at redemption. Raw secrets leave this module exactly once, at
//! issuance; verification failures are deliberately uninformative to the
//! caller and fully informative in the audit log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{Pool, Postgres};
use tracing::{info, warn};
use uuid::Uuid;

use munidesk_core::{
    next_status, Actor, ActorRole, AuditAction, AuditEntityType, AuditLogRepository,
    ClaimCredential, ClaimTicket, ClaimTicketRepository, DocumentRequest, DocumentTypeRepository,
    Error, IssuedTicket, NewAuditEntry, NotificationDispatcher, RequestRepository, RequestSnapshot,
    RequestStatus, Result, TicketTransport, TransitionAction,
};
use munidesk_db::{
    audit::record_tx,
    requests::{fetch_for_update, link_ticket_tx, update_status_tx},
    tickets::{
        active_by_token_hash, active_for_request_tx, generate_code, generate_token, hash_secret,
        insert_tx, mark_redeemed_tx, record_failed_attempt, secret_matches, supersede_active_tx,
    },
    PgAuditLogRepository, PgClaimTicketRepository, PgDocumentTypeRepository, PgRequestRepository,
};

/// Why a verification failed. Recorded in the audit log; never shown to
/// the caller, who only ever sees [`Error::InvalidClaim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerifyFailure {
    NoActiveTicket,
    Expired,
    LockedOut,
    CredentialMismatch,
}

impl VerifyFailure {
    fn as_str(self) -> &'static str {
        match self {
            Self::NoActiveTicket => "no_active_ticket",
            Self::Expired => "expired",
            Self::LockedOut => "locked_out",
            Self::CredentialMismatch => "credential_mismatch",
        }
    }
}

/// Issues, verifies, and redeems claim tickets.
pub struct ClaimTicketService {
    pool: Pool<Postgres>,
    requests: PgRequestRepository,
    document_types: PgDocumentTypeRepository,
    tickets: PgClaimTicketRepository,
    audit: PgAuditLogRepository,
    transport: Arc<dyn TicketTransport>,
    notifications: Arc<dyn NotificationDispatcher>,
}

impl ClaimTicketService {
    pub fn new(
        pool: Pool<Postgres>,
        transport: Arc<dyn TicketTransport>,
        notifications: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            requests: PgRequestRepository::new(pool.clone()),
            document_types: PgDocumentTypeRepository::new(pool.clone()),
            tickets: PgClaimTicketRepository::new(pool.clone()),
            audit: PgAuditLogRepository::new(pool.clone()),
            pool,
            transport,
            notifications,
        }
    }

    /// Issue a fresh claim ticket for a pickup request in processing.
    ///
    /// Any live ticket is superseded first; its token and code become
    /// permanently unusable. The returned [`IssuedTicket`] is the only
    /// time the raw secrets are ever available; they are handed to the
    /// ticket transport and then forgotten.
    pub async fn issue(
        &self,
        request_id: Uuid,
        actor: Actor,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IssuedTicket> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let request = fetch_for_update(&mut tx, request_id).await?;

        // IssueTicket is a self-edge on processing, pickup only.
        next_status(
            request.status,
            TransitionAction::IssueTicket,
            request.delivery_method,
        )?;

        let superseded = supersede_active_tx(&mut tx, request_id).await?;
        let token = generate_token();
        let code = generate_code();
        let ticket = insert_tx(&mut tx, request_id, &token, &code, expires_at).await?;
        link_ticket_tx(&mut tx, request_id, ticket.id).await?;

        record_tx(
            &mut tx,
            NewAuditEntry::action(
                AuditEntityType::DocumentRequest,
                request_id,
                actor,
                AuditAction::IssueTicket,
            )
            .with_metadata(json!({
                "ticket_id": ticket.id,
                "code_masked": ticket.code_masked,
                "expires_at": expires_at,
                "superseded_ticket_id": superseded,
            })),
        )
        .await?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "tickets",
            component = "issue",
            op = "issue",
            request_id = %request_id,
            ticket_id = %ticket.id,
            reissue = superseded.is_some(),
            "Claim ticket issued"
        );

        // Hand the secrets to the transport exactly once. A transport
        // failure is logged; the resident can still fall back to the
        // issuance response carried to them by the administrator.
        if let Err(e) = self.transport.deliver(&request, &token, &code).await {
            warn!(
                subsystem = "tickets",
                component = "issue",
                op = "deliver",
                request_id = %request_id,
                error = %e,
                "Ticket transport failed"
            );
        }

        Ok(IssuedTicket {
            ticket,
            token,
            code,
        })
    }

    /// Verify a presented credential without consuming it.
    ///
    /// On success returns a read-only snapshot for the verifier to
    /// visually confirm; the state machine does not move. Redemption is a
    /// separate, explicit act. Every failure collapses to
    /// [`Error::InvalidClaim`]: the caller learns nothing about whether
    /// the request exists, the ticket expired, or the credential was
    /// simply wrong.
    pub async fn verify(&self, credential: &ClaimCredential) -> Result<RequestSnapshot> {
        match credential {
            ClaimCredential::Token { token } => {
                let ticket = active_by_token_hash(&self.pool, &hash_secret(token)).await?;
                let Some(ticket) = ticket else {
                    warn!(
                        subsystem = "tickets",
                        component = "verify",
                        op = "verify",
                        "Token verification failed: no matching live ticket"
                    );
                    return Err(Error::InvalidClaim);
                };
                let hash = ticket.token_hash.clone();
                self.check_ticket(&ticket, token, &hash).await
            }
            ClaimCredential::Code { code, request_id } => {
                let ticket = self.tickets.active_for_request(*request_id).await?;
                let Some(ticket) = ticket else {
                    self.audit_verify_failure(*request_id, None, VerifyFailure::NoActiveTicket)
                        .await?;
                    return Err(Error::InvalidClaim);
                };
                let hash = ticket.code_hash.clone();
                self.check_ticket(&ticket, code, &hash).await
            }
        }
    }

    /// Shared verification tail: lockout, expiry, constant-time match.
    async fn check_ticket(
        &self,
        ticket: &ClaimTicket,
        presented: &str,
        stored_hash: &str,
    ) -> Result<RequestSnapshot> {
        let now = Utc::now();

        if ticket.is_locked(now) {
            self.audit_verify_failure(ticket.request_id, Some(ticket.id), VerifyFailure::LockedOut)
                .await?;
            return Err(Error::InvalidClaim);
        }
        if !ticket.is_active(now) {
            self.audit_verify_failure(ticket.request_id, Some(ticket.id), VerifyFailure::Expired)
                .await?;
            return Err(Error::InvalidClaim);
        }
        if !secret_matches(presented, stored_hash) {
            let attempts = record_failed_attempt(&self.pool, ticket.id).await?;
            self.audit_verify_failure(
                ticket.request_id,
                Some(ticket.id),
                VerifyFailure::CredentialMismatch,
            )
            .await?;
            warn!(
                subsystem = "tickets",
                component = "verify",
                op = "verify",
                request_id = %ticket.request_id,
                ticket_id = %ticket.id,
                failed_attempts = attempts,
                "Credential mismatch"
            );
            return Err(Error::InvalidClaim);
        }

        let request = self.requests.fetch(ticket.request_id).await?;
        let snapshot = self.snapshot(&request).await?;

        self.audit
            .record(
                NewAuditEntry {
                    entity_type: AuditEntityType::DocumentRequest,
                    entity_id: request.id,
                    actor_id: None,
                    actor_role: ActorRole::System,
                    action: AuditAction::VerifyTicket,
                    from_status: None,
                    to_status: None,
                    notes: None,
                    metadata: json!({ "ticket_id": ticket.id }),
                },
            )
            .await?;

        Ok(snapshot)
    }

    /// Consume the ticket and move the request to `picked_up`.
    ///
    /// Exactly-once: the ticket row is consumed with a conditional update
    /// under the request's row lock, so of any number of concurrent
    /// redemption attempts exactly one succeeds and the rest fail with
    /// [`Error::AlreadyRedeemed`].
    pub async fn redeem(&self, request_id: Uuid, actor: Actor) -> Result<DocumentRequest> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let request = fetch_for_update(&mut tx, request_id).await?;
        let from = request.status;

        if from == RequestStatus::PickedUp {
            tx.rollback().await.map_err(Error::Database)?;
            return Err(Error::AlreadyRedeemed(request_id));
        }
        let to = next_status(from, TransitionAction::RedeemTicket, request.delivery_method)?;

        let ticket = active_for_request_tx(&mut tx, request_id).await?;
        let Some(ticket) = ticket else {
            tx.rollback().await.map_err(Error::Database)?;
            return Err(Error::AlreadyRedeemed(request_id));
        };
        if !ticket.is_active(Utc::now()) {
            tx.rollback().await.map_err(Error::Database)?;
            return Err(Error::InvalidClaim);
        }

        if !mark_redeemed_tx(&mut tx, ticket.id).await? {
            tx.rollback().await.map_err(Error::Database)?;
            return Err(Error::AlreadyRedeemed(request_id));
        }

        update_status_tx(&mut tx, request_id, to).await?;
        record_tx(
            &mut tx,
            NewAuditEntry::transition(request_id, actor, AuditAction::RedeemTicket, from, to)
                .with_metadata(json!({ "ticket_id": ticket.id })),
        )
        .await?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "tickets",
            component = "redeem",
            op = "redeem",
            request_id = %request_id,
            ticket_id = %ticket.id,
            from_status = %from,
            to_status = %to,
            actor_id = %actor.id,
            "Claim ticket redeemed"
        );

        let updated = self.requests.fetch(request_id).await?;
        self.notify(&updated);
        Ok(updated)
    }

    /// Masked view of the live ticket for owner-facing display. Secrets
    /// are not retrievable here; only `code_masked` survives issuance.
    pub async fn active_ticket(&self, request_id: Uuid) -> Result<Option<ClaimTicket>> {
        self.tickets.active_for_request(request_id).await
    }

    async fn snapshot(&self, request: &DocumentRequest) -> Result<RequestSnapshot> {
        let document_type = self
            .document_types
            .get(request.document_type_id)
            .await?
            .ok_or(Error::DocumentTypeNotFound(request.document_type_id))?;
        Ok(RequestSnapshot {
            request_id: request.id,
            request_number: request.request_number.clone(),
            requester_id: request.requester_id,
            document_type_code: document_type.code,
            document_type_name: document_type.name,
            status: request.status,
            delivery_method: request.delivery_method,
        })
    }

    /// Audit a verification failure with its real cause. This is the only
    /// place the cause is recorded; the caller sees `InvalidClaim` alone.
    async fn audit_verify_failure(
        &self,
        request_id: Uuid,
        ticket_id: Option<Uuid>,
        failure: VerifyFailure,
    ) -> Result<()> {
        self.audit
            .record(NewAuditEntry {
                entity_type: AuditEntityType::DocumentRequest,
                entity_id: request_id,
                actor_id: None,
                actor_role: ActorRole::System,
                action: AuditAction::VerifyFailed,
                from_status: None,
                to_status: None,
                notes: None,
                metadata: json!({
                    "ticket_id": ticket_id,
                    "reason": failure.as_str(),
                }),
            })
            .await?;
        Ok(())
    }

    fn notify(&self, request: &DocumentRequest) {
        let dispatcher = self.notifications.clone();
        let event = munidesk_core::RequestNotification {
            request_id: request.id,
            request_number: request.request_number.clone(),
            requester_id: request.requester_id,
            status: request.status,
            occurred_at: Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(e) = dispatcher.notify(event.clone()).await {
                warn!(
                    subsystem = "tickets",
                    component = "redeem",
                    op = "notify",
                    request_id = %event.request_id,
                    error = %e,
                    "Notification dispatch failed"
                );
            }
        });
    }
}

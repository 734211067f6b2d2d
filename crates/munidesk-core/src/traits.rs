//! Core traits for munidesk abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy: the persistence repositories (implemented over Postgres in
//! `munidesk-db`) and the external collaborators the engine delegates to
//! (identity, artifact generation, notification, ticket transport).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::BigDecimal;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// DOCUMENT TYPE REGISTRY
// =============================================================================

/// Request for creating a document type.
#[derive(Debug, Clone)]
pub struct CreateDocumentTypeRequest {
    pub code: String,
    pub name: String,
    pub authority_level: AuthorityLevel,
    pub fee: BigDecimal,
    pub processing_days: i32,
    pub supports_digital: bool,
    pub supports_physical: bool,
    /// Loosely-structured requirements value; normalized at the boundary.
    pub requirements: JsonValue,
}

/// Request for updating a document type. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateDocumentTypeRequest {
    pub name: Option<String>,
    pub fee: Option<BigDecimal>,
    pub processing_days: Option<i32>,
    pub supports_digital: Option<bool>,
    pub supports_physical: Option<bool>,
    pub requirements: Option<JsonValue>,
    pub is_active: Option<bool>,
}

/// Registry of document type configuration.
///
/// Deactivation only blocks new request creation; requests already in
/// flight keep their snapshotted rules.
#[async_trait]
pub trait DocumentTypeRepository: Send + Sync {
    async fn create(&self, req: CreateDocumentTypeRequest, actor: Actor) -> Result<DocumentType>;

    async fn update(
        &self,
        id: Uuid,
        req: UpdateDocumentTypeRequest,
        actor: Actor,
    ) -> Result<DocumentType>;

    async fn get(&self, id: Uuid) -> Result<Option<DocumentType>>;

    async fn get_by_code(&self, code: &str) -> Result<Option<DocumentType>>;

    /// List document types, active only unless `include_inactive`.
    async fn list(&self, include_inactive: bool) -> Result<Vec<DocumentType>>;

    /// Soft delete: inactive types reject new requests but leave in-flight
    /// requests untouched.
    async fn deactivate(&self, id: Uuid, actor: Actor) -> Result<()>;

    /// Hard delete. Refused with a validation error while any request
    /// still references the type.
    async fn delete(&self, id: Uuid) -> Result<()>;

    /// Number of requests referencing this type.
    async fn reference_count(&self, id: Uuid) -> Result<i64>;
}

// =============================================================================
// DOCUMENT REQUESTS
// =============================================================================

/// Request for creating a document request.
#[derive(Debug, Clone)]
pub struct CreateRequestRequest {
    pub requester_id: Uuid,
    pub document_type_id: Uuid,
    pub delivery_method: DeliveryMethod,
    pub priority: RequestPriority,
    pub resident_input: ResidentInput,
}

/// Filters for listing requests. All filters are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct ListRequestsRequest {
    pub status: Option<RequestStatus>,
    pub delivery_method: Option<DeliveryMethod>,
    pub document_type_id: Option<Uuid>,
    pub requester_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Response for listing requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRequestsResponse {
    pub requests: Vec<DocumentRequest>,
    pub total: i64,
}

/// Administrator content edits, stored as an overlay over the resident's
/// original submission.
#[derive(Debug, Clone, Default)]
pub struct ContentOverlayRequest {
    pub purpose: Option<String>,
    pub civil_status: Option<String>,
    pub remarks: Option<String>,
}

/// Repository for document request rows.
///
/// Status mutation is deliberately absent here: only the lifecycle engine
/// moves a request along the transition table, inside its own transaction.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// Insert a new request in `pending`, assigning the human-facing
    /// request number and snapshotting the type's rules.
    async fn insert(&self, req: CreateRequestRequest) -> Result<DocumentRequest>;

    async fn fetch(&self, id: Uuid) -> Result<DocumentRequest>;

    async fn fetch_by_number(&self, request_number: &str) -> Result<DocumentRequest>;

    async fn list(&self, req: ListRequestsRequest) -> Result<ListRequestsResponse>;
}

// =============================================================================
// CLAIM TICKETS
// =============================================================================

/// Read access to claim tickets. Issuance, verification and redemption
/// live in the engine's `ClaimTicketService`, which needs transactional
/// control beyond a repository surface.
#[async_trait]
pub trait ClaimTicketRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<ClaimTicket>>;

    /// The at-most-one unredeemed, unsuperseded ticket for a request.
    async fn active_for_request(&self, request_id: Uuid) -> Result<Option<ClaimTicket>>;
}

// =============================================================================
// AUDIT LOG
// =============================================================================

/// A new audit record, before the id and timestamp are assigned.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub entity_type: AuditEntityType,
    pub entity_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub actor_role: ActorRole,
    pub action: AuditAction,
    pub from_status: Option<RequestStatus>,
    pub to_status: Option<RequestStatus>,
    pub notes: Option<String>,
    pub metadata: JsonValue,
}

impl NewAuditEntry {
    /// A transition entry for a document request.
    pub fn transition(
        request_id: Uuid,
        actor: Actor,
        action: AuditAction,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Self {
        Self {
            entity_type: AuditEntityType::DocumentRequest,
            entity_id: request_id,
            actor_id: Some(actor.id),
            actor_role: actor.role,
            action,
            from_status: Some(from),
            to_status: Some(to),
            notes: None,
            metadata: JsonValue::Null,
        }
    }

    /// A non-transition entry (ticket issuance, content edit, registry
    /// change); carries no from/to status.
    pub fn action(
        entity_type: AuditEntityType,
        entity_id: Uuid,
        actor: Actor,
        action: AuditAction,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            actor_id: Some(actor.id),
            actor_role: actor.role,
            action,
            from_status: None,
            to_status: None,
            notes: None,
            metadata: JsonValue::Null,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Append-only audit log.
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Append one entry. Never fails silently; a failed write must fail
    /// the operation that triggered it.
    async fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry>;

    /// Timeline for one entity, `created_at` ascending.
    async fn timeline(
        &self,
        entity_type: AuditEntityType,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEntry>>;
}

// =============================================================================
// EXTERNAL COLLABORATORS
// =============================================================================

/// Produces the document artifact for a digital-delivery request.
///
/// Invoked only from `processing`; the engine stores the returned opaque
/// reference and never looks inside it.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(&self, request: &DocumentRequest) -> Result<String>;
}

/// A lifecycle event worth telling the resident about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestNotification {
    pub request_id: Uuid,
    pub request_number: String,
    pub requester_id: Uuid,
    pub status: RequestStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Fire-and-forget notification fan-out. The engine only logs failures;
/// delivery is never allowed to fail a transition.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, event: RequestNotification) -> Result<()>;
}

/// Receives the raw claim token and fallback code at issuance time to
/// render a QR code or message for the resident. The engine never renders
/// anything itself and never sees the secrets again.
#[async_trait]
pub trait TicketTransport: Send + Sync {
    async fn deliver(&self, request: &DocumentRequest, token: &str, code: &str) -> Result<()>;
}

/// Supplies requester display data by id; the core stores only the id.
#[async_trait]
pub trait RequesterDirectory: Send + Sync {
    async fn display_name(&self, requester_id: Uuid) -> Result<Option<String>>;
}

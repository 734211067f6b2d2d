//! Core data models for the munidesk fulfillment engine.
//!
//! These types are shared across all munidesk crates and represent the
//! domain entities: document types, document requests, claim tickets,
//! and audit entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::BigDecimal;
use uuid::Uuid;

// =============================================================================
// STATUS & CLASSIFICATION ENUMS
// =============================================================================

/// Which authority issues a document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthorityLevel {
    /// Issued by the municipal office.
    Municipal,
    /// Issued by a local unit office (barangay-level in the source system).
    LocalUnit,
}

impl std::fmt::Display for AuthorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Municipal => write!(f, "municipal"),
            Self::LocalUnit => write!(f, "local-unit"),
        }
    }
}

impl std::str::FromStr for AuthorityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "municipal" => Ok(Self::Municipal),
            // "barangay" still arrives from the legacy admin tooling
            "local-unit" | "local_unit" | "barangay" => Ok(Self::LocalUnit),
            _ => Err(format!("Invalid authority level: {}", s)),
        }
    }
}

/// How the finished artifact is released to the resident.
///
/// Fixed at creation; determines which branch of the transition table
/// applies to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    /// Released electronically; completes via artifact generation.
    Digital,
    /// Collected at a counter; completes via claim-ticket redemption.
    Pickup,
}

impl std::fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Digital => write!(f, "digital"),
            Self::Pickup => write!(f, "pickup"),
        }
    }
}

impl std::str::FromStr for DeliveryMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "digital" => Ok(Self::Digital),
            // The source system used "physical" and "pickup" interchangeably.
            "pickup" | "physical" => Ok(Self::Pickup),
            _ => Err(format!("Invalid delivery method: {}", s)),
        }
    }
}

/// Canonical request status.
///
/// The source system expressed status as loosely-typed strings with ad hoc
/// synonyms ("in_progress", "resolved", "closed", ...). Those still arrive
/// from legacy callers and are collapsed here by [`FromStr`]; everything
/// downstream works with this one enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted by the resident, awaiting triage.
    Pending,
    /// Accepted by an administrator, not yet worked on.
    Approved,
    /// Being fulfilled; the only state in which content edits are legal.
    Processing,
    /// Pickup branch: artifact ready at the counter, awaiting redemption.
    Ready,
    /// Digital branch terminal: artifact generated and released.
    Completed,
    /// Pickup branch terminal: claim ticket redeemed at the counter.
    PickedUp,
    /// Terminal: declined by an administrator with a reason.
    Rejected,
}

impl RequestStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::PickedUp | Self::Rejected)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Processing => write!(f, "processing"),
            Self::Ready => write!(f, "ready"),
            Self::Completed => write!(f, "completed"),
            Self::PickedUp => write!(f, "picked_up"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "processing" | "in_progress" => Ok(Self::Processing),
            "ready" | "resolved" => Ok(Self::Ready),
            "completed" | "closed" => Ok(Self::Completed),
            "picked_up" | "claimed" | "released" => Ok(Self::PickedUp),
            "rejected" | "declined" => Ok(Self::Rejected),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

/// Request priority. Informational only; never gates a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    #[default]
    Normal,
    High,
    Urgent,
}

impl std::fmt::Display for RequestPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for RequestPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// Role of the actor recorded on an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Resident,
    MunicipalAdmin,
    LocalUnitAdmin,
    System,
}

impl std::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resident => write!(f, "resident"),
            Self::MunicipalAdmin => write!(f, "municipal_admin"),
            Self::LocalUnitAdmin => write!(f, "local_unit_admin"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "resident" => Ok(Self::Resident),
            "municipal_admin" => Ok(Self::MunicipalAdmin),
            "local_unit_admin" | "barangay_admin" => Ok(Self::LocalUnitAdmin),
            "system" => Ok(Self::System),
            _ => Err(format!("Invalid actor role: {}", s)),
        }
    }
}

/// An actor performing an engine operation: identity plus role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: Uuid, role: ActorRole) -> Self {
        Self { id, role }
    }
}

// =============================================================================
// DOCUMENT TYPE REGISTRY
// =============================================================================

/// One required attachment for a document type.
///
/// The source configuration is heterogeneous: plain strings, or objects
/// with varying key names. [`Requirement::normalize_list`] is the single
/// boundary where that mess is collapsed into this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Maximum number of required attachments per document type.
pub const MAX_REQUIREMENTS: usize = 5;

impl Requirement {
    /// Build a requirement from a bare label.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            description: None,
        }
    }

    /// Normalize a loosely-structured requirements value into at most
    /// [`MAX_REQUIREMENTS`] entries.
    ///
    /// Accepts a JSON array whose items are strings, or objects keyed by
    /// `label`/`name`/`title` with an optional `description`/`details`.
    /// Blank entries are dropped; anything else is rejected.
    pub fn normalize_list(value: &JsonValue) -> crate::Result<Vec<Requirement>> {
        let items = match value {
            JsonValue::Null => return Ok(Vec::new()),
            JsonValue::Array(items) => items,
            _ => {
                return Err(crate::Error::Validation(
                    "requirements must be an array".to_string(),
                ))
            }
        };

        let mut out = Vec::new();
        for item in items {
            let requirement = match item {
                JsonValue::String(s) => {
                    let label = s.trim();
                    if label.is_empty() {
                        continue;
                    }
                    Requirement::labeled(label)
                }
                JsonValue::Object(map) => {
                    let label = ["label", "name", "title"]
                        .iter()
                        .find_map(|k| map.get(*k))
                        .and_then(|v| v.as_str())
                        .map(str::trim)
                        .unwrap_or_default();
                    if label.is_empty() {
                        continue;
                    }
                    let description = ["description", "details"]
                        .iter()
                        .find_map(|k| map.get(*k))
                        .and_then(|v| v.as_str())
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from);
                    Requirement {
                        label: label.to_string(),
                        description,
                    }
                }
                _ => {
                    return Err(crate::Error::Validation(format!(
                        "unsupported requirement entry: {}",
                        item
                    )))
                }
            };
            out.push(requirement);
        }

        if out.len() > MAX_REQUIREMENTS {
            return Err(crate::Error::Validation(format!(
                "at most {} requirements allowed, got {}",
                MAX_REQUIREMENTS,
                out.len()
            )));
        }
        Ok(out)
    }
}

/// Configuration for one kind of document request.
///
/// Pure configuration: never a workflow participant. Inactive types reject
/// new requests but do not affect requests already in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentType {
    pub id: Uuid,
    /// Unique short code, e.g. "INDIGENCY".
    pub code: String,
    pub name: String,
    pub authority_level: AuthorityLevel,
    pub fee: BigDecimal,
    pub processing_days: i32,
    pub supports_digital: bool,
    pub supports_physical: bool,
    pub requirements: Vec<Requirement>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentType {
    /// Whether the zero-fee digital release path is available for this type.
    ///
    /// Payment processing is out of scope, so any fee forces the request
    /// to the pickup counter where it is collected in person.
    pub fn digital_allowed(&self) -> bool {
        self.supports_digital && self.fee <= BigDecimal::from(0)
    }
}

/// The registry rules in force when a request was created.
///
/// Snapshotted onto the request so later registry edits never rewrite the
/// basis on which a historical request was adjudicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSnapshot {
    pub fee: BigDecimal,
    pub processing_days: i32,
    pub requirements: Vec<Requirement>,
}

impl From<&DocumentType> for TypeSnapshot {
    fn from(dt: &DocumentType) -> Self {
        Self {
            fee: dt.fee.clone(),
            processing_days: dt.processing_days,
            requirements: dt.requirements.clone(),
        }
    }
}

// =============================================================================
// DOCUMENT REQUEST
// =============================================================================

/// The resident's original submission. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentInput {
    pub purpose: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub civil_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

/// Administrator-entered edits layered over [`ResidentInput`].
///
/// Supplements rather than replaces the resident's submission; the
/// original is always retrievable underneath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentOverlay {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub civil_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub edited_by: Uuid,
    pub edited_at: DateTime<Utc>,
}

/// A document request: the workflow subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub id: Uuid,
    /// Human-facing unique number, e.g. "REQ-20260824-0042".
    pub request_number: String,
    pub requester_id: Uuid,
    pub document_type_id: Uuid,
    pub delivery_method: DeliveryMethod,
    pub priority: RequestPriority,
    pub status: RequestStatus,
    pub resident_input: ResidentInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<ContentOverlay>,
    pub type_snapshot: TypeSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Opaque pointer to the generated artifact; owned by the artifact
    /// generator collaborator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<String>,
    /// Active claim ticket, pickup branch only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_ticket_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRequest {
    /// Effective content: overlay fields where present, resident input
    /// underneath. The original submission is never destroyed.
    pub fn effective_content(&self) -> ResidentInput {
        match &self.overlay {
            None => self.resident_input.clone(),
            Some(overlay) => ResidentInput {
                purpose: overlay
                    .purpose
                    .clone()
                    .unwrap_or_else(|| self.resident_input.purpose.clone()),
                civil_status: overlay
                    .civil_status
                    .clone()
                    .or_else(|| self.resident_input.civil_status.clone()),
                remarks: overlay
                    .remarks
                    .clone()
                    .or_else(|| self.resident_input.remarks.clone()),
            },
        }
    }
}

// =============================================================================
// CLAIM TICKET
// =============================================================================

/// A short-lived bearer credential bound to exactly one request.
///
/// Raw secrets are never stored: only SHA-256 digests of the token and the
/// fallback code survive issuance, plus the masked code for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimTicket {
    pub id: Uuid,
    pub request_id: Uuid,
    /// SHA-256 hex digest of the bearer token.
    #[serde(skip_serializing)]
    pub token_hash: String,
    /// SHA-256 hex digest of the human-typeable fallback code.
    #[serde(skip_serializing)]
    pub code_hash: String,
    /// Display form of the fallback code, middle redacted.
    pub code_masked: String,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Set exactly once, at redemption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
    /// Set when a re-issue invalidates this ticket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_at: Option<DateTime<Utc>>,
    pub failed_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

impl ClaimTicket {
    /// Whether this ticket can still be verified and redeemed at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.redeemed_at.is_none()
            && self.superseded_at.is_none()
            && self.expires_at.map(|t| t > now).unwrap_or(true)
    }

    /// Whether verification is currently locked out after repeated failures.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|t| t > now).unwrap_or(false)
    }
}

/// The one-time issuance result: the stored ticket plus the raw secrets.
///
/// Returned exactly once to the caller and handed to the ticket transport;
/// after that only `ticket.code_masked` is retrievable.
#[derive(Debug, Clone)]
pub struct IssuedTicket {
    pub ticket: ClaimTicket,
    pub token: String,
    pub code: String,
}

/// Credential presented at the pickup counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ClaimCredential {
    /// Full bearer token, usually scanned from a QR code.
    Token { token: String },
    /// Human-typed fallback code; must be paired with the request it
    /// claims so a bare code cannot be probed against every request.
    Code { code: String, request_id: Uuid },
}

/// Read-only view returned by a successful verification, for the verifier
/// to visually confirm before explicitly redeeming. Carries no secrets and
/// does not advance the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub request_id: Uuid,
    pub request_number: String,
    pub requester_id: Uuid,
    pub document_type_code: String,
    pub document_type_name: String,
    pub status: RequestStatus,
    pub delivery_method: DeliveryMethod,
}

// =============================================================================
// AUDIT LOG
// =============================================================================

/// Action recorded on an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Approve,
    StartProcessing,
    GenerateArtifact,
    IssueTicket,
    MarkReady,
    VerifyTicket,
    VerifyFailed,
    RedeemTicket,
    Reject,
    ContentEdit,
    TypeCreate,
    TypeUpdate,
    TypeDeactivate,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Approve => write!(f, "approve"),
            Self::StartProcessing => write!(f, "start_processing"),
            Self::GenerateArtifact => write!(f, "generate_artifact"),
            Self::IssueTicket => write!(f, "issue_ticket"),
            Self::MarkReady => write!(f, "mark_ready"),
            Self::VerifyTicket => write!(f, "verify_ticket"),
            Self::VerifyFailed => write!(f, "verify_failed"),
            Self::RedeemTicket => write!(f, "redeem_ticket"),
            Self::Reject => write!(f, "reject"),
            Self::ContentEdit => write!(f, "content_edit"),
            Self::TypeCreate => write!(f, "type_create"),
            Self::TypeUpdate => write!(f, "type_update"),
            Self::TypeDeactivate => write!(f, "type_deactivate"),
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "approve" => Ok(Self::Approve),
            "start_processing" => Ok(Self::StartProcessing),
            "generate_artifact" => Ok(Self::GenerateArtifact),
            "issue_ticket" => Ok(Self::IssueTicket),
            "mark_ready" => Ok(Self::MarkReady),
            "verify_ticket" => Ok(Self::VerifyTicket),
            "verify_failed" => Ok(Self::VerifyFailed),
            "redeem_ticket" => Ok(Self::RedeemTicket),
            "reject" => Ok(Self::Reject),
            "content_edit" => Ok(Self::ContentEdit),
            "type_create" => Ok(Self::TypeCreate),
            "type_update" => Ok(Self::TypeUpdate),
            "type_deactivate" => Ok(Self::TypeDeactivate),
            _ => Err(format!("Invalid audit action: {}", s)),
        }
    }
}

/// Entity kinds referenced by audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntityType {
    DocumentRequest,
    DocumentType,
    ClaimTicket,
}

impl std::fmt::Display for AuditEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DocumentRequest => write!(f, "document_request"),
            Self::DocumentType => write!(f, "document_type"),
            Self::ClaimTicket => write!(f, "claim_ticket"),
        }
    }
}

impl std::str::FromStr for AuditEntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document_request" => Ok(Self::DocumentRequest),
            "document_type" => Ok(Self::DocumentType),
            "claim_ticket" => Ok(Self::ClaimTicket),
            _ => Err(format!("Invalid audit entity type: {}", s)),
        }
    }
}

/// One append-only audit record. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity_type: AuditEntityType,
    pub entity_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    pub actor_role: ActorRole,
    pub action: AuditAction,
    /// Status before a transition; None for non-transition actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_status: Option<RequestStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_status: Option<RequestStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Structured, action-specific detail (masked code, failure cause, ...).
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn test_status_round_trip() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Approved,
            RequestStatus::Processing,
            RequestStatus::Ready,
            RequestStatus::Completed,
            RequestStatus::PickedUp,
            RequestStatus::Rejected,
        ] {
            let parsed = RequestStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_legacy_synonyms() {
        assert_eq!(
            RequestStatus::from_str("in_progress").unwrap(),
            RequestStatus::Processing
        );
        assert_eq!(
            RequestStatus::from_str("resolved").unwrap(),
            RequestStatus::Ready
        );
        assert_eq!(
            RequestStatus::from_str("closed").unwrap(),
            RequestStatus::Completed
        );
        assert_eq!(
            RequestStatus::from_str("claimed").unwrap(),
            RequestStatus::PickedUp
        );
        assert_eq!(
            RequestStatus::from_str("released").unwrap(),
            RequestStatus::PickedUp
        );
        assert_eq!(
            RequestStatus::from_str("declined").unwrap(),
            RequestStatus::Rejected
        );
        assert!(RequestStatus::from_str("archived").is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::PickedUp.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
        assert!(!RequestStatus::Ready.is_terminal());
        assert!(!RequestStatus::Processing.is_terminal());
    }

    #[test]
    fn test_delivery_method_physical_synonym() {
        assert_eq!(
            DeliveryMethod::from_str("physical").unwrap(),
            DeliveryMethod::Pickup
        );
        assert_eq!(
            DeliveryMethod::from_str("digital").unwrap(),
            DeliveryMethod::Digital
        );
        assert!(DeliveryMethod::from_str("courier").is_err());
    }

    #[test]
    fn test_requirement_normalize_strings_and_objects() {
        let value = json!([
            "Valid ID",
            { "label": "Proof of residency", "description": "Utility bill or lease" },
            { "name": "Barangay clearance" },
            { "title": "Photo", "details": "2x2, white background" },
            "   "
        ]);
        let reqs = Requirement::normalize_list(&value).unwrap();
        assert_eq!(reqs.len(), 4);
        assert_eq!(reqs[0], Requirement::labeled("Valid ID"));
        assert_eq!(reqs[1].label, "Proof of residency");
        assert_eq!(reqs[1].description.as_deref(), Some("Utility bill or lease"));
        assert_eq!(reqs[2].label, "Barangay clearance");
        assert_eq!(reqs[3].description.as_deref(), Some("2x2, white background"));
    }

    #[test]
    fn test_requirement_normalize_rejects_over_limit() {
        let value = json!(["a", "b", "c", "d", "e", "f"]);
        assert!(Requirement::normalize_list(&value).is_err());
    }

    #[test]
    fn test_requirement_normalize_rejects_non_array() {
        assert!(Requirement::normalize_list(&json!({"label": "x"})).is_err());
        assert!(Requirement::normalize_list(&json!(42)).is_err());
        assert!(Requirement::normalize_list(&json!(null)).unwrap().is_empty());
    }

    #[test]
    fn test_effective_content_merges_overlay() {
        let input = ResidentInput {
            purpose: "Scholarship assistance".to_string(),
            civil_status: Some("single".to_string()),
            remarks: None,
        };
        let mut request = sample_request(input.clone());
        assert_eq!(request.effective_content(), input);

        request.overlay = Some(ContentOverlay {
            purpose: Some("Scholarship application (DSWD)".to_string()),
            civil_status: None,
            remarks: Some("Verified against registry".to_string()),
            edited_by: Uuid::nil(),
            edited_at: Utc::now(),
        });
        let effective = request.effective_content();
        assert_eq!(effective.purpose, "Scholarship application (DSWD)");
        // Overlay leaves civil_status untouched; resident value shows through.
        assert_eq!(effective.civil_status.as_deref(), Some("single"));
        assert_eq!(effective.remarks.as_deref(), Some("Verified against registry"));
        // The original is still intact underneath.
        assert_eq!(request.resident_input, input);
    }

    #[test]
    fn test_ticket_active_and_locked() {
        let now = Utc::now();
        let mut ticket = ClaimTicket {
            id: Uuid::nil(),
            request_id: Uuid::nil(),
            token_hash: String::new(),
            code_hash: String::new(),
            code_masked: "AB**-**34".to_string(),
            issued_at: now,
            expires_at: None,
            redeemed_at: None,
            superseded_at: None,
            failed_attempts: 0,
            locked_until: None,
        };
        assert!(ticket.is_active(now));
        assert!(!ticket.is_locked(now));

        ticket.expires_at = Some(now - chrono::Duration::minutes(1));
        assert!(!ticket.is_active(now));

        ticket.expires_at = None;
        ticket.redeemed_at = Some(now);
        assert!(!ticket.is_active(now));

        ticket.redeemed_at = None;
        ticket.superseded_at = Some(now);
        assert!(!ticket.is_active(now));

        ticket.superseded_at = None;
        ticket.locked_until = Some(now + chrono::Duration::minutes(10));
        assert!(ticket.is_locked(now));
    }

    fn sample_request(resident_input: ResidentInput) -> DocumentRequest {
        let now = Utc::now();
        DocumentRequest {
            id: Uuid::nil(),
            request_number: "REQ-20260101-0001".to_string(),
            requester_id: Uuid::nil(),
            document_type_id: Uuid::nil(),
            delivery_method: DeliveryMethod::Pickup,
            priority: RequestPriority::Normal,
            status: RequestStatus::Processing,
            resident_input,
            overlay: None,
            type_snapshot: TypeSnapshot {
                fee: BigDecimal::from(0),
                processing_days: 3,
                requirements: vec![],
            },
            rejection_reason: None,
            artifact_ref: None,
            claim_ticket_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

//! Document request repository implementation.
//!
//! Inserts validate the delivery method against the document type and
//! snapshot the type's rules onto the request. Status is deliberately not
//! mutable through this repository: only the lifecycle engine moves a
//! request along the transition table, via the `_tx` helpers here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::info;
use uuid::Uuid;

use munidesk_core::{
    new_v7, ActorRole, AuditAction, AuditEntityType, ContentOverlay, CreateRequestRequest,
    DeliveryMethod, DocumentRequest, DocumentTypeRepository, Error, ListRequestsRequest,
    ListRequestsResponse, NewAuditEntry, RequestPriority, RequestRepository, RequestStatus,
    ResidentInput, Result, TypeSnapshot,
};

use crate::audit::record_tx;
use crate::document_types::PgDocumentTypeRepository;

/// Columns selected for a full request row.
pub const REQUEST_COLUMNS: &str = "id, request_number, requester_id, document_type_id, \
     delivery_method, priority, status, resident_input, overlay, type_snapshot, \
     rejection_reason, artifact_ref, claim_ticket_id, created_at, updated_at";

/// PostgreSQL implementation of RequestRepository.
pub struct PgRequestRepository {
    pool: Pool<Postgres>,
}

impl PgRequestRepository {
    /// Create a new PgRequestRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn parse_status(s: &str) -> Result<RequestStatus> {
    s.parse()
        .map_err(|e: String| Error::Internal(format!("document_request row: {}", e)))
}

fn parse_delivery(s: &str) -> Result<DeliveryMethod> {
    s.parse()
        .map_err(|e: String| Error::Internal(format!("document_request row: {}", e)))
}

fn parse_priority(s: &str) -> Result<RequestPriority> {
    s.parse()
        .map_err(|e: String| Error::Internal(format!("document_request row: {}", e)))
}

/// Build a [`DocumentRequest`] from a full row.
pub fn request_from_row(row: &sqlx::postgres::PgRow) -> Result<DocumentRequest> {
    let resident_input: ResidentInput =
        serde_json::from_value(row.get::<serde_json::Value, _>("resident_input"))?;
    let overlay: Option<ContentOverlay> = row
        .get::<Option<serde_json::Value>, _>("overlay")
        .map(serde_json::from_value)
        .transpose()?;
    let type_snapshot: TypeSnapshot =
        serde_json::from_value(row.get::<serde_json::Value, _>("type_snapshot"))?;

    Ok(DocumentRequest {
        id: row.get("id"),
        request_number: row.get("request_number"),
        requester_id: row.get("requester_id"),
        document_type_id: row.get("document_type_id"),
        delivery_method: parse_delivery(row.get("delivery_method"))?,
        priority: parse_priority(row.get("priority"))?,
        status: parse_status(row.get("status"))?,
        resident_input,
        overlay,
        type_snapshot,
        rejection_reason: row.get("rejection_reason"),
        artifact_ref: row.get("artifact_ref"),
        claim_ticket_id: row.get("claim_ticket_id"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

/// Fetch a request row under `FOR UPDATE`, serializing all transitions
/// against the same request for the lifetime of the transaction.
pub async fn fetch_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<DocumentRequest> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM document_request WHERE id = $1 FOR UPDATE",
        REQUEST_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(Error::Database)?
    .ok_or(Error::RequestNotFound(id))?;

    request_from_row(&row)
}

/// Set the request status on a live transaction.
pub async fn update_status_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    to: RequestStatus,
) -> Result<()> {
    sqlx::query("UPDATE document_request SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(to.to_string())
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

#[async_trait]
impl RequestRepository for PgRequestRepository {
    async fn insert(&self, req: CreateRequestRequest) -> Result<DocumentRequest> {
        if req.resident_input.purpose.trim().is_empty() {
            return Err(Error::Validation("purpose is required".to_string()));
        }

        let types = PgDocumentTypeRepository::new(self.pool.clone());
        let document_type = types
            .get(req.document_type_id)
            .await?
            .ok_or(Error::DocumentTypeNotFound(req.document_type_id))?;

        if !document_type.is_active {
            return Err(Error::Validation(format!(
                "document type {} is not accepting new requests",
                document_type.code
            )));
        }
        match req.delivery_method {
            DeliveryMethod::Pickup if !document_type.supports_physical => {
                return Err(Error::Validation(format!(
                    "document type {} does not support pickup delivery",
                    document_type.code
                )));
            }
            // Digital release requires digital support and a zero fee:
            // there is no payment step, so a fee forces the counter.
            DeliveryMethod::Digital if !document_type.digital_allowed() => {
                return Err(Error::Validation(format!(
                    "document type {} can only be requested for in-person pickup",
                    document_type.code
                )));
            }
            _ => {}
        }

        let id = new_v7();
        let now = Utc::now();
        let snapshot = TypeSnapshot::from(&document_type);

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let seq: i64 = sqlx::query_scalar("SELECT nextval('document_request_number_seq')")
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;
        let request_number = format!("REQ-{}-{:04}", now.format("%Y%m%d"), seq);

        sqlx::query(
            r#"INSERT INTO document_request (
                id, request_number, requester_id, document_type_id,
                delivery_method, priority, status, resident_input,
                type_snapshot, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9, $9)"#,
        )
        .bind(id)
        .bind(&request_number)
        .bind(req.requester_id)
        .bind(req.document_type_id)
        .bind(req.delivery_method.to_string())
        .bind(req.priority.to_string())
        .bind(serde_json::to_value(&req.resident_input)?)
        .bind(serde_json::to_value(&snapshot)?)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        record_tx(
            &mut tx,
            NewAuditEntry {
                entity_type: AuditEntityType::DocumentRequest,
                entity_id: id,
                actor_id: Some(req.requester_id),
                actor_role: ActorRole::Resident,
                action: AuditAction::Create,
                from_status: None,
                to_status: Some(RequestStatus::Pending),
                notes: None,
                metadata: json!({
                    "document_type": document_type.code,
                    "delivery_method": req.delivery_method.to_string(),
                }),
            },
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "requests",
            op = "insert",
            request_id = %id,
            request_number = %request_number,
            delivery_method = %req.delivery_method,
            "Document request created"
        );

        self.fetch(id).await
    }

    async fn fetch(&self, id: Uuid) -> Result<DocumentRequest> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM document_request WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::RequestNotFound(id))?;

        request_from_row(&row)
    }

    async fn fetch_by_number(&self, request_number: &str) -> Result<DocumentRequest> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM document_request WHERE request_number = $1",
            REQUEST_COLUMNS
        ))
        .bind(request_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("request {}", request_number)))?;

        request_from_row(&row)
    }

    async fn list(&self, req: ListRequestsRequest) -> Result<ListRequestsResponse> {
        let mut conditions = Vec::new();
        let mut param_idx = 1;

        // Build the WHERE clause positionally; binds are appended in the
        // same order below.
        if req.status.is_some() {
            conditions.push(format!("status = ${}", param_idx));
            param_idx += 1;
        }
        if req.delivery_method.is_some() {
            conditions.push(format!("delivery_method = ${}", param_idx));
            param_idx += 1;
        }
        if req.document_type_id.is_some() {
            conditions.push(format!("document_type_id = ${}", param_idx));
            param_idx += 1;
        }
        if req.requester_id.is_some() {
            conditions.push(format!("requester_id = ${}", param_idx));
            param_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit = req.limit.unwrap_or(50).clamp(1, 500);
        let offset = req.offset.unwrap_or(0).max(0);

        let list_query = format!(
            "SELECT {} FROM document_request {} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
            REQUEST_COLUMNS,
            where_clause,
            param_idx,
            param_idx + 1
        );
        let count_query = format!("SELECT COUNT(*) FROM document_request {}", where_clause);

        let mut list = sqlx::query(&list_query);
        let mut count = sqlx::query_scalar::<_, i64>(&count_query);

        if let Some(status) = req.status {
            list = list.bind(status.to_string());
            count = count.bind(status.to_string());
        }
        if let Some(delivery) = req.delivery_method {
            list = list.bind(delivery.to_string());
            count = count.bind(delivery.to_string());
        }
        if let Some(type_id) = req.document_type_id {
            list = list.bind(type_id);
            count = count.bind(type_id);
        }
        if let Some(requester_id) = req.requester_id {
            list = list.bind(requester_id);
            count = count.bind(requester_id);
        }

        let rows = list
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        let total = count.fetch_one(&self.pool).await.map_err(Error::Database)?;

        let requests = rows
            .iter()
            .map(request_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(ListRequestsResponse { requests, total })
    }
}

/// Store an administrator content overlay on a live transaction.
///
/// The resident's original `resident_input` column is never touched.
pub async fn store_overlay_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    overlay: &ContentOverlay,
) -> Result<()> {
    sqlx::query("UPDATE document_request SET overlay = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(serde_json::to_value(overlay)?)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

/// Record the artifact reference produced by the generator collaborator.
pub async fn store_artifact_ref_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    artifact_ref: &str,
) -> Result<()> {
    sqlx::query("UPDATE document_request SET artifact_ref = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(artifact_ref)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

/// Record the rejection reason alongside the status change.
pub async fn store_rejection_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    reason: &str,
) -> Result<()> {
    sqlx::query("UPDATE document_request SET rejection_reason = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(reason)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

/// Point the request at its active claim ticket.
pub async fn link_ticket_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    ticket_id: Uuid,
) -> Result<()> {
    sqlx::query("UPDATE document_request SET claim_ticket_id = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(ticket_id)
        .bind(Utc::now())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

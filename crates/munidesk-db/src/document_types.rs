//! PostgreSQL implementation of DocumentTypeRepository.
//!
//! Registry changes are audited in the same transaction as the change.
//! Deactivation (soft delete) only blocks new request creation; requests
//! already in flight keep the rules they snapshotted at creation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::types::BigDecimal;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use munidesk_core::{
    new_v7, Actor, AuditAction, AuditEntityType, AuthorityLevel, CreateDocumentTypeRequest,
    DocumentType, DocumentTypeRepository, Error, NewAuditEntry, Requirement, Result,
    UpdateDocumentTypeRequest,
};

use crate::audit::record_tx;

/// PostgreSQL implementation of DocumentTypeRepository.
pub struct PgDocumentTypeRepository {
    pool: Pool<Postgres>,
}

impl PgDocumentTypeRepository {
    /// Create a new PgDocumentTypeRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn parse_authority_level(s: &str) -> Result<AuthorityLevel> {
    s.parse()
        .map_err(|e: String| Error::Internal(format!("document_type row: {}", e)))
}

fn type_from_row(row: &sqlx::postgres::PgRow) -> Result<DocumentType> {
    let requirements: Vec<Requirement> =
        serde_json::from_value(row.get::<serde_json::Value, _>("requirements"))?;
    Ok(DocumentType {
        id: row.get("id"),
        code: row.get("code"),
        name: row.get("name"),
        authority_level: parse_authority_level(row.get("authority_level"))?,
        fee: row.get::<BigDecimal, _>("fee"),
        processing_days: row.get("processing_days"),
        supports_digital: row.get("supports_digital"),
        supports_physical: row.get("supports_physical"),
        requirements,
        is_active: row.get("is_active"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

const SELECT_COLUMNS: &str = "id, code, name, authority_level, fee, processing_days, \
     supports_digital, supports_physical, requirements, is_active, created_at, updated_at";

fn validate_config(
    code: &str,
    fee: &BigDecimal,
    processing_days: i32,
    supports_digital: bool,
    supports_physical: bool,
) -> Result<()> {
    if code.trim().is_empty() {
        return Err(Error::Validation("document type code required".to_string()));
    }
    if *fee < BigDecimal::from(0) {
        return Err(Error::Validation("fee must be non-negative".to_string()));
    }
    if processing_days <= 0 {
        return Err(Error::Validation(
            "processing days must be positive".to_string(),
        ));
    }
    if !supports_digital && !supports_physical {
        return Err(Error::Validation(
            "document type must support at least one delivery method".to_string(),
        ));
    }
    Ok(())
}

/// Fetch a document type on a live transaction.
pub async fn get_tx(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<DocumentType>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM document_type WHERE id = $1",
        SELECT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(Error::Database)?;

    row.as_ref().map(type_from_row).transpose()
}

#[async_trait]
impl DocumentTypeRepository for PgDocumentTypeRepository {
    async fn create(&self, req: CreateDocumentTypeRequest, actor: Actor) -> Result<DocumentType> {
        validate_config(
            &req.code,
            &req.fee,
            req.processing_days,
            req.supports_digital,
            req.supports_physical,
        )?;
        let requirements = Requirement::normalize_list(&req.requirements)?;

        let id = new_v7();
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            r#"INSERT INTO document_type (
                id, code, name, authority_level, fee, processing_days,
                supports_digital, supports_physical, requirements,
                is_active, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, $10, $10)"#,
        )
        .bind(id)
        .bind(req.code.trim())
        .bind(&req.name)
        .bind(req.authority_level.to_string())
        .bind(&req.fee)
        .bind(req.processing_days)
        .bind(req.supports_digital)
        .bind(req.supports_physical)
        .bind(serde_json::to_value(&requirements)?)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        record_tx(
            &mut tx,
            NewAuditEntry::action(AuditEntityType::DocumentType, id, actor, AuditAction::TypeCreate)
                .with_metadata(json!({ "code": req.code.trim() })),
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "registry",
            op = "create",
            document_type_id = %id,
            "Document type created"
        );

        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal("document type vanished after insert".to_string()))
    }

    async fn update(
        &self,
        id: Uuid,
        req: UpdateDocumentTypeRequest,
        actor: Actor,
    ) -> Result<DocumentType> {
        let existing = self
            .get(id)
            .await?
            .ok_or(Error::DocumentTypeNotFound(id))?;

        let name = req.name.unwrap_or(existing.name);
        let fee = req.fee.unwrap_or(existing.fee);
        let processing_days = req.processing_days.unwrap_or(existing.processing_days);
        let supports_digital = req.supports_digital.unwrap_or(existing.supports_digital);
        let supports_physical = req.supports_physical.unwrap_or(existing.supports_physical);
        let is_active = req.is_active.unwrap_or(existing.is_active);
        let requirements = match req.requirements {
            Some(value) => Requirement::normalize_list(&value)?,
            None => existing.requirements,
        };

        validate_config(
            &existing.code,
            &fee,
            processing_days,
            supports_digital,
            supports_physical,
        )?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            r#"UPDATE document_type
               SET name = $2, fee = $3, processing_days = $4,
                   supports_digital = $5, supports_physical = $6,
                   requirements = $7, is_active = $8, updated_at = $9
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(&name)
        .bind(&fee)
        .bind(processing_days)
        .bind(supports_digital)
        .bind(supports_physical)
        .bind(serde_json::to_value(&requirements)?)
        .bind(is_active)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        record_tx(
            &mut tx,
            NewAuditEntry::action(AuditEntityType::DocumentType, id, actor, AuditAction::TypeUpdate)
                .with_metadata(json!({ "code": existing.code })),
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;

        self.get(id)
            .await?
            .ok_or(Error::DocumentTypeNotFound(id))
    }

    async fn get(&self, id: Uuid) -> Result<Option<DocumentType>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM document_type WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(type_from_row).transpose()
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<DocumentType>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM document_type WHERE code = $1",
            SELECT_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(type_from_row).transpose()
    }

    async fn list(&self, include_inactive: bool) -> Result<Vec<DocumentType>> {
        let query = if include_inactive {
            format!("SELECT {} FROM document_type ORDER BY code", SELECT_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM document_type WHERE is_active = TRUE ORDER BY code",
                SELECT_COLUMNS
            )
        };
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(type_from_row).collect()
    }

    async fn deactivate(&self, id: Uuid, actor: Actor) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let result = sqlx::query(
            "UPDATE document_type SET is_active = FALSE, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(Error::Database)?;
            return Err(Error::DocumentTypeNotFound(id));
        }

        record_tx(
            &mut tx,
            NewAuditEntry::action(
                AuditEntityType::DocumentType,
                id,
                actor,
                AuditAction::TypeDeactivate,
            ),
        )
        .await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "registry",
            op = "deactivate",
            document_type_id = %id,
            "Document type deactivated"
        );
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let references = self.reference_count(id).await?;
        if references > 0 {
            return Err(Error::Validation(format!(
                "document type is referenced by {} request(s); deactivate it instead",
                references
            )));
        }

        let result = sqlx::query("DELETE FROM document_type WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::DocumentTypeNotFound(id));
        }
        Ok(())
    }

    async fn reference_count(&self, id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_request WHERE document_type_id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }
}

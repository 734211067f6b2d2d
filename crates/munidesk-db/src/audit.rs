//! Append-only audit log implementation.
//!
//! Entries are written inside the same transaction as the operation that
//! produced them: a transition that cannot record its audit entry does
//! not happen. There is deliberately no update or delete surface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use munidesk_core::{
    new_v7, ActorRole, AuditAction, AuditEntityType, AuditEntry, AuditLogRepository, Error,
    NewAuditEntry, RequestStatus, Result,
};

/// PostgreSQL implementation of AuditLogRepository.
pub struct PgAuditLogRepository {
    pool: Pool<Postgres>,
}

impl PgAuditLogRepository {
    /// Create a new PgAuditLogRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Append one audit entry on a live transaction.
///
/// Used by the engine and the registry so the entry commits or rolls back
/// with the triggering mutation.
pub async fn record_tx(
    tx: &mut Transaction<'_, Postgres>,
    entry: NewAuditEntry,
) -> Result<AuditEntry> {
    let id = new_v7();
    let now = Utc::now();
    let metadata = match &entry.metadata {
        JsonValue::Null => JsonValue::Object(Default::default()),
        other => other.clone(),
    };

    sqlx::query(
        r#"INSERT INTO audit_log (
            id, entity_type, entity_id, actor_id, actor_role, action,
            from_status, to_status, notes, metadata, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
    )
    .bind(id)
    .bind(entry.entity_type.to_string())
    .bind(entry.entity_id)
    .bind(entry.actor_id)
    .bind(entry.actor_role.to_string())
    .bind(entry.action.to_string())
    .bind(entry.from_status.map(|s| s.to_string()))
    .bind(entry.to_status.map(|s| s.to_string()))
    .bind(&entry.notes)
    .bind(&metadata)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;

    Ok(AuditEntry {
        id,
        entity_type: entry.entity_type,
        entity_id: entry.entity_id,
        actor_id: entry.actor_id,
        actor_role: entry.actor_role,
        action: entry.action,
        from_status: entry.from_status,
        to_status: entry.to_status,
        notes: entry.notes,
        metadata,
        created_at: now,
    })
}

fn parse_entity_type(s: &str) -> Result<AuditEntityType> {
    s.parse()
        .map_err(|e: String| Error::Internal(format!("audit row: {}", e)))
}

fn parse_actor_role(s: &str) -> Result<ActorRole> {
    s.parse()
        .map_err(|e: String| Error::Internal(format!("audit row: {}", e)))
}

fn parse_action(s: &str) -> Result<AuditAction> {
    s.parse()
        .map_err(|e: String| Error::Internal(format!("audit row: {}", e)))
}

fn parse_status(s: Option<&str>) -> Result<Option<RequestStatus>> {
    s.map(|s| {
        s.parse()
            .map_err(|e: String| Error::Internal(format!("audit row: {}", e)))
    })
    .transpose()
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get("id"),
        entity_type: parse_entity_type(row.get("entity_type"))?,
        entity_id: row.get("entity_id"),
        actor_id: row.get("actor_id"),
        actor_role: parse_actor_role(row.get("actor_role"))?,
        action: parse_action(row.get("action"))?,
        from_status: parse_status(row.get::<Option<&str>, _>("from_status"))?,
        to_status: parse_status(row.get::<Option<&str>, _>("to_status"))?,
        notes: row.get("notes"),
        metadata: row.get("metadata"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

#[async_trait]
impl AuditLogRepository for PgAuditLogRepository {
    async fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let recorded = record_tx(&mut tx, entry).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(recorded)
    }

    async fn timeline(
        &self,
        entity_type: AuditEntityType,
        entity_id: Uuid,
    ) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"SELECT id, entity_type, entity_id, actor_id, actor_role, action,
                      from_status, to_status, notes, metadata, created_at
               FROM audit_log
               WHERE entity_type = $1 AND entity_id = $2
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(entity_type.to_string())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(entry_from_row).collect()
    }
}

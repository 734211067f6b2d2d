//! Claim ticket repository implementation.
//!
//! Stores bearer credentials hash-only: the raw token and fallback code
//! exist in memory exactly once, at issuance, and are never retrievable
//! afterwards. Verification compares SHA-256 digests in constant time.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hex;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use munidesk_core::{new_v7, ClaimTicket, ClaimTicketRepository, Error, Result};

/// Length of the bearer token (alphanumeric, ~190 bits of entropy).
pub const TOKEN_LENGTH: usize = 32;

/// Failed verification attempts before the ticket locks.
pub const MAX_VERIFY_ATTEMPTS: i32 = 5;

/// How long a locked ticket stays locked.
pub const LOCKOUT_MINUTES: i64 = 15;

/// Generate a cryptographically secure random bearer token.
pub fn generate_token() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..TOKEN_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generate the human-typeable fallback code, `XXXX-XXXX`.
///
/// The charset drops visually ambiguous characters (0/O, 1/I/L); 8
/// symbols over 28 characters is ~38 bits, which with the per-ticket
/// attempt lockout makes guessing impractical.
pub fn generate_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let pick = |rng: &mut rand::rngs::ThreadRng| {
        let idx = rng.gen_range(0..CHARSET.len());
        CHARSET[idx] as char
    };
    let first: String = (0..4).map(|_| pick(&mut rng)).collect();
    let second: String = (0..4).map(|_| pick(&mut rng)).collect();
    format!("{}-{}", first, second)
}

/// SHA-256 hex digest of a secret.
pub fn hash_secret(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of a presented secret against a stored digest.
pub fn secret_matches(presented: &str, stored_hash: &str) -> bool {
    constant_time_eq::constant_time_eq(hash_secret(presented).as_bytes(), stored_hash.as_bytes())
}

/// Mask a fallback code for display: first and last two characters
/// visible, everything else redacted (separators kept).
pub fn mask_code(code: &str) -> String {
    let alnum: Vec<usize> = code
        .char_indices()
        .filter(|(_, c)| c.is_ascii_alphanumeric())
        .map(|(i, _)| i)
        .collect();
    code.char_indices()
        .map(|(i, c)| {
            if !c.is_ascii_alphanumeric() {
                c
            } else {
                // Position within the alphanumeric characters only.
                let pos = alnum.iter().position(|&v| v == i).unwrap_or(0);
                if pos < 2 || pos + 2 >= alnum.len() {
                    c
                } else {
                    '*'
                }
            }
        })
        .collect()
}

const TICKET_COLUMNS: &str = "id, request_id, token_hash, code_hash, code_masked, issued_at, \
     expires_at, redeemed_at, superseded_at, failed_attempts, locked_until";

fn ticket_from_row(row: &sqlx::postgres::PgRow) -> ClaimTicket {
    ClaimTicket {
        id: row.get("id"),
        request_id: row.get("request_id"),
        token_hash: row.get("token_hash"),
        code_hash: row.get("code_hash"),
        code_masked: row.get("code_masked"),
        issued_at: row.get::<DateTime<Utc>, _>("issued_at"),
        expires_at: row.get("expires_at"),
        redeemed_at: row.get("redeemed_at"),
        superseded_at: row.get("superseded_at"),
        failed_attempts: row.get("failed_attempts"),
        locked_until: row.get("locked_until"),
    }
}

/// PostgreSQL implementation of ClaimTicketRepository.
pub struct PgClaimTicketRepository {
    pool: Pool<Postgres>,
}

impl PgClaimTicketRepository {
    /// Create a new PgClaimTicketRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClaimTicketRepository for PgClaimTicketRepository {
    async fn get(&self, id: Uuid) -> Result<Option<ClaimTicket>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM claim_ticket WHERE id = $1",
            TICKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(ticket_from_row))
    }

    async fn active_for_request(&self, request_id: Uuid) -> Result<Option<ClaimTicket>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM claim_ticket
             WHERE request_id = $1 AND redeemed_at IS NULL AND superseded_at IS NULL",
            TICKET_COLUMNS
        ))
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(ticket_from_row))
    }
}

/// Fetch the live ticket for a request under `FOR UPDATE`.
pub async fn active_for_request_tx(
    tx: &mut Transaction<'_, Postgres>,
    request_id: Uuid,
) -> Result<Option<ClaimTicket>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM claim_ticket
         WHERE request_id = $1 AND redeemed_at IS NULL AND superseded_at IS NULL
         FOR UPDATE",
        TICKET_COLUMNS
    ))
    .bind(request_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(Error::Database)?;

    Ok(row.as_ref().map(ticket_from_row))
}

/// Look up the live ticket holding a given token hash, across requests.
pub async fn active_by_token_hash(
    pool: &Pool<Postgres>,
    token_hash: &str,
) -> Result<Option<ClaimTicket>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM claim_ticket
         WHERE token_hash = $1 AND redeemed_at IS NULL AND superseded_at IS NULL",
        TICKET_COLUMNS
    ))
    .bind(token_hash)
    .fetch_optional(pool)
    .await
    .map_err(Error::Database)?;

    Ok(row.as_ref().map(ticket_from_row))
}

/// Invalidate any live ticket for the request. Re-issue is "replace",
/// never "accumulate": the superseded ticket's credentials become
/// permanently unusable.
pub async fn supersede_active_tx(
    tx: &mut Transaction<'_, Postgres>,
    request_id: Uuid,
) -> Result<Option<Uuid>> {
    let row = sqlx::query(
        r#"UPDATE claim_ticket SET superseded_at = $2
           WHERE request_id = $1 AND redeemed_at IS NULL AND superseded_at IS NULL
           RETURNING id"#,
    )
    .bind(request_id)
    .bind(Utc::now())
    .fetch_optional(&mut **tx)
    .await
    .map_err(Error::Database)?;

    Ok(row.map(|r| r.get("id")))
}

/// Insert a fresh ticket on a live transaction. Returns the stored row.
pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    request_id: Uuid,
    token: &str,
    code: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<ClaimTicket> {
    let id = new_v7();
    let now = Utc::now();
    let code_masked = mask_code(code);

    sqlx::query(
        r#"INSERT INTO claim_ticket (
            id, request_id, token_hash, code_hash, code_masked,
            issued_at, expires_at, failed_attempts
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, 0)"#,
    )
    .bind(id)
    .bind(request_id)
    .bind(hash_secret(token))
    .bind(hash_secret(code))
    .bind(&code_masked)
    .bind(now)
    .bind(expires_at)
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;

    Ok(ClaimTicket {
        id,
        request_id,
        token_hash: hash_secret(token),
        code_hash: hash_secret(code),
        code_masked,
        issued_at: now,
        expires_at,
        redeemed_at: None,
        superseded_at: None,
        failed_attempts: 0,
        locked_until: None,
    })
}

/// Bump the failed-attempt counter; lock the ticket once it crosses
/// [`MAX_VERIFY_ATTEMPTS`]. Returns the new attempt count.
pub async fn record_failed_attempt(pool: &Pool<Postgres>, ticket_id: Uuid) -> Result<i32> {
    let lock_after = MAX_VERIFY_ATTEMPTS;
    let locked_until = Utc::now() + Duration::minutes(LOCKOUT_MINUTES);

    let attempts: i32 = sqlx::query_scalar(
        r#"UPDATE claim_ticket
           SET failed_attempts = failed_attempts + 1,
               locked_until = CASE
                   WHEN failed_attempts + 1 >= $2 THEN $3
                   ELSE locked_until
               END
           WHERE id = $1
           RETURNING failed_attempts"#,
    )
    .bind(ticket_id)
    .bind(lock_after)
    .bind(locked_until)
    .fetch_one(pool)
    .await
    .map_err(Error::Database)?;

    Ok(attempts)
}

/// Consume the ticket: set `redeemed_at` if and only if it is still
/// unredeemed. Returns false when another redemption got there first.
pub async fn mark_redeemed_tx(tx: &mut Transaction<'_, Postgres>, ticket_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE claim_ticket SET redeemed_at = $2 WHERE id = $1 AND redeemed_at IS NULL",
    )
    .bind(ticket_id)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_length_and_charset() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens: HashSet<String> = (0..100).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 100);
    }

    #[test]
    fn test_code_shape() {
        let code = generate_code();
        assert_eq!(code.len(), 9);
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 2);
        for part in parts {
            assert_eq!(part.len(), 4);
            // No visually ambiguous characters.
            assert!(part.chars().all(|c| !"0O1IL".contains(c)));
        }
    }

    #[test]
    fn test_mask_code_keeps_edges() {
        assert_eq!(mask_code("ABCD-1234"), "AB**-**34");
        assert_eq!(mask_code("WXYZ9876"), "WX****76");
    }

    #[test]
    fn test_hash_is_stable_and_hex() {
        let h = hash_secret("ABCD-1234");
        assert_eq!(h, hash_secret("ABCD-1234"));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_secret_matches() {
        let stored = hash_secret("ABCD-1234");
        assert!(secret_matches("ABCD-1234", &stored));
        assert!(!secret_matches("ABCD-1235", &stored));
        assert!(!secret_matches("", &stored));
    }
}

//! # munidesk-db
//!
//! PostgreSQL persistence layer for munidesk.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for the document type registry, document
//!   requests, claim tickets, and the append-only audit log
//! - Transaction-scoped helpers (`*_tx`) the lifecycle engine composes
//!   into single units of work
//! - Test fixtures for integration tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use munidesk_db::{create_pool, PgRequestRepository};
//! use munidesk_core::RequestRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool("postgres://localhost/munidesk").await?;
//!     let requests = PgRequestRepository::new(pool);
//!     let request = requests.fetch_by_number("REQ-20260824-0042").await?;
//!     println!("{} is {}", request.request_number, request.status);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod document_types;
pub mod pool;
pub mod requests;
pub mod tickets;

// Test fixtures are always compiled so integration tests (in tests/) of
// this crate and the engine crate can share them.
pub mod test_fixtures;

pub use audit::PgAuditLogRepository;
pub use document_types::PgDocumentTypeRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use requests::PgRequestRepository;
pub use tickets::PgClaimTicketRepository;

// Re-export core types
pub use munidesk_core::*;

/// Embedded migrations for consumers who do not manage schema externally.
#[cfg(feature = "migrations")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

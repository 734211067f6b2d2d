//! # munidesk-engine
//!
//! The document request fulfillment engine: the lifecycle state machine
//! over [`munidesk_db`]'s repositories, plus the claim ticket service that
//! issues, verifies, and redeems pickup credentials.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use munidesk_db::create_pool;
//! use munidesk_engine::{
//!     LifecycleEngine, NullNotifier, StaticArtifactGenerator, TransitionCommand,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = create_pool("postgres://localhost/munidesk").await?;
//!     let engine = LifecycleEngine::new(
//!         pool,
//!         Arc::new(StaticArtifactGenerator),
//!         Arc::new(NullNotifier),
//!     );
//!     let request = engine
//!         .apply(request_id, TransitionCommand::Approve, actor)
//!         .await?;
//!     println!("{} is now {}", request.request_number, request.status);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod lifecycle;
pub mod tickets;

pub use adapters::{NullDirectory, NullNotifier, NullTransport, StaticArtifactGenerator};
pub use lifecycle::{LifecycleEngine, TransitionCommand};
pub use tickets::ClaimTicketService;

pub use munidesk_core::{Error, Result};

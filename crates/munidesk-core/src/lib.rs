//! # munidesk-core
//!
//! Core types, traits, and workflow rules for the munidesk document
//! request fulfillment engine.
//!
//! This crate provides the foundational data structures, the request
//! transition table, and the trait definitions that the persistence and
//! engine crates depend on.

pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;
pub mod workflow;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7};
pub use workflow::{can_edit_content, next_status, notifies, TransitionAction};

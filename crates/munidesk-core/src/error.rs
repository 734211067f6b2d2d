//! Error types for munidesk.

use thiserror::Error;

use crate::models::{DeliveryMethod, RequestStatus};
use crate::workflow::TransitionAction;

/// Result type alias using munidesk's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for fulfillment-engine operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document request not found
    #[error("Request not found: {0}")]
    RequestNotFound(uuid::Uuid),

    /// Document type not found
    #[error("Document type not found: {0}")]
    DocumentTypeNotFound(uuid::Uuid),

    /// The requested edge does not exist in the transition table for the
    /// request's current state and delivery method.
    #[error("Invalid transition: {action} is not legal from {from} for {delivery} delivery")]
    InvalidTransition {
        from: RequestStatus,
        action: TransitionAction,
        delivery: DeliveryMethod,
    },

    /// Claim credential did not match. Deliberately carries no detail:
    /// callers must not learn whether the request exists, the ticket is
    /// missing, expired, locked, or the credential is simply wrong.
    #[error("verification failed")]
    InvalidClaim,

    /// The claim ticket for this request has already been consumed.
    #[error("Claim ticket already redeemed for request {0}")]
    AlreadyRedeemed(uuid::Uuid),

    /// Invalid input or malformed configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external collaborator (artifact generator, ticket transport) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display_names_edge() {
        let err = Error::InvalidTransition {
            from: RequestStatus::Completed,
            action: TransitionAction::Approve,
            delivery: DeliveryMethod::Digital,
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition: approve is not legal from completed for digital delivery"
        );
    }

    #[test]
    fn test_invalid_claim_display_is_generic() {
        // The message shown to callers must not explain the failure.
        assert_eq!(Error::InvalidClaim.to_string(), "verification failed");
    }

    #[test]
    fn test_validation_display() {
        let err = Error::Validation("rejection reason required".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: rejection reason required"
        );
    }
}

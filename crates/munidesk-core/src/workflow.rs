//! The request transition table.
//!
//! Pure decision logic, no I/O: given the current status, the requested
//! action, and the request's delivery method, either the single legal
//! next status or [`Error::InvalidTransition`]. The engine crate applies
//! the result under a row lock; nothing outside this table may set a
//! request status.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{DeliveryMethod, RequestStatus};

/// An administrator (or counter) action against a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    Approve,
    StartProcessing,
    /// Digital branch: produce the artifact and complete the request.
    GenerateArtifact,
    /// Pickup branch: issue (or re-issue) a claim ticket. A self-edge on
    /// Processing; the status does not change but the action has side
    /// effects and is audited.
    IssueTicket,
    /// Pickup branch: artifact is at the counter, awaiting redemption.
    MarkReady,
    /// Pickup branch: consume the claim ticket and release the artifact.
    RedeemTicket,
    Reject,
}

impl std::fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::StartProcessing => write!(f, "start_processing"),
            Self::GenerateArtifact => write!(f, "generate_artifact"),
            Self::IssueTicket => write!(f, "issue_ticket"),
            Self::MarkReady => write!(f, "mark_ready"),
            Self::RedeemTicket => write!(f, "redeem_ticket"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Resolve the next status for `action` from `from` under `delivery`.
///
/// Exactly the edges of the transition table; everything else is
/// [`Error::InvalidTransition`]. Re-applying an already-applied transition
/// fails the same way: the workflow is deliberately not idempotent because
/// transitions carry side effects (ticket issuance, artifact generation)
/// that must not repeat implicitly.
pub fn next_status(
    from: RequestStatus,
    action: TransitionAction,
    delivery: DeliveryMethod,
) -> Result<RequestStatus> {
    use DeliveryMethod::*;
    use RequestStatus::*;
    use TransitionAction::*;

    let to = match (from, action, delivery) {
        (Pending, Approve, _) => Approved,
        (Approved, StartProcessing, _) => Processing,
        (Processing, GenerateArtifact, Digital) => Completed,
        (Processing, IssueTicket, Pickup) => Processing,
        (Processing, MarkReady, Pickup) => Ready,
        (Ready, RedeemTicket, Pickup) => PickedUp,
        (Pending | Approved | Processing, Reject, _) => Rejected,
        _ => {
            return Err(Error::InvalidTransition {
                from,
                action,
                delivery,
            })
        }
    };
    Ok(to)
}

/// Whether resident-supplied content may still be edited (as an overlay)
/// in the given status. Edits are legal only while the request is being
/// processed, before the artifact exists or the ticket window opens.
pub fn can_edit_content(status: RequestStatus) -> bool {
    status == RequestStatus::Processing
}

/// Whether a successful `action` informs the notification dispatcher.
pub fn notifies(action: TransitionAction) -> bool {
    matches!(
        action,
        TransitionAction::Approve
            | TransitionAction::MarkReady
            | TransitionAction::Reject
            | TransitionAction::RedeemTicket
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeliveryMethod::*;
    use RequestStatus::*;
    use TransitionAction::*;

    const ALL_STATUSES: [RequestStatus; 7] = [
        Pending, Approved, Processing, Ready, Completed, PickedUp, Rejected,
    ];
    const ALL_ACTIONS: [TransitionAction; 7] = [
        Approve,
        StartProcessing,
        GenerateArtifact,
        IssueTicket,
        MarkReady,
        RedeemTicket,
        Reject,
    ];

    #[test]
    fn test_digital_happy_path() {
        assert_eq!(next_status(Pending, Approve, Digital).unwrap(), Approved);
        assert_eq!(
            next_status(Approved, StartProcessing, Digital).unwrap(),
            Processing
        );
        assert_eq!(
            next_status(Processing, GenerateArtifact, Digital).unwrap(),
            Completed
        );
    }

    #[test]
    fn test_pickup_happy_path() {
        assert_eq!(next_status(Pending, Approve, Pickup).unwrap(), Approved);
        assert_eq!(
            next_status(Approved, StartProcessing, Pickup).unwrap(),
            Processing
        );
        // Issuing a ticket keeps the request in processing.
        assert_eq!(
            next_status(Processing, IssueTicket, Pickup).unwrap(),
            Processing
        );
        assert_eq!(next_status(Processing, MarkReady, Pickup).unwrap(), Ready);
        assert_eq!(next_status(Ready, RedeemTicket, Pickup).unwrap(), PickedUp);
    }

    #[test]
    fn test_branches_do_not_cross() {
        // A pickup request never completes via artifact generation.
        assert!(next_status(Processing, GenerateArtifact, Pickup).is_err());
        // A digital request never acquires a ticket or a ready state.
        assert!(next_status(Processing, IssueTicket, Digital).is_err());
        assert!(next_status(Processing, MarkReady, Digital).is_err());
        assert!(next_status(Ready, RedeemTicket, Digital).is_err());
    }

    #[test]
    fn test_reject_reachable_only_from_early_states() {
        for delivery in [Digital, Pickup] {
            assert_eq!(next_status(Pending, Reject, delivery).unwrap(), Rejected);
            assert_eq!(next_status(Approved, Reject, delivery).unwrap(), Rejected);
            assert_eq!(
                next_status(Processing, Reject, delivery).unwrap(),
                Rejected
            );
            assert!(next_status(Ready, Reject, delivery).is_err());
            assert!(next_status(Completed, Reject, delivery).is_err());
            assert!(next_status(PickedUp, Reject, delivery).is_err());
            assert!(next_status(Rejected, Reject, delivery).is_err());
        }
    }

    #[test]
    fn test_reapplying_a_transition_is_an_error() {
        // The workflow is not idempotent: approving twice fails.
        assert!(next_status(Approved, Approve, Pickup).is_err());
        assert!(next_status(Processing, StartProcessing, Pickup).is_err());
        assert!(next_status(PickedUp, RedeemTicket, Pickup).is_err());
        assert!(next_status(Completed, GenerateArtifact, Digital).is_err());
    }

    #[test]
    fn test_terminal_states_admit_nothing() {
        for status in [Completed, PickedUp, Rejected] {
            for action in ALL_ACTIONS {
                for delivery in [Digital, Pickup] {
                    assert!(
                        next_status(status, action, delivery).is_err(),
                        "{status} should admit no transitions, but {action} succeeded"
                    );
                }
            }
        }
    }

    #[test]
    fn test_every_edge_matches_the_table() {
        // Enumerate the full space and pin down exactly the legal edges.
        let legal = |from, action, delivery| {
            matches!(
                (from, action, delivery),
                (Pending, Approve, _)
                    | (Approved, StartProcessing, _)
                    | (Processing, GenerateArtifact, Digital)
                    | (Processing, IssueTicket, Pickup)
                    | (Processing, MarkReady, Pickup)
                    | (Ready, RedeemTicket, Pickup)
                    | (Pending | Approved | Processing, Reject, _)
            )
        };
        for from in ALL_STATUSES {
            for action in ALL_ACTIONS {
                for delivery in [Digital, Pickup] {
                    assert_eq!(
                        next_status(from, action, delivery).is_ok(),
                        legal(from, action, delivery),
                        "edge ({from}, {action}, {delivery}) disagrees with the table"
                    );
                }
            }
        }
    }

    #[test]
    fn test_edit_window() {
        assert!(can_edit_content(Processing));
        for status in [Pending, Approved, Ready, Completed, PickedUp, Rejected] {
            assert!(!can_edit_content(status));
        }
    }

    #[test]
    fn test_notifying_actions() {
        assert!(notifies(Approve));
        assert!(notifies(MarkReady));
        assert!(notifies(Reject));
        assert!(notifies(RedeemTicket));
        assert!(!notifies(StartProcessing));
        assert!(!notifies(IssueTicket));
        assert!(!notifies(GenerateArtifact));
    }
}

//! Structured logging schema and field name constants for munidesk.
//!
//! All crates use these constants for consistent structured logging
//! fields, so log aggregation tools can query by standardized field names
//! across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue (failed verification, dropped notification) |
//! | INFO  | Transitions, issuance, redemption, registry changes |
//! | DEBUG | Decision points, precondition checks |
//! | TRACE | Per-row detail |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "engine", "tickets", "db", "audit"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "lifecycle", "pool", "registry"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "apply", "issue", "verify", "redeem"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Document request UUID being operated on.
pub const REQUEST_ID: &str = "request_id";

/// Human-facing request number.
pub const REQUEST_NUMBER: &str = "request_number";

/// Document type UUID.
pub const DOCUMENT_TYPE_ID: &str = "document_type_id";

/// Claim ticket UUID.
pub const TICKET_ID: &str = "ticket_id";

/// Actor UUID performing the operation.
pub const ACTOR_ID: &str = "actor_id";

/// Actor role string.
pub const ACTOR_ROLE: &str = "actor_role";

// ─── Workflow fields ───────────────────────────────────────────────────────

/// Transition action name.
pub const ACTION: &str = "action";

/// Status before a transition.
pub const FROM_STATUS: &str = "from_status";

/// Status after a transition.
pub const TO_STATUS: &str = "to_status";

/// Delivery method of the request.
pub const DELIVERY_METHOD: &str = "delivery_method";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows or results returned.
pub const RESULT_COUNT: &str = "result_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

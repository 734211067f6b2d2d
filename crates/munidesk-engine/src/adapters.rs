//! No-op collaborator implementations.
//!
//! Deployments wire real implementations (PDF renderers, SMS or email
//! gateways, QR transports) behind the core traits; these stand in for
//! them in tests and in installations that have not configured one.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use munidesk_core::{
    ArtifactGenerator, DocumentRequest, NotificationDispatcher, RequestNotification,
    RequesterDirectory, Result, TicketTransport,
};

/// Produces a deterministic artifact reference without rendering anything.
#[derive(Debug, Default, Clone)]
pub struct StaticArtifactGenerator;

#[async_trait]
impl ArtifactGenerator for StaticArtifactGenerator {
    async fn generate(&self, request: &DocumentRequest) -> Result<String> {
        Ok(format!("artifact://{}/{}", request.request_number, request.id))
    }
}

/// Swallows notifications, logging them at debug level.
#[derive(Debug, Default, Clone)]
pub struct NullNotifier;

#[async_trait]
impl NotificationDispatcher for NullNotifier {
    async fn notify(&self, event: RequestNotification) -> Result<()> {
        debug!(
            subsystem = "engine",
            component = "null_notifier",
            request_id = %event.request_id,
            to_status = %event.status,
            "Notification dropped (no dispatcher configured)"
        );
        Ok(())
    }
}

/// Discards issued credentials. The secrets still reach the caller of
/// `issue` through the returned [`IssuedTicket`](munidesk_core::IssuedTicket).
#[derive(Debug, Default, Clone)]
pub struct NullTransport;

#[async_trait]
impl TicketTransport for NullTransport {
    async fn deliver(&self, request: &DocumentRequest, _token: &str, _code: &str) -> Result<()> {
        debug!(
            subsystem = "engine",
            component = "null_transport",
            request_id = %request.id,
            "Ticket delivery skipped (no transport configured)"
        );
        Ok(())
    }
}

/// Knows nobody. Callers fall back to showing the bare requester id.
#[derive(Debug, Default, Clone)]
pub struct NullDirectory;

#[async_trait]
impl RequesterDirectory for NullDirectory {
    async fn display_name(&self, _requester_id: Uuid) -> Result<Option<String>> {
        Ok(None)
    }
}

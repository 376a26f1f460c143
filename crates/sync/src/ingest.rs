//! Webhook ingestion: verify, route, acknowledge, enqueue.
//!
//! Ordering matters here — platforms retry aggressively when the response
//! is slow, so the HTTP surface answers as soon as the decision is made and
//! the enqueue happens on a detached task.

use crate::context::SyncContext;
use crate::jobs::WebhookJobData;
use crate::queues;
use channelsync_core::jobs::{JobQueue, QueueSpec, QueuedJob};
use channelsync_core::ErrorCode;
use channelsync_platforms::types::WebhookHeaders;
use channelsync_catalog::model::PlatformType;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the HTTP surface should answer, decided before any queue work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// 200 — event accepted; processing is asynchronous.
    Accepted,
    /// 200 — connection is disabled; acknowledged and dropped.
    Disabled,
    /// 401 — signature verification failed.
    SignatureRejected,
    /// 400 — malformed payload or no owning connection.
    Rejected,
}

pub struct WebhookIngestor {
    context: Arc<SyncContext>,
    queue: Arc<dyn JobQueue>,
    webhook_spec: QueueSpec,
}

impl WebhookIngestor {
    pub fn new(
        context: Arc<SyncContext>,
        queue: Arc<dyn JobQueue>,
        webhook_spec: QueueSpec,
    ) -> Self {
        debug_assert_eq!(webhook_spec.name, queues::WEBHOOK_PROCESSING);
        Self {
            context,
            queue,
            webhook_spec,
        }
    }

    /// Decide the response for a raw webhook and, when accepted, enqueue
    /// the normalized event on a detached task so the caller can answer
    /// immediately.
    pub async fn ingest(
        &self,
        platform_type: PlatformType,
        raw_body: &[u8],
        headers: &WebhookHeaders,
    ) -> IngestOutcome {
        let Some(adapter) = self.context.adapters.get(platform_type) else {
            warn!(%platform_type, "webhook for unregistered platform");
            return IngestOutcome::Rejected;
        };

        // 1. Signature first; nothing else runs on an unverified body.
        if let Err(err) = adapter.verify_webhook(raw_body, headers) {
            if err.code == ErrorCode::WebhookSignatureInvalid {
                warn!(%platform_type, "webhook signature rejected");
                return IngestOutcome::SignatureRejected;
            }
            warn!(%platform_type, error = %err, "webhook verification errored");
            return IngestOutcome::Rejected;
        }

        // 2. Identify the owning connection.
        let Ok((locator, value)) = adapter.connection_locator(raw_body, headers) else {
            return IngestOutcome::Rejected;
        };
        let connections = match self
            .context
            .store
            .find_connections_by_locator(platform_type, locator, &value)
            .await
        {
            Ok(connections) => connections,
            Err(err) => {
                warn!(%platform_type, error = %err, "connection lookup failed");
                return IngestOutcome::Rejected;
            }
        };
        let Some(connection) = connections.first().cloned() else {
            debug!(%platform_type, locator_value = %value, "no connection for webhook");
            return IngestOutcome::Rejected;
        };
        if connections.len() > 1 {
            warn!(
                %platform_type,
                locator_value = %value,
                count = connections.len(),
                "multiple connections match webhook; using the oldest"
            );
        }

        if !connection.is_enabled {
            return IngestOutcome::Disabled;
        }

        // 3. Normalize the event; a payload the adapter cannot parse is a
        // client error, not a retryable one.
        let event = match adapter.parse_webhook(raw_body, headers) {
            Ok(event) => event,
            Err(err) => {
                warn!(%platform_type, error = %err, "webhook payload rejected");
                return IngestOutcome::Rejected;
            }
        };

        // 4. Acknowledge now, enqueue on a detached task.
        let data = WebhookJobData {
            connection_id: connection.id,
            user_id: connection.user_id,
            platform_type,
            event,
        };
        let queue = Arc::clone(&self.queue);
        let spec = self.webhook_spec.clone();
        tokio::spawn(async move {
            let payload = match serde_json::to_value(&data) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to serialize webhook job");
                    return;
                }
            };
            let job = QueuedJob::new("webhook-event", payload, spec.max_attempts);
            if let Err(err) = queue.enqueue(&spec, job).await {
                warn!(error = %err, "failed to enqueue webhook job");
            }
        });

        IngestOutcome::Accepted
    }
}

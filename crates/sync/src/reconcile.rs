//! Reconciliation: re-scan a syncing connection and regenerate mapping
//! suggestions without touching the canonical catalog.
//!
//! Once a connection is confirmed, the canonical store is the source of
//! truth; drift detection and remediation go through the suggestions the
//! user reviews, not through silent re-persistence.

use crate::context::SyncContext;
use crate::scan::platform_variant_summaries;
use channelsync_catalog::mapper::suggest::SuggestionEngine;
use channelsync_catalog::model::ConnectionStatus;
use channelsync_core::activity::events;
use channelsync_core::jobs::JobContext;
use channelsync_core::{Error, ErrorCode, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ReconciliationProcessor {
    context: Arc<SyncContext>,
}

impl ReconciliationProcessor {
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self { context }
    }

    pub async fn run(&self, connection_id: Uuid, user_id: Uuid, job: &JobContext) -> Result<()> {
        match self.run_pipeline(connection_id, user_id, job).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(%connection_id, error = %err, "reconciliation failed");
                let _ = self
                    .context
                    .store
                    .update_connection_status(connection_id, ConnectionStatus::Error)
                    .await;
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        job: &JobContext,
    ) -> Result<()> {
        let connection = self
            .context
            .store
            .get_connection(user_id, connection_id)
            .await?
            .ok_or_else(|| {
                Error::new(
                    ErrorCode::ResourceNotFound,
                    "connection not found for the calling user",
                )
            })?;

        self.context
            .store
            .update_connection_status(connection_id, ConnectionStatus::Reconciling)
            .await?;

        job.report_progress(10, "fetching catalog from platform").await;
        let credentials = self.context.credentials(&connection)?;
        let adapter = self.context.adapter_for(&connection)?;
        let fetched = adapter.fetch_all(&connection, &credentials).await?;
        job.report_progress(50, "catalog fetched").await;

        // Regenerate suggestions against the current canonical state; the
        // previous suggestion set is overwritten wholesale.
        let summaries = platform_variant_summaries(&fetched.products);
        let canonical_variants = self.context.store.get_variants_for_user(user_id).await?;
        let suggestions = SuggestionEngine::default().suggest(&summaries, &canonical_variants);
        let suggestion_count = suggestions.len();

        self.context
            .store
            .patch_connection_data(
                connection_id,
                serde_json::json!({
                    "mappingSuggestions": suggestions,
                    "lastReconciliationAt": Utc::now(),
                }),
            )
            .await?;

        self.context
            .store
            .update_connection_status(connection_id, ConnectionStatus::NeedsReview)
            .await?;
        job.report_progress(100, "reconciliation complete").await;

        info!(%connection_id, suggestions = suggestion_count, "reconciliation complete");
        self.context
            .activity
            .success(
                user_id,
                "PlatformConnection",
                connection_id,
                events::RECONCILIATION_COMPLETED,
                "reconciliation complete",
                serde_json::json!({ "suggestionCount": suggestion_count }),
            )
            .await;

        Ok(())
    }
}

use super::entry::{ActivityEntry, ActivityStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Storage backend for activity entries.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn record(&self, entry: ActivityEntry) -> Result<()>;
}

/// High-level activity logger.
///
/// Mirrors every entry into structured logging and forwards it to the
/// configured sink. Sink failures are logged and swallowed: the activity
/// log is an audit trail, and a broken trail must never fail the sync
/// operation it describes.
#[derive(Clone)]
pub struct ActivityLogger {
    sink: Arc<dyn ActivitySink>,
}

impl ActivityLogger {
    pub fn new(sink: Arc<dyn ActivitySink>) -> Self {
        Self { sink }
    }

    pub async fn log(&self, entry: ActivityEntry) {
        match entry.status {
            ActivityStatus::Success | ActivityStatus::Info => {
                info!(
                    user_id = %entry.user_id,
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    event_type = %entry.event_type,
                    message = %entry.message,
                    "activity"
                );
            }
            ActivityStatus::Warning => {
                warn!(
                    user_id = %entry.user_id,
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    event_type = %entry.event_type,
                    message = %entry.message,
                    "activity"
                );
            }
            ActivityStatus::Error => {
                error!(
                    user_id = %entry.user_id,
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    event_type = %entry.event_type,
                    message = %entry.message,
                    "activity"
                );
            }
        }

        if let Err(err) = self.sink.record(entry).await {
            error!(error = %err, "failed to persist activity entry");
        }
    }

    pub async fn success(
        &self,
        user_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        event_type: &str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) {
        self.log(
            ActivityEntry::new(
                user_id,
                entity_type,
                entity_id,
                event_type,
                ActivityStatus::Success,
                message,
            )
            .with_details(details),
        )
        .await;
    }

    pub async fn warning(
        &self,
        user_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        event_type: &str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) {
        self.log(
            ActivityEntry::new(
                user_id,
                entity_type,
                entity_id,
                event_type,
                ActivityStatus::Warning,
                message,
            )
            .with_details(details),
        )
        .await;
    }

    pub async fn error(
        &self,
        user_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        event_type: &str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) {
        self.log(
            ActivityEntry::new(
                user_id,
                entity_type,
                entity_id,
                event_type,
                ActivityStatus::Error,
                message,
            )
            .with_details(details),
        )
        .await;
    }
}

/// Sink that drops entries after the tracing mirror. Used in tests and
/// tooling contexts with no database.
pub struct NullActivitySink;

#[async_trait]
impl ActivitySink for NullActivitySink {
    async fn record(&self, _entry: ActivityEntry) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct CollectingSink {
        entries: Mutex<Vec<ActivityEntry>>,
    }

    #[async_trait]
    impl ActivitySink for CollectingSink {
        async fn record(&self, entry: ActivityEntry) -> Result<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }
    }

    #[tokio::test]
    async fn logger_forwards_entries_to_sink() {
        let sink = Arc::new(CollectingSink {
            entries: Mutex::new(Vec::new()),
        });
        let logger = ActivityLogger::new(Arc::clone(&sink) as Arc<dyn ActivitySink>);

        let user = Uuid::new_v4();
        let entity = Uuid::new_v4();
        logger
            .warning(
                user,
                "ProductVariant",
                entity,
                "INVENTORY_PUSH_SKIPPED",
                "no mapping for connection",
                serde_json::json!({"connection_id": "c-1"}),
            )
            .await;

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ActivityStatus::Warning);
        assert_eq!(entries[0].event_type, "INVENTORY_PUSH_SKIPPED");
    }
}

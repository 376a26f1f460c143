use channelsync_core::jobs::{JobQueue, QueueSpec};
use channelsync_core::{Config, DatabasePool};
use channelsync_sync::{PushCoordinator, SyncContext, WebhookIngestor};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DatabasePool,
    pub sync: Arc<SyncContext>,
    pub queue: Arc<dyn JobQueue>,
    pub coordinator: Arc<PushCoordinator>,
    pub ingestor: Arc<WebhookIngestor>,
    pub scan_spec: QueueSpec,
    pub reconciliation_spec: QueueSpec,
}

//! Job payloads and the handlers that bind processors to the queue
//! runtime.
//!
//! Every handler classifies errors at its boundary: retryable codes become
//! `JobResult::Retry` for the runtime's backoff, everything else
//! dead-letters. Idempotency lives in the processors, not here.

use crate::context::SyncContext;
use crate::push::PushCoordinator;
use crate::queues;
use crate::reconcile::ReconciliationProcessor;
use crate::scan::InitialScanProcessor;
use crate::webhook::WebhookProcessor;
use async_trait::async_trait;
use channelsync_catalog::model::PlatformType;
use channelsync_core::config::QueueOverrides;
use channelsync_core::jobs::{JobContext, JobExecutor, JobHandler, JobQueue, JobResult};
use channelsync_core::Error;
use channelsync_platforms::types::WebhookEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Job type names on the `push-operations` queue.
pub mod push_job_types {
    pub const PRODUCT_CREATE: &str = "product-create";
    pub const PRODUCT_UPDATE: &str = "product-update";
    pub const PRODUCT_DELETE: &str = "product-delete";
    pub const INVENTORY_UPDATE: &str = "inventory-update";
}

/// Payload for scan and reconciliation jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJobData {
    pub connection_id: Uuid,
    pub user_id: Uuid,
}

/// Payload for push jobs; `entity_id` is a product or variant id depending
/// on the job type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushJobData {
    pub user_id: Uuid,
    pub entity_id: Uuid,
}

/// Payload for webhook processing jobs: the normalized event plus routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookJobData {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub platform_type: PlatformType,
    pub event: WebhookEvent,
}

fn classify(err: Error) -> JobResult {
    if err.is_retryable() {
        JobResult::retry(err.to_string())
    } else {
        JobResult::failed(err.to_string())
    }
}

fn bad_payload(err: serde_json::Error) -> JobResult {
    JobResult::failed(format!("undecodable job payload: {}", err))
}

// === Handlers ===

pub struct InitialScanHandler {
    processor: InitialScanProcessor,
}

impl InitialScanHandler {
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self {
            processor: InitialScanProcessor::new(context),
        }
    }
}

#[async_trait]
impl JobHandler for InitialScanHandler {
    fn job_type(&self) -> &'static str {
        "initial-scan"
    }

    async fn handle(&self, job_data: &serde_json::Value, context: &JobContext) -> JobResult {
        let data: ScanJobData = match serde_json::from_value(job_data.clone()) {
            Ok(data) => data,
            Err(err) => return bad_payload(err),
        };

        match self
            .processor
            .run(data.connection_id, data.user_id, context)
            .await
        {
            Ok(_) => JobResult::success(),
            Err(err) => classify(err),
        }
    }
}

pub struct ReconciliationHandler {
    processor: ReconciliationProcessor,
}

impl ReconciliationHandler {
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self {
            processor: ReconciliationProcessor::new(context),
        }
    }
}

#[async_trait]
impl JobHandler for ReconciliationHandler {
    fn job_type(&self) -> &'static str {
        "reconciliation"
    }

    async fn handle(&self, job_data: &serde_json::Value, context: &JobContext) -> JobResult {
        let data: ScanJobData = match serde_json::from_value(job_data.clone()) {
            Ok(data) => data,
            Err(err) => return bad_payload(err),
        };

        match self
            .processor
            .run(data.connection_id, data.user_id, context)
            .await
        {
            Ok(()) => JobResult::success(),
            Err(err) => classify(err),
        }
    }
}

/// One handler per push operation; all four share the coordinator.
pub struct PushHandler {
    coordinator: Arc<PushCoordinator>,
    job_type: &'static str,
}

impl PushHandler {
    pub fn product_create(coordinator: Arc<PushCoordinator>) -> Self {
        Self {
            coordinator,
            job_type: push_job_types::PRODUCT_CREATE,
        }
    }

    pub fn product_update(coordinator: Arc<PushCoordinator>) -> Self {
        Self {
            coordinator,
            job_type: push_job_types::PRODUCT_UPDATE,
        }
    }

    pub fn product_delete(coordinator: Arc<PushCoordinator>) -> Self {
        Self {
            coordinator,
            job_type: push_job_types::PRODUCT_DELETE,
        }
    }

    pub fn inventory_update(coordinator: Arc<PushCoordinator>) -> Self {
        Self {
            coordinator,
            job_type: push_job_types::INVENTORY_UPDATE,
        }
    }
}

#[async_trait]
impl JobHandler for PushHandler {
    fn job_type(&self) -> &'static str {
        self.job_type
    }

    async fn handle(&self, job_data: &serde_json::Value, _context: &JobContext) -> JobResult {
        let data: PushJobData = match serde_json::from_value(job_data.clone()) {
            Ok(data) => data,
            Err(err) => return bad_payload(err),
        };

        let outcome = match self.job_type {
            push_job_types::PRODUCT_CREATE => {
                self.coordinator
                    .execute_product_create(data.user_id, data.entity_id)
                    .await
            }
            push_job_types::PRODUCT_UPDATE => {
                self.coordinator
                    .execute_product_update(data.user_id, data.entity_id)
                    .await
            }
            push_job_types::PRODUCT_DELETE => {
                self.coordinator
                    .execute_product_delete(data.user_id, data.entity_id)
                    .await
            }
            push_job_types::INVENTORY_UPDATE => {
                self.coordinator
                    .execute_inventory_update(data.user_id, data.entity_id)
                    .await
            }
            other => return JobResult::failed(format!("unknown push job type: {}", other)),
        };

        match outcome {
            Ok(()) => JobResult::success(),
            Err(err) => classify(err),
        }
    }
}

pub struct WebhookEventHandler {
    processor: WebhookProcessor,
}

impl WebhookEventHandler {
    pub fn new(context: Arc<SyncContext>, push: Arc<PushCoordinator>) -> Self {
        Self {
            processor: WebhookProcessor::new(context, push),
        }
    }
}

#[async_trait]
impl JobHandler for WebhookEventHandler {
    fn job_type(&self) -> &'static str {
        "webhook-event"
    }

    async fn handle(&self, job_data: &serde_json::Value, _context: &JobContext) -> JobResult {
        let data: WebhookJobData = match serde_json::from_value(job_data.clone()) {
            Ok(data) => data,
            Err(err) => return bad_payload(err),
        };

        match self
            .processor
            .process(data.connection_id, data.user_id, data.event)
            .await
        {
            Ok(()) => JobResult::success(),
            Err(err) => classify(err),
        }
    }
}

/// Build and start one executor per core queue. Returns the executors so
/// the caller owns their shutdown.
pub fn start_workers(
    context: Arc<SyncContext>,
    queue: Arc<dyn JobQueue>,
    coordinator: Arc<PushCoordinator>,
    overrides: &QueueOverrides,
) -> Vec<JobExecutor> {
    let mut executors = Vec::new();

    let mut scan_executor =
        JobExecutor::new(queues::initial_scan_spec(overrides), Arc::clone(&queue));
    scan_executor.register_handler(Arc::new(InitialScanHandler::new(Arc::clone(&context))));
    scan_executor.start();
    executors.push(scan_executor);

    let mut reconcile_executor =
        JobExecutor::new(queues::reconciliation_spec(overrides), Arc::clone(&queue));
    reconcile_executor.register_handler(Arc::new(ReconciliationHandler::new(Arc::clone(
        &context,
    ))));
    reconcile_executor.start();
    executors.push(reconcile_executor);

    let mut push_executor =
        JobExecutor::new(queues::push_operations_spec(overrides), Arc::clone(&queue));
    push_executor.register_handler(Arc::new(PushHandler::product_create(Arc::clone(
        &coordinator,
    ))));
    push_executor.register_handler(Arc::new(PushHandler::product_update(Arc::clone(
        &coordinator,
    ))));
    push_executor.register_handler(Arc::new(PushHandler::product_delete(Arc::clone(
        &coordinator,
    ))));
    push_executor.register_handler(Arc::new(PushHandler::inventory_update(Arc::clone(
        &coordinator,
    ))));
    push_executor.start();
    executors.push(push_executor);

    let mut webhook_executor =
        JobExecutor::new(queues::webhook_processing_spec(overrides), Arc::clone(&queue));
    webhook_executor.register_handler(Arc::new(WebhookEventHandler::new(
        Arc::clone(&context),
        coordinator,
    )));
    webhook_executor.start();
    executors.push(webhook_executor);

    executors
}

//! # Sync Core
//!
//! The processors that keep the canonical catalog and the external
//! platforms consistent: the initial scan and reconciliation pipelines, the
//! outbound push coordinator, webhook ingestion and processing, and the job
//! handlers that bind them to the queue runtime.

pub mod context;
pub mod ingest;
pub mod jobs;
pub mod push;
pub mod queues;
pub mod reconcile;
pub mod scan;
pub mod webhook;

pub use context::SyncContext;
pub use ingest::{IngestOutcome, WebhookIngestor};
pub use push::PushCoordinator;
pub use reconcile::ReconciliationProcessor;
pub use scan::InitialScanProcessor;
pub use webhook::WebhookProcessor;

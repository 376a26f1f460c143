//! Queue declarations for the sync core.
//!
//! | queue | concurrency | rate | deadline |
//! |---|---|---|---|
//! | `initial-scan` | 1 | — | 10 min |
//! | `reconciliation` | 1 | — | 10 min |
//! | `push-operations` | 1 | 1 / 60 s | 2 min |
//! | `webhook-processing` | 4 | — | 2 min |
//!
//! `push-operations` is deliberately serialized and throttled: it bounds
//! outbound API pressure and gives per-entity changes a de facto ordering
//! on a single worker.

use channelsync_core::config::QueueOverrides;
use channelsync_core::jobs::QueueSpec;
use std::time::Duration;

pub const INITIAL_SCAN: &str = "initial-scan";
pub const RECONCILIATION: &str = "reconciliation";
pub const PUSH_OPERATIONS: &str = "push-operations";
pub const WEBHOOK_PROCESSING: &str = "webhook-processing";

pub fn initial_scan_spec(overrides: &QueueOverrides) -> QueueSpec {
    QueueSpec::new(INITIAL_SCAN)
        .concurrency(overrides.initial_scan_concurrency.unwrap_or(1))
        .job_timeout(Duration::from_secs(
            overrides.scan_timeout_secs.unwrap_or(600),
        ))
        .stall_timeout(Duration::from_secs(120))
        .max_attempts(3)
}

pub fn reconciliation_spec(overrides: &QueueOverrides) -> QueueSpec {
    QueueSpec::new(RECONCILIATION)
        .concurrency(1)
        .job_timeout(Duration::from_secs(
            overrides.scan_timeout_secs.unwrap_or(600),
        ))
        .stall_timeout(Duration::from_secs(120))
        .max_attempts(3)
}

pub fn push_operations_spec(overrides: &QueueOverrides) -> QueueSpec {
    QueueSpec::new(PUSH_OPERATIONS)
        .concurrency(1)
        .rate_limit(
            1,
            Duration::from_secs(overrides.push_rate_limit_secs.unwrap_or(60)),
        )
        .job_timeout(Duration::from_secs(
            overrides.push_timeout_secs.unwrap_or(120),
        ))
        .stall_timeout(Duration::from_secs(60))
        .max_attempts(5)
}

pub fn webhook_processing_spec(overrides: &QueueOverrides) -> QueueSpec {
    QueueSpec::new(WEBHOOK_PROCESSING)
        .concurrency(overrides.webhook_concurrency.unwrap_or(4))
        .job_timeout(Duration::from_secs(120))
        .stall_timeout(Duration::from_secs(60))
        .max_attempts(3)
}

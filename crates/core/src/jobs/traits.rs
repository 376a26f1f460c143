use super::types::{JobId, JobProgress, JobStatus, QueueSpec, QueuedJob};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Result of a job execution
#[derive(Debug, Clone)]
pub enum JobResult {
    /// Job completed successfully
    Success,
    /// Job failed but can be retried
    Retry {
        error: String,
        delay_seconds: Option<u64>,
    },
    /// Job failed permanently
    Failed { error: String },
}

impl JobResult {
    pub fn success() -> Self {
        Self::Success
    }

    pub fn retry(error: impl Into<String>) -> Self {
        Self::Retry {
            error: error.into(),
            delay_seconds: None,
        }
    }

    pub fn retry_with_delay(error: impl Into<String>, delay_seconds: u64) -> Self {
        Self::Retry {
            error: error.into(),
            delay_seconds: Some(delay_seconds),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success)
    }

    pub fn should_retry(&self) -> bool {
        matches!(self, JobResult::Retry { .. })
    }
}

/// Context provided to job handlers during execution.
///
/// Carries attempt accounting and a progress channel back to the queue so
/// long-running jobs (the scan pipeline) can publish milestones.
pub struct JobContext {
    pub job_id: JobId,
    pub queue: &'static str,
    pub attempt: u32,
    pub max_attempts: u32,
    progress_sink: Option<Arc<dyn ProgressSink>>,
}

impl JobContext {
    pub fn new(job_id: JobId, queue: &'static str, attempt: u32, max_attempts: u32) -> Self {
        Self {
            job_id,
            queue,
            attempt,
            max_attempts,
            progress_sink: None,
        }
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Publish a progress milestone. Failures to record progress never fail
    /// the job itself.
    pub async fn report_progress(&self, percent: u8, description: impl Into<String>) {
        if let Some(sink) = &self.progress_sink {
            let progress = JobProgress::new(percent, description);
            if let Err(err) = sink.record(&self.job_id, progress).await {
                tracing::debug!(job_id = %self.job_id, error = %err, "progress report dropped");
            }
        }
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job_id)
            .field("queue", &self.queue)
            .field("attempt", &self.attempt)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

/// Receiver side of job progress reports.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn record(&self, job_id: &JobId, progress: JobProgress) -> Result<()>;
}

/// Trait for handling specific job types.
///
/// One handler per job type; a queue's worker dispatches on
/// `QueuedJob::job_type`. Handlers must be idempotent — every job in this
/// system is delivered at least once.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Job type this handler processes.
    fn job_type(&self) -> &'static str;

    /// Handle a job execution.
    async fn handle(&self, job_data: &serde_json::Value, context: &JobContext) -> JobResult;
}

/// Trait for job queue implementations
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job on a named queue.
    async fn enqueue(&self, spec: &QueueSpec, job: QueuedJob) -> Result<JobId>;

    /// Dequeue the next ready job, honoring the queue's rate limit.
    /// Returns `None` when the queue is empty or throttled.
    async fn dequeue(&self, spec: &QueueSpec, worker_id: &str) -> Result<Option<QueuedJob>>;

    /// Get job status.
    async fn get_status(&self, spec: &QueueSpec, job_id: &JobId) -> Result<Option<JobStatus>>;

    /// Persist an updated job status and move the job between queue
    /// structures accordingly.
    async fn update_status(&self, spec: &QueueSpec, job_id: &JobId, status: JobStatus)
        -> Result<()>;

    /// Record a progress milestone for a running job.
    async fn record_progress(
        &self,
        spec: &QueueSpec,
        job_id: &JobId,
        progress: JobProgress,
    ) -> Result<()>;

    /// Re-deliver jobs whose workers died mid-run. Returns how many were
    /// recovered.
    async fn recover_stalled(&self, spec: &QueueSpec) -> Result<u32>;

    /// Jobs in the dead-letter list.
    async fn dead_letter_count(&self, spec: &QueueSpec) -> Result<u64>;

    /// Health check.
    async fn health_check(&self) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_result_variants() {
        let success = JobResult::success();
        assert!(success.is_success());
        assert!(!success.should_retry());

        let retry = JobResult::retry("temporary error");
        assert!(!retry.is_success());
        assert!(retry.should_retry());

        let failed = JobResult::failed("permanent error");
        assert!(!failed.is_success());
        assert!(!failed.should_retry());
    }

    #[test]
    fn context_tracks_last_attempt() {
        let context = JobContext::new(JobId::new(), "push-operations", 1, 3);
        assert!(!context.is_last_attempt());

        let context = JobContext::new(JobId::new(), "push-operations", 3, 3);
        assert!(context.is_last_attempt());
    }

    #[tokio::test]
    async fn progress_without_sink_is_a_noop() {
        let context = JobContext::new(JobId::new(), "initial-scan", 1, 3);
        context.report_progress(40, "persisting products").await;
    }
}

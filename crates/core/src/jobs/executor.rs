use super::traits::{JobContext, JobHandler, JobQueue, JobResult, ProgressSink};
use super::types::{retry_delay, JobId, JobProgress, JobState, QueueSpec, QueuedJob};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Worker pool for one named queue.
///
/// Polls the queue, enforces the spec's concurrency with a semaphore, runs
/// each job under its soft deadline, and translates [`JobResult`]s into
/// queue state: completed, retried with exponential backoff, or
/// dead-lettered. Stalled-job recovery runs on every poll so jobs orphaned
/// by a crashed worker re-deliver after the stall timeout.
pub struct JobExecutor {
    spec: QueueSpec,
    queue: Arc<dyn JobQueue>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    worker_id: String,
    poll_interval: Duration,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl JobExecutor {
    pub fn new(spec: QueueSpec, queue: Arc<dyn JobQueue>) -> Self {
        let worker_id = format!("{}-worker-{}", spec.name, uuid::Uuid::new_v4());
        Self {
            spec,
            queue,
            handlers: HashMap::new(),
            worker_id,
            poll_interval: Duration::from_secs(1),
            shutdown_tx: None,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Register a handler for a job type on this queue.
    pub fn register_handler(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type().to_string();
        info!(queue = self.spec.name, %job_type, "registered job handler");
        self.handlers.insert(job_type, handler);
    }

    /// Start the worker loop (non-blocking).
    pub fn start(&mut self) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let spec = self.spec.clone();
        let queue = Arc::clone(&self.queue);
        let handlers = self.handlers.clone();
        let worker_id = self.worker_id.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            Self::worker_loop(spec, queue, handlers, worker_id, poll_interval, shutdown_rx).await;
        });

        info!(queue = self.spec.name, worker_id = %self.worker_id, "job executor started");
    }

    /// Request a graceful stop. In-flight jobs run to completion.
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(()).await;
            info!(queue = self.spec.name, "job executor shutdown signal sent");
        }
    }

    async fn worker_loop(
        spec: QueueSpec,
        queue: Arc<dyn JobQueue>,
        handlers: HashMap<String, Arc<dyn JobHandler>>,
        worker_id: String,
        poll_interval: Duration,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let semaphore = Arc::new(Semaphore::new(spec.concurrency));
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(queue = spec.name, "shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = queue.recover_stalled(&spec).await {
                        error!(queue = spec.name, error = %e, "stalled-job recovery failed");
                    }

                    // Hold a permit before touching the queue so a full
                    // worker pool never consumes (and re-delivers) jobs it
                    // cannot run.
                    let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                        continue;
                    };

                    match queue.dequeue(&spec, &worker_id).await {
                        Ok(Some(job)) => {
                            let spec = spec.clone();
                            let queue = Arc::clone(&queue);
                            let handlers = handlers.clone();

                            tokio::spawn(async move {
                                let _permit = permit;
                                Self::run_job(&spec, queue, &handlers, job).await;
                            });
                        }
                        Ok(None) => {
                            drop(permit);
                        }
                        Err(e) => {
                            drop(permit);
                            error!(queue = spec.name, error = %e, "dequeue failed");
                        }
                    }
                }
            }
        }

        // Drain: wait for all in-flight jobs to release their permits.
        let _ = semaphore.acquire_many(spec.concurrency as u32).await;
        info!(queue = spec.name, "worker loop stopped");
    }

    async fn run_job(
        spec: &QueueSpec,
        queue: Arc<dyn JobQueue>,
        handlers: &HashMap<String, Arc<dyn JobHandler>>,
        job: QueuedJob,
    ) {
        let job_id = job.id.clone();
        debug!(queue = spec.name, job_id = %job_id, job_type = %job.job_type, "executing job");

        let result = match handlers.get(&job.job_type) {
            Some(handler) => {
                let sink: Arc<dyn ProgressSink> = Arc::new(QueueProgressSink {
                    queue: Arc::clone(&queue),
                    spec: spec.clone(),
                });
                let context = JobContext::new(
                    job.id.clone(),
                    spec.name,
                    job.status.attempts_made,
                    job.status.max_attempts,
                )
                .with_progress_sink(sink);

                match timeout(spec.job_timeout, handler.handle(&job.data, &context)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(queue = spec.name, job_id = %job_id, "job exceeded its deadline");
                        JobResult::retry(format!(
                            "job timed out after {}s",
                            spec.job_timeout.as_secs()
                        ))
                    }
                }
            }
            None => {
                error!(queue = spec.name, job_type = %job.job_type, "no handler for job type");
                JobResult::failed(format!("no handler for job type: {}", job.job_type))
            }
        };

        if let Err(e) = Self::apply_result(spec, &queue, &job_id, job, result).await {
            error!(queue = spec.name, job_id = %job_id, error = %e, "failed to persist job result");
        }
    }

    async fn apply_result(
        spec: &QueueSpec,
        queue: &Arc<dyn JobQueue>,
        job_id: &JobId,
        job: QueuedJob,
        result: JobResult,
    ) -> Result<()> {
        let mut status = job.status;

        match result {
            JobResult::Success => {
                status.state = JobState::Completed;
                status.completed_at = Some(Utc::now());
                status.progress = Some(JobProgress::new(100, "completed"));
                debug!(queue = spec.name, job_id = %job_id, "job completed");
            }
            JobResult::Retry {
                error,
                delay_seconds,
            } => {
                if status.can_retry() {
                    let delay = delay_seconds
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| retry_delay(status.attempts_made));
                    status.state = JobState::Retrying;
                    status.last_error = Some(error);
                    status.scheduled_for =
                        Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
                    warn!(
                        queue = spec.name,
                        job_id = %job_id,
                        attempt = status.attempts_made,
                        delay_secs = delay.as_secs(),
                        "job scheduled for retry"
                    );
                } else {
                    status.state = JobState::Dead;
                    status.completed_at = Some(Utc::now());
                    status.last_error = Some(error);
                }
            }
            JobResult::Failed { error } => {
                status.state = JobState::Dead;
                status.completed_at = Some(Utc::now());
                status.last_error = Some(error);
            }
        }

        queue.update_status(spec, job_id, status).await
    }
}

/// Progress sink that writes milestones back onto the job record.
struct QueueProgressSink {
    queue: Arc<dyn JobQueue>,
    spec: QueueSpec,
}

#[async_trait]
impl ProgressSink for QueueProgressSink {
    async fn record(&self, job_id: &JobId, progress: JobProgress) -> Result<()> {
        self.queue.record_progress(&self.spec, job_id, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobStatus;
    use std::sync::Mutex;

    /// In-memory queue good enough to exercise the executor result paths.
    #[derive(Default)]
    struct RecordingQueue {
        statuses: Mutex<Vec<JobStatus>>,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, _spec: &QueueSpec, job: QueuedJob) -> Result<JobId> {
            Ok(job.id)
        }

        async fn dequeue(&self, _spec: &QueueSpec, _worker_id: &str) -> Result<Option<QueuedJob>> {
            Ok(None)
        }

        async fn get_status(&self, _spec: &QueueSpec, _job_id: &JobId) -> Result<Option<JobStatus>> {
            Ok(None)
        }

        async fn update_status(
            &self,
            _spec: &QueueSpec,
            _job_id: &JobId,
            status: JobStatus,
        ) -> Result<()> {
            self.statuses.lock().unwrap().push(status);
            Ok(())
        }

        async fn record_progress(
            &self,
            _spec: &QueueSpec,
            _job_id: &JobId,
            _progress: JobProgress,
        ) -> Result<()> {
            Ok(())
        }

        async fn recover_stalled(&self, _spec: &QueueSpec) -> Result<u32> {
            Ok(0)
        }

        async fn dead_letter_count(&self, _spec: &QueueSpec) -> Result<u64> {
            Ok(0)
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn spec() -> QueueSpec {
        QueueSpec::new("test-queue").max_attempts(3)
    }

    #[tokio::test]
    async fn success_marks_job_completed() {
        let queue = Arc::new(RecordingQueue::default());
        let mut job = QueuedJob::new("noop", serde_json::json!({}), 3);
        job.mark_processing();
        let job_id = job.id.clone();

        JobExecutor::apply_result(
            &spec(),
            &(Arc::clone(&queue) as Arc<dyn JobQueue>),
            &job_id,
            job,
            JobResult::success(),
        )
        .await
        .unwrap();

        let statuses = queue.statuses.lock().unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].state, JobState::Completed);
        assert_eq!(statuses[0].progress.as_ref().unwrap().percent, 100);
    }

    #[tokio::test]
    async fn retry_backs_off_then_dead_letters() {
        let queue = Arc::new(RecordingQueue::default());

        // First attempt: retry budget remains.
        let mut job = QueuedJob::new("flaky", serde_json::json!({}), 2);
        job.mark_processing();
        let job_id = job.id.clone();
        JobExecutor::apply_result(
            &spec(),
            &(Arc::clone(&queue) as Arc<dyn JobQueue>),
            &job_id,
            job,
            JobResult::retry("HTTP 503"),
        )
        .await
        .unwrap();

        // Final attempt: budget exhausted.
        let mut job = QueuedJob::new("flaky", serde_json::json!({}), 2);
        job.mark_processing();
        job.mark_processing();
        let job_id = job.id.clone();
        JobExecutor::apply_result(
            &spec(),
            &(Arc::clone(&queue) as Arc<dyn JobQueue>),
            &job_id,
            job,
            JobResult::retry("HTTP 503 again"),
        )
        .await
        .unwrap();

        let statuses = queue.statuses.lock().unwrap();
        assert_eq!(statuses[0].state, JobState::Retrying);
        assert!(statuses[0].scheduled_for.is_some());
        assert_eq!(statuses[1].state, JobState::Dead);
    }

    #[tokio::test]
    async fn permanent_failure_dead_letters_immediately() {
        let queue = Arc::new(RecordingQueue::default());
        let mut job = QueuedJob::new("bad-input", serde_json::json!({}), 3);
        job.mark_processing();
        let job_id = job.id.clone();

        JobExecutor::apply_result(
            &spec(),
            &(Arc::clone(&queue) as Arc<dyn JobQueue>),
            &job_id,
            job,
            JobResult::failed("missing SKU"),
        )
        .await
        .unwrap();

        let statuses = queue.statuses.lock().unwrap();
        assert_eq!(statuses[0].state, JobState::Dead);
        assert_eq!(statuses[0].last_error.as_deref(), Some("missing SKU"));
    }
}

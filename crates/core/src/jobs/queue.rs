use super::traits::JobQueue;
use super::types::{JobId, JobProgress, JobState, JobStatus, QueueSpec, QueuedJob};
use crate::error::{Error, ErrorCode, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

/// Redis-backed durable job queue.
///
/// One instance serves every named queue; keys are prefixed with the queue
/// name from the [`QueueSpec`]:
///
/// - `{queue}:waiting` — list of job ids ready to run
/// - `{queue}:delayed` — sorted set of job ids scored by due time
/// - `{queue}:processing` — sorted set of in-flight job ids scored by the
///   stall deadline
/// - `{queue}:dead` — dead-letter list
/// - `{queue}:job:{id}` — serialized job payload + status
/// - `{queue}:rate:{window}` — job-start counter for the rate limiter
pub struct RedisJobQueue {
    redis: ConnectionManager,
}

impl RedisJobQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn job_key(spec: &QueueSpec, job_id: &JobId) -> String {
        format!("{}:job:{}", spec.name, job_id.as_str())
    }

    fn waiting_key(spec: &QueueSpec) -> String {
        format!("{}:waiting", spec.name)
    }

    fn delayed_key(spec: &QueueSpec) -> String {
        format!("{}:delayed", spec.name)
    }

    fn processing_key(spec: &QueueSpec) -> String {
        format!("{}:processing", spec.name)
    }

    fn dead_key(spec: &QueueSpec) -> String {
        format!("{}:dead", spec.name)
    }

    /// Store job data in Redis. Jobs are kept for seven days for
    /// inspection, then expire.
    async fn store_job_data(&self, spec: &QueueSpec, job: &QueuedJob) -> Result<()> {
        let mut conn = self.redis.clone();
        let job_json = serde_json::to_string(job)
            .map_err(|e| Error::new(ErrorCode::SerializationError, e.to_string()))?;

        conn.set_ex::<_, _, ()>(Self::job_key(spec, &job.id), job_json, 86400 * 7)
            .await?;
        Ok(())
    }

    /// Load job data from Redis.
    async fn load_job_data(&self, spec: &QueueSpec, job_id: &JobId) -> Result<Option<QueuedJob>> {
        let mut conn = self.redis.clone();
        let job_json: Option<String> = conn.get(Self::job_key(spec, job_id)).await?;

        match job_json {
            Some(json) => {
                let job: QueuedJob = serde_json::from_str(&json)
                    .map_err(|e| Error::new(ErrorCode::SerializationError, e.to_string()))?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Move due delayed jobs into the waiting list.
    async fn promote_delayed(&self, spec: &QueueSpec) -> Result<u32> {
        let mut conn = self.redis.clone();
        let now_timestamp = Utc::now().timestamp();

        let ready: Vec<String> = conn
            .zrangebyscore_limit(Self::delayed_key(spec), 0, now_timestamp, 0, 100)
            .await?;

        let mut moved = 0;
        for job_id_str in ready {
            let job_id = JobId::from_string(job_id_str);

            if let Some(mut job) = self.load_job_data(spec, &job_id).await? {
                let _: u32 = conn.zrem(Self::delayed_key(spec), job_id.as_str()).await?;

                job.status.state = JobState::Queued;
                job.status.scheduled_for = None;

                conn.lpush::<_, _, ()>(Self::waiting_key(spec), job_id.as_str())
                    .await?;
                self.store_job_data(spec, &job).await?;
                moved += 1;
            }
        }

        if moved > 0 {
            debug!(queue = spec.name, moved, "promoted delayed jobs");
        }
        Ok(moved)
    }

    /// Rate limiter: fixed window counter keyed by the window index.
    /// Returns false when the queue has exhausted its allowance for the
    /// current window.
    async fn try_acquire_rate_slot(&self, spec: &QueueSpec) -> Result<bool> {
        let Some(limit) = spec.rate_limit else {
            return Ok(true);
        };

        let mut conn = self.redis.clone();
        let per_secs = limit.per.as_secs().max(1);
        let window = Utc::now().timestamp() / per_secs as i64;
        let key = format!("{}:rate:{}", spec.name, window);

        let count: u32 = conn.incr(&key, 1).await?;
        if count == 1 {
            conn.expire::<_, ()>(&key, (per_secs * 2) as i64).await?;
        }

        if count > limit.max {
            debug!(queue = spec.name, window, "rate limit window exhausted");
            return Ok(false);
        }
        Ok(true)
    }

    /// Return an unconsumed rate slot when the dequeue found no job.
    async fn release_rate_slot(&self, spec: &QueueSpec) -> Result<()> {
        if let Some(limit) = spec.rate_limit {
            let mut conn = self.redis.clone();
            let per_secs = limit.per.as_secs().max(1);
            let window = Utc::now().timestamp() / per_secs as i64;
            let key = format!("{}:rate:{}", spec.name, window);
            let _: i64 = conn.decr(&key, 1).await?;
        }
        Ok(())
    }

    async fn dead_letter(&self, spec: &QueueSpec, job: &mut QueuedJob, error: String) -> Result<()> {
        let mut conn = self.redis.clone();
        job.status.state = JobState::Dead;
        job.status.completed_at = Some(Utc::now());
        job.status.last_error = Some(error);

        let _: u32 = conn
            .zrem(Self::processing_key(spec), job.id.as_str())
            .await?;
        conn.rpush::<_, _, ()>(Self::dead_key(spec), job.id.as_str())
            .await?;
        self.store_job_data(spec, job).await?;

        warn!(queue = spec.name, job_id = %job.id, "job moved to dead-letter list");
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, spec: &QueueSpec, job: QueuedJob) -> Result<JobId> {
        self.store_job_data(spec, &job).await?;

        let mut conn = self.redis.clone();

        if let Some(scheduled_for) = job.status.scheduled_for {
            conn.zadd::<_, _, _, ()>(
                Self::delayed_key(spec),
                job.id.as_str(),
                scheduled_for.timestamp(),
            )
            .await?;
            debug!(queue = spec.name, job_id = %job.id, %scheduled_for, "enqueued delayed job");
        } else {
            conn.lpush::<_, _, ()>(Self::waiting_key(spec), job.id.as_str())
                .await?;
        }

        info!(queue = spec.name, job_id = %job.id, job_type = %job.job_type, "enqueued job");
        Ok(job.id)
    }

    async fn dequeue(&self, spec: &QueueSpec, worker_id: &str) -> Result<Option<QueuedJob>> {
        self.promote_delayed(spec).await?;

        if !self.try_acquire_rate_slot(spec).await? {
            return Ok(None);
        }

        let mut conn = self.redis.clone();
        let job_id_opt: Option<String> = conn.rpop(Self::waiting_key(spec), None).await?;

        let Some(job_id_str) = job_id_opt else {
            self.release_rate_slot(spec).await?;
            return Ok(None);
        };

        let job_id = JobId::from_string(job_id_str);
        let Some(mut job) = self.load_job_data(spec, &job_id).await? else {
            // Payload expired out from under the id; drop it.
            warn!(queue = spec.name, job_id = %job_id, "dequeued id without payload");
            self.release_rate_slot(spec).await?;
            return Ok(None);
        };

        if !job.is_ready_to_run() {
            self.release_rate_slot(spec).await?;
            return Ok(None);
        }

        job.mark_processing();

        let stall_deadline =
            Utc::now() + ChronoDuration::from_std(spec.job_timeout + spec.stall_timeout).unwrap_or(ChronoDuration::seconds(600));
        conn.zadd::<_, _, _, ()>(
            Self::processing_key(spec),
            job_id.as_str(),
            stall_deadline.timestamp(),
        )
        .await?;

        self.store_job_data(spec, &job).await?;

        debug!(queue = spec.name, job_id = %job.id, worker_id, "dequeued job");
        Ok(Some(job))
    }

    async fn get_status(&self, spec: &QueueSpec, job_id: &JobId) -> Result<Option<JobStatus>> {
        Ok(self
            .load_job_data(spec, job_id)
            .await?
            .map(|job| job.status))
    }

    async fn update_status(
        &self,
        spec: &QueueSpec,
        job_id: &JobId,
        status: JobStatus,
    ) -> Result<()> {
        let Some(mut job) = self.load_job_data(spec, job_id).await? else {
            return Ok(());
        };

        let mut conn = self.redis.clone();
        job.status = status;

        match job.status.state {
            JobState::Completed => {
                let _: u32 = conn
                    .zrem(Self::processing_key(spec), job_id.as_str())
                    .await?;
                self.store_job_data(spec, &job).await?;
            }
            JobState::Retrying => {
                let _: u32 = conn
                    .zrem(Self::processing_key(spec), job_id.as_str())
                    .await?;
                let due = job
                    .status
                    .scheduled_for
                    .unwrap_or_else(Utc::now)
                    .timestamp();
                conn.zadd::<_, _, _, ()>(Self::delayed_key(spec), job_id.as_str(), due)
                    .await?;
                self.store_job_data(spec, &job).await?;
            }
            JobState::Dead => {
                let last_error = job
                    .status
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                self.dead_letter(spec, &mut job, last_error).await?;
            }
            JobState::Queued => {
                let _: u32 = conn
                    .zrem(Self::processing_key(spec), job_id.as_str())
                    .await?;
                conn.lpush::<_, _, ()>(Self::waiting_key(spec), job_id.as_str())
                    .await?;
                self.store_job_data(spec, &job).await?;
            }
            JobState::Processing => {
                self.store_job_data(spec, &job).await?;
            }
        }

        Ok(())
    }

    async fn record_progress(
        &self,
        spec: &QueueSpec,
        job_id: &JobId,
        progress: JobProgress,
    ) -> Result<()> {
        if let Some(mut job) = self.load_job_data(spec, job_id).await? {
            job.status.progress = Some(progress);
            self.store_job_data(spec, &job).await?;
        }
        Ok(())
    }

    async fn recover_stalled(&self, spec: &QueueSpec) -> Result<u32> {
        let mut conn = self.redis.clone();
        let now_timestamp = Utc::now().timestamp();

        let stalled: Vec<String> = conn
            .zrangebyscore_limit(Self::processing_key(spec), 0, now_timestamp, 0, 100)
            .await?;

        let mut recovered = 0;
        for job_id_str in stalled {
            let job_id = JobId::from_string(job_id_str);
            let _: u32 = conn
                .zrem(Self::processing_key(spec), job_id.as_str())
                .await?;

            let Some(mut job) = self.load_job_data(spec, &job_id).await? else {
                continue;
            };

            if job.status.can_retry() {
                warn!(queue = spec.name, job_id = %job_id, "re-delivering stalled job");
                job.status.state = JobState::Retrying;
                job.status.scheduled_for = Some(Utc::now());
                self.store_job_data(spec, &job).await?;
                conn.zadd::<_, _, _, ()>(
                    Self::delayed_key(spec),
                    job_id.as_str(),
                    now_timestamp,
                )
                .await?;
                recovered += 1;
            } else {
                self.dead_letter(spec, &mut job, "stalled beyond retry budget".to_string())
                    .await?;
            }
        }

        if recovered > 0 {
            info!(queue = spec.name, recovered, "recovered stalled jobs");
        }
        Ok(recovered)
    }

    async fn dead_letter_count(&self, spec: &QueueSpec) -> Result<u64> {
        let mut conn = self.redis.clone();
        let count: u64 = conn.llen(Self::dead_key(spec)).await?;
        Ok(count)
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.redis.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

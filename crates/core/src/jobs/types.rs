use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current state of a job in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Job is waiting to be picked up by a worker
    Queued,
    /// Job is currently being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed terminally and was moved to the dead-letter list
    Dead,
    /// Job failed but will be retried
    Retrying,
}

/// Progress report published by a running job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobProgress {
    pub percent: u8,
    pub description: String,
}

impl JobProgress {
    pub fn new(percent: u8, description: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            description: description.into(),
        }
    }
}

/// Rate limit for a queue: at most `max` jobs started per `per` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max: u32,
    pub per: Duration,
}

/// Declaration of a named, durable queue.
///
/// Every queue the engine uses is declared once with its concurrency,
/// optional rate limit, per-job soft deadline and retry budget. The worker
/// runtime and the Redis queue both consult the spec; callers only ever
/// reference queues by name.
#[derive(Debug, Clone)]
pub struct QueueSpec {
    /// Queue name, also the Redis key prefix.
    pub name: &'static str,
    /// Max in-flight jobs per worker process.
    pub concurrency: usize,
    /// Optional throttle on job starts.
    pub rate_limit: Option<RateLimit>,
    /// Soft deadline; a job running past it counts as stalled.
    pub job_timeout: Duration,
    /// Attempts before the job is dead-lettered.
    pub max_attempts: u32,
    /// How long after the deadline the runtime waits before re-delivering
    /// a job whose worker died.
    pub stall_timeout: Duration,
}

impl QueueSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            concurrency: 1,
            rate_limit: None,
            job_timeout: Duration::from_secs(120),
            max_attempts: 3,
            stall_timeout: Duration::from_secs(60),
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn rate_limit(mut self, max: u32, per: Duration) -> Self {
        self.rate_limit = Some(RateLimit { max, per });
        self
    }

    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }
}

/// Detailed status information about a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub job_type: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub progress: Option<JobProgress>,
}

impl JobStatus {
    pub fn new(id: JobId, job_type: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            id,
            job_type: job_type.into(),
            state: JobState::Queued,
            created_at: Utc::now(),
            scheduled_for: None,
            started_at: None,
            completed_at: None,
            attempts_made: 0,
            max_attempts,
            last_error: None,
            progress: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Dead)
    }

    pub fn can_retry(&self) -> bool {
        self.attempts_made < self.max_attempts && !self.is_terminal()
    }
}

/// Wrapper for storing jobs in the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    /// Job type name within its queue, e.g. `product-create`.
    pub job_type: String,
    pub data: serde_json::Value,
    pub status: JobStatus,
}

impl QueuedJob {
    pub fn new(job_type: impl Into<String>, data: serde_json::Value, max_attempts: u32) -> Self {
        let id = JobId::new();
        let job_type = job_type.into();
        let status = JobStatus::new(id.clone(), &job_type, max_attempts);
        Self {
            id,
            job_type,
            data,
            status,
        }
    }

    pub fn is_ready_to_run(&self) -> bool {
        match self.status.state {
            JobState::Queued | JobState::Retrying => match self.status.scheduled_for {
                Some(scheduled_for) => Utc::now() >= scheduled_for,
                None => true,
            },
            _ => false,
        }
    }

    pub fn mark_processing(&mut self) {
        self.status.state = JobState::Processing;
        self.status.started_at = Some(Utc::now());
        self.status.attempts_made += 1;
    }
}

/// Exponential backoff delay for a retry attempt, capped at 5 minutes.
pub fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(2_u64.saturating_pow(attempt).min(300))
}

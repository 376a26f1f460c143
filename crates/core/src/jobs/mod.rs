//! # Queue & Worker Runtime
//!
//! Named, durable Redis-backed queues with per-queue concurrency, optional
//! rate limiting, retry with exponential backoff, dead-lettering and
//! stalled-job recovery.
//!
//! A queue is declared once as a [`QueueSpec`]; producers enqueue
//! [`QueuedJob`]s through the [`JobQueue`] trait, and one [`JobExecutor`]
//! per queue dispatches jobs to registered [`JobHandler`]s. Handlers are
//! responsible for idempotency: delivery is at-least-once.

pub mod executor;
pub mod queue;
pub mod traits;
pub mod types;

pub use executor::JobExecutor;
pub use queue::RedisJobQueue;
pub use traits::{JobContext, JobHandler, JobQueue, JobResult, ProgressSink};
pub use types::{JobId, JobProgress, JobState, JobStatus, QueueSpec, QueuedJob, RateLimit};

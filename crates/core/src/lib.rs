pub mod activity;
pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod security;

pub use activity::{ActivityEntry, ActivityLogger, ActivityStatus, PgActivityRepository};
pub use config::{Config, CorsConfig, QueueOverrides};
pub use database::DatabasePool;
pub use error::{Error, ErrorCode, Result};
pub use jobs::{JobExecutor, JobQueue, QueueSpec, RedisJobQueue};
pub use security::CredentialVault;

// Re-export commonly used types from dependencies
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

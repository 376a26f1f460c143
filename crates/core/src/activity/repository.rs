use super::entry::{ActivityEntry, ActivityStatus};
use super::logger::ActivitySink;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed activity sink.
pub struct PgActivityRepository {
    pool: PgPool,
}

impl PgActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Recent entries for a user, newest first.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ActivityEntry>> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            "SELECT id, user_id, entity_type, entity_id, event_type, status, message, details, timestamp
             FROM activity_log WHERE user_id = $1 ORDER BY timestamp DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries for one entity within a time range, oldest first.
    pub async fn list_for_entity(
        &self,
        user_id: Uuid,
        entity_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEntry>> {
        let entries = sqlx::query_as::<_, ActivityEntry>(
            "SELECT id, user_id, entity_type, entity_id, event_type, status, message, details, timestamp
             FROM activity_log
             WHERE user_id = $1 AND entity_id = $2 AND timestamp >= $3
             ORDER BY timestamp ASC",
        )
        .bind(user_id)
        .bind(entity_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Count of error entries for a user since a point in time.
    pub async fn error_count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM activity_log
             WHERE user_id = $1 AND status = $2 AND timestamp >= $3",
        )
        .bind(user_id)
        .bind(ActivityStatus::Error)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}

#[async_trait]
impl ActivitySink for PgActivityRepository {
    async fn record(&self, entry: ActivityEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO activity_log
             (id, user_id, entity_type, entity_id, event_type, status, message, details, timestamp)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.event_type)
        .bind(entry.status)
        .bind(&entry.message)
        .bind(&entry.details)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

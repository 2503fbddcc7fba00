//! SQLite implementation of the EventStore trait.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_uuid};
use crate::domain::models::{MergeCompletedEvent, MergeStrategyType};
use crate::services::event_bus::{EventId, PublishedEvent, SequenceNumber};
use crate::services::event_store::{EventQuery, EventStore, EventStoreError};

/// SQLite-backed store of merge completion events.
#[derive(Clone)]
pub struct SqliteEventRepository {
    pool: SqlitePool,
}

impl SqliteEventRepository {
    /// Store events in the pool's `merge_events` table.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_event(&self, row: EventRow) -> Result<PublishedEvent, EventStoreError> {
        let invalid = |e: crate::domain::errors::DomainError| EventStoreError::SerializationError(e.to_string());

        let retired_launch_ids: Vec<String> = serde_json::from_str(&row.retired_launch_ids)
            .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;
        let strategy = MergeStrategyType::parse(&row.strategy).map_err(invalid)?;

        Ok(PublishedEvent {
            id: EventId(parse_uuid(&row.id).map_err(invalid)?),
            sequence: SequenceNumber(row.sequence as u64),
            timestamp: parse_datetime(&row.timestamp).map_err(invalid)?,
            payload: MergeCompletedEvent {
                result_launch_id: parse_uuid(&row.result_launch_id).map_err(invalid)?,
                retired_launch_ids: retired_launch_ids
                    .iter()
                    .map(|s| parse_uuid(s))
                    .collect::<Result<_, _>>()
                    .map_err(invalid)?,
                strategy,
                merged_items: row.merged_items as usize,
                completed_at: parse_datetime(&row.completed_at).map_err(invalid)?,
            },
        })
    }
}

#[async_trait]
impl EventStore for SqliteEventRepository {
    async fn append(&self, event: &PublishedEvent) -> Result<(), EventStoreError> {
        let retired_json = serde_json::to_string(&event.payload.retired_launch_ids)
            .map_err(|e| EventStoreError::SerializationError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO merge_events (id, sequence, timestamp, result_launch_id, retired_launch_ids,
                                      strategy, merged_items, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.0.to_string())
        .bind(event.sequence.0 as i64)
        .bind(format_datetime(&event.timestamp))
        .bind(event.payload.result_launch_id.to_string())
        .bind(retired_json)
        .bind(event.payload.strategy.as_str())
        .bind(event.payload.merged_items as i64)
        .bind(format_datetime(&event.payload.completed_at))
        .execute(&self.pool)
        .await
        .map_err(|e| EventStoreError::AppendError(e.to_string()))?;

        Ok(())
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<PublishedEvent>, EventStoreError> {
        let mut sql = String::from(
            "SELECT id, sequence, timestamp, result_launch_id, retired_launch_ids, strategy, merged_items, completed_at \
             FROM merge_events \
             WHERE (?1 IS NULL OR result_launch_id = ?1 OR instr(retired_launch_ids, ?1) > 0) \
               AND (?2 IS NULL OR timestamp >= ?2)",
        );

        if let Some(since) = query.since_sequence {
            sql.push_str(&format!(" AND sequence >= {}", since.0));
        }

        if query.ascending {
            sql.push_str(" ORDER BY sequence ASC");
        } else {
            sql.push_str(" ORDER BY sequence DESC");
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(query.launch_id.map(|id| id.to_string()))
            .bind(query.since_time.as_ref().map(format_datetime))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EventStoreError::QueryError(e.to_string()))?;

        rows.into_iter().map(|row| self.row_to_event(row)).collect()
    }

    async fn latest_sequence(&self) -> Result<Option<SequenceNumber>, EventStoreError> {
        let result: (Option<i64>,) = sqlx::query_as("SELECT MAX(sequence) FROM merge_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EventStoreError::QueryError(e.to_string()))?;

        Ok(result.0.filter(|seq| *seq >= 0).map(|seq| SequenceNumber(seq as u64)))
    }

    async fn count(&self) -> Result<u64, EventStoreError> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM merge_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EventStoreError::QueryError(e.to_string()))?;

        Ok(result.0 as u64)
    }

    async fn prune_older_than(&self, duration: Duration) -> Result<u64, EventStoreError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(duration).unwrap_or_default();

        let result = sqlx::query("DELETE FROM merge_events WHERE timestamp < ?")
            .bind(format_datetime(&cutoff))
            .execute(&self.pool)
            .await
            .map_err(|e| EventStoreError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    sequence: i64,
    timestamp: String,
    result_launch_id: String,
    retired_launch_ids: String,
    strategy: String,
    merged_items: i64,
    completed_at: String,
}

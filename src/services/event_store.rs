//! EventStore trait for merge event persistence.
//!
//! Defines the interface for storing and querying published merge events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::errors::DomainError;

use super::event_bus::{PublishedEvent, SequenceNumber};

/// Error type for EventStore operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Writing an event failed.
    #[error("Failed to append event: {0}")]
    AppendError(String),

    /// Reading events failed.
    #[error("Failed to query events: {0}")]
    QueryError(String),

    /// A stored event could not be decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The backing store failed.
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<EventStoreError> for DomainError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::SerializationError(msg) => DomainError::SerializationError(msg),
            other => DomainError::DatabaseError(other.to_string()),
        }
    }
}

/// Query parameters for event retrieval.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by minimum sequence number (inclusive).
    pub since_sequence: Option<SequenceNumber>,
    /// Only events whose result or retired launches include this launch.
    pub launch_id: Option<Uuid>,
    /// Filter by timestamp (events after this time).
    pub since_time: Option<DateTime<Utc>>,
    /// Maximum number of events to return.
    pub limit: Option<u32>,
    /// Sort order (true = ascending by sequence, false = descending).
    pub ascending: bool,
}

impl EventQuery {
    /// Query matching every event, newest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only events at or after `seq`.
    pub fn since_sequence(mut self, seq: SequenceNumber) -> Self {
        self.since_sequence = Some(seq);
        self
    }

    /// Only events involving launch `id`.
    pub fn launch_id(mut self, id: Uuid) -> Self {
        self.launch_id = Some(id);
        self
    }

    /// Only events published at or after `time`.
    pub fn since_time(mut self, time: DateTime<Utc>) -> Self {
        self.since_time = Some(time);
        self
    }

    /// Return at most `limit` events.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Oldest first.
    pub fn ascending(mut self) -> Self {
        self.ascending = true;
        self
    }

    /// True when `event` passes every filter except the limit.
    pub fn matches(&self, event: &PublishedEvent) -> bool {
        if self.since_sequence.is_some_and(|seq| event.sequence < seq) {
            return false;
        }
        if self.since_time.is_some_and(|since| event.timestamp < since) {
            return false;
        }
        if let Some(launch_id) = self.launch_id {
            let payload = &event.payload;
            if payload.result_launch_id != launch_id && !payload.retired_launch_ids.contains(&launch_id) {
                return false;
            }
        }
        true
    }
}

/// Trait for event persistence implementations.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event to the store.
    async fn append(&self, event: &PublishedEvent) -> Result<(), EventStoreError>;

    /// Query events based on filter criteria.
    async fn query(&self, query: EventQuery) -> Result<Vec<PublishedEvent>, EventStoreError>;

    /// Get the latest sequence number in the store.
    async fn latest_sequence(&self) -> Result<Option<SequenceNumber>, EventStoreError>;

    /// Count total events in the store.
    async fn count(&self) -> Result<u64, EventStoreError>;

    /// Prune events older than the specified duration.
    async fn prune_older_than(&self, duration: Duration) -> Result<u64, EventStoreError>;

    /// Get events since a sequence number (for replay).
    async fn replay_since(&self, sequence: SequenceNumber) -> Result<Vec<PublishedEvent>, EventStoreError> {
        self.query(EventQuery::new().since_sequence(sequence).ascending()).await
    }
}

/// In-memory event store for testing.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: tokio::sync::RwLock<Vec<PublishedEvent>>,
}

impl InMemoryEventStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: &PublishedEvent) -> Result<(), EventStoreError> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(())
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<PublishedEvent>, EventStoreError> {
        let events = self.events.read().await;
        let mut result: Vec<_> = events.iter().filter(|e| query.matches(e)).cloned().collect();

        if query.ascending {
            result.sort_by_key(|e| e.sequence);
        } else {
            result.sort_by_key(|e| std::cmp::Reverse(e.sequence));
        }

        if let Some(limit) = query.limit {
            result.truncate(limit as usize);
        }

        Ok(result)
    }

    async fn latest_sequence(&self) -> Result<Option<SequenceNumber>, EventStoreError> {
        let events = self.events.read().await;
        Ok(events.iter().map(|e| e.sequence).max())
    }

    async fn count(&self) -> Result<u64, EventStoreError> {
        let events = self.events.read().await;
        Ok(events.len() as u64)
    }

    async fn prune_older_than(&self, duration: Duration) -> Result<u64, EventStoreError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(duration).unwrap_or_default();
        let mut events = self.events.write().await;
        let original_len = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        Ok((original_len - events.len()) as u64)
    }
}

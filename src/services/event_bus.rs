//! EventBus service for merge completion events.
//!
//! Provides a broadcast-based event system with sequence numbering and
//! optional persistence. The bus is the default event collaborator of the
//! merge service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::MergeCompletedEvent;
use crate::domain::ports::MergeEventPublisher;

use super::event_store::EventStore;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Fresh random ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Sequence before the first event.
    pub fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A merge completion event as delivered to subscribers and the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedEvent {
    /// Event ID.
    pub id: EventId,
    /// Position in the bus's publication order.
    pub sequence: SequenceNumber,
    /// When the bus published the event.
    pub timestamp: DateTime<Utc>,
    /// The merge that completed.
    pub payload: MergeCompletedEvent,
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
    /// Whether to persist events to storage.
    pub persist_events: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            persist_events: true,
        }
    }
}

/// Central event bus for broadcasting events to multiple consumers.
pub struct EventBus {
    sender: broadcast::Sender<PublishedEvent>,
    sequence: AtomicU64,
    store: Option<Arc<dyn EventStore>>,
    config: EventBusConfig,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
            store: None,
            config,
        }
    }

    /// Add an event store for persistence.
    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Continue numbering after the latest persisted event.
    pub async fn restore_sequence(&self) -> DomainResult<()> {
        if let Some(store) = &self.store {
            if let Some(latest) = store.latest_sequence().await? {
                self.sequence.fetch_max(latest.0 + 1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    /// Publish a merge completion event.
    ///
    /// The event is persisted first when a store is configured; a failing
    /// store is reported and the event is not broadcast.
    pub async fn publish_event(&self, payload: MergeCompletedEvent) -> DomainResult<PublishedEvent> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = PublishedEvent {
            id: EventId::new(),
            sequence: SequenceNumber(seq),
            timestamp: Utc::now(),
            payload,
        };

        if self.config.persist_events {
            if let Some(ref store) = self.store {
                store.append(&event).await?;
            }
        }

        // No subscribers is not an error
        let _ = self.sender.send(event.clone());
        Ok(event)
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Get the event store if configured.
    pub fn store(&self) -> Option<Arc<dyn EventStore>> {
        self.store.clone()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl MergeEventPublisher for EventBus {
    async fn publish(&self, event: &MergeCompletedEvent) -> DomainResult<()> {
        self.publish_event(event.clone()).await.map(|_| ())
    }
}

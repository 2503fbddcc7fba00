//! Shared EventBus factory for CLI commands.
//!
//! Merge completion events are written to the SQLite event store so they
//! can be listed later with `launch-merge event list`.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::adapters::sqlite::SqliteEventRepository;
use crate::services::event_bus::{EventBus, EventBusConfig};
use crate::services::event_store::EventStore;

/// Create an EventBus that persists events to SQLite, numbering new events
/// after the latest stored one.
pub async fn create_persistent_event_bus(pool: SqlitePool) -> Result<Arc<EventBus>> {
    let event_store = Arc::new(SqliteEventRepository::new(pool));
    let bus = EventBus::new(EventBusConfig {
        persist_events: true,
        ..Default::default()
    })
    .with_store(event_store as Arc<dyn EventStore>);
    bus.restore_sequence().await?;
    Ok(Arc::new(bus))
}

//! Per-launch exclusive locks.
//!
//! A merge holds the lock of every launch it reads or writes until it
//! finishes. Locks are taken in ascending launch ID order, so two merges
//! over overlapping launch sets can never deadlock.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Registry of launch locks shared by every merge of one process.
#[derive(Debug, Clone, Default)]
pub struct LaunchLockRegistry {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

/// Held locks of one launch set. Dropping it releases every lock.
#[derive(Debug)]
pub struct LaunchSetGuard {
    launch_ids: Vec<Uuid>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LaunchSetGuard {
    /// Launches held by this guard, sorted.
    pub fn launch_ids(&self) -> &[Uuid] {
        &self.launch_ids
    }
}

impl LaunchLockRegistry {
    /// Registry without any held locks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until every launch in `launch_ids` is free, then lock them all.
    pub async fn acquire(&self, launch_ids: &BTreeSet<Uuid>) -> LaunchSetGuard {
        let handles: Vec<Arc<Mutex<()>>> = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            launch_ids
                .iter()
                .map(|id| Arc::clone(locks.entry(*id).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }

        debug!(launches = launch_ids.len(), "Acquired launch locks");
        LaunchSetGuard {
            launch_ids: launch_ids.iter().copied().collect(),
            _guards: guards,
        }
    }

    /// Number of launches with a live lock entry.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

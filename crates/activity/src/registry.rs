//! Known activities and their on/off state.

use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use harmonyctl_protocol::{Activity, ActivityId};

/// Capacity of the change notification channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// One toggleable activity as seen by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: ActivityId,
    pub label: String,
    pub is_on: bool,
}

#[derive(Debug)]
struct RegistryState {
    records: Vec<ActivityRecord>,
    current: ActivityId,
}

/// Activities loaded once at startup, sorted by label.
///
/// `is_on` only ever changes through [`ActivityRegistry::reconcile`], which
/// keeps at most one record on.
#[derive(Debug)]
pub struct ActivityRegistry {
    state: RwLock<RegistryState>,
    changes: broadcast::Sender<ActivityRecord>,
}

impl ActivityRegistry {
    /// Builds the registry from the hub's activity list and its current
    /// activity.
    ///
    /// The off sentinel and any other non-positive id is not registered.
    pub fn new(activities: Vec<Activity>, current: &ActivityId) -> Self {
        let mut activities = activities;
        // Stable: equal labels keep the hub's order.
        activities.sort_by(|a, b| a.label.cmp(&b.label));

        let records = activities
            .into_iter()
            .filter(|a| a.id.is_registrable())
            .map(|a| ActivityRecord {
                is_on: a.id == *current,
                id: a.id,
                label: a.label,
            })
            .collect();

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(RegistryState {
                records,
                current: current.clone(),
            }),
            changes,
        }
    }

    /// Marks `current` on and everything else off, then notifies every
    /// record, changed or not.
    pub fn reconcile(&self, current: &ActivityId) {
        let snapshot = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.current = current.clone();
            for record in &mut state.records {
                record.is_on = record.id == *current;
            }
            state.records.clone()
        };

        debug!(activity = %current, "reconciled activity state");
        for record in snapshot {
            // No subscribers is fine.
            let _ = self.changes.send(record);
        }
    }

    /// Snapshot of all records in display order.
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.read(|state| state.records.clone())
    }

    pub fn record(&self, id: &ActivityId) -> Option<ActivityRecord> {
        self.read(|state| state.records.iter().find(|r| r.id == *id).cloned())
    }

    /// Last known or assumed current activity, possibly the off sentinel.
    pub fn current(&self) -> ActivityId {
        self.read(|state| state.current.clone())
    }

    /// Registered activities in display order.
    pub fn activities(&self) -> Vec<Activity> {
        self.read(|state| {
            state
                .records
                .iter()
                .map(|r| Activity::new(r.id.clone(), r.label.clone()))
                .collect()
        })
    }

    /// Receives one notification per record per reconcile.
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityRecord> {
        self.changes.subscribe()
    }

    fn read<T>(&self, f: impl FnOnce(&RegistryState) -> T) -> T {
        f(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }
}

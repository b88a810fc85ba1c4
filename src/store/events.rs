use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::feature::FeatureId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

impl ChangeKind {
    /// Event name used when forwarding to a named-event emitter.
    pub fn event_name(&self) -> &'static str {
        match self {
            ChangeKind::Added => "records_added",
            ChangeKind::Updated => "records_updated",
            ChangeKind::Removed => "records_removed",
        }
    }
}

/// One store mutation, as seen by listeners.
///
/// `ids` lists the affected identifiers and is empty for collections
/// without identity; `count` is always the number of records affected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub type_name: String,
    pub ids: BTreeSet<FeatureId>,
    pub count: usize,
}

impl ChangeEvent {
    pub(crate) fn with_ids(kind: ChangeKind, type_name: &str, ids: BTreeSet<FeatureId>) -> Self {
        let count = ids.len();
        Self {
            kind,
            type_name: type_name.to_string(),
            ids,
            count,
        }
    }

    pub(crate) fn anonymous(kind: ChangeKind, type_name: &str, count: usize) -> Self {
        Self {
            kind,
            type_name: type_name.to_string(),
            ids: BTreeSet::new(),
            count,
        }
    }
}

/// Handle returned by listener registration.
pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Registry of change listeners. Listeners run synchronously on the thread
/// that performed the mutation, after the mutation is visible.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    pub fn add<F>(&self, listener: F) -> Result<ListenerId, StoreError>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .write()
            .map_err(|_| StoreError::LockPoisoned("listener registration"))?
            .push((id, Arc::new(listener)));
        debug!(listener = id, "change listener registered");
        Ok(id)
    }

    pub fn remove(&self, id: ListenerId) -> Result<bool, StoreError> {
        let mut listeners = self
            .listeners
            .write()
            .map_err(|_| StoreError::LockPoisoned("listener removal"))?;
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        Ok(listeners.len() != before)
    }

    pub fn emit(&self, event: &ChangeEvent) {
        // Snapshot first so a listener may register or remove listeners.
        let snapshot: Vec<Listener> = match self.listeners.read() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => {
                warn!(kind = ?event.kind, "listener registry poisoned, event dropped");
                return;
            }
        };
        for listener in snapshot {
            listener(event);
        }
    }
}

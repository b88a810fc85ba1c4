use std::sync::{Arc, Mutex};

use event_emitter_rs::EventEmitter;
use tracing::warn;

use crate::error::StoreError;
use crate::store::{ListenerId, Store};

impl Store {
    /// Forward every change event to `emitter` as a JSON payload, under the
    /// names `records_added`, `records_updated` and `records_removed`.
    ///
    /// The emitter runs its callbacks on their own threads, so they observe
    /// events after the mutation has returned.
    pub fn bridge_to_emitter(
        &self,
        emitter: Arc<Mutex<EventEmitter>>,
    ) -> Result<ListenerId, StoreError> {
        self.add_listener(move |event| {
            let payload = match serde_json::to_string(event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "change event could not be serialized");
                    return;
                }
            };
            match emitter.lock() {
                Ok(mut emitter) => {
                    emitter.emit(event.kind.event_name(), payload);
                }
                Err(_) => warn!("event emitter lock poisoned, change event dropped"),
            }
        })
    }
}

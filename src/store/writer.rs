use std::sync::Arc;

use tracing::trace;

use super::Store;
use crate::cursor::{BoxedCursor, FeatureCursor, FeatureWriter};
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType};
use crate::filter::Filter;

struct Pending {
    /// The record as stored, `None` for one being appended.
    original: Option<Feature>,
    edited: Feature,
    removed: bool,
}

/// Write cursor over one collection.
///
/// Each fetched record becomes pending. Advancing, closing, or calling
/// [`write`](FeatureWriter::write) commits it: an edited record is updated
/// in the store, an untouched one is left alone, and one marked with
/// [`remove`](FeatureWriter::remove) is deleted. Past the end of the
/// collection `next` hands out blank records, which are added on commit.
///
/// Commits go through the store's own update/add/remove operations, so each
/// emits the usual change event.
pub struct StoreWriter {
    store: Store,
    type_name: String,
    feature_type: Arc<FeatureType>,
    identity: bool,
    source: BoxedCursor,
    pending: Option<Pending>,
    closed: bool,
}

impl StoreWriter {
    pub(crate) fn new(store: Store, source: BoxedCursor) -> Self {
        let feature_type = Arc::clone(source.feature_type());
        Self {
            store,
            type_name: feature_type.name().to_string(),
            identity: feature_type.has_identity(),
            feature_type,
            source,
            pending: None,
            closed: false,
        }
    }

    /// Apply the pending record to the store. A failed commit leaves it
    /// pending, so the edit can be fixed and written again.
    fn commit(&mut self) -> Result<(), StoreError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        if let Err(err) = self.apply(&pending) {
            self.pending = Some(pending);
            return Err(err);
        }
        Ok(())
    }

    fn apply(&self, pending: &Pending) -> Result<(), StoreError> {
        match (&pending.original, pending.removed) {
            (None, true) => {}
            (None, false) => {
                self.store.add(&self.type_name, [pending.edited.clone()])?;
            }
            (Some(original), true) => match original.id() {
                Some(id) if self.identity => {
                    self.store.remove(&self.type_name, &Filter::ids([id]))?;
                }
                _ => {
                    self.store.remove_exact(&self.type_name, original)?;
                }
            },
            (Some(original), false) => {
                if *original == pending.edited {
                    return Ok(());
                }
                match original.id() {
                    Some(id) if self.identity => {
                        let changes: Vec<_> = original
                            .diff(&pending.edited)
                            .into_iter()
                            .filter(|(name, _)| {
                                self.feature_type
                                    .identifier()
                                    .map_or(true, |attr| attr.name != *name)
                            })
                            .collect();
                        trace!(id, changed = changes.len(), "writer committing update");
                        self.store
                            .update(&self.type_name, &Filter::ids([id]), &changes)?;
                    }
                    _ => {
                        self.store
                            .replace_exact(&self.type_name, original, pending.edited.clone())?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl FeatureCursor for StoreWriter {
    fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    /// Commits the pending record, then reports whether existing records
    /// remain.
    fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.closed {
            return Ok(false);
        }
        self.commit()?;
        self.source.has_next()
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.commit()?;
        let pending = if self.source.has_next()? {
            let feature = self.source.next()?;
            Pending {
                original: Some(feature.clone()),
                edited: feature,
                removed: false,
            }
        } else {
            Pending {
                original: None,
                edited: Feature::new(Arc::clone(&self.feature_type)),
                removed: false,
            }
        };
        let feature = pending.edited.clone();
        self.pending = Some(pending);
        Ok(feature)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let committed = self.commit();
        let closed = self.source.close();
        committed.and(closed)
    }
}

impl FeatureWriter for StoreWriter {
    fn current(&mut self) -> Result<&mut Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        match self.pending.as_mut() {
            Some(pending) if !pending.removed => Ok(&mut pending.edited),
            _ => Err(StoreError::NoCurrentRecord),
        }
    }

    fn write(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if self.pending.is_none() {
            return Err(StoreError::NoCurrentRecord);
        }
        self.commit()
    }

    fn remove(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        match self.pending.as_mut() {
            Some(pending) => {
                pending.removed = true;
                self.commit()
            }
            None => Err(StoreError::NoCurrentRecord),
        }
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                tracing::warn!(error = %err, "committing writer on drop failed");
            }
        }
    }
}

//! Per-collection storage and the raw cursors over it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cursor::FeatureCursor;
use crate::error::StoreError;
use crate::feature::{Feature, FeatureId, FeatureType};
use crate::filter::Filter;

/// Storage cell for one collection. The variant follows from whether the
/// type declares an identifier.
#[derive(Clone)]
pub(crate) enum Group {
    Identity(Arc<IdentityGroup>),
    Unordered(Arc<UnorderedGroup>),
}

impl Group {
    pub fn new(feature_type: Arc<FeatureType>, id_start: FeatureId) -> Self {
        if feature_type.has_identity() {
            Group::Identity(Arc::new(IdentityGroup {
                feature_type,
                records: DashMap::new(),
                next_id: AtomicI64::new(id_start),
            }))
        } else {
            Group::Unordered(Arc::new(UnorderedGroup {
                feature_type,
                records: RwLock::new(Vec::new()),
            }))
        }
    }

    pub fn feature_type(&self) -> &Arc<FeatureType> {
        match self {
            Group::Identity(g) => &g.feature_type,
            Group::Unordered(g) => &g.feature_type,
        }
    }

    /// Cursor over a snapshot of every record.
    pub fn scan(&self) -> Result<Box<dyn FeatureCursor + Send>, StoreError> {
        Ok(match self {
            Group::Identity(g) => Box::new(g.scan()),
            Group::Unordered(g) => Box::new(g.scan()?),
        })
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        match self {
            Group::Identity(g) => Ok(g.records.len()),
            Group::Unordered(g) => Ok(g
                .records
                .read()
                .map_err(|_| StoreError::LockPoisoned("group read"))?
                .len()),
        }
    }

    /// Every stored record, in scan order.
    pub fn snapshot(&self) -> Result<Vec<Feature>, StoreError> {
        self.scan()?.drain()
    }

    /// Insert a record already checked against this group's type. Returns
    /// the identifier it was stored under, if the group has identity.
    pub fn insert(&self, feature: Feature) -> Result<Option<FeatureId>, StoreError> {
        match self {
            Group::Identity(g) => Ok(Some(g.insert(feature))),
            Group::Unordered(g) => {
                g.push(feature)?;
                Ok(None)
            }
        }
    }
}

pub(crate) struct IdentityGroup {
    feature_type: Arc<FeatureType>,
    records: DashMap<FeatureId, Feature>,
    next_id: AtomicI64,
}

impl IdentityGroup {
    /// Keep a usable caller-supplied identifier, otherwise draw from the
    /// counter until a free key is found. Negative identifiers are
    /// placeholders and always replaced.
    pub fn insert(&self, feature: Feature) -> FeatureId {
        let mut feature = match feature.id().filter(|id| *id >= 0) {
            Some(id) => match self.records.entry(id) {
                Entry::Vacant(slot) => {
                    slot.insert(feature);
                    return id;
                }
                Entry::Occupied(_) => feature,
            },
            None => feature,
        };
        loop {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            if let Entry::Vacant(slot) = self.records.entry(id) {
                feature.set_id(id);
                slot.insert(feature);
                return id;
            }
        }
    }

    pub fn get(&self, id: FeatureId) -> Option<Feature> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.records.contains_key(&id)
    }

    /// Apply `edit` to the stored record in place. False when `id` is gone.
    pub fn modify(
        &self,
        id: FeatureId,
        edit: impl FnOnce(&mut Feature) -> Result<(), StoreError>,
    ) -> Result<bool, StoreError> {
        match self.records.get_mut(&id) {
            Some(mut record) => {
                edit(record.value_mut())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove(&self, id: FeatureId) -> bool {
        self.records.remove(&id).is_some()
    }

    pub fn next_id(&self) -> FeatureId {
        self.next_id.load(Ordering::SeqCst)
    }

    pub fn advance_counter(&self, at_least: FeatureId) {
        self.next_id.fetch_max(at_least, Ordering::SeqCst);
    }

    /// Snapshot of the keys in ascending order; records are looked up as
    /// the cursor reaches them, so ones removed meanwhile are skipped.
    pub fn scan(self: &Arc<Self>) -> KeyCursor {
        let mut keys: Vec<FeatureId> = self.records.iter().map(|r| *r.key()).collect();
        keys.sort_unstable();
        KeyCursor::new(Arc::clone(self), keys.into())
    }

    /// Direct key lookups, for identifier-set queries.
    pub fn lookup(self: &Arc<Self>, ids: impl IntoIterator<Item = FeatureId>) -> KeyCursor {
        KeyCursor::new(Arc::clone(self), ids.into_iter().collect())
    }
}

pub(crate) struct UnorderedGroup {
    feature_type: Arc<FeatureType>,
    records: RwLock<Vec<Arc<Feature>>>,
}

impl UnorderedGroup {
    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Arc<Feature>>>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::LockPoisoned("group read"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Arc<Feature>>>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::LockPoisoned("group write"))
    }

    pub fn push(&self, feature: Feature) -> Result<(), StoreError> {
        self.write()?.push(Arc::new(feature));
        Ok(())
    }

    /// Cursor over the records present now. Later appends are not seen.
    pub fn scan(&self) -> Result<ListCursor, StoreError> {
        Ok(ListCursor {
            feature_type: Arc::clone(&self.feature_type),
            records: self.read()?.iter().cloned().collect(),
            closed: false,
        })
    }

    /// Apply `edit` to a copy of every record matching `filter`, swapping
    /// the copies in. Returns how many were changed.
    pub fn modify_matching(
        &self,
        filter: &Filter,
        edit: impl Fn(&mut Feature) -> Result<(), StoreError>,
    ) -> Result<usize, StoreError> {
        let mut records = self.write()?;
        let mut count = 0;
        for slot in records.iter_mut() {
            if filter.evaluate(slot) {
                let mut copy = Feature::clone(slot);
                edit(&mut copy)?;
                *slot = Arc::new(copy);
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn remove_matching(&self, filter: &Filter) -> Result<usize, StoreError> {
        let mut records = self.write()?;
        let before = records.len();
        records.retain(|record| !filter.evaluate(record));
        Ok(before - records.len())
    }

    /// Replace the first record equal to `original`. False when none is.
    pub fn replace_first(&self, original: &Feature, replacement: Feature) -> Result<bool, StoreError> {
        let mut records = self.write()?;
        match records.iter_mut().find(|r| ***r == *original) {
            Some(slot) => {
                *slot = Arc::new(replacement);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_first(&self, original: &Feature) -> Result<bool, StoreError> {
        let mut records = self.write()?;
        match records.iter().position(|r| **r == *original) {
            Some(index) => {
                records.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Raw cursor over an identity group, visiting a fixed key sequence.
pub(crate) struct KeyCursor {
    group: Arc<IdentityGroup>,
    keys: VecDeque<FeatureId>,
    lookahead: Option<Feature>,
    closed: bool,
}

impl KeyCursor {
    fn new(group: Arc<IdentityGroup>, keys: VecDeque<FeatureId>) -> Self {
        Self {
            group,
            keys,
            lookahead: None,
            closed: false,
        }
    }
}

impl FeatureCursor for KeyCursor {
    fn feature_type(&self) -> &Arc<FeatureType> {
        &self.group.feature_type
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.closed {
            return Ok(false);
        }
        while self.lookahead.is_none() {
            let Some(id) = self.keys.pop_front() else {
                return Ok(false);
            };
            self.lookahead = self.group.get(id);
        }
        Ok(true)
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if !self.has_next()? {
            return Err(StoreError::Exhausted);
        }
        self.lookahead.take().ok_or(StoreError::Exhausted)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        self.keys.clear();
        self.lookahead = None;
        Ok(())
    }
}

/// Raw cursor over a snapshot of an unordered group.
pub(crate) struct ListCursor {
    feature_type: Arc<FeatureType>,
    records: VecDeque<Arc<Feature>>,
    closed: bool,
}

impl FeatureCursor for ListCursor {
    fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        Ok(!self.closed && !self.records.is_empty())
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.records
            .pop_front()
            .map(|record| Feature::clone(&record))
            .ok_or(StoreError::Exhausted)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        self.records.clear();
        Ok(())
    }
}

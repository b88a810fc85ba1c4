//! The in-memory feature store.
//!
//! A [`Store`] owns named collections. Each collection is a group keyed by
//! identifier when its type declares one, or an insertion-ordered list
//! otherwise. Reads go through the query pipeline; mutations notify
//! registered listeners with a [`ChangeEvent`].

mod events;
mod group;
mod writer;

pub use events::{ChangeEvent, ChangeKind, ListenerId};
pub use writer::StoreWriter;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::cursor::{BoxedCursor, BoxedWriter, EmptyCursor, FeatureCursor, FilterCursor};
use crate::error::StoreError;
use crate::feature::{Feature, FeatureId, FeatureType, Value};
use crate::filter::Filter;
use crate::geometry::{AffineTransformer, Crs, GeometryTransformer};
use crate::pipeline::{compile, PipelineContext};
use crate::query::{Hints, Query};
use crate::worker::WorkerPool;
use events::Listeners;
use group::{Group, IdentityGroup};

/// Thread-safe handle to an in-memory feature store. Clones share state.
///
/// ## Example
///
/// ```
/// use feature_store::{AttributeKind, Feature, FeatureType, Filter, Query, Store, StoreConfig};
///
/// let store = Store::new(StoreConfig::default()).unwrap();
/// let roads = store
///     .create_schema(
///         FeatureType::builder("roads")
///             .identifier("fid")
///             .attribute("lanes", AttributeKind::Int)
///             .build()
///             .unwrap(),
///     )
///     .unwrap();
///
/// let ids = store
///     .add("roads", (1..=3).map(|n| Feature::new(roads.clone()).with("lanes", n).unwrap()))
///     .unwrap();
/// assert_eq!(ids.len(), 3);
///
/// let query = Query::builder("roads").filter(Filter::ge("lanes", 2)).build();
/// assert_eq!(store.count(&query).unwrap(), 2);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    groups: RwLock<HashMap<String, Group>>,
    listeners: Listeners,
    ctx: PipelineContext,
    config: StoreConfig,
}

/// Configures the services a [`Store`] runs with.
#[derive(Default)]
pub struct StoreBuilder {
    config: StoreConfig,
    pool: Option<Arc<WorkerPool>>,
    transformer: Option<Arc<dyn GeometryTransformer>>,
}

impl StoreBuilder {
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Run cache producers on a caller-owned pool instead of creating one.
    pub fn pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Geometry service for reprojection, resampling and CRS equivalence.
    /// Defaults to an [`AffineTransformer`] with no registered transforms.
    pub fn transformer(mut self, transformer: Arc<dyn GeometryTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn build(self) -> Result<Store, StoreError> {
        self.config.validate()?;
        let pool = match self.pool {
            Some(pool) => pool,
            None => Arc::new(WorkerPool::new(self.config.worker_threads)?),
        };
        let transformer = self
            .transformer
            .unwrap_or_else(|| Arc::new(AffineTransformer::new()));
        info!(
            workers = pool.size(),
            prefetch = ?self.config.prefetch,
            "feature store created"
        );
        Ok(Store {
            inner: Arc::new(Inner {
                groups: RwLock::new(HashMap::new()),
                listeners: Listeners::default(),
                ctx: PipelineContext {
                    transformer,
                    pool,
                    default_prefetch: self.config.prefetch,
                },
                config: self.config,
            }),
        })
    }
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// A store with its own worker pool of `config.worker_threads` threads.
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        Store::builder().config(config).build()
    }

    /// A store whose cache producers run on `pool`. The caller decides when
    /// the pool shuts down.
    pub fn with_pool(config: StoreConfig, pool: Arc<WorkerPool>) -> Result<Self, StoreError> {
        Store::builder().config(config).pool(pool).build()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.inner.ctx.pool
    }

    pub fn transformer(&self) -> &Arc<dyn GeometryTransformer> {
        &self.inner.ctx.transformer
    }

    // ---- schema management ----

    /// Collection names, sorted.
    pub fn type_names(&self) -> Result<Vec<String>, StoreError> {
        let groups = self.read_groups()?;
        let mut names: Vec<String> = groups.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn schema(&self, type_name: &str) -> Result<Option<Arc<FeatureType>>, StoreError> {
        Ok(self
            .read_groups()?
            .get(type_name)
            .map(|group| Arc::clone(group.feature_type())))
    }

    /// Create an empty collection for `feature_type`. Returns the shared
    /// type records of this collection should be built from.
    pub fn create_schema(&self, feature_type: FeatureType) -> Result<Arc<FeatureType>, StoreError> {
        let mut groups = self.write_groups()?;
        let name = feature_type.name().to_string();
        if groups.contains_key(&name) {
            return Err(StoreError::TypeExists(name));
        }
        let feature_type = Arc::new(feature_type);
        groups.insert(
            name.clone(),
            Group::new(Arc::clone(&feature_type), self.inner.config.id_start),
        );
        info!(
            feature_type = %name,
            identity = feature_type.has_identity(),
            "collection created"
        );
        Ok(feature_type)
    }

    /// Replace a collection's type. Stored records are carried over by
    /// attribute name: attributes the new type drops are lost, new ones start
    /// as `Null`, and identifiers are kept while the identifier attribute
    /// keeps its name. Nothing changes if any migrated record is invalid
    /// under the new type.
    pub fn update_schema(&self, feature_type: FeatureType) -> Result<Arc<FeatureType>, StoreError> {
        let mut groups = self.write_groups()?;
        let name = feature_type.name().to_string();
        let old = groups
            .get(&name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownType(name.clone()))?;
        let feature_type = Arc::new(feature_type);
        let migrated: Vec<Feature> = old
            .snapshot()?
            .iter()
            .map(|f| f.project(&feature_type))
            .collect();
        for feature in &migrated {
            self.check_record(&feature_type, feature)?;
        }
        let replacement = Group::new(Arc::clone(&feature_type), self.inner.config.id_start);
        let count = migrated.len();
        for feature in migrated {
            replacement.insert(feature)?;
        }
        if let (Group::Identity(before), Group::Identity(after)) = (&old, &replacement) {
            after.advance_counter(before.next_id());
        }
        groups.insert(name.clone(), replacement);
        info!(feature_type = %name, migrated = count, "collection schema updated");
        Ok(feature_type)
    }

    pub fn remove_schema(&self, type_name: &str) -> Result<(), StoreError> {
        self.write_groups()?
            .remove(type_name)
            .ok_or_else(|| StoreError::UnknownType(type_name.to_string()))?;
        info!(feature_type = %type_name, "collection removed");
        Ok(())
    }

    // ---- listeners ----

    /// Register a change listener. It runs on the mutating thread after each
    /// add, update and remove.
    pub fn add_listener<F>(&self, listener: F) -> Result<ListenerId, StoreError>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    /// False when `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> Result<bool, StoreError> {
        self.inner.listeners.remove(id)
    }

    // ---- reads ----

    /// Run `query`, returning a cursor over its result.
    pub fn query(&self, query: &Query) -> Result<BoxedCursor, StoreError> {
        let group = self.group(query.type_name())?;
        let rewritten;
        let (source, query): (BoxedCursor, &Query) = match &group {
            Group::Identity(g) => match query.filter().clone().simplify().as_ids() {
                Some(ids) => {
                    debug!(feature_type = %query.type_name(), ids = ids.len(), "identity lookup");
                    rewritten = query.replace_filter(Filter::Include);
                    (Box::new(g.lookup(ids.iter().copied())) as BoxedCursor, &rewritten)
                }
                None => (group.scan()?, query),
            },
            Group::Unordered(_) => (group.scan()?, query),
        };
        compile(source, query, &self.inner.ctx)
    }

    /// Number of records `query` yields.
    pub fn count(&self, query: &Query) -> Result<usize, StoreError> {
        Ok(self.query(query)?.drain()?.len())
    }

    /// Number of records stored in a collection, without running a query.
    pub fn record_count(&self, type_name: &str) -> Result<usize, StoreError> {
        self.group(type_name)?.len()
    }

    /// One record by identifier. `None` when absent or when the collection
    /// has no identity.
    pub fn get(&self, type_name: &str, id: FeatureId) -> Result<Option<Feature>, StoreError> {
        match self.group(type_name)? {
            Group::Identity(g) => Ok(g.get(id)),
            Group::Unordered(_) => Ok(None),
        }
    }

    // ---- writes ----

    /// Add copies of `features`. Identity collections assign identifiers
    /// to records without a usable one; the assigned set is returned.
    ///
    /// Every record is checked before any is stored, so a failure leaves
    /// the collection untouched.
    pub fn add(
        &self,
        type_name: &str,
        features: impl IntoIterator<Item = Feature>,
    ) -> Result<BTreeSet<FeatureId>, StoreError> {
        let group = self.group(type_name)?;
        let feature_type = Arc::clone(group.feature_type());
        let features: Vec<Feature> = features.into_iter().collect();
        for feature in &features {
            self.check_record(&feature_type, feature)?;
        }

        let count = features.len();
        let mut ids = BTreeSet::new();
        for feature in features {
            if let Some(id) = group.insert(feature.retyped(&feature_type))? {
                ids.insert(id);
            }
        }
        info!(feature_type = %type_name, count, "records added");

        let event = if feature_type.has_identity() {
            ChangeEvent::with_ids(ChangeKind::Added, type_name, ids.clone())
        } else {
            ChangeEvent::anonymous(ChangeKind::Added, type_name, count)
        };
        self.inner.listeners.emit(&event);
        Ok(ids)
    }

    /// Overwrite attribute values on every record matching `filter`.
    pub fn update(
        &self,
        type_name: &str,
        filter: &Filter,
        values: &[(String, Value)],
    ) -> Result<ChangeEvent, StoreError> {
        let group = self.group(type_name)?;
        let feature_type = Arc::clone(group.feature_type());
        self.check_overwrites(&feature_type, values)?;
        let edit = |feature: &mut Feature| -> Result<(), StoreError> {
            for (name, value) in values {
                feature.set(name, value.clone())?;
            }
            Ok(())
        };

        let event = match &group {
            Group::Identity(g) => {
                let mut changed = BTreeSet::new();
                for id in self.resolve_ids(type_name, g, filter)? {
                    if g.modify(id, &edit)? {
                        changed.insert(id);
                    }
                }
                ChangeEvent::with_ids(ChangeKind::Updated, type_name, changed)
            }
            Group::Unordered(g) => ChangeEvent::anonymous(
                ChangeKind::Updated,
                type_name,
                g.modify_matching(filter, &edit)?,
            ),
        };
        info!(feature_type = %type_name, count = event.count, "records updated");
        self.inner.listeners.emit(&event);
        Ok(event)
    }

    /// Delete every record matching `filter`.
    pub fn remove(&self, type_name: &str, filter: &Filter) -> Result<ChangeEvent, StoreError> {
        let group = self.group(type_name)?;
        let event = match &group {
            Group::Identity(g) => {
                let removed = self
                    .resolve_ids(type_name, g, filter)?
                    .into_iter()
                    .filter(|id| g.remove(*id))
                    .collect();
                ChangeEvent::with_ids(ChangeKind::Removed, type_name, removed)
            }
            Group::Unordered(g) => ChangeEvent::anonymous(
                ChangeKind::Removed,
                type_name,
                g.remove_matching(filter)?,
            ),
        };
        info!(feature_type = %type_name, count = event.count, "records removed");
        self.inner.listeners.emit(&event);
        Ok(event)
    }

    /// A write cursor over the records matching `filter`.
    pub fn writer(&self, type_name: &str, filter: Filter) -> Result<BoxedWriter, StoreError> {
        let source = self.group(type_name)?.scan()?;
        let writer = StoreWriter::new(self.clone(), source);
        let filter = filter.simplify();
        if filter.is_include() {
            Ok(Box::new(writer))
        } else {
            Ok(Box::new(FilterCursor::new(writer, filter)))
        }
    }

    /// A write cursor positioned past the last record: every `next` yields
    /// a blank record that is added on commit.
    pub fn appender(&self, type_name: &str) -> Result<BoxedWriter, StoreError> {
        let feature_type = Arc::clone(self.group(type_name)?.feature_type());
        Ok(Box::new(StoreWriter::new(
            self.clone(),
            Box::new(EmptyCursor::new(feature_type)),
        )))
    }

    /// Drop every collection. The worker pool stays up until the last store
    /// handle and every cursor using it are gone.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut groups = self.write_groups()?;
        let count = groups.len();
        groups.clear();
        info!(collections = count, "feature store closed");
        Ok(())
    }

    // ---- internals ----

    pub(crate) fn replace_exact(
        &self,
        type_name: &str,
        original: &Feature,
        replacement: Feature,
    ) -> Result<bool, StoreError> {
        let group = self.group(type_name)?;
        let feature_type = Arc::clone(group.feature_type());
        self.check_record(&feature_type, &replacement)?;
        let replaced = match &group {
            Group::Unordered(g) => g.replace_first(original, replacement.retyped(&feature_type))?,
            Group::Identity(_) => false,
        };
        if replaced {
            self.inner
                .listeners
                .emit(&ChangeEvent::anonymous(ChangeKind::Updated, type_name, 1));
        }
        Ok(replaced)
    }

    pub(crate) fn remove_exact(&self, type_name: &str, original: &Feature) -> Result<bool, StoreError> {
        let removed = match self.group(type_name)? {
            Group::Unordered(g) => g.remove_first(original)?,
            Group::Identity(_) => false,
        };
        if removed {
            self.inner
                .listeners
                .emit(&ChangeEvent::anonymous(ChangeKind::Removed, type_name, 1));
        }
        Ok(removed)
    }

    fn read_groups(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Group>>, StoreError> {
        self.inner
            .groups
            .read()
            .map_err(|_| StoreError::LockPoisoned("collections read"))
    }

    fn write_groups(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Group>>, StoreError> {
        self.inner
            .groups
            .write()
            .map_err(|_| StoreError::LockPoisoned("collections write"))
    }

    fn group(&self, type_name: &str) -> Result<Group, StoreError> {
        self.read_groups()?
            .get(type_name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownType(type_name.to_string()))
    }

    /// Identifiers of the records `filter` selects. Identifier-set filters
    /// are resolved by key; anything else runs an identifier-only query.
    fn resolve_ids(
        &self,
        type_name: &str,
        group: &Arc<IdentityGroup>,
        filter: &Filter,
    ) -> Result<BTreeSet<FeatureId>, StoreError> {
        let filter = filter.clone().simplify();
        if let Some(ids) = filter.as_ids() {
            return Ok(ids.iter().copied().filter(|id| group.contains(*id)).collect());
        }
        let mut query = Query::builder(type_name)
            .filter(filter)
            .hints(Hints::no_prefetch());
        if let Some(identifier) = self.schema(type_name)?.and_then(|t| t.identifier().cloned()) {
            query = query.properties([identifier.name]);
        }
        let mut ids = BTreeSet::new();
        for feature in self.query(&query.build())?.into_features() {
            if let Some(id) = feature?.id() {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    /// A record may enter a collection when its type matches the
    /// collection's, every embedded CRS agrees with the declared one, and
    /// required attributes are set.
    fn check_record(&self, feature_type: &FeatureType, feature: &Feature) -> Result<(), StoreError> {
        if !feature.feature_type().conforms_to(feature_type) {
            return Err(StoreError::TypeMismatch {
                expected: feature_type.name().to_string(),
                actual: feature.feature_type().name().to_string(),
            });
        }
        for (attribute, value) in feature_type.attributes().iter().zip(feature.values()) {
            if !value.fits(&attribute.kind) {
                return Err(StoreError::InvalidValue {
                    attribute: attribute.name.clone(),
                    reason: format!("expected {}, got {}", attribute.kind, value),
                });
            }
        }
        for (index, geometry) in feature.geometries() {
            let attribute = &feature_type.attributes()[index];
            self.check_crs(&attribute.name, attribute.kind.crs(), geometry.crs.as_ref())?;
        }
        feature.validate()
    }

    fn check_overwrites(
        &self,
        feature_type: &FeatureType,
        values: &[(String, Value)],
    ) -> Result<(), StoreError> {
        for (name, value) in values {
            let attribute =
                feature_type
                    .attribute(name)
                    .ok_or_else(|| StoreError::UnknownAttribute {
                        type_name: feature_type.name().to_string(),
                        attribute: name.clone(),
                    })?;
            let invalid = |reason: String| StoreError::InvalidValue {
                attribute: name.clone(),
                reason,
            };
            if attribute.identifier {
                return Err(invalid("identifiers cannot be updated".into()));
            }
            if !value.fits(&attribute.kind) {
                return Err(invalid(format!("expected {}, got {}", attribute.kind, value)));
            }
            if value.is_null() && !attribute.nillable {
                return Err(invalid("attribute is required".into()));
            }
            if let Some(geometry) = value.as_geometry() {
                self.check_crs(name, attribute.kind.crs(), geometry.crs.as_ref())?;
            }
        }
        Ok(())
    }

    fn check_crs(
        &self,
        attribute: &str,
        declared: Option<&Crs>,
        actual: Option<&Crs>,
    ) -> Result<(), StoreError> {
        match (declared, actual) {
            (Some(expected), Some(actual))
                if !self.inner.ctx.transformer.equivalent(expected, actual) =>
            {
                Err(StoreError::CrsMismatch {
                    attribute: attribute.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.inner.config)
            .field("collections", &self.type_names().unwrap_or_default())
            .finish()
    }
}

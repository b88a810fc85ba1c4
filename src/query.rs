//! The request descriptor handed to [`Store::query`](crate::Store::query).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::filter::Filter;
use crate::geometry::Crs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub attribute: String,
    pub order: SortOrder,
}

impl SortBy {
    pub fn asc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn desc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Target geometry resolution along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub x: f64,
    pub y: f64,
}

impl Resolution {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Whether query results are pulled through the prefetching cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Prefetch {
    /// Use the store's configured default.
    #[default]
    StoreDefault,
    Disabled,
    /// Prefetch in batches of this many records.
    Size(usize),
}

/// Implementation hints. Recognized hints steer the pipeline; anything
/// else is carried along untouched for callers that layer on top.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hints {
    pub prefetch: Prefetch,
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Hints {
    pub fn prefetch(size: usize) -> Self {
        Self {
            prefetch: Prefetch::Size(size),
            ..Self::default()
        }
    }

    pub fn no_prefetch() -> Self {
        Self {
            prefetch: Prefetch::Disabled,
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    /// The cache size to use given the store default.
    pub(crate) fn resolve_prefetch(&self, store_default: Option<usize>) -> Option<usize> {
        match self.prefetch {
            Prefetch::StoreDefault => store_default,
            Prefetch::Disabled => None,
            Prefetch::Size(size) => Some(size),
        }
    }
}

/// What a caller wants from one collection.
///
/// Every optional part defaults to "no constraint": an absent `max_features`
/// means unlimited, absent `properties` means all attributes, and so on.
/// Queries are immutable once built.
///
/// ```
/// use feature_store::{Filter, Query, SortBy};
///
/// let query = Query::builder("roads")
///     .filter(Filter::gt("lanes", 2))
///     .sort_by(SortBy::asc("name"))
///     .start_index(10)
///     .max_features(5)
///     .build();
/// assert_eq!(query.type_name(), "roads");
/// assert_eq!(query.max_features(), Some(5));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    type_name: String,
    filter: Filter,
    sort_by: Vec<SortBy>,
    start_index: Option<usize>,
    max_features: Option<usize>,
    properties: Option<Vec<String>>,
    resolution: Option<Resolution>,
    crs: Option<Crs>,
    hints: Hints,
}

impl Query {
    /// Every record of the collection, untouched.
    pub fn all(type_name: impl Into<String>) -> Query {
        Query::builder(type_name).build()
    }

    pub fn builder(type_name: impl Into<String>) -> QueryBuilder {
        QueryBuilder {
            query: Query {
                type_name: type_name.into(),
                filter: Filter::Include,
                sort_by: Vec::new(),
                start_index: None,
                max_features: None,
                properties: None,
                resolution: None,
                crs: None,
                hints: Hints::default(),
            },
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn sort_by(&self) -> &[SortBy] {
        &self.sort_by
    }

    pub fn start_index(&self) -> Option<usize> {
        self.start_index
    }

    pub fn max_features(&self) -> Option<usize> {
        self.max_features
    }

    pub fn properties(&self) -> Option<&[String]> {
        self.properties.as_deref()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn hints(&self) -> &Hints {
        &self.hints
    }

    /// A copy of this query with a different filter.
    pub(crate) fn replace_filter(&self, filter: Filter) -> Query {
        Query {
            filter,
            ..self.clone()
        }
    }
}

/// Builder for [`Query`].
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter = filter;
        self
    }

    /// Append a sort key; earlier keys take precedence.
    pub fn sort_by(mut self, sort: SortBy) -> Self {
        self.query.sort_by.push(sort);
        self
    }

    pub fn start_index(mut self, start: usize) -> Self {
        self.query.start_index = Some(start);
        self
    }

    pub fn max_features(mut self, max: usize) -> Self {
        self.query.max_features = Some(max);
        self
    }

    pub fn properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.properties = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn resolution(mut self, x: f64, y: f64) -> Self {
        self.query.resolution = Some(Resolution::new(x, y));
        self
    }

    pub fn crs(mut self, crs: Crs) -> Self {
        self.query.crs = Some(crs);
        self
    }

    pub fn hints(mut self, hints: Hints) -> Self {
        self.query.hints = hints;
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

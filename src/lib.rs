//! In-memory geospatial feature store.
//!
//! Records ([`Feature`]s) live in named collections inside a [`Store`].
//! Queries are compiled into a chain of lazy cursor decorators (sort,
//! filter, skip, limit, projection, resampling, reprojection, prefetch
//! caching) and pulled one record at a time. Write cursors turn in-place
//! edits into store updates.

pub mod cursor;
mod config;
mod error;
mod feature;
mod filter;
mod geometry;
mod pipeline;
mod query;
mod store;
mod worker;

#[cfg(feature = "emitter")]
mod emitter;

pub use config::StoreConfig;
pub use cursor::{BoxedCursor, BoxedWriter, FeatureCursor, FeatureWriter};
pub use error::StoreError;
pub use feature::{
    AttributeDescriptor, AttributeKind, Feature, FeatureId, FeatureType, FeatureTypeBuilder, Value,
};
pub use filter::{CompareOp, Filter, Predicate};
pub use geometry::{
    Affine, AffineTransformer, Coord, Crs, Envelope, Geometry, GeometryTransformer, GeometryValue,
};
pub use pipeline::{compile, PipelineContext};
pub use query::{Hints, Prefetch, Query, QueryBuilder, Resolution, SortBy, SortOrder};
pub use store::{ChangeEvent, ChangeKind, ListenerId, Store, StoreBuilder, StoreWriter};
pub use worker::WorkerPool;

#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;

//! Forward-only record cursors and the decorators that compose them.
//!
//! A [`FeatureCursor`] yields records one at a time. Decorators wrap exactly
//! one upstream cursor and add one behavior. A decorator is generic over its
//! upstream, and when the upstream is a [`FeatureWriter`] the decorator is
//! one too wherever editing through it makes sense (filter, skip, limit).
//!
//! ```text
//!  raw group cursor ─▶ Sort ─▶ Filter ─▶ Skip ─▶ Limit ─▶ View ─▶ Resample ─▶ Reproject ─▶ Cache
//! ```
//!
//! Every cursor is either open or closed. `close` is idempotent and closes
//! the upstream exactly once.

mod cache;
mod empty;
mod filter;
mod iter;
mod limit;
mod mapping;
mod memory;
mod modify;
mod reproject;
mod resample;
mod skip;
mod sort;
mod view;

pub use cache::CacheCursor;
pub use empty::EmptyCursor;
pub use filter::FilterCursor;
pub use iter::Features;
pub use limit::LimitCursor;
pub use mapping::{AttributeMapping, EncapsulateCursor, FeatureMapper, MappingCursor};
pub use memory::VecCursor;
pub use modify::ModifyCursor;
pub use reproject::ReprojectCursor;
pub(crate) use reproject::needs_reprojection;
pub use resample::ResampleCursor;
pub use skip::SkipCursor;
pub use sort::SortCursor;
pub use view::ViewCursor;

use std::sync::Arc;

use crate::error::StoreError;
use crate::feature::{Feature, FeatureType};

/// A forward-only, pull-based sequence of records.
///
/// Cursors are single-consumer: none is safe for concurrent use, though
/// most are `Send` so a cursor can move to another thread.
pub trait FeatureCursor {
    /// Type of the records this cursor yields.
    fn feature_type(&self) -> &Arc<FeatureType>;

    /// Whether another record is available. May pull from upstream; calling
    /// it repeatedly without `next` has no further effect.
    fn has_next(&mut self) -> Result<bool, StoreError>;

    /// The next record, or [`StoreError::Exhausted`] past the end.
    fn next(&mut self) -> Result<Feature, StoreError>;

    /// Release this cursor and its upstream. Idempotent.
    fn close(&mut self) -> Result<(), StoreError>;

    /// Pull every remaining record, then close.
    fn drain(&mut self) -> Result<Vec<Feature>, StoreError> {
        let mut out = Vec::new();
        let result = (|| -> Result<(), StoreError> {
            while self.has_next()? {
                out.push(self.next()?);
            }
            Ok(())
        })();
        let closed = self.close();
        result.and(closed).map(|_| out)
    }

    /// Adapt into an [`Iterator`] of results that closes at the end.
    fn into_features(self) -> Features<Self>
    where
        Self: Sized,
    {
        Features::new(self)
    }
}

/// A cursor whose fetched records can be edited and committed.
///
/// Advancing (`has_next`/`next`) or closing commits the pending record:
/// an edited record is written back, an untouched one is left alone.
pub trait FeatureWriter: FeatureCursor {
    /// The most recently fetched record, for editing in place.
    fn current(&mut self) -> Result<&mut Feature, StoreError>;

    /// Commit the pending record now.
    fn write(&mut self) -> Result<(), StoreError>;

    /// Delete the pending record instead of writing it.
    fn remove(&mut self) -> Result<(), StoreError>;
}

pub type BoxedCursor = Box<dyn FeatureCursor + Send>;
pub type BoxedWriter = Box<dyn FeatureWriter + Send>;

impl<C: FeatureCursor + ?Sized> FeatureCursor for Box<C> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        (**self).feature_type()
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        (**self).has_next()
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        (**self).next()
    }

    fn close(&mut self) -> Result<(), StoreError> {
        (**self).close()
    }
}

impl<C: FeatureWriter + ?Sized> FeatureWriter for Box<C> {
    fn current(&mut self) -> Result<&mut Feature, StoreError> {
        (**self).current()
    }

    fn write(&mut self) -> Result<(), StoreError> {
        (**self).write()
    }

    fn remove(&mut self) -> Result<(), StoreError> {
        (**self).remove()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::feature::{AttributeKind, Value};
    use crate::geometry::{Crs, Geometry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn numbered_type() -> Arc<FeatureType> {
        Arc::new(
            FeatureType::builder("numbers")
                .identifier("fid")
                .attribute("n", AttributeKind::Int)
                .attribute("label", AttributeKind::Text)
                .geometry("geom", Crs::new("EPSG:4326"))
                .build()
                .unwrap(),
        )
    }

    pub fn numbered(count: i64) -> Vec<Feature> {
        let t = numbered_type();
        (1..=count)
            .map(|i| {
                Feature::from_values(
                    Arc::clone(&t),
                    vec![
                        Value::Int(i),
                        Value::Int(i * 10),
                        Value::from(format!("#{}", i)),
                        Value::from(Geometry::point(i as f64, i as f64)),
                    ],
                )
                .unwrap()
            })
            .collect()
    }

    pub fn numbered_cursor(count: i64) -> VecCursor {
        VecCursor::new(numbered_type(), numbered(count))
    }

    pub fn ids(features: &[Feature]) -> Vec<i64> {
        features.iter().filter_map(Feature::id).collect()
    }

    /// Wraps a cursor and records how often it was pulled and closed.
    pub struct Counting<C> {
        inner: C,
        pub pulls: Arc<AtomicUsize>,
        pub closes: Arc<AtomicUsize>,
    }

    impl<C> Counting<C> {
        pub fn new(inner: C) -> Self {
            Self {
                inner,
                pulls: Arc::new(AtomicUsize::new(0)),
                closes: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn counters(&self) -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
            (Arc::clone(&self.pulls), Arc::clone(&self.closes))
        }
    }

    impl<C: FeatureCursor> FeatureCursor for Counting<C> {
        fn feature_type(&self) -> &Arc<FeatureType> {
            self.inner.feature_type()
        }

        fn has_next(&mut self) -> Result<bool, StoreError> {
            self.inner.has_next()
        }

        fn next(&mut self) -> Result<Feature, StoreError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            self.inner.next()
        }

        fn close(&mut self) -> Result<(), StoreError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.inner.close()
        }
    }

    /// Yields `ok` records, then fails every pull.
    pub struct Failing {
        inner: VecCursor,
    }

    impl Failing {
        pub fn after(ok: i64) -> Self {
            Self {
                inner: numbered_cursor(ok),
            }
        }
    }

    impl FeatureCursor for Failing {
        fn feature_type(&self) -> &Arc<FeatureType> {
            self.inner.feature_type()
        }

        fn has_next(&mut self) -> Result<bool, StoreError> {
            Ok(true)
        }

        fn next(&mut self) -> Result<Feature, StoreError> {
            if self.inner.has_next()? {
                self.inner.next()
            } else {
                Err(StoreError::Transform("upstream failure".into()))
            }
        }

        fn close(&mut self) -> Result<(), StoreError> {
            self.inner.close()
        }
    }
}

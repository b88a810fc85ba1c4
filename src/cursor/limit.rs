use std::sync::Arc;

use super::{FeatureCursor, FeatureWriter};
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType};

/// Yields at most `n` upstream records. A limit of zero never touches the
/// upstream.
pub struct LimitCursor<C> {
    upstream: C,
    remaining: usize,
    closed: bool,
}

impl<C: FeatureCursor> LimitCursor<C> {
    pub fn new(upstream: C, n: usize) -> Self {
        Self {
            upstream,
            remaining: n,
            closed: false,
        }
    }
}

impl<C: FeatureCursor> FeatureCursor for LimitCursor<C> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        self.upstream.feature_type()
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.closed || self.remaining == 0 {
            return Ok(false);
        }
        self.upstream.has_next()
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if !self.has_next()? {
            return Err(StoreError::Exhausted);
        }
        let feature = self.upstream.next()?;
        self.remaining -= 1;
        Ok(feature)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.upstream.close()
    }
}

impl<C: FeatureWriter> FeatureWriter for LimitCursor<C> {
    fn current(&mut self) -> Result<&mut Feature, StoreError> {
        self.upstream.current()
    }

    fn write(&mut self) -> Result<(), StoreError> {
        self.upstream.write()
    }

    fn remove(&mut self) -> Result<(), StoreError> {
        self.upstream.remove()
    }
}

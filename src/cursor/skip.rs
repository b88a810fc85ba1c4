use std::sync::Arc;

use super::{FeatureCursor, FeatureWriter};
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType};

/// Discards the first `n` upstream records, then passes the rest through.
///
/// The skip runs once, on the first `has_next` or `next`.
pub struct SkipCursor<C> {
    upstream: C,
    to_skip: usize,
    closed: bool,
}

impl<C: FeatureCursor> SkipCursor<C> {
    pub fn new(upstream: C, n: usize) -> Self {
        Self {
            upstream,
            to_skip: n,
            closed: false,
        }
    }

    fn skip_pending(&mut self) -> Result<(), StoreError> {
        while self.to_skip > 0 {
            if !self.upstream.has_next()? {
                self.to_skip = 0;
                break;
            }
            self.upstream.next()?;
            self.to_skip -= 1;
        }
        Ok(())
    }
}

impl<C: FeatureCursor> FeatureCursor for SkipCursor<C> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        self.upstream.feature_type()
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.closed {
            return Ok(false);
        }
        self.skip_pending()?;
        self.upstream.has_next()
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if !self.has_next()? {
            return Err(StoreError::Exhausted);
        }
        self.upstream.next()
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.upstream.close()
    }
}

impl<C: FeatureWriter> FeatureWriter for SkipCursor<C> {
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

use std::sync::Arc;

use super::FeatureCursor;
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType};

/// Re-exposes upstream records restricted to a subset of attributes, in
/// the requested order. Dropped attributes are gone, not defaulted.
pub struct ViewCursor<C> {
    upstream: C,
    target: Arc<FeatureType>,
    passthrough: bool,
    closed: bool,
}

impl<C: FeatureCursor> ViewCursor<C> {
    pub fn new(upstream: C, properties: &[String]) -> Result<Self, StoreError> {
        let source = upstream.feature_type();
        let passthrough = source.is_exactly(properties);
        let target = if passthrough {
            Arc::clone(source)
        } else {
            Arc::new(source.subtype(properties)?)
        };
        Ok(Self {
            upstream,
            target,
            passthrough,
            closed: false,
        })
    }
}

impl<C: FeatureCursor> FeatureCursor for ViewCursor<C> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        &self.target
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.closed {
            return Ok(false);
        }
        self.upstream.has_next()
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let feature = self.upstream.next()?;
        if self.passthrough {
            Ok(feature)
        } else {
            Ok(feature.project(&self.target))
        }
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.upstream.close()
    }
}

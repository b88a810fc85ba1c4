use std::sync::Arc;

use super::FeatureCursor;
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType, Value};
use crate::filter::Filter;

/// Overwrites attribute values on records matching a filter. Records that do
/// not match pass through unchanged, and overwrites naming an attribute the
/// record lacks are ignored.
pub struct ModifyCursor<C> {
    upstream: C,
    filter: Filter,
    overwrites: Vec<(String, Value)>,
    closed: bool,
}

impl<C: FeatureCursor> ModifyCursor<C> {
    pub fn new(upstream: C, filter: Filter, overwrites: Vec<(String, Value)>) -> Self {
        Self {
            upstream,
            filter,
            overwrites,
            closed: false,
        }
    }
}

impl<C: FeatureCursor> FeatureCursor for ModifyCursor<C> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        self.upstream.feature_type()
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
        let mut feature = self.upstream.next()?;
        if self.filter.evaluate(&feature) {
            for (name, value) in &self.overwrites {
                match feature.set(name, value.clone()) {
                    Ok(()) | Err(StoreError::UnknownAttribute { .. }) => {}
                    Err(err) => return Err(err),
                }
            }
        }
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

use std::sync::Arc;

use super::FeatureCursor;
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType, Value};
use crate::geometry::GeometryTransformer;
use crate::query::Resolution;

/// Simplifies every geometry value to a target resolution. The record type
/// is unchanged.
pub struct ResampleCursor<C> {
    upstream: C,
    resolution: Resolution,
    transformer: Arc<dyn GeometryTransformer>,
    closed: bool,
}

impl<C: FeatureCursor> ResampleCursor<C> {
    pub fn new(
        upstream: C,
        resolution: Resolution,
        transformer: Arc<dyn GeometryTransformer>,
    ) -> Self {
        Self {
            upstream,
            resolution,
            transformer,
            closed: false,
        }
    }
}

impl<C: FeatureCursor> FeatureCursor for ResampleCursor<C> {
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
        for value in feature.values_mut() {
            if let Value::Geometry(geometry) = value {
                geometry.geometry = self.transformer.resample(
                    &geometry.geometry,
                    self.resolution.x,
                    self.resolution.y,
                )?;
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

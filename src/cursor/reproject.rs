use std::sync::Arc;

use super::FeatureCursor;
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType, Value};
use crate::geometry::{Crs, GeometryTransformer};

/// Transforms every geometry attribute into a target CRS.
///
/// A geometry's source CRS is the one it carries, falling back to the CRS
/// its attribute declares. Geometries already in an equivalent CRS are left
/// untouched, so applying the same reprojection twice changes nothing.
pub struct ReprojectCursor<C> {
    upstream: C,
    target_type: Arc<FeatureType>,
    target_crs: Crs,
    declared: Vec<Option<Crs>>,
    transformer: Arc<dyn GeometryTransformer>,
    closed: bool,
}

impl<C: FeatureCursor> ReprojectCursor<C> {
    pub fn new(upstream: C, target_crs: Crs, transformer: Arc<dyn GeometryTransformer>) -> Self {
        let source = upstream.feature_type();
        let declared = source
            .attributes()
            .iter()
            .map(|a| a.kind.crs().cloned())
            .collect();
        let target_type = Arc::new(source.with_crs(&target_crs));
        Self {
            upstream,
            target_type,
            target_crs,
            declared,
            transformer,
            closed: false,
        }
    }

    fn reproject(&self, feature: Feature) -> Result<Feature, StoreError> {
        let mut feature = feature.retyped(&self.target_type);
        let attributes = self.target_type.attributes();
        for (index, value) in feature.values_mut().iter_mut().enumerate() {
            let Value::Geometry(geometry) = value else {
                continue;
            };
            let source = geometry
                .crs
                .as_ref()
                .or(self.declared[index].as_ref())
                .ok_or_else(|| {
                    StoreError::Transform(format!(
                        "attribute {} has no CRS to reproject from",
                        attributes[index].name
                    ))
                })?;
            if !self.transformer.equivalent(source, &self.target_crs) {
                geometry.geometry =
                    self.transformer
                        .reproject(&geometry.geometry, source, &self.target_crs)?;
            }
            if geometry.crs.is_some() {
                geometry.crs = Some(self.target_crs.clone());
            }
        }
        Ok(feature)
    }
}

/// Whether reprojecting records of `feature_type` into `target` would change
/// anything, judged from the declared CRS of each geometry attribute.
pub(crate) fn needs_reprojection(
    feature_type: &FeatureType,
    target: &Crs,
    transformer: &dyn GeometryTransformer,
) -> bool {
    feature_type.geometry_attributes().any(|a| {
        a.kind
            .crs()
            .map_or(true, |crs| !transformer.equivalent(crs, target))
    })
}

impl<C: FeatureCursor> FeatureCursor for ReprojectCursor<C> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        &self.target_type
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
        self.reproject(feature)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.upstream.close()
    }
}

use std::sync::Arc;

use super::FeatureCursor;
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType, Value};

/// Reshapes records of one type into records of another.
pub trait FeatureMapper: Send {
    fn target_type(&self) -> &Arc<FeatureType>;

    fn map(&self, feature: Feature) -> Result<Feature, StoreError>;
}

/// Maps by an explicit source-to-target attribute table. Target attributes
/// the table does not fill take their default, or `Null`.
///
/// ```
/// use std::sync::Arc;
/// use feature_store::cursor::{AttributeMapping, FeatureMapper};
/// use feature_store::{AttributeKind, Feature, FeatureType, Value};
///
/// let roads = FeatureType::builder("roads")
///     .attribute("name", AttributeKind::Text)
///     .build()
///     .unwrap();
/// let labels = Arc::new(
///     FeatureType::builder("labels")
///         .attribute("text", AttributeKind::Text)
///         .attribute("size", AttributeKind::Int)
///         .build()
///         .unwrap(),
/// );
/// let mapping = AttributeMapping::new(
///     &roads,
///     Arc::clone(&labels),
///     &[("name", "text")],
///     vec![("size".into(), Value::Int(12))],
/// )
/// .unwrap();
///
/// let road = Feature::new(Arc::new(roads)).with("name", "High St").unwrap();
/// let label = mapping.map(road).unwrap();
/// assert_eq!(label.get("text"), Some(&Value::from("High St")));
/// assert_eq!(label.get("size"), Some(&Value::Int(12)));
/// ```
#[derive(Debug, Clone)]
pub struct AttributeMapping {
    target: Arc<FeatureType>,
    pairs: Vec<(usize, String)>,
    template: Feature,
}

impl AttributeMapping {
    pub fn new(
        source: &FeatureType,
        target: Arc<FeatureType>,
        correspondence: &[(&str, &str)],
        defaults: Vec<(String, Value)>,
    ) -> Result<Self, StoreError> {
        let mut template = Feature::new(Arc::clone(&target));
        for (name, value) in defaults {
            template.set(&name, value)?;
        }
        let pairs = correspondence
            .iter()
            .map(|&(from, to)| {
                let index = source.index_of(from).ok_or_else(|| StoreError::UnknownAttribute {
                    type_name: source.name().to_string(),
                    attribute: from.to_string(),
                })?;
                if target.index_of(to).is_none() {
                    return Err(StoreError::UnknownAttribute {
                        type_name: target.name().to_string(),
                        attribute: to.to_string(),
                    });
                }
                Ok((index, to.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            target,
            pairs,
            template,
        })
    }
}

impl FeatureMapper for AttributeMapping {
    fn target_type(&self) -> &Arc<FeatureType> {
        &self.target
    }

    fn map(&self, feature: Feature) -> Result<Feature, StoreError> {
        let mut mapped = self.template.clone();
        for (index, name) in &self.pairs {
            if let Some(value) = feature.value(*index) {
                mapped.set(name, value.clone())?;
            }
        }
        Ok(mapped)
    }
}

/// Applies a [`FeatureMapper`] to every upstream record.
pub struct MappingCursor<C, M> {
    upstream: C,
    mapper: M,
    closed: bool,
}

impl<C: FeatureCursor, M: FeatureMapper> MappingCursor<C, M> {
    pub fn new(upstream: C, mapper: M) -> Self {
        Self {
            upstream,
            mapper,
            closed: false,
        }
    }
}

impl<C: FeatureCursor, M: FeatureMapper> FeatureCursor for MappingCursor<C, M> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        self.mapper.target_type()
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
        self.mapper.map(feature)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.upstream.close()
    }
}

/// Wraps each upstream record into a record of `target` using a closure.
/// The closure's output must conform to `target`.
pub struct EncapsulateCursor<C, F> {
    upstream: C,
    target: Arc<FeatureType>,
    wrap: F,
    closed: bool,
}

impl<C, F> EncapsulateCursor<C, F>
where
    C: FeatureCursor,
    F: FnMut(Feature) -> Result<Feature, StoreError>,
{
    pub fn new(upstream: C, target: Arc<FeatureType>, wrap: F) -> Self {
        Self {
            upstream,
            target,
            wrap,
            closed: false,
        }
    }
}

impl<C, F> FeatureCursor for EncapsulateCursor<C, F>
where
    C: FeatureCursor,
    F: FnMut(Feature) -> Result<Feature, StoreError>,
{
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
        let wrapped = (self.wrap)(self.upstream.next()?)?;
        if !wrapped.feature_type().conforms_to(&self.target) {
            return Err(StoreError::TypeMismatch {
                expected: self.target.name().to_string(),
                actual: wrapped.feature_type().name().to_string(),
            });
        }
        Ok(wrapped.retyped(&self.target))
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.upstream.close()
    }
}

//! Records ("features") and the types describing their shape.

mod feature_type;
mod value;

pub use feature_type::{AttributeDescriptor, FeatureType, FeatureTypeBuilder};
pub use value::{AttributeKind, Value};

use std::sync::Arc;

use crate::error::StoreError;
use crate::geometry::GeometryValue;

/// Stable identifier of a record in an identity-keyed collection.
/// Negative values are placeholders the store replaces on ingestion.
pub type FeatureId = i64;

/// One record: a value per attribute of its [`FeatureType`].
///
/// Features are plain values. The store copies them on the way in and out,
/// so a caller holding a feature never aliases stored state.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    feature_type: Arc<FeatureType>,
    values: Vec<Value>,
}

impl Feature {
    /// A feature with every attribute set to `Null`.
    pub fn new(feature_type: Arc<FeatureType>) -> Self {
        let values = vec![Value::Null; feature_type.len()];
        Self {
            feature_type,
            values,
        }
    }

    /// Build a feature from one value per attribute, in declaration order.
    pub fn from_values(
        feature_type: Arc<FeatureType>,
        values: Vec<Value>,
    ) -> Result<Self, StoreError> {
        if values.len() != feature_type.len() {
            return Err(StoreError::InvalidValue {
                attribute: feature_type.name().to_string(),
                reason: format!(
                    "expected {} values, got {}",
                    feature_type.len(),
                    values.len()
                ),
            });
        }
        let mut feature = Feature::new(feature_type);
        for (index, value) in values.into_iter().enumerate() {
            feature.set_at(index, value)?;
        }
        Ok(feature)
    }

    /// Builder-style [`set`](Feature::set).
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self, StoreError> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.feature_type
            .index_of(name)
            .map(|index| &self.values[index])
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Overwrite one attribute, checking the value against its declared kind.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), StoreError> {
        let index = self
            .feature_type
            .index_of(name)
            .ok_or_else(|| StoreError::UnknownAttribute {
                type_name: self.feature_type.name().to_string(),
                attribute: name.to_string(),
            })?;
        self.set_at(index, value.into())
    }

    fn set_at(&mut self, index: usize, value: Value) -> Result<(), StoreError> {
        let attr = &self.feature_type.attributes()[index];
        if !value.fits(&attr.kind) {
            return Err(StoreError::InvalidValue {
                attribute: attr.name.clone(),
                reason: format!("expected {}, got {}", attr.kind, value),
            });
        }
        self.values[index] = value.coerce(&attr.kind);
        Ok(())
    }

    /// The identifier, when the type declares one and it is set.
    pub fn id(&self) -> Option<FeatureId> {
        self.feature_type
            .identifier_index()
            .and_then(|index| self.values[index].as_int())
    }

    pub(crate) fn set_id(&mut self, id: FeatureId) {
        if let Some(index) = self.feature_type.identifier_index() {
            self.values[index] = Value::Int(id);
        }
    }

    /// Geometry-valued attributes as `(attribute index, value)` pairs.
    pub fn geometries(&self) -> impl Iterator<Item = (usize, &GeometryValue)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(index, value)| value.as_geometry().map(|g| (index, g)))
    }

    /// Check that required attributes are set.
    pub fn validate(&self) -> Result<(), StoreError> {
        for (attr, value) in self.feature_type.attributes().iter().zip(&self.values) {
            if !attr.nillable && !attr.identifier && value.is_null() {
                return Err(StoreError::InvalidValue {
                    attribute: attr.name.clone(),
                    reason: "attribute is required".into(),
                });
            }
        }
        Ok(())
    }

    /// Re-expose this feature under `target`, picking values by attribute
    /// name. Attributes `target` does not declare are dropped; attributes
    /// missing here are `Null`.
    pub fn project(&self, target: &Arc<FeatureType>) -> Feature {
        let values = target
            .attribute_names()
            .map(|name| self.get(name).cloned().unwrap_or(Value::Null))
            .collect();
        Feature {
            feature_type: Arc::clone(target),
            values,
        }
    }

    /// Swap the type without touching values. `target` must share this
    /// feature's attribute layout.
    pub(crate) fn retyped(mut self, target: &Arc<FeatureType>) -> Feature {
        debug_assert_eq!(target.len(), self.values.len());
        self.feature_type = Arc::clone(target);
        self
    }

    pub(crate) fn values_mut(&mut self) -> &mut [Value] {
        &mut self.values
    }

    /// Attribute names whose values differ between `self` and `other`,
    /// which must share a layout.
    pub fn diff<'a>(&'a self, other: &'a Feature) -> Vec<(String, Value)> {
        self.feature_type
            .attributes()
            .iter()
            .zip(self.values.iter().zip(&other.values))
            .filter(|(_, (a, b))| a != b)
            .map(|(attr, (_, b))| (attr.name.clone(), b.clone()))
            .collect()
    }
}

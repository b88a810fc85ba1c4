use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::AttributeKind;
use crate::error::StoreError;
use crate::geometry::Crs;

/// One named attribute of a [`FeatureType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: AttributeKind,
    pub nillable: bool,
    /// Marks the stable identifier attribute. At most one per type.
    pub identifier: bool,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nillable: true,
            identifier: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.nillable = false;
        self
    }
}

/// Schema of a collection: an ordered list of attribute descriptors.
///
/// Immutable once built. Two types are interchangeable when their
/// descriptors match (see [`FeatureType::conforms_to`]); the name only
/// selects the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureType {
    name: String,
    attributes: Vec<AttributeDescriptor>,
}

impl FeatureType {
    pub fn builder(name: impl Into<String>) -> FeatureTypeBuilder {
        FeatureTypeBuilder {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Validate and build a type from descriptors.
    pub fn new(
        name: impl Into<String>,
        attributes: Vec<AttributeDescriptor>,
    ) -> Result<Self, StoreError> {
        let name = name.into();
        let mut seen = HashSet::new();
        let mut identifiers = 0;
        for attr in &attributes {
            if !seen.insert(attr.name.as_str()) {
                return Err(StoreError::InvalidValue {
                    attribute: attr.name.clone(),
                    reason: format!("declared twice in type {}", name),
                });
            }
            if attr.identifier {
                identifiers += 1;
                if attr.kind != AttributeKind::Int {
                    return Err(StoreError::InvalidValue {
                        attribute: attr.name.clone(),
                        reason: "identifier attributes must be int".into(),
                    });
                }
            }
        }
        if identifiers > 1 {
            return Err(StoreError::InvalidValue {
                attribute: name.clone(),
                reason: "a type declares at most one identifier".into(),
            });
        }
        Ok(Self { name, attributes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn identifier(&self) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.identifier)
    }

    pub fn identifier_index(&self) -> Option<usize> {
        self.attributes.iter().position(|a| a.identifier)
    }

    /// Whether records of this type carry a stable identifier.
    pub fn has_identity(&self) -> bool {
        self.identifier_index().is_some()
    }

    pub fn geometry_attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.iter().filter(|a| a.kind.is_geometry())
    }

    /// Structural compatibility: same descriptors in the same order.
    pub fn conforms_to(&self, other: &FeatureType) -> bool {
        self.attributes == other.attributes
    }

    /// Whether `names` is exactly this type's attribute list, in order.
    pub fn is_exactly(&self, names: &[String]) -> bool {
        names.len() == self.attributes.len()
            && names.iter().zip(&self.attributes).all(|(n, a)| *n == a.name)
    }

    /// The type restricted to `names`, in the order given.
    pub fn subtype(&self, names: &[String]) -> Result<FeatureType, StoreError> {
        let mut attributes = Vec::with_capacity(names.len());
        for name in names {
            let attr = self
                .attribute(name)
                .ok_or_else(|| StoreError::UnknownAttribute {
                    type_name: self.name.clone(),
                    attribute: name.clone(),
                })?;
            attributes.push(attr.clone());
        }
        FeatureType::new(self.name.clone(), attributes)
    }

    /// A copy whose geometry attributes all declare `crs`.
    pub fn with_crs(&self, crs: &Crs) -> FeatureType {
        let attributes = self
            .attributes
            .iter()
            .map(|a| match a.kind {
                AttributeKind::Geometry(_) => AttributeDescriptor {
                    kind: AttributeKind::Geometry(Some(crs.clone())),
                    ..a.clone()
                },
                _ => a.clone(),
            })
            .collect();
        FeatureType {
            name: self.name.clone(),
            attributes,
        }
    }
}

/// Fluent construction of a [`FeatureType`].
///
/// ```
/// use feature_store::{AttributeKind, Crs, FeatureType};
///
/// let roads = FeatureType::builder("roads")
///     .identifier("fid")
///     .attribute("name", AttributeKind::Text)
///     .geometry("geom", Crs::new("EPSG:4326"))
///     .build()
///     .unwrap();
/// assert!(roads.has_identity());
/// ```
#[derive(Debug, Clone)]
pub struct FeatureTypeBuilder {
    name: String,
    attributes: Vec<AttributeDescriptor>,
}

impl FeatureTypeBuilder {
    pub fn identifier(mut self, name: impl Into<String>) -> Self {
        let mut attr = AttributeDescriptor::new(name, AttributeKind::Int);
        attr.identifier = true;
        self.attributes.push(attr);
        self
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeDescriptor::new(name, kind));
        self
    }

    pub fn required(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes
            .push(AttributeDescriptor::new(name, kind).required());
        self
    }

    pub fn geometry(mut self, name: impl Into<String>, crs: Crs) -> Self {
        self.attributes
            .push(AttributeDescriptor::new(name, AttributeKind::Geometry(Some(crs))));
        self
    }

    pub fn descriptor(mut self, descriptor: AttributeDescriptor) -> Self {
        self.attributes.push(descriptor);
        self
    }

    pub fn build(self) -> Result<FeatureType, StoreError> {
        FeatureType::new(self.name, self.attributes)
    }
}

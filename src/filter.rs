//! Record predicates.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::feature::{Feature, FeatureId, Value};
use crate::geometry::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn matches(self, left: &Value, right: &Value) -> bool {
        let ordering = left.partial_compare(right);
        match self {
            CompareOp::Eq => left == right || ordering == Some(Ordering::Equal),
            CompareOp::Ne => !CompareOp::Eq.matches(left, right),
            CompareOp::Lt => ordering == Some(Ordering::Less),
            CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => ordering == Some(Ordering::Greater),
            CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

/// An arbitrary predicate closure.
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&Feature) -> bool + Send + Sync>);

impl Predicate {
    pub fn test(&self, feature: &Feature) -> bool {
        (self.0)(feature)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Predicate over records. [`Filter::Include`] is the "no constraint" filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Include,
    Exclude,
    /// Identity-set test: matches records whose identifier is in the set.
    Ids(BTreeSet<FeatureId>),
    Compare {
        attribute: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    /// Geometry attribute whose envelope intersects the given box.
    Bbox {
        attribute: String,
        envelope: Envelope,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Custom(Predicate),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Include
    }
}

impl Filter {
    pub fn ids(ids: impl IntoIterator<Item = FeatureId>) -> Filter {
        Filter::Ids(ids.into_iter().collect())
    }

    pub fn compare(attribute: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Filter {
        Filter::Compare {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::compare(attribute, CompareOp::Eq, value)
    }

    pub fn ne(attribute: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::compare(attribute, CompareOp::Ne, value)
    }

    pub fn lt(attribute: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::compare(attribute, CompareOp::Lt, value)
    }

    pub fn le(attribute: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::compare(attribute, CompareOp::Le, value)
    }

    pub fn gt(attribute: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::compare(attribute, CompareOp::Gt, value)
    }

    pub fn ge(attribute: impl Into<String>, value: impl Into<Value>) -> Filter {
        Filter::compare(attribute, CompareOp::Ge, value)
    }

    pub fn is_null(attribute: impl Into<String>) -> Filter {
        Filter::IsNull(attribute.into())
    }

    pub fn bbox(attribute: impl Into<String>, envelope: Envelope) -> Filter {
        Filter::Bbox {
            attribute: attribute.into(),
            envelope,
        }
    }

    pub fn custom(f: impl Fn(&Feature) -> bool + Send + Sync + 'static) -> Filter {
        Filter::Custom(Predicate(Arc::new(f)))
    }

    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Filter {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    pub fn evaluate(&self, feature: &Feature) -> bool {
        match self {
            Filter::Include => true,
            Filter::Exclude => false,
            Filter::Ids(ids) => feature.id().is_some_and(|id| ids.contains(&id)),
            Filter::Compare {
                attribute,
                op,
                value,
            } => feature
                .get(attribute)
                .is_some_and(|current| op.matches(current, value)),
            Filter::IsNull(attribute) => feature.get(attribute).is_some_and(Value::is_null),
            Filter::Bbox {
                attribute,
                envelope,
            } => feature
                .get(attribute)
                .and_then(Value::as_geometry)
                .and_then(|g| g.geometry.envelope())
                .is_some_and(|env| env.intersects(envelope)),
            Filter::And(parts) => parts.iter().all(|f| f.evaluate(feature)),
            Filter::Or(parts) => parts.iter().any(|f| f.evaluate(feature)),
            Filter::Not(inner) => !inner.evaluate(feature),
            Filter::Custom(predicate) => predicate.test(feature),
        }
    }

    /// Fold constant sub-filters so "include all" and "exclude all" can be
    /// recognized without evaluating anything.
    pub fn simplify(self) -> Filter {
        match self {
            Filter::Ids(ids) if ids.is_empty() => Filter::Exclude,
            Filter::And(parts) => {
                let mut kept = Vec::with_capacity(parts.len());
                for part in parts.into_iter().map(Filter::simplify) {
                    match part {
                        Filter::Include => {}
                        Filter::Exclude => return Filter::Exclude,
                        Filter::And(nested) => kept.extend(nested),
                        other => kept.push(other),
                    }
                }
                match kept.len() {
                    0 => Filter::Include,
                    1 => kept.remove(0),
                    _ => Filter::And(kept),
                }
            }
            Filter::Or(parts) => {
                let mut kept = Vec::with_capacity(parts.len());
                for part in parts.into_iter().map(Filter::simplify) {
                    match part {
                        Filter::Exclude => {}
                        Filter::Include => return Filter::Include,
                        Filter::Or(nested) => kept.extend(nested),
                        other => kept.push(other),
                    }
                }
                match kept.len() {
                    0 => Filter::Exclude,
                    1 => kept.remove(0),
                    _ => Filter::Or(kept),
                }
            }
            Filter::Not(inner) => match inner.simplify() {
                Filter::Include => Filter::Exclude,
                Filter::Exclude => Filter::Include,
                Filter::Not(again) => *again,
                other => Filter::Not(Box::new(other)),
            },
            other => other,
        }
    }

    pub fn is_include(&self) -> bool {
        matches!(self.clone().simplify(), Filter::Include)
    }

    pub fn is_exclude(&self) -> bool {
        matches!(self.clone().simplify(), Filter::Exclude)
    }

    /// The identifier set, when this filter is exactly an identity-set test.
    pub fn as_ids(&self) -> Option<&BTreeSet<FeatureId>> {
        match self {
            Filter::Ids(ids) => Some(ids),
            _ => None,
        }
    }
}

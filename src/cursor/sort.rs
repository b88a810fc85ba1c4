use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use super::FeatureCursor;
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType};
use crate::query::{SortBy, SortOrder};

/// Sorts the whole upstream on first access.
///
/// This materializes every upstream record in memory. The sort is stable,
/// so records that compare equal keep their upstream order.
pub struct SortCursor<C> {
    upstream: C,
    keys: Vec<(usize, SortOrder)>,
    sorted: Option<VecDeque<Feature>>,
    closed: bool,
}

impl<C: FeatureCursor> SortCursor<C> {
    /// Fails when a sort key names an attribute the upstream type lacks.
    pub fn new(upstream: C, sort_by: &[SortBy]) -> Result<Self, StoreError> {
        let feature_type = upstream.feature_type();
        let keys = sort_by
            .iter()
            .map(|key| {
                feature_type
                    .index_of(&key.attribute)
                    .map(|index| (index, key.order))
                    .ok_or_else(|| StoreError::UnknownAttribute {
                        type_name: feature_type.name().to_string(),
                        attribute: key.attribute.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            upstream,
            keys,
            sorted: None,
            closed: false,
        })
    }

    fn compare(keys: &[(usize, SortOrder)], a: &Feature, b: &Feature) -> Ordering {
        for &(index, order) in keys {
            let (Some(x), Some(y)) = (a.value(index), b.value(index)) else {
                continue;
            };
            let ordering = match order {
                SortOrder::Ascending => x.sort_cmp(y),
                SortOrder::Descending => y.sort_cmp(x),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    fn materialize(&mut self) -> Result<&mut VecDeque<Feature>, StoreError> {
        if self.sorted.is_none() {
            let mut all = Vec::new();
            while self.upstream.has_next()? {
                all.push(self.upstream.next()?);
            }
            let keys = &self.keys;
            all.sort_by(|a, b| Self::compare(keys, a, b));
            self.sorted = Some(all.into());
        }
        Ok(self.sorted.get_or_insert_with(VecDeque::new))
    }
}

impl<C: FeatureCursor> FeatureCursor for SortCursor<C> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        self.upstream.feature_type()
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.closed {
            return Ok(false);
        }
        Ok(!self.materialize()?.is_empty())
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.materialize()?
            .pop_front()
            .ok_or(StoreError::Exhausted)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sorted = None;
        self.upstream.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::test_support::*;
    use crate::cursor::VecCursor;
    use crate::feature::Value;

    #[test]
    fn sorts_descending() {
        let mut cursor = SortCursor::new(numbered_cursor(4), &[SortBy::desc("n")]).unwrap();
        assert_eq!(ids(&cursor.drain().unwrap()), vec![4, 3, 2, 1]);
    }

    #[test]
    fn secondary_key_breaks_ties() {
        let mut features = numbered(4);
        for (i, f) in features.iter_mut().enumerate() {
            f.set("label", if i % 2 == 0 { "even" } else { "odd" }).unwrap();
        }
        let upstream = VecCursor::new(numbered_type(), features);
        let mut cursor =
            SortCursor::new(upstream, &[SortBy::asc("label"), SortBy::desc("fid")]).unwrap();
        assert_eq!(ids(&cursor.drain().unwrap()), vec![3, 1, 4, 2]);
    }

    #[test]
    fn nulls_sort_first_and_ties_are_stable() {
        let mut features = numbered(3);
        features[2].set("n", Value::Null).unwrap();
        features[0].set("n", 20).unwrap();
        let upstream = VecCursor::new(numbered_type(), features);
        let mut cursor = SortCursor::new(upstream, &[SortBy::asc("n")]).unwrap();
        assert_eq!(ids(&cursor.drain().unwrap()), vec![3, 1, 2]);
    }

    #[test]
    fn unknown_sort_key() {
        let err = SortCursor::new(numbered_cursor(1), &[SortBy::asc("nope")])
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::UnknownAttribute { .. }));
    }
}

use std::sync::Arc;

use super::{FeatureCursor, FeatureWriter};
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType};
use crate::filter::Filter;

/// Yields only the upstream records matching a filter.
///
/// Over a writer, looking ahead advances the upstream writer, which commits
/// the record fetched before it. Edit the current record before calling
/// `has_next` again.
pub struct FilterCursor<C> {
    upstream: C,
    filter: Filter,
    lookahead: Option<Feature>,
    closed: bool,
}

impl<C: FeatureCursor> FilterCursor<C> {
    pub fn new(upstream: C, filter: Filter) -> Self {
        Self {
            upstream,
            filter,
            lookahead: None,
            closed: false,
        }
    }
}

impl<C: FeatureCursor> FeatureCursor for FilterCursor<C> {
    fn feature_type(&self) -> &Arc<FeatureType> {
        self.upstream.feature_type()
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        if self.closed {
            return Ok(false);
        }
        if self.lookahead.is_some() {
            return Ok(true);
        }
        while self.upstream.has_next()? {
            let candidate = self.upstream.next()?;
            if self.filter.evaluate(&candidate) {
                self.lookahead = Some(candidate);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        if !self.has_next()? {
            return Err(StoreError::Exhausted);
        }
        self.lookahead.take().ok_or(StoreError::Exhausted)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.lookahead = None;
        self.upstream.close()
    }
}

impl<C: FeatureWriter> FeatureWriter for FilterCursor<C> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::test_support::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn keeps_matching_records() {
        let mut cursor = FilterCursor::new(numbered_cursor(6), Filter::gt("n", 30));
        assert_eq!(ids(&cursor.drain().unwrap()), vec![4, 5, 6]);
    }

    #[test]
    fn has_next_is_repeatable() {
        let counting = Counting::new(numbered_cursor(5));
        let (pulls, _) = counting.counters();
        let mut cursor = FilterCursor::new(counting, Filter::eq("n", 20));
        assert!(cursor.has_next().unwrap());
        assert!(cursor.has_next().unwrap());
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
        assert_eq!(cursor.next().unwrap().id(), Some(2));
        assert!(!cursor.has_next().unwrap());
        assert_eq!(cursor.next().unwrap_err(), StoreError::Exhausted);
    }

    #[test]
    fn close_propagates_once() {
        let counting = Counting::new(numbered_cursor(2));
        let (_, closes) = counting.counters();
        let mut cursor = FilterCursor::new(counting, Filter::Include);
        cursor.close().unwrap();
        cursor.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!cursor.has_next().unwrap());
    }
}

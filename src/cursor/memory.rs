use std::collections::VecDeque;
use std::sync::Arc;

use super::FeatureCursor;
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType};

/// Cursor over records already held in memory.
#[derive(Debug)]
pub struct VecCursor {
    feature_type: Arc<FeatureType>,
    features: VecDeque<Feature>,
    closed: bool,
}

impl VecCursor {
    pub fn new(feature_type: Arc<FeatureType>, features: Vec<Feature>) -> Self {
        Self {
            feature_type,
            features: features.into(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl FeatureCursor for VecCursor {
    fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        Ok(!self.closed && !self.features.is_empty())
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.features.pop_front().ok_or(StoreError::Exhausted)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        self.features.clear();
        Ok(())
    }
}

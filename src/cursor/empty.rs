use std::sync::Arc;

use super::FeatureCursor;
use crate::error::StoreError;
use crate::feature::{Feature, FeatureType};

/// A cursor of a given type that never yields anything.
///
/// The pipeline substitutes it for a real chain when the result is known to
/// be empty (an "exclude all" filter, a limit of zero).
#[derive(Debug, Clone)]
pub struct EmptyCursor {
    feature_type: Arc<FeatureType>,
    closed: bool,
}

impl EmptyCursor {
    pub fn new(feature_type: Arc<FeatureType>) -> Self {
        Self {
            feature_type,
            closed: false,
        }
    }
}

impl FeatureCursor for EmptyCursor {
    fn feature_type(&self) -> &Arc<FeatureType> {
        &self.feature_type
    }

    fn has_next(&mut self) -> Result<bool, StoreError> {
        Ok(false)
    }

    fn next(&mut self) -> Result<Feature, StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Err(StoreError::Exhausted)
        }
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        Ok(())
    }
}

use super::FeatureCursor;
use crate::error::StoreError;
use crate::feature::Feature;

/// [`Iterator`] over a cursor's records.
///
/// The cursor is closed when iteration ends, when an error is yielded, or
/// when the adapter is dropped. After an error the iterator is fused.
pub struct Features<C: FeatureCursor> {
    cursor: C,
    done: bool,
}

impl<C: FeatureCursor> Features<C> {
    pub(crate) fn new(cursor: C) -> Self {
        Self {
            cursor,
            done: false,
        }
    }

    fn finish(&mut self) -> Option<Result<Feature, StoreError>> {
        self.done = true;
        self.cursor.close().err().map(Err)
    }
}

impl<C: FeatureCursor> Iterator for Features<C> {
    type Item = Result<Feature, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.has_next() {
            Ok(true) => match self.cursor.next() {
                Ok(feature) => Some(Ok(feature)),
                Err(err) => {
                    self.finish();
                    Some(Err(err))
                }
            },
            Ok(false) => self.finish(),
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl<C: FeatureCursor> Drop for Features<C> {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.cursor.close();
        }
    }
}

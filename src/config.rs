//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::feature::FeatureId;

/// Settings applied when a [`Store`](crate::Store) is constructed.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use feature_store::StoreConfig;
///
/// let config = StoreConfig::from_json(r#"{ "prefetch": 64 }"#).unwrap();
/// assert_eq!(config.prefetch, Some(64));
/// assert_eq!(config.worker_threads, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Threads in the worker pool the store creates for itself.
    /// Ignored by [`Store::with_pool`](crate::Store::with_pool).
    pub worker_threads: usize,
    /// First value drawn from each identity-keyed collection's id counter.
    pub id_start: FeatureId,
    /// Default cache size for query results. `None` disables prefetching
    /// unless a query asks for it through its hints.
    pub prefetch: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            id_start: 1,
            prefetch: None,
        }
    }
}

impl StoreConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let config: StoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_id_start(mut self, id_start: FeatureId) -> Self {
        self.id_start = id_start;
        self
    }

    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.worker_threads == 0 {
            return Err(StoreError::Config("worker_threads must be at least 1".into()));
        }
        if self.id_start < 0 {
            return Err(StoreError::Config(
                "id_start must not be negative, negative ids are placeholders".into(),
            ));
        }
        if self.prefetch == Some(0) {
            return Err(StoreError::Config("prefetch must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.id_start, 1);
        assert_eq!(config.prefetch, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = StoreConfig::from_json(r#"{ "id_start": 100 }"#).unwrap();
        assert_eq!(config.id_start, 100);
        assert_eq!(config.worker_threads, 2);
    }

    #[test]
    fn rejects_zero_workers() {
        let err = StoreConfig::from_json(r#"{ "worker_threads": 0 }"#).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = StoreConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }
}

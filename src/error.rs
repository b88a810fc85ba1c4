use thiserror::Error;

/// Error type shared by the store, its cursors and the query pipeline.
///
/// Usage errors (unknown collection, CRS mismatch, reading past the end) are
/// returned synchronously. Errors raised while pulling from an upstream cursor
/// are carried through the decorator chain and surface on the next pull.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("no such collection: {0}")]
    UnknownType(String),

    #[error("collection already exists: {0}")]
    TypeExists(String),

    #[error("record of type {actual} does not conform to collection {expected}")]
    TypeMismatch { expected: String, actual: String },

    #[error("type {type_name} has no attribute {attribute}")]
    UnknownAttribute { type_name: String, attribute: String },

    #[error("invalid value for attribute {attribute}: {reason}")]
    InvalidValue { attribute: String, reason: String },

    #[error("CRS mismatch on attribute {attribute} (declared {expected}, found {actual})")]
    CrsMismatch {
        attribute: String,
        expected: String,
        actual: String,
    },

    #[error("cursor exhausted")]
    Exhausted,

    #[error("no record has been fetched from this writer")]
    NoCurrentRecord,

    #[error("cursor is closed")]
    Closed,

    #[error("geometry transform failed: {0}")]
    Transform(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Config(err.to_string())
    }
}

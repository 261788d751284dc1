//! Error types for the settings stores.

use thiserror::Error;

/// Errors raised by a backing store adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    /// MongoDB driver failure.
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// A stored document did not have the expected shape.
    #[error("malformed row: {0}")]
    Decode(String),

    /// `create` was called for a scope that already has a row.
    #[error("row already exists for scope {0}")]
    Conflict(String),

    /// `update` was called for a scope without a row.
    #[error("no row for scope {0}")]
    Missing(String),

    /// The adapter cannot be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the cache store API.
///
/// Validation variants describe a malformed call and never touch storage.
/// The remaining variants wrap a [`BackendError`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{store} store is keyed by id, but no scope id was given")]
    MissingScope { store: &'static str },

    #[error("none of the requested fields exist in the {store} store")]
    NoKnownFields { store: &'static str },

    #[error("field '{field}' is not declared in the {store} store")]
    UnknownField { store: &'static str, field: String },

    #[error("unknown method '{0}', expected get, set, add or delete")]
    UnknownMethod(String),

    #[error("invalid content for '{field}': {reason}")]
    InvalidContent { field: String, reason: &'static str },

    #[error("field '{0}' does not hold an object")]
    NotAnObject(String),

    #[error("deleting from object field '{0}' requires an id")]
    MissingId(String),

    #[error("key '{id}' is not present in field '{field}'")]
    IdNotFound { field: String, id: String },

    #[error("refusing to delete scalar field '{0}' without force")]
    DeleteRefused(String),

    #[error("field '{0}' is not set")]
    FieldAbsent(String),

    #[error("failed to warm {store} store: {source}")]
    Warm {
        store: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("failed to load scope {scope} of {store} store: {source}")]
    Load {
        store: &'static str,
        scope: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to persist '{field}' in scope {scope} of {store} store: {source}")]
    Persist {
        store: &'static str,
        scope: String,
        field: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to flush {failed} of {total} scopes in {store} store")]
    Flush {
        store: &'static str,
        failed: usize,
        total: usize,
    },
}

impl StoreError {
    /// Whether the error came from a malformed call rather than from storage.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Self::Warm { .. } | Self::Load { .. } | Self::Persist { .. } | Self::Flush { .. }
        )
    }
}

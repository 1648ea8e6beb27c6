//! Error taxonomy of the adapter.
//!
//! Definition errors abort `define`; validation and input errors are reported
//! before any store call is made; store errors pass through untouched.

use dynorm_model::StoreError;

/// A model definition that cannot be registered.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// Two properties claim the same key role.
    #[error("model {model}: more than one {role} key ({first}, {second})")]
    DuplicateKey {
        model: String,
        role: &'static str,
        first: String,
        second: String,
    },

    /// A generated (UUID) key must use the reserved identifier name.
    #[error("model {model}: uuid key must be named `id`, found `{property}`")]
    InvalidUuidKey { model: String, property: String },

    /// A composite primary key must use the reserved identifier name.
    #[error("model {model}: primary key must be named `id`, found `{property}`")]
    InvalidPrimaryKeyName { model: String, property: String },

    /// A range key was declared without the composite `id` key.
    #[error("model {model}: range key `{range}` requires a composite `id` key (keyType: pk)")]
    MissingPrimaryKey { model: String, range: String },

    /// A composite key was declared without a range key.
    #[error("model {model}: composite key `{property}` declared without a range key")]
    CompositeWithoutRange { model: String, property: String },

    /// A range key was declared without a hash key.
    #[error("model {model}: range key `{range}` declared without a hash key")]
    RangeWithoutHash { model: String, range: String },

    /// Two indexes resolve to the same name.
    #[error("model {model}: duplicate index name `{index}`")]
    DuplicateIndexName { model: String, index: String },

    /// A property spec is malformed.
    #[error("model {model}: invalid property `{property}`: {reason}")]
    InvalidProperty {
        model: String,
        property: String,
        reason: String,
    },

    /// The registry already holds a model with this name.
    #[error("model {0} is already defined")]
    ModelAlreadyDefined(String),
}

/// Key values missing or malformed on a write or lookup.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// The hash key attribute is absent.
    #[error("model {model}: hash key `{attribute}` is missing")]
    MissingHashValue { model: String, attribute: String },

    /// The hash key attribute is explicitly null.
    #[error("model {model}: hash key `{attribute}` cannot be null")]
    NullHashValue { model: String, attribute: String },

    /// The range key attribute is absent or null.
    #[error("model {model}: range key `{attribute}` is missing")]
    MissingRangeValue { model: String, attribute: String },

    /// A key value cannot be converted to its declared type.
    #[error("invalid value for key `{attribute}`: {reason}")]
    InvalidKeyValue { attribute: String, reason: String },
}

/// A caller-supplied filter that cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// `limit` is not a non-negative number.
    #[error("limit must be a non-negative number, got {0}")]
    InvalidLimit(String),

    /// `offset`/`skip` is not a non-negative number.
    #[error("offset must be a non-negative number, got {0}")]
    InvalidOffset(String),

    /// `minResults` is not a non-negative number.
    #[error("minResults must be a non-negative number, got {0}")]
    InvalidMinResults(String),

    /// The filter shape is not understood.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// An `inq` (or bare list) condition with no values.
    #[error("empty value list for `{0}`")]
    EmptyInSet(String),
}

/// Top-level error of every connector operation.
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Input(#[from] InputError),

    /// Failure answered by the store, unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A remote call exceeded the configured timeout.
    #[error("{operation} timed out after {elapsed_ms} ms")]
    Timeout {
        operation: &'static str,
        elapsed_ms: u64,
    },

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience result type for connector operations.
pub type OrmResult<T> = Result<T, OrmError>;

impl OrmError {
    /// The store error, if this error came from the store.
    #[must_use]
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

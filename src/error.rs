//! Error taxonomy for authoring operations.

use crate::store::StoreError;

/// Error returned by every authoring, ordering and publishing operation.
///
/// No variant leaves a partial mutation behind: all multi-row work runs in a
/// transaction that is rolled back when an error escapes it.
#[derive(Debug, thiserror::Error)]
pub enum AuthoringError {
    /// Malformed input (missing field, bad enum value, reorder set mismatch).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("module", "task", ...).
        entity: &'static str,
        /// The id or code that was looked up.
        id: String,
    },

    /// The operation is not allowed in the current state.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A uniqueness constraint or serialization check rejected the
    /// transaction. Safe to retry.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Backend failure unrelated to the request.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuthoringError {
    /// Shorthand for [`AuthoringError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`AuthoringError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::PreconditionFailed(_) => "PRECONDITION_FAILED",
            Self::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<StoreError> for AuthoringError {
    fn from(err: StoreError) -> Self {
        if err.is_constraint_violation() {
            Self::ConstraintViolation(err.to_string())
        } else {
            Self::Storage(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AuthoringError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("Payload serialization failed: {}", err))
    }
}

/// Result alias for authoring operations.
pub type AuthoringResult<T> = Result<T, AuthoringError>;

//! Error types for the story and follow-up services
//!
//! Errors are classified by how the caller should react:
//! - Blocking: validation and import failures stop the save and are shown inline
//! - Retryable: storage failures may succeed if the caller tries again
//! - NotFound: the referenced entity is gone
//!
//! Unresolved stakeholder ids are not errors. They are logged and omitted.

use thiserror::Error;

use crate::dates::InvalidDate;
use crate::db::DbError;

/// Error returned by every service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Could not import stakeholder '{stakeholder}': {reason}")]
    ImportFailure { stakeholder: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
}

impl ServiceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ServiceError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns true if this error is retryable. The services never retry on
    /// their own; this is a hint for the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Storage(_))
    }

    /// Returns true if the user's pending save must be held back so the
    /// authored content is not lost.
    pub fn blocks_save(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation(_) | ServiceError::ImportFailure { .. }
        )
    }

    fn error_type(&self) -> ErrorType {
        match self {
            ServiceError::Validation(_) => ErrorType::Validation,
            ServiceError::NotFound { .. } => ErrorType::NotFound,
            ServiceError::ImportFailure { .. } => ErrorType::ImportFailure,
            ServiceError::Storage(_) => ErrorType::Storage,
        }
    }
}

impl From<InvalidDate> for ServiceError {
    fn from(err: InvalidDate) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        ServiceError::Storage(DbError::Sqlite(err))
    }
}

/// Serializable error representation for API callers
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    Validation,
    NotFound,
    ImportFailure,
    Storage,
}

impl From<&ServiceError> for ErrorPayload {
    fn from(err: &ServiceError) -> Self {
        ErrorPayload {
            message: err.to_string(),
            error_type: err.error_type(),
            can_retry: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let validation = ServiceError::Validation("content is required".to_string());
        assert!(validation.blocks_save());
        assert!(!validation.is_retryable());

        let import = ServiceError::ImportFailure {
            stakeholder: "Ada".to_string(),
            reason: "name taken".to_string(),
        };
        assert!(import.blocks_save());

        let storage = ServiceError::Storage(DbError::NotOpen);
        assert!(storage.is_retryable());
        assert!(!storage.blocks_save());

        let missing = ServiceError::not_found("Story", "st1");
        assert!(!missing.is_retryable());
        assert_eq!(missing.to_string(), "Story not found: st1");
    }

    #[test]
    fn test_invalid_date_becomes_validation() {
        let err: ServiceError = InvalidDate("soon".to_string()).into();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_payload_serializes_camel_case() {
        let err = ServiceError::Storage(DbError::NotOpen);
        let payload = ErrorPayload::from(&err);
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["errorType"], "storage");
        assert_eq!(json["canRetry"], true);
        assert_eq!(json["message"], "Storage error: Database is not open");
    }
}

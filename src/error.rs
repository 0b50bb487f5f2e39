// ⚠️ Error taxonomy for the ledger core
// Every failure is a typed value the caller can match on; none is fatal.

use crate::medicine::ValidationError;
use crate::store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Bad input shape, rejected before any store interaction.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No ledger entry carries the requested batch id.
    #[error("batch not found: {0}")]
    NotFound(String),

    /// Forecast called with too short a history.
    #[error("insufficient data: need at least {required} stock readings, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    /// Forecast arithmetic produced a non-finite value.
    #[error("forecast computation failed: {0}")]
    Compute(String),

    /// The document store failed or is closed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Canonical serialization of a medicine failed.
    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Optimistic retries exhausted while other writers kept appending.
    #[error("concurrent update conflict on batch {batch} after {attempts} attempts")]
    Conflict { batch: String, attempts: u32 },
}

impl LedgerError {
    /// Whether the same call may succeed if simply repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Store(StoreError::Unavailable(_)) => true,
            LedgerError::Conflict { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LedgerError::Store(StoreError::Unavailable("closed".into())).is_retryable());
        assert!(LedgerError::Conflict { batch: "B1".into(), attempts: 5 }.is_retryable());

        assert!(!LedgerError::NotFound("B1".into()).is_retryable());
        assert!(!LedgerError::InsufficientData { required: 3, actual: 2 }.is_retryable());
        assert!(!LedgerError::Store(StoreError::Corrupt("bad json".into())).is_retryable());
    }

    #[test]
    fn test_validation_error_names_field() {
        let err: LedgerError = ValidationError::new("batch", "Required field is empty").into();
        assert_eq!(err.to_string(), "validation failed: batch: Required field is empty");
    }
}

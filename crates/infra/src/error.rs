//! Public error of the stock service.

use thiserror::Error;

use pharmastock_core::{DomainError, Quantity};

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// Malformed or inconsistent input; nothing was written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The allocation scope holds less than requested; nothing was written.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Quantity,
        available: Quantity,
    },

    /// A balance would have gone negative; the transaction was aborted.
    #[error("negative balance guard: {0}")]
    NegativeBalance(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// A conflicting record already exists (duplicate lot code, reused key).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage failed; the transaction left no partial writes.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl StockError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether retrying the same request later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StockError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<DomainError> for StockError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => StockError::Validation(msg),
            DomainError::InsufficientStock {
                requested,
                available,
            } => StockError::InsufficientStock {
                requested,
                available,
            },
            e @ DomainError::NegativeBalance { .. } => StockError::NegativeBalance(e.to_string()),
            DomainError::InvariantViolation(msg) => StockError::InvariantViolation(msg),
            DomainError::Conflict(msg) => StockError::Conflict(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn domain_errors_map_onto_service_errors() {
        let e: StockError = DomainError::insufficient(Quantity::from(5), Quantity::from(2)).into();
        assert_eq!(
            e,
            StockError::InsufficientStock {
                requested: Quantity::from(5),
                available: Quantity::from(2)
            }
        );

        let e: StockError = DomainError::NegativeBalance {
            balance: Quantity::from(1),
            delta: dec!(-3),
        }
        .into();
        assert!(matches!(e, StockError::NegativeBalance(_)));

        let e: StockError = DomainError::invalid_id("nope").into();
        assert!(matches!(e, StockError::Validation(_)));
    }

    #[test]
    fn only_unavailable_store_is_retryable() {
        assert!(StockError::from(StoreError::Unavailable("down".into())).is_retryable());
        assert!(!StockError::from(StoreError::Duplicate("lot".into())).is_retryable());
        assert!(!StockError::validation("bad").is_retryable());
    }
}

//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::quantity::Quantity;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only (validation, stock shortages,
/// invariant guards). Storage failures live in the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input: non-positive quantity, unknown unit/substance/batch,
    /// origin equal to destination, inactive unit, ...
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested quantity exceeds what the allocation scope holds.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Quantity,
        available: Quantity,
    },

    /// A balance mutation would have produced a negative on-hand quantity.
    ///
    /// Guards the non-negative invariant; the enclosing transaction must abort.
    #[error("negative balance: applying {delta} to {balance} would drop below zero")]
    NegativeBalance { balance: Quantity, delta: Decimal },

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A conflicting record already exists (duplicate lot, reused request key).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Validation failure for a reference that does not resolve.
    pub fn unknown(kind: &str, id: impl core::fmt::Display) -> Self {
        Self::Validation(format!("unknown {kind} {id}"))
    }

    pub fn insufficient(requested: Quantity, available: Quantity) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

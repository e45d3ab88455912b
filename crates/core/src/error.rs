//! Domain error model.

use serde::Serialize;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error taxonomy callers branch on (retry, re-fetch, abandon).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidTransition,
    InvalidState,
    Conflict,
    InsufficientStock,
    AlreadyProcessed,
    Forbidden,
    /// Infrastructure failure; never produced by [`DomainError`].
    Unavailable,
}

/// Domain-level error.
///
/// Deterministic business rejections only. Every variant carries enough text
/// to name the violated rule. Infrastructure failures live in the infra
/// crate and are never folded into this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, caught before any write.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A movement or line quantity that is not strictly positive.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Submitted unit price differs from the catalog price.
    #[error("price mismatch for product {product}: submitted {submitted}, catalog {catalog}")]
    PriceMismatch {
        product: String,
        submitted: u64,
        catalog: u64,
    },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("product not found: {0}")]
    ProductNotFound(String),

    #[error("worker not found: {0}")]
    WorkerNotFound(String),

    /// A requested status change is not an edge of the state machine.
    #[error("invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// The operation is not allowed in the aggregate's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("duplicate order number: {0}")]
    DuplicateOrderNumber(String),

    /// An item is already bound to another worker or already started.
    #[error("reassignment denied: {0}")]
    ReassignmentDenied(String),

    /// Concurrent-write collision (stale version).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient stock for product {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// An idempotency guard rejected a repeated side effect.
    #[error("already processed: {0}")]
    AlreadyProcessed(String),

    /// The actor lacks the role or ownership for the action.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_quantity(msg: impl Into<String>) -> Self {
        Self::InvalidQuantity(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn already_processed(msg: impl Into<String>) -> Self {
        Self::AlreadyProcessed(msg.into())
    }

    pub fn reassignment_denied(msg: impl Into<String>) -> Self {
        Self::ReassignmentDenied(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_)
            | DomainError::InvalidQuantity(_)
            | DomainError::PriceMismatch { .. }
            | DomainError::InvalidId(_) => ErrorKind::Validation,
            DomainError::NotFound(_)
            | DomainError::ProductNotFound(_)
            | DomainError::WorkerNotFound(_) => ErrorKind::NotFound,
            DomainError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            DomainError::InvalidState(_) | DomainError::InvariantViolation(_) => {
                ErrorKind::InvalidState
            }
            DomainError::DuplicateOrderNumber(_)
            | DomainError::ReassignmentDenied(_)
            | DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            DomainError::AlreadyProcessed(_) => ErrorKind::AlreadyProcessed,
            DomainError::Forbidden(_) => ErrorKind::Forbidden,
        }
    }

    /// Stale-version collisions are the only rejections worth retrying as-is.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, DomainError::Conflict(_))
    }
}

//! Error taxonomy surfaced at every public boundary of the crate.
//!
//! One enum, [`CoreError`], covers every failure mode named by the four
//! components (order lifecycle, execution service, portfolio accounting,
//! slippage estimation). Callers match on [`CoreError::kind`] rather than on
//! the enum variants directly when they only care about the retry/no-retry
//! class of a failure (see [`ErrorKind`]).

use std::fmt;
use std::time::Duration;

use crate::decimal::Decimal;

/// Coarse classification used by retry logic and metrics labeling.
///
/// Mirrors the taxonomy in the reference design: most kinds are terminal
/// (never retried), [`ErrorKind::EngineFailure`] is retried locally by the
/// execution service, and [`ErrorKind::CapacityExceeded`] /
/// [`ErrorKind::CircuitOpen`] are retryable by the caller after backing off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    InvalidState,
    NotFound,
    AlreadyExists,
    CapacityExceeded,
    InsufficientFunds,
    InsufficientLiquidity,
    EngineFailure,
    CircuitOpen,
    Cancelled,
}

/// The crate's single error type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid state transition: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("capacity exceeded: {active}/{max} active orders")]
    CapacityExceeded { active: usize, max: usize },

    #[error("insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("insufficient liquidity: {0}")]
    InsufficientLiquidity(String),

    #[error("engine failure: {0}")]
    EngineFailure(String),

    #[error("circuit open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    pub fn insufficient_liquidity(msg: impl Into<String>) -> Self {
        Self::InsufficientLiquidity(msg.into())
    }

    pub fn engine_failure(msg: impl Into<String>) -> Self {
        Self::EngineFailure(msg.into())
    }

    /// Classify the error for retry/metrics purposes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::InsufficientLiquidity(_) => ErrorKind::InsufficientLiquidity,
            Self::EngineFailure(_) => ErrorKind::EngineFailure,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the execution service's engine-call retry loop should retry
    /// this failure. validation/invalid/rejected/unauthorized
    /// messages are never retried even if surfaced as an `EngineFailure`.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EngineFailure(msg) => !matches_no_retry_predicate(msg),
            _ => false,
        }
    }
}

fn matches_no_retry_predicate(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    ["validation", "invalid", "rejected", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle))
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InsufficientLiquidity => "insufficient_liquidity",
            ErrorKind::EngineFailure => "engine_failure",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_retry_predicate_blocks_validation_style_messages() {
        let err = CoreError::engine_failure("order Rejected by venue: bad tick size");
        assert!(!err.is_retryable());

        let err = CoreError::engine_failure("upstream timeout, connection reset");
        assert!(err.is_retryable());
    }

    #[test]
    fn kind_maps_each_variant() {
        assert_eq!(CoreError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            CoreError::CapacityExceeded { active: 1, max: 1 }.kind(),
            ErrorKind::CapacityExceeded
        );
    }
}

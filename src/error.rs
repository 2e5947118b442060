//! Error types for the trigger engine
//!
//! Source failures never escape `check_and_toggle_trigger`; they are turned
//! into violations inside the evaluator. The errors here surface only at
//! construction time or from the sources themselves.

use alloy_primitives::U256;
use thiserror::Error;

use crate::engine::Violation;

/// A signal source could not produce a value (transport error, revert,
/// undecodable return data, or a simulated failure).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("signal source unavailable: {reason}")]
pub struct SourceUnavailable {
    pub reason: String,
}

impl SourceUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Misconfigured tolerance ratio
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToleranceError {
    #[error("tolerance denominator must be non-zero")]
    ZeroDenominator,

    #[error("tolerance numerator {numerator} exceeds denominator {denominator}")]
    NumeratorAboveDenominator { numerator: U256, denominator: U256 },
}

/// Refusal to build a trigger. No partially constructed trigger exists
/// when one of these is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("invalid trigger identity: {0}")]
    InvalidIdentity(String),

    #[error("trigger must watch at least one check")]
    NoChecks,

    #[error("check group '{0}' is empty")]
    EmptyGroup(String),

    #[error("initial read of '{check}' failed: {reason}")]
    InitialReadFailed { check: String, reason: String },

    #[error("trigger would be born triggered: {0}")]
    AlreadyViolated(Violation),

    #[error(transparent)]
    Tolerance(#[from] ToleranceError),
}

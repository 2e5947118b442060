//! Check outcomes and violation reasons

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a check reported a violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationReason {
    /// A tracked value fell below its tolerance floor
    Decayed {
        previous: U256,
        current: U256,
        floor: U256,
    },

    /// Real custody fell below the tolerance floor of the internal accounting
    Drained {
        true_balance: U256,
        internal_balance: U256,
        floor: U256,
    },

    /// Two quantities that must match exactly did not
    Mismatch { left: U256, right: U256 },

    /// The source could not be read; treated as broken
    SourceUnavailable { reason: String },
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationReason::Decayed {
                previous,
                current,
                floor,
            } => write!(f, "decayed from {} to {} (floor {})", previous, current, floor),
            ViolationReason::Drained {
                true_balance,
                internal_balance,
                floor,
            } => write!(
                f,
                "drained: holds {} against {} tracked (floor {})",
                true_balance, internal_balance, floor
            ),
            ViolationReason::Mismatch { left, right } => {
                write!(f, "invariant broken: {} != {}", left, right)
            }
            ViolationReason::SourceUnavailable { reason } => {
                write!(f, "source unavailable: {}", reason)
            }
        }
    }
}

/// A violation attributed to the check that reported it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub check: String,
    pub reason: ViolationReason,
}

impl Violation {
    pub fn new(check: impl Into<String>, reason: ViolationReason) -> Self {
        Self {
            check: check.into(),
            reason,
        }
    }

    pub fn unavailable(check: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(
            check,
            ViolationReason::SourceUnavailable {
                reason: reason.into(),
            },
        )
    }

    pub fn is_source_failure(&self) -> bool {
        matches!(self.reason, ViolationReason::SourceUnavailable { .. })
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.check, self.reason)
    }
}

/// Result of probing one check. Probing never mutates; `Ok` carries the
/// fresh observation to commit later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Violated(Violation),
    Ok(T),
}

impl<T> Outcome<T> {
    pub fn is_violated(&self) -> bool {
        matches!(self, Outcome::Violated(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Violated(v) => Outcome::Violated(v),
            Outcome::Ok(value) => Outcome::Ok(f(value)),
        }
    }
}

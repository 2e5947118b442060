//! Live-versus-live checks
//!
//! Both checks here read two sources fresh on every cycle and keep no prior
//! snapshot for the comparison itself. The last passing observation is
//! recorded only for auditing.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::outcome::{Outcome, Violation, ViolationReason};
use super::source::SignalSource;
use super::tolerance::ToleranceRatio;
use crate::error::SourceUnavailable;

async fn read_or_violate(
    label: &str,
    source: &dyn SignalSource,
) -> Result<U256, Violation> {
    source.read().await.map_err(|e: SourceUnavailable| {
        warn!("{}: read of {} failed: {}", label, source.describe(), e);
        Violation::unavailable(label, e.reason)
    })
}

// ============================================
// BALANCE CHECK
// ============================================

/// Real custody and internal accounting observed together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceObservation {
    pub true_balance: U256,
    pub internal_balance: U256,
}

/// Detects a pool whose accounting has drifted away from what it really
/// holds: violates when `true < floor(internal * tolerance)`.
pub struct BalanceCheck {
    label: String,
    true_balance: Arc<dyn SignalSource>,
    internal_balance: Arc<dyn SignalSource>,
    tolerance: ToleranceRatio,
    last_observation: Option<BalanceObservation>,
}

impl BalanceCheck {
    pub fn new(
        label: impl Into<String>,
        true_balance: Arc<dyn SignalSource>,
        internal_balance: Arc<dyn SignalSource>,
        tolerance: ToleranceRatio,
    ) -> Self {
        Self {
            label: label.into(),
            true_balance,
            internal_balance,
            tolerance,
            last_observation: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn tolerance(&self) -> ToleranceRatio {
        self.tolerance
    }

    pub fn last_observation(&self) -> Option<BalanceObservation> {
        self.last_observation
    }

    pub async fn check(&self) -> Outcome<BalanceObservation> {
        let true_balance = match read_or_violate(&self.label, self.true_balance.as_ref()).await {
            Ok(value) => value,
            Err(violation) => return Outcome::Violated(violation),
        };
        let internal_balance =
            match read_or_violate(&self.label, self.internal_balance.as_ref()).await {
                Ok(value) => value,
                Err(violation) => return Outcome::Violated(violation),
            };

        let floor = self.tolerance.floor_of(internal_balance);
        if true_balance < floor {
            return Outcome::Violated(Violation::new(
                &self.label,
                ViolationReason::Drained {
                    true_balance,
                    internal_balance,
                    floor,
                },
            ));
        }

        debug!(
            "{}: holds {} against {} tracked (floor {})",
            self.label, true_balance, internal_balance, floor
        );
        Outcome::Ok(BalanceObservation {
            true_balance,
            internal_balance,
        })
    }

    pub(crate) fn commit(&mut self, observation: BalanceObservation) {
        self.last_observation = Some(observation);
    }
}

impl fmt::Debug for BalanceCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalanceCheck")
            .field("label", &self.label)
            .field("true_balance", &self.true_balance.describe())
            .field("internal_balance", &self.internal_balance.describe())
            .field("tolerance", &self.tolerance)
            .field("last_observation", &self.last_observation)
            .finish()
    }
}

// ============================================
// INVARIANT EQUALITY CHECK
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqualityObservation {
    pub left: U256,
    pub right: U256,
}

/// Two quantities that must always be equal, e.g. a wrapper token's supply
/// and what its staking contract says it can claim. No tolerance band.
pub struct InvariantEqualityCheck {
    label: String,
    left: Arc<dyn SignalSource>,
    right: Arc<dyn SignalSource>,
    last_observation: Option<EqualityObservation>,
}

impl InvariantEqualityCheck {
    pub fn new(
        label: impl Into<String>,
        left: Arc<dyn SignalSource>,
        right: Arc<dyn SignalSource>,
    ) -> Self {
        Self {
            label: label.into(),
            left,
            right,
            last_observation: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn last_observation(&self) -> Option<EqualityObservation> {
        self.last_observation
    }

    pub async fn check(&self) -> Outcome<EqualityObservation> {
        let left = match read_or_violate(&self.label, self.left.as_ref()).await {
            Ok(value) => value,
            Err(violation) => return Outcome::Violated(violation),
        };
        let right = match read_or_violate(&self.label, self.right.as_ref()).await {
            Ok(value) => value,
            Err(violation) => return Outcome::Violated(violation),
        };

        if left != right {
            return Outcome::Violated(Violation::new(
                &self.label,
                ViolationReason::Mismatch { left, right },
            ));
        }

        Outcome::Ok(EqualityObservation { left, right })
    }

    pub(crate) fn commit(&mut self, observation: EqualityObservation) {
        self.last_observation = Some(observation);
    }
}

impl fmt::Debug for InvariantEqualityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvariantEqualityCheck")
            .field("label", &self.label)
            .field("left", &self.left.describe())
            .field("right", &self.right.describe())
            .field("last_observation", &self.last_observation)
            .finish()
    }
}

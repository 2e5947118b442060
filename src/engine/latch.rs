//! Latch State Machine
//!
//! `Armed -> Triggered`, once, never back. Once triggered, no check is read
//! or written again.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::composite::{CheckStatus, Composite};
use super::outcome::Violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatchState {
    Armed,
    Triggered,
}

impl fmt::Display for LatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatchState::Armed => write!(f, "ARMED"),
            LatchState::Triggered => write!(f, "TRIGGERED"),
        }
    }
}

/// What a single `check_and_latch` call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Checks passed; fresh snapshots were committed
    StayedArmed,

    /// This call found a violation and latched
    Fired(Violation),

    /// Already latched; nothing was read
    AlreadyTriggered,
}

impl Transition {
    pub fn state(&self) -> LatchState {
        match self {
            Transition::StayedArmed => LatchState::Armed,
            Transition::Fired(_) | Transition::AlreadyTriggered => LatchState::Triggered,
        }
    }
}

#[derive(Debug)]
pub struct Latch {
    state: LatchState,
    checks: Composite,
    violation: Option<Violation>,
}

impl Latch {
    pub fn new(checks: Composite) -> Self {
        Self {
            state: LatchState::Armed,
            checks,
            violation: None,
        }
    }

    pub fn state(&self) -> LatchState {
        self.state
    }

    /// The violation that latched this instance, if it has
    pub fn violation(&self) -> Option<&Violation> {
        self.violation.as_ref()
    }

    pub fn status(&self) -> Vec<CheckStatus> {
        self.checks.status()
    }

    pub async fn check_and_latch(&mut self) -> Transition {
        if self.state == LatchState::Triggered {
            return Transition::AlreadyTriggered;
        }

        match self.checks.evaluate().await {
            Some(violation) => {
                self.state = LatchState::Triggered;
                self.violation = Some(violation.clone());
                Transition::Fired(violation)
            }
            None => Transition::StayedArmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::source::ManualSource;
    use crate::engine::tolerance::ToleranceRatio;
    use crate::engine::tracker::SignalTracker;
    use alloy_primitives::U256;
    use std::sync::Arc;

    fn latch_over(source: &Arc<ManualSource>, prior: u64) -> Latch {
        let tracker = SignalTracker::with_snapshot(
            "share price",
            source.clone(),
            ToleranceRatio::per_mille(500).unwrap(),
            U256::from(prior),
        );
        Latch::new(Composite::new("vault").with(tracker))
    }

    #[tokio::test]
    async fn test_stays_armed_while_healthy() {
        let source = Arc::new(ManualSource::from_u64("pps", 1_000));
        let mut latch = latch_over(&source, 1_000);

        assert_eq!(latch.check_and_latch().await, Transition::StayedArmed);
        assert_eq!(latch.state(), LatchState::Armed);
        assert!(latch.violation().is_none());
    }

    #[tokio::test]
    async fn test_fires_once_then_never_reads_again() {
        let source = Arc::new(ManualSource::from_u64("pps", 400));
        let mut latch = latch_over(&source, 1_000);

        let first = latch.check_and_latch().await;
        assert!(matches!(first, Transition::Fired(_)));
        assert_eq!(first.state(), LatchState::Triggered);
        let reads = source.reads();

        // Recovery does not untrigger
        source.set_u64(5_000);
        for _ in 0..3 {
            assert_eq!(latch.check_and_latch().await, Transition::AlreadyTriggered);
        }

        assert_eq!(latch.state(), LatchState::Triggered);
        assert_eq!(source.reads(), reads);
        assert_eq!(latch.violation().map(|v| v.check.as_str()), Some("share price"));
    }

    #[tokio::test]
    async fn test_latched_snapshot_is_frozen() {
        let source = Arc::new(ManualSource::from_u64("pps", 1_000));
        let mut latch = latch_over(&source, 1_000);

        source.fail("reverted");
        latch.check_and_latch().await;
        source.set_u64(2_000);
        latch.check_and_latch().await;

        match &latch.status()[0] {
            CheckStatus::Signal { last_value, .. } => assert_eq!(*last_value, U256::from(1_000u64)),
            other => panic!("expected a signal, got {:?}", other),
        }
    }
}

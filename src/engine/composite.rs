//! Composite Evaluator
//!
//! Runs an ordered list of checks and reports the first violation.
//!
//! Order matters. Checks that cannot fault (live balance comparisons) go
//! first; checks that call into price functions which may themselves blow
//! up on a broken pool go last. A read failure counts as a violation, so a
//! faulting price function still latches the trigger even though the checks
//! after it never ran.
//!
//! With [`CommitPolicy::Atomic`] (the default) every check is probed first
//! and fresh values are committed only when all of them pass. A violation
//! leaves every snapshot exactly as it was before the call.

use alloy_primitives::U256;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::checks::{BalanceCheck, BalanceObservation, EqualityObservation, InvariantEqualityCheck};
use super::outcome::{Outcome, Violation};
use super::tolerance::ToleranceRatio;
use super::tracker::SignalTracker;

/// When passing checks write their fresh observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Commit everything only after the whole composite passed
    #[default]
    Atomic,

    /// Commit each check as soon as it passes, before moving on.
    /// Snapshots of earlier checks may run ahead of later ones after a
    /// violation; harmless once the trigger has latched.
    Eager,
}

// ============================================
// CHECK
// ============================================

/// One entry in a composite
#[derive(Debug)]
pub enum Check {
    Signal(SignalTracker),
    Balance(BalanceCheck),
    Equality(InvariantEqualityCheck),
    Group(Composite),
}

/// Fresh observation produced by a passing probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    Signal(U256),
    Balance(BalanceObservation),
    Equality(EqualityObservation),
    Group(Vec<Snapshot>),
}

impl Check {
    pub fn label(&self) -> &str {
        match self {
            Check::Signal(tracker) => tracker.label(),
            Check::Balance(check) => check.label(),
            Check::Equality(check) => check.label(),
            Check::Group(group) => group.label(),
        }
    }

    /// Read-only evaluation of this check
    pub fn probe(&self) -> BoxFuture<'_, Outcome<Snapshot>> {
        async move {
            match self {
                Check::Signal(tracker) => tracker.check().await.map(Snapshot::Signal),
                Check::Balance(check) => check.check().await.map(Snapshot::Balance),
                Check::Equality(check) => check.check().await.map(Snapshot::Equality),
                Check::Group(group) => group.probe().await.map(Snapshot::Group),
            }
        }
        .boxed()
    }

    fn commit(&mut self, snapshot: Snapshot) {
        // Snapshots always come from probing this same tree, so the shapes line up
        match (self, snapshot) {
            (Check::Signal(tracker), Snapshot::Signal(value)) => tracker.commit(value),
            (Check::Balance(check), Snapshot::Balance(observation)) => check.commit(observation),
            (Check::Equality(check), Snapshot::Equality(observation)) => {
                check.commit(observation)
            }
            (Check::Group(group), Snapshot::Group(snapshots)) => group.commit(snapshots),
            (check, snapshot) => {
                error!("{}: snapshot {:?} does not fit this check, not committed", check.label(), snapshot);
                debug_assert!(false, "snapshot shape does not match check '{}'", check.label());
            }
        }
    }

    fn evaluate(&mut self) -> BoxFuture<'_, Option<Violation>> {
        async move {
            if let Check::Group(group) = self {
                return group.evaluate().await;
            }
            match self.probe().await {
                Outcome::Violated(violation) => Some(violation),
                Outcome::Ok(snapshot) => {
                    self.commit(snapshot);
                    None
                }
            }
        }
        .boxed()
    }

    fn status(&self) -> CheckStatus {
        match self {
            Check::Signal(tracker) => CheckStatus::Signal {
                label: tracker.label().to_string(),
                tolerance: tracker.tolerance(),
                last_value: tracker.last_value(),
            },
            Check::Balance(check) => CheckStatus::Balance {
                label: check.label().to_string(),
                tolerance: check.tolerance(),
                last_observation: check.last_observation(),
            },
            Check::Equality(check) => CheckStatus::Equality {
                label: check.label().to_string(),
                last_observation: check.last_observation(),
            },
            Check::Group(group) => CheckStatus::Group {
                label: group.label().to_string(),
                checks: group.status(),
            },
        }
    }

    fn first_empty_group(&self) -> Option<&str> {
        match self {
            Check::Group(group) => group.first_empty_group(),
            _ => None,
        }
    }
}

impl From<SignalTracker> for Check {
    fn from(tracker: SignalTracker) -> Self {
        Check::Signal(tracker)
    }
}

impl From<BalanceCheck> for Check {
    fn from(check: BalanceCheck) -> Self {
        Check::Balance(check)
    }
}

impl From<InvariantEqualityCheck> for Check {
    fn from(check: InvariantEqualityCheck) -> Self {
        Check::Equality(check)
    }
}

impl From<Composite> for Check {
    fn from(group: Composite) -> Self {
        Check::Group(group)
    }
}

/// Auditable view of one check's recorded state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckStatus {
    Signal {
        label: String,
        tolerance: ToleranceRatio,
        last_value: U256,
    },
    Balance {
        label: String,
        tolerance: ToleranceRatio,
        last_observation: Option<BalanceObservation>,
    },
    Equality {
        label: String,
        last_observation: Option<EqualityObservation>,
    },
    Group {
        label: String,
        checks: Vec<CheckStatus>,
    },
}

impl CheckStatus {
    pub fn label(&self) -> &str {
        match self {
            CheckStatus::Signal { label, .. }
            | CheckStatus::Balance { label, .. }
            | CheckStatus::Equality { label, .. }
            | CheckStatus::Group { label, .. } => label,
        }
    }
}

// ============================================
// COMPOSITE
// ============================================

/// Ordered group of checks evaluated with short-circuit semantics
#[derive(Debug)]
pub struct Composite {
    label: String,
    checks: Vec<Check>,
    policy: CommitPolicy,
}

impl Composite {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            checks: Vec::new(),
            policy: CommitPolicy::default(),
        }
    }

    /// Append a check; evaluation follows insertion order
    pub fn with(mut self, check: impl Into<Check>) -> Self {
        self.checks.push(check.into());
        self
    }

    pub fn with_policy(mut self, policy: CommitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn push(&mut self, check: impl Into<Check>) {
        self.checks.push(check.into());
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Probe every check in order without mutating anything. Stops at the
    /// first violation.
    pub fn probe(&self) -> BoxFuture<'_, Outcome<Vec<Snapshot>>> {
        async move {
            let mut snapshots = Vec::with_capacity(self.checks.len());
            for check in &self.checks {
                match check.probe().await {
                    Outcome::Ok(snapshot) => snapshots.push(snapshot),
                    Outcome::Violated(violation) => return Outcome::Violated(violation),
                }
            }
            Outcome::Ok(snapshots)
        }
        .boxed()
    }

    /// Write snapshots produced by [`Composite::probe`]
    pub(crate) fn commit(&mut self, snapshots: Vec<Snapshot>) {
        if snapshots.len() != self.checks.len() {
            error!(
                "{}: {} snapshots for {} checks",
                self.label,
                snapshots.len(),
                self.checks.len()
            );
            debug_assert!(false, "snapshot count does not match checks of '{}'", self.label);
        }
        for (check, snapshot) in self.checks.iter_mut().zip(snapshots) {
            check.commit(snapshot);
        }
    }

    /// Evaluate and commit according to this composite's policy.
    ///
    /// Returns the first violation found, or `None` when every check passed
    /// and all fresh observations were committed. When this composite is
    /// atomic its nested groups are committed atomically with it whatever
    /// their own policy says.
    pub fn evaluate(&mut self) -> BoxFuture<'_, Option<Violation>> {
        async move {
            match self.policy {
                CommitPolicy::Atomic => match self.probe().await {
                    Outcome::Violated(violation) => Some(violation),
                    Outcome::Ok(snapshots) => {
                        self.commit(snapshots);
                        None
                    }
                },
                CommitPolicy::Eager => {
                    for check in self.checks.iter_mut() {
                        if let Some(violation) = check.evaluate().await {
                            return Some(violation);
                        }
                    }
                    None
                }
            }
        }
        .boxed()
    }

    pub fn status(&self) -> Vec<CheckStatus> {
        self.checks.iter().map(Check::status).collect()
    }

    /// Label of the first group (this one included) with no checks
    pub(crate) fn first_empty_group(&self) -> Option<&str> {
        if self.checks.is_empty() {
            return Some(&self.label);
        }
        self.checks.iter().find_map(Check::first_empty_group)
    }
}

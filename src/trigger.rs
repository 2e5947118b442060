//! Trigger - the aggregate root
//!
//! Identity, latch, and checks of one protected pool. The only mutating
//! entry point is [`Trigger::check_and_toggle_trigger`], which anyone may
//! call as often as they like. Calls on one instance serialize on an async
//! mutex so a commit is never observed half-done; `is_triggered` is a
//! lock-free read of a flag that only ever goes from false to true.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::engine::{
    CheckStatus, Composite, Latch, LatchState, Outcome, Transition, Violation, ViolationReason,
};
use crate::error::ConstructionError;

/// Capacity of the activation channel. One event per trigger is ever sent.
const EVENT_CHANNEL_CAPACITY: usize = 16;

// ============================================
// IDENTITY
// ============================================

/// Immutable description of what a trigger protects and who it pays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerIdentity {
    pub name: String,
    pub symbol: String,
    pub description: String,
    /// Protocols the trigger covers, e.g. "Curve", "Convex"
    pub platforms: BTreeSet<String>,
    /// Receives the subsidy for keeping the trigger alive
    pub recipient: Address,
}

impl TriggerIdentity {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        description: impl Into<String>,
        platforms: impl IntoIterator<Item = impl Into<String>>,
        recipient: Address,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            description: description.into(),
            platforms: platforms.into_iter().map(Into::into).collect(),
            recipient,
        }
    }

    pub fn validate(&self) -> Result<(), ConstructionError> {
        let blank = |field: &str| ConstructionError::InvalidIdentity(format!("{} is empty", field));

        if self.name.trim().is_empty() {
            return Err(blank("name"));
        }
        if self.symbol.trim().is_empty() {
            return Err(blank("symbol"));
        }
        if self.description.trim().is_empty() {
            return Err(blank("description"));
        }
        if self.platforms.is_empty() {
            return Err(blank("platform set"));
        }
        if self.platforms.iter().any(|p| p.trim().is_empty()) {
            return Err(blank("platform tag"));
        }
        if self.recipient == Address::ZERO {
            return Err(ConstructionError::InvalidIdentity(
                "recipient is the zero address".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================
// EVENTS & STATUS
// ============================================

/// Published exactly once, when a trigger latches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerActivated {
    pub identity: TriggerIdentity,
    pub violation: Violation,
    pub triggered_at: DateTime<Utc>,
}

/// Point-in-time view of a trigger for auditing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerStatus {
    pub identity: TriggerIdentity,
    pub state: LatchState,
    pub violation: Option<Violation>,
    pub checks: Vec<CheckStatus>,
}

impl TriggerStatus {
    /// `(label, last_value)` of every signal tracker, depth first
    pub fn signal_values(&self) -> Vec<(String, U256)> {
        fn walk(checks: &[CheckStatus], out: &mut Vec<(String, U256)>) {
            for check in checks {
                match check {
                    CheckStatus::Signal {
                        label, last_value, ..
                    } => out.push((label.clone(), *last_value)),
                    CheckStatus::Group { checks, .. } => walk(checks, out),
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.checks, &mut out);
        out
    }
}

// ============================================
// TRIGGER
// ============================================

pub struct Trigger {
    identity: TriggerIdentity,
    triggered: AtomicBool,
    latch: Mutex<Latch>,
    events: broadcast::Sender<TriggerActivated>,
}

impl Trigger {
    /// Build a trigger over `checks`, committing their first observations.
    ///
    /// Refuses to build a trigger that would be born triggered: a new
    /// trigger is assumed to protect a currently healthy system.
    pub async fn new(
        identity: TriggerIdentity,
        mut checks: Composite,
    ) -> Result<Self, ConstructionError> {
        identity.validate()?;

        if checks.is_empty() {
            return Err(ConstructionError::NoChecks);
        }
        if let Some(label) = checks.first_empty_group() {
            return Err(ConstructionError::EmptyGroup(label.to_string()));
        }

        match checks.probe().await {
            Outcome::Ok(snapshots) => checks.commit(snapshots),
            Outcome::Violated(Violation {
                check,
                reason: ViolationReason::SourceUnavailable { reason },
            }) => return Err(ConstructionError::InitialReadFailed { check, reason }),
            Outcome::Violated(violation) => {
                return Err(ConstructionError::AlreadyViolated(violation))
            }
        }

        info!(
            "Armed trigger '{}' ({}) with {} checks",
            identity.name,
            identity.symbol,
            checks.checks().len()
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            identity,
            triggered: AtomicBool::new(false),
            latch: Mutex::new(Latch::new(checks)),
            events,
        })
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Evaluate the checks and latch on the first violation.
    ///
    /// Returns the triggered status after the call. Never errors: source
    /// failures count as violations. Once triggered this is a no-op that
    /// returns `true` without reading anything.
    pub async fn check_and_toggle_trigger(&self) -> bool {
        if self.is_triggered() {
            return true;
        }

        let mut latch = self.latch.lock().await;
        match latch.check_and_latch().await {
            Transition::StayedArmed => {
                debug!("{}: all checks passed", self.identity.name);
                false
            }
            Transition::AlreadyTriggered => true,
            Transition::Fired(violation) => {
                self.triggered.store(true, Ordering::Release);
                info!("🚨 TRIGGERED '{}': {}", self.identity.name, violation);

                let event = TriggerActivated {
                    identity: self.identity.clone(),
                    violation,
                    triggered_at: Utc::now(),
                };
                if self.events.send(event).is_err() {
                    debug!("{}: no activation subscribers", self.identity.name);
                }
                true
            }
        }
    }

    /// Receive the activation event. Subscribe before the trigger fires.
    pub fn subscribe(&self) -> broadcast::Receiver<TriggerActivated> {
        self.events.subscribe()
    }

    pub fn identity(&self) -> &TriggerIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn symbol(&self) -> &str {
        &self.identity.symbol
    }

    pub fn description(&self) -> &str {
        &self.identity.description
    }

    pub fn platforms(&self) -> &BTreeSet<String> {
        &self.identity.platforms
    }

    pub fn recipient(&self) -> Address {
        self.identity.recipient
    }

    /// The violation that latched this trigger
    pub async fn violation(&self) -> Option<Violation> {
        self.latch.lock().await.violation().cloned()
    }

    pub async fn status(&self) -> TriggerStatus {
        let latch = self.latch.lock().await;
        TriggerStatus {
            identity: self.identity.clone(),
            state: latch.state(),
            violation: latch.violation().cloned(),
            checks: latch.status(),
        }
    }
}

impl std::fmt::Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("identity", &self.identity)
            .field("triggered", &self.is_triggered())
            .finish()
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        BalanceCheck, InvariantEqualityCheck, ManualSource, SignalTracker, ToleranceRatio,
    };
    use std::sync::Arc;

    fn identity() -> TriggerIdentity {
        TriggerIdentity::new(
            "Yearn Curve 3pool",
            "YCRV3-TRIG",
            "Triggers when the vault share price or the 3pool virtual price drops by more than 50%",
            ["Yearn", "Curve"],
            Address::repeat_byte(0xAB),
        )
    }

    fn half() -> ToleranceRatio {
        ToleranceRatio::per_mille(500).unwrap()
    }

    async fn tracked(label: &str, source: &Arc<ManualSource>) -> SignalTracker {
        SignalTracker::new(label, source.clone(), half()).await.unwrap()
    }

    #[tokio::test]
    async fn test_latch_is_monotonic() {
        let pps = Arc::new(ManualSource::from_u64("pps", 1_000));
        let trigger = Trigger::new(identity(), Composite::new("vault").with(tracked("pps", &pps).await))
            .await
            .unwrap();

        assert!(!trigger.check_and_toggle_trigger().await);
        assert!(!trigger.is_triggered());

        pps.set_u64(100);
        assert!(trigger.check_and_toggle_trigger().await);

        // Recovery and further calls never untrigger
        pps.set_u64(10_000);
        for _ in 0..5 {
            assert!(trigger.check_and_toggle_trigger().await);
            assert!(trigger.is_triggered());
        }
        assert_eq!(trigger.status().await.state, LatchState::Triggered);
    }

    #[tokio::test]
    async fn test_commit_on_success_matches_fresh_reads() {
        let pps = Arc::new(ManualSource::from_u64("pps", 1_000));
        let vp = Arc::new(ManualSource::from_u64("vp", 2_000));
        let checks = Composite::new("vault")
            .with(tracked("share price", &pps).await)
            .with(tracked("virtual price", &vp).await);
        let trigger = Trigger::new(identity(), checks).await.unwrap();

        pps.set_u64(1_337);
        vp.set_u64(1_500);
        assert!(!trigger.check_and_toggle_trigger().await);

        let values = trigger.status().await.signal_values();
        assert_eq!(
            values,
            vec![
                ("share price".to_string(), pps.peek().unwrap()),
                ("virtual price".to_string(), vp.peek().unwrap()),
            ]
        );
    }

    #[tokio::test]
    async fn test_fault_after_passing_check_keeps_old_snapshot() {
        let a = Arc::new(ManualSource::from_u64("a", 1_000));
        let b = Arc::new(ManualSource::from_u64("b", 1_000));
        let checks = Composite::new("pool")
            .with(tracked("a", &a).await)
            .with(tracked("b", &b).await);
        let trigger = Trigger::new(identity(), checks).await.unwrap();

        a.set_u64(1_250);
        b.fail("division by zero");

        assert!(trigger.check_and_toggle_trigger().await);
        assert!(trigger.is_triggered());

        let values = trigger.status().await.signal_values();
        assert_eq!(values[0], ("a".to_string(), U256::from(1_000u64)));
        assert_eq!(
            trigger.violation().await,
            Some(Violation::unavailable("b", "division by zero"))
        );
    }

    #[tokio::test]
    async fn test_refuses_to_be_born_triggered() {
        let pps = Arc::new(ManualSource::from_u64("pps", 400));
        let tracker = SignalTracker::with_snapshot("pps", pps, half(), U256::from(1_000u64));

        let err = Trigger::new(identity(), Composite::new("vault").with(tracker))
            .await
            .unwrap_err();

        assert!(matches!(err, ConstructionError::AlreadyViolated(_)));
    }

    #[tokio::test]
    async fn test_refuses_unreadable_source() {
        let pps = Arc::new(ManualSource::from_u64("pps", 1_000));
        let tracker = SignalTracker::with_snapshot("pps", pps.clone(), half(), U256::from(1_000u64));
        pps.fail("execution reverted");

        let err = Trigger::new(identity(), Composite::new("vault").with(tracker))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ConstructionError::InitialReadFailed {
                check: "pps".to_string(),
                reason: "execution reverted".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_refuses_malformed_construction() {
        let pps = Arc::new(ManualSource::from_u64("pps", 1_000));

        let err = Trigger::new(identity(), Composite::new("vault")).await.unwrap_err();
        assert_eq!(err, ConstructionError::NoChecks);

        let checks = Composite::new("vault")
            .with(tracked("pps", &pps).await)
            .with(Composite::new("meta"));
        let err = Trigger::new(identity(), checks).await.unwrap_err();
        assert_eq!(err, ConstructionError::EmptyGroup("meta".to_string()));

        let mut nameless = identity();
        nameless.name = " ".to_string();
        let checks = Composite::new("vault").with(tracked("pps", &pps).await);
        let err = Trigger::new(nameless, checks).await.unwrap_err();
        assert!(matches!(err, ConstructionError::InvalidIdentity(_)));

        let mut unpaid = identity();
        unpaid.recipient = Address::ZERO;
        assert!(unpaid.validate().is_err());

        let mut untagged = identity();
        untagged.platforms.clear();
        assert!(untagged.validate().is_err());
    }

    #[tokio::test]
    async fn test_balance_drain_scenario() {
        let custody = Arc::new(ManualSource::from_u64("balanceOf", 1_000_000));
        let accounting = Arc::new(ManualSource::from_u64("balances(0)", 1_000_000));
        let checks = Composite::new("3pool").with(BalanceCheck::new(
            "DAI balance",
            custody.clone(),
            accounting,
            half(),
        ));
        let trigger = Trigger::new(identity(), checks).await.unwrap();

        custody.set_u64(500_001);
        assert!(!trigger.check_and_toggle_trigger().await);

        custody.set_u64(499_999);
        assert!(trigger.check_and_toggle_trigger().await);
    }

    #[tokio::test]
    async fn test_equality_invariant_scenario() {
        let supply = Arc::new(ManualSource::from_u64("totalSupply", 1_000));
        let claimable = Arc::new(ManualSource::from_u64("claimable", 1_000));
        let checks = Composite::new("convex").with(InvariantEqualityCheck::new(
            "wrapper supply",
            supply.clone(),
            claimable,
        ));
        let trigger = Trigger::new(identity(), checks).await.unwrap();

        assert!(!trigger.check_and_toggle_trigger().await);

        supply.set_u64(1_001);
        assert!(trigger.check_and_toggle_trigger().await);
    }

    #[tokio::test]
    async fn test_activation_event_is_sent_once() {
        let pps = Arc::new(ManualSource::from_u64("pps", 1_000));
        let trigger = Trigger::new(identity(), Composite::new("vault").with(tracked("pps", &pps).await))
            .await
            .unwrap();
        let mut events = trigger.subscribe();

        assert!(!trigger.check_and_toggle_trigger().await);
        assert!(events.try_recv().is_err());

        pps.set_u64(1);
        trigger.check_and_toggle_trigger().await;
        trigger.check_and_toggle_trigger().await;

        let event = events.try_recv().unwrap();
        assert_eq!(event.identity, identity());
        assert_eq!(event.violation.check, "pps");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pokes_latch_once() {
        let pps = Arc::new(ManualSource::from_u64("pps", 1_000));
        let trigger = Arc::new(
            Trigger::new(identity(), Composite::new("vault").with(tracked("pps", &pps).await))
                .await
                .unwrap(),
        );
        let mut events = trigger.subscribe();
        pps.set_u64(1);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let trigger = trigger.clone();
                tokio::spawn(async move { trigger.check_and_toggle_trigger().await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());
        // Seeding and the construction probe, then exactly one evaluation
        assert_eq!(pps.reads(), 3);
    }

    #[tokio::test]
    async fn test_accessors() {
        let pps = Arc::new(ManualSource::from_u64("pps", 1_000));
        let trigger = Trigger::new(identity(), Composite::new("vault").with(tracked("pps", &pps).await))
            .await
            .unwrap();

        assert_eq!(trigger.name(), "Yearn Curve 3pool");
        assert_eq!(trigger.symbol(), "YCRV3-TRIG");
        assert!(trigger.description().contains("50%"));
        assert!(trigger.platforms().contains("Curve"));
        assert_eq!(trigger.recipient(), Address::repeat_byte(0xAB));

        match &trigger.status().await.checks[0] {
            CheckStatus::Signal { tolerance, .. } => assert_eq!(*tolerance, half()),
            other => panic!("expected a signal, got {:?}", other),
        }
    }
}

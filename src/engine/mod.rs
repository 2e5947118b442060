//! The Trigger Engine
//!
//! Responsible for:
//! - Tolerance arithmetic on 256-bit values
//! - Tracking external signals against their last accepted snapshot
//! - Combining checks in a fixed order with short-circuit semantics
//! - The one-way latch

mod checks;
mod composite;
mod latch;
mod outcome;
mod source;
mod tolerance;
mod tracker;

pub use checks::{BalanceCheck, BalanceObservation, EqualityObservation, InvariantEqualityCheck};
pub use composite::{Check, CheckStatus, CommitPolicy, Composite, Snapshot};
pub use latch::{Latch, LatchState, Transition};
pub use outcome::{Outcome, Violation, ViolationReason};
pub use source::{ManualSource, SignalSource};
pub use tolerance::{violates, ToleranceRatio, PER_MILLE, WAD};
pub use tracker::SignalTracker;

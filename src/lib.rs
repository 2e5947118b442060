//! Pool Triggers
//!
//! Latching triggers over DeFi pools. Each trigger watches a fixed list of
//! on-chain signals and flips, permanently, the first time one of them
//! shows the protected system has been exploited or has failed.
//!
//! - [`engine`]: tolerance arithmetic, signal tracking, composite checks, the latch
//! - [`trigger`]: the aggregate root and its activation event
//! - [`protocols`]: on-chain sources and check layouts for Yearn, Curve, Convex
//! - [`watcher`]: the polling loop

pub mod config;
pub mod engine;
pub mod error;
pub mod protocols;
pub mod trigger;
pub mod watcher;

pub use config::{TriggerConfig, TriggerKind, WatcherConfig};
pub use engine::{CommitPolicy, Composite, SignalSource, SignalTracker, ToleranceRatio};
pub use error::{ConstructionError, SourceUnavailable, ToleranceError};
pub use protocols::{build_trigger, RpcEndpoint};
pub use trigger::{Trigger, TriggerActivated, TriggerIdentity, TriggerStatus};
pub use watcher::{RoundSummary, Watcher};

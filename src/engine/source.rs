//! Signal Sources
//!
//! A signal source reads one unsigned 256-bit quantity from an external
//! system, or fails. The engine never retries and never times out a read;
//! whatever latency a read carries belongs to the source.

use alloy_primitives::U256;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use crate::error::SourceUnavailable;

/// Capability to read the current value of an external quantity
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Read the current value
    async fn read(&self) -> Result<U256, SourceUnavailable>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

// ============================================
// MANUAL SOURCE
// ============================================

#[derive(Debug)]
struct ManualState {
    value: Result<U256, String>,
    reads: u64,
}

/// In-memory source whose value is set by hand.
///
/// Used for dry runs and as the fake behind every engine test.
#[derive(Debug)]
pub struct ManualSource {
    label: String,
    state: Mutex<ManualState>,
}

impl ManualSource {
    pub fn new(label: impl Into<String>, value: U256) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(ManualState {
                value: Ok(value),
                reads: 0,
            }),
        }
    }

    /// Convenience for small literal values
    pub fn from_u64(label: impl Into<String>, value: u64) -> Self {
        Self::new(label, U256::from(value))
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        // The state is plain data; a panic while holding the lock cannot
        // leave it half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make subsequent reads return `value`
    pub fn set(&self, value: U256) {
        self.state().value = Ok(value);
    }

    pub fn set_u64(&self, value: u64) {
        self.set(U256::from(value));
    }

    /// Make subsequent reads fail
    pub fn fail(&self, reason: impl Into<String>) {
        self.state().value = Err(reason.into());
    }

    /// Number of reads served so far, failed ones included
    pub fn reads(&self) -> u64 {
        self.state().reads
    }

    /// Current value without counting as a read
    pub fn peek(&self) -> Option<U256> {
        self.state().value.as_ref().ok().copied()
    }
}

#[async_trait]
impl SignalSource for ManualSource {
    async fn read(&self) -> Result<U256, SourceUnavailable> {
        let mut state = self.state();
        state.reads += 1;
        state.value.clone().map_err(SourceUnavailable::new)
    }

    fn describe(&self) -> String {
        format!("manual:{}", self.label)
    }
}

//! Signal Tracker
//!
//! Remembers the last accepted value of one external quantity and checks
//! each fresh reading against it. The tracker never writes its own
//! snapshot; the composite evaluator commits fresh values once the whole
//! evaluation has passed.

use alloy_primitives::U256;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::outcome::{Outcome, Violation, ViolationReason};
use super::source::SignalSource;
use super::tolerance::ToleranceRatio;
use crate::error::ConstructionError;

pub struct SignalTracker {
    label: String,
    last_value: U256,
    tolerance: ToleranceRatio,
    source: Arc<dyn SignalSource>,
}

impl SignalTracker {
    /// Build a tracker seeded from a live read of `source`
    pub async fn new(
        label: impl Into<String>,
        source: Arc<dyn SignalSource>,
        tolerance: ToleranceRatio,
    ) -> Result<Self, ConstructionError> {
        let label = label.into();
        let initial = source
            .read()
            .await
            .map_err(|e| ConstructionError::InitialReadFailed {
                check: label.clone(),
                reason: e.reason,
            })?;

        debug!("{} seeded at {} ({})", label, initial, source.describe());

        Ok(Self::with_snapshot(label, source, tolerance, initial))
    }

    /// Build a tracker with a known prior snapshot
    pub fn with_snapshot(
        label: impl Into<String>,
        source: Arc<dyn SignalSource>,
        tolerance: ToleranceRatio,
        last_value: U256,
    ) -> Self {
        Self {
            label: label.into(),
            last_value,
            tolerance,
            source,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn last_value(&self) -> U256 {
        self.last_value
    }

    pub fn tolerance(&self) -> ToleranceRatio {
        self.tolerance
    }

    /// Read the source and compare against the remembered value.
    ///
    /// A failed read is a violation: a price function that errors out
    /// usually means the system behind it is already broken.
    pub async fn check(&self) -> Outcome<U256> {
        let fresh = match self.source.read().await {
            Ok(value) => value,
            Err(e) => {
                warn!("{}: read failed, treating as violation: {}", self.label, e);
                return Outcome::Violated(Violation::unavailable(&self.label, e.reason));
            }
        };

        let floor = self.tolerance.floor_of(self.last_value);
        if fresh < floor {
            return Outcome::Violated(Violation::new(
                &self.label,
                ViolationReason::Decayed {
                    previous: self.last_value,
                    current: fresh,
                    floor,
                },
            ));
        }

        debug!("{}: {} -> {} (floor {})", self.label, self.last_value, fresh, floor);
        Outcome::Ok(fresh)
    }

    pub(crate) fn commit(&mut self, fresh: U256) {
        self.last_value = fresh;
    }
}

impl fmt::Debug for SignalTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalTracker")
            .field("label", &self.label)
            .field("last_value", &self.last_value)
            .field("tolerance", &self.tolerance)
            .field("source", &self.source.describe())
            .finish()
    }
}

//! The Watcher
//!
//! Pokes every trigger once per round, concurrently, and optionally appends
//! each trigger's status to a JSON-lines log. Stops when asked to, or once
//! every trigger has latched and there is nothing left to watch.

use chrono::{DateTime, Utc};
use eyre::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::trigger::{Trigger, TriggerStatus};

// ============================================
// STATUS LOG
// ============================================

/// One line of the status log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub timestamp: DateTime<Utc>,
    pub round: u64,
    pub status: TriggerStatus,
}

impl StatusRecord {
    /// Append this record to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// ROUNDS
// ============================================

/// Result of poking every trigger once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub round: u64,
    /// Still armed after this round
    pub armed: usize,
    /// Latched during this round
    pub fired: usize,
    /// Latched before this round started
    pub already_triggered: usize,
}

impl RoundSummary {
    pub fn all_triggered(&self) -> bool {
        self.armed == 0
    }
}

pub struct Watcher {
    triggers: Vec<Arc<Trigger>>,
    poll_interval: Duration,
    status_log: Option<PathBuf>,
    round: u64,
}

impl Watcher {
    pub fn new(triggers: Vec<Arc<Trigger>>, poll_interval: Duration) -> Self {
        Self {
            triggers,
            poll_interval,
            status_log: None,
            round: 0,
        }
    }

    pub fn with_status_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_log = Some(path.into());
        self
    }

    pub fn triggers(&self) -> &[Arc<Trigger>] {
        &self.triggers
    }

    /// Poke every trigger once, concurrently
    pub async fn poll_once(&mut self) -> RoundSummary {
        self.round += 1;

        let pokes = self.triggers.iter().map(|trigger| async move {
            let was_triggered = trigger.is_triggered();
            let triggered = trigger.check_and_toggle_trigger().await;
            (was_triggered, triggered)
        });
        let results = join_all(pokes).await;

        let mut summary = RoundSummary {
            round: self.round,
            ..Default::default()
        };
        for (was_triggered, triggered) in results {
            match (was_triggered, triggered) {
                (true, _) => summary.already_triggered += 1,
                (false, true) => summary.fired += 1,
                (false, false) => summary.armed += 1,
            }
        }

        if let Some(path) = &self.status_log {
            self.log_statuses(path).await;
        }

        debug!(
            "Round {}: {} armed, {} fired, {} already triggered",
            summary.round, summary.armed, summary.fired, summary.already_triggered
        );
        summary
    }

    async fn log_statuses(&self, path: &Path) {
        let timestamp = Utc::now();
        for trigger in &self.triggers {
            let record = StatusRecord {
                timestamp,
                round: self.round,
                status: trigger.status().await,
            };
            if let Err(e) = record.append_to_file(path) {
                warn!("Failed to write status of '{}': {}", trigger.name(), e);
            }
        }
    }

    /// Poll until `shutdown` resolves or every trigger has latched
    pub async fn run<F>(&mut self, shutdown: F) -> RoundSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let summary = self.poll_once().await;
            if summary.fired > 0 {
                info!("🚨 Round {}: {} trigger(s) fired", summary.round, summary.fired);
            }
            if summary.all_triggered() {
                info!("All {} triggers have latched, nothing left to watch", self.triggers.len());
                return summary;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested after round {}", summary.round);
                    return summary;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Composite, ManualSource, SignalTracker, ToleranceRatio};
    use crate::trigger::TriggerIdentity;
    use alloy_primitives::Address;

    async fn vault_trigger(name: &str, source: &Arc<ManualSource>) -> Arc<Trigger> {
        let identity = TriggerIdentity::new(
            name,
            "TRIG",
            "Share price trigger",
            ["Yearn"],
            Address::repeat_byte(0x01),
        );
        let tracker = SignalTracker::new("pps", source.clone(), ToleranceRatio::HALF)
            .await
            .unwrap();
        Arc::new(
            Trigger::new(identity, Composite::new(name).with(tracker))
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_poll_once_counts() {
        let healthy = Arc::new(ManualSource::from_u64("healthy", 1_000));
        let broken = Arc::new(ManualSource::from_u64("broken", 1_000));
        let mut watcher = Watcher::new(
            vec![
                vault_trigger("healthy", &healthy).await,
                vault_trigger("broken", &broken).await,
            ],
            Duration::from_millis(1),
        );

        broken.set_u64(1);
        let first = watcher.poll_once().await;
        assert_eq!((first.round, first.armed, first.fired, first.already_triggered), (1, 1, 1, 0));

        let second = watcher.poll_once().await;
        assert_eq!((second.round, second.armed, second.fired, second.already_triggered), (2, 1, 0, 1));
        assert!(!second.all_triggered());
    }

    #[tokio::test]
    async fn test_run_stops_when_everything_latched() {
        let pps = Arc::new(ManualSource::from_u64("pps", 1_000));
        let mut watcher = Watcher::new(vec![vault_trigger("vault", &pps).await], Duration::from_millis(1));
        pps.fail("execution reverted");

        let summary = watcher.run(std::future::pending()).await;
        assert!(summary.all_triggered());
        assert_eq!(summary.fired, 1);
    }

    #[tokio::test]
    async fn test_run_honours_shutdown() {
        let pps = Arc::new(ManualSource::from_u64("pps", 1_000));
        let mut watcher = Watcher::new(vec![vault_trigger("vault", &pps).await], Duration::from_secs(3600));

        let summary = watcher.run(async {}).await;
        assert_eq!(summary.round, 1);
        assert_eq!(summary.armed, 1);
    }

    #[tokio::test]
    async fn test_status_log_is_json_lines() {
        let pps = Arc::new(ManualSource::from_u64("pps", 1_000));
        let path = std::env::temp_dir().join(format!("pool-triggers-status-{}.jsonl", std::process::id()));
        fs::remove_file(&path).ok();

        let mut watcher = Watcher::new(vec![vault_trigger("vault", &pps).await], Duration::from_millis(1))
            .with_status_log(&path);
        watcher.poll_once().await;
        pps.set_u64(1);
        watcher.poll_once().await;

        let content = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).ok();

        let records: Vec<StatusRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].round, 1);
        assert!(records[0].status.violation.is_none());
        assert_eq!(
            records[1].status.violation.as_ref().map(|v| v.check.as_str()),
            Some("pps")
        );
    }
}

//! Watcher Configuration
//!
//! Which triggers to build, which node to read them from, and how often to
//! poke them. Loaded from environment variables (with `.env` support) or a
//! TOML file.

use alloy_primitives::{Address, U256};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;

use crate::engine::{CommitPolicy, ToleranceRatio, PER_MILLE};
use crate::error::ToleranceError;
use crate::trigger::TriggerIdentity;

// ============================================
// TRIGGER CONFIGURATION
// ============================================

fn default_tolerance_numerator() -> u64 {
    500
}

fn default_tolerance_denominator() -> u64 {
    PER_MILLE
}

/// One Curve pool: its address and coins in index order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub pool: Address,
    pub coins: Vec<Address>,
}

/// Shape of the protected system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    /// Vault share price (Yearn, Rari, Ribbon)
    SharePrice { vault: Address },

    /// Compound-style market exchange rate
    ExchangeRate { market: Address },

    /// Vault share price plus the Curve pool under the vault
    VaultOnCurve { vault: Address, pool: Address },

    /// Curve pool coin balances plus virtual price
    CurvePool { pool: PoolConfig },

    /// Convex deposit over a Curve meta pool and its base pool
    ConvexMetaPool {
        deposit_token: Address,
        reward_pool: Address,
        base: PoolConfig,
        meta: PoolConfig,
    },
}

impl TriggerKind {
    pub fn label(&self) -> &'static str {
        match self {
            TriggerKind::SharePrice { .. } => "share price",
            TriggerKind::ExchangeRate { .. } => "exchange rate",
            TriggerKind::VaultOnCurve { .. } => "vault on curve",
            TriggerKind::CurvePool { .. } => "curve pool",
            TriggerKind::ConvexMetaPool { .. } => "convex meta pool",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub platforms: Vec<String>,
    pub recipient: Address,

    /// Tolerance applied to every check of this trigger
    #[serde(default = "default_tolerance_numerator")]
    pub tolerance_numerator: u64,
    #[serde(default = "default_tolerance_denominator")]
    pub tolerance_denominator: u64,

    #[serde(default)]
    pub commit_policy: CommitPolicy,

    pub kind: TriggerKind,
}

impl TriggerConfig {
    pub fn identity(&self) -> TriggerIdentity {
        TriggerIdentity::new(
            self.name.clone(),
            self.symbol.clone(),
            self.description.clone(),
            self.platforms.iter().cloned(),
            self.recipient,
        )
    }

    pub fn tolerance(&self) -> std::result::Result<ToleranceRatio, ToleranceError> {
        ToleranceRatio::new(
            U256::from(self.tolerance_numerator),
            U256::from(self.tolerance_denominator),
        )
    }
}

// ============================================
// WATCHER CONFIGURATION
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// JSON-RPC endpoint the signal sources read from
    pub rpc_url: String,

    /// Seconds between poke rounds (~1 block by default)
    pub poll_interval_secs: u64,

    /// Append per-round trigger status as JSON lines here
    #[serde(default)]
    pub status_log_path: Option<String>,

    /// Poke every trigger once and exit
    #[serde(default)]
    pub run_once: bool,

    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

/// Trigger list file referenced by `TRIGGERS_FILE`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TriggerFile {
    #[serde(default)]
    triggers: Vec<TriggerConfig>,
}

impl WatcherConfig {
    /// Load configuration from environment variables and .env file.
    /// Triggers come from the TOML file named by `TRIGGERS_FILE`, if set.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let triggers = match env::var("TRIGGERS_FILE") {
            Ok(path) => {
                let content = fs::read_to_string(&path)
                    .map_err(|e| eyre!("Cannot read TRIGGERS_FILE {}: {}", path, e))?;
                toml::from_str::<TriggerFile>(&content)?.triggers
            }
            Err(_) => Vec::new(),
        };

        Ok(Self {
            rpc_url: env::var("RPC_URL").unwrap_or_else(|_| "https://eth.llamarpc.com".to_string()),
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "12".to_string())
                .parse()
                .unwrap_or(12),
            status_log_path: env::var("STATUS_LOG_PATH").ok(),
            run_once: env::var("RUN_ONCE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            triggers,
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre!("Invalid RPC_URL - please set a valid node URL"));
        }
        if self.poll_interval_secs == 0 {
            return Err(eyre!("POLL_INTERVAL_SECS must be at least 1"));
        }

        let mut names = HashSet::new();
        for trigger in &self.triggers {
            if !names.insert(trigger.name.as_str()) {
                return Err(eyre!("Duplicate trigger name '{}'", trigger.name));
            }
            trigger
                .tolerance()
                .map_err(|e| eyre!("Trigger '{}': {}", trigger.name, e))?;
            trigger
                .identity()
                .validate()
                .map_err(|e| eyre!("Trigger '{}': {}", trigger.name, e))?;
        }

        Ok(())
    }

    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              POOL TRIGGERS - CONFIGURATION                 ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Poll Interval:     {:>36} s ║", self.poll_interval_secs);
        println!("║ Mode:              {:^40} ║", if self.run_once { "SINGLE ROUND" } else { "CONTINUOUS" });
        println!("║ Status Log:        {:^40} ║",
            if self.status_log_path.is_some() { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ TRIGGERS ({:>3})                                             ║", self.triggers.len());
        for trigger in &self.triggers {
            println!("║ • {:<24} {:>32} ║", trigger.name, trigger.kind.label());
        }
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://eth.llamarpc.com".to_string(),
            poll_interval_secs: 12,
            status_log_path: None,
            run_once: false,
            triggers: vec![],
        }
    }
}

// ============================================
// TESTS
// ============================================

//! Diagnostic tool - check trigger configuration without arming anything
//!
//! Run with: cargo run --bin check-config -- [path/to/triggers.toml]

use color_eyre::eyre::Result;
use std::env;

use pool_triggers::{TriggerKind, WatcherConfig};

/// Keep long URLs (and the API keys in them) off the screen
fn abbreviate_url(url: &str) -> String {
    let chars: Vec<char> = url.chars().collect();
    if chars.len() <= 50 {
        return url.to_string();
    }
    let head: String = chars[..30].iter().collect();
    let tail: String = chars[chars.len() - 15..].iter().collect();
    format!("{}...{}", head, tail)
}

fn main() -> Result<()> {
    color_eyre::install()?;

    println!("🔍 POOL TRIGGERS CONFIGURATION CHECK\n");

    let config = match env::args().nth(1) {
        Some(path) => {
            println!("  Source: {}", path);
            WatcherConfig::from_file(&path)?
        }
        None => {
            println!("  Source: environment (.env)");
            WatcherConfig::from_env()?
        }
    };

    println!("\n═══════════════════════════════════════════════════");
    println!("                  CONFIGURATION                     ");
    println!("═══════════════════════════════════════════════════\n");

    println!("  RPC_URL: {}", abbreviate_url(&config.rpc_url));
    println!("  POLL_INTERVAL_SECS: {}", config.poll_interval_secs);
    println!(
        "  STATUS_LOG_PATH: {}",
        config.status_log_path.as_deref().unwrap_or("(disabled)")
    );

    println!("\n═══════════════════════════════════════════════════");
    println!("                    TRIGGERS                        ");
    println!("═══════════════════════════════════════════════════\n");

    for trigger in &config.triggers {
        let tolerance = match trigger.tolerance() {
            Ok(t) => format!("{}", t),
            Err(_) => "INVALID".to_string(),
        };
        let identity_ok = trigger.identity().validate().is_ok();

        println!(
            "  {} {} [{}]",
            if identity_ok { "✅" } else { "❌" },
            trigger.name,
            trigger.symbol
        );
        println!("    └─ kind: {}", trigger.kind.label());
        println!("    └─ tolerance: {} ({:?})", tolerance, trigger.commit_policy);
        println!("    └─ platforms: {}", trigger.platforms.join(", "));

        match &trigger.kind {
            TriggerKind::CurvePool { pool } => {
                println!("    └─ {} coins in {}", pool.coins.len(), pool.name);
            }
            TriggerKind::ConvexMetaPool { base, meta, .. } => {
                println!(
                    "    └─ base {} ({} coins), meta {} ({} coins)",
                    base.name,
                    base.coins.len(),
                    meta.name,
                    meta.coins.len()
                );
            }
            _ => {}
        }
        println!();
    }

    println!("═══════════════════════════════════════════════════");
    println!("                     STATUS                         ");
    println!("═══════════════════════════════════════════════════\n");

    match config.validate() {
        Ok(()) => println!("  ✅ {} trigger(s) ready to arm", config.triggers.len()),
        Err(e) => println!("  ❌ {}", e),
    }

    Ok(())
}

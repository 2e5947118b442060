//! Pool Triggers - trigger watcher
//!
//! Run with: cargo run -- --config triggers.toml
//!
//! Builds every configured trigger against the RPC node, then pokes them
//! each poll interval until they have all latched or Ctrl-C is pressed.

use clap::Parser;
use color_eyre::eyre::{bail, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pool_triggers::{build_trigger, RpcEndpoint, Trigger, Watcher, WatcherConfig};

#[derive(Debug, Parser)]
#[command(name = "pool-triggers", version, about = "Latching exploit triggers for DeFi pools")]
struct Args {
    /// TOML configuration file (defaults to environment variables)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Poke every trigger once and exit
    #[arg(long)]
    once: bool,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🛡  POOL TRIGGERS - Exploit Detection Latches").cyan().bold()
    );
    println!(
        "{}",
        style("    Yearn | Curve | Convex | Compound-style markets").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pool_triggers=info".parse()?),
        )
        .init();

    let args = Args::parse();

    print_banner();

    let mut config = match &args.config {
        Some(path) => WatcherConfig::from_file(path)?,
        None => WatcherConfig::from_env()?,
    };
    if args.once {
        config.run_once = true;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your configuration file or .env");
        return Err(e);
    }

    config.print_summary();
    println!();

    if config.triggers.is_empty() {
        bail!("No triggers configured - set TRIGGERS_FILE or pass --config");
    }

    // =============================================
    // BUILD TRIGGERS
    // =============================================
    println!("{}", style("═══ ARMING TRIGGERS ═══").blue().bold());

    let rpc = RpcEndpoint::parse(&config.rpc_url)?;
    let mut triggers: Vec<Arc<Trigger>> = Vec::new();

    for trigger_config in &config.triggers {
        match build_trigger(&rpc, trigger_config).await {
            Ok(trigger) => triggers.push(Arc::new(trigger)),
            Err(e) => warn!("Skipping trigger '{}': {}", trigger_config.name, e),
        }
    }

    if triggers.is_empty() {
        bail!("None of the {} configured triggers could be armed", config.triggers.len());
    }
    info!("✓ Armed {}/{} triggers", triggers.len(), config.triggers.len());

    for trigger in &triggers {
        let mut events = trigger.subscribe();
        tokio::spawn(async move {
            if let Ok(event) = events.recv().await {
                println!();
                println!(
                    "{}",
                    style(format!(
                        "🚨 {} ({}) TRIGGERED at {}",
                        event.identity.name, event.identity.symbol, event.triggered_at
                    ))
                    .red()
                    .bold()
                );
                println!("   └─ {}", event.violation);
                println!("   └─ recipient {:?}", event.identity.recipient);
            }
        });
    }

    // =============================================
    // WATCH
    // =============================================
    println!();
    println!("{}", style("═══ WATCHING ═══").blue().bold());

    let mut watcher = Watcher::new(triggers, Duration::from_secs(config.poll_interval_secs));
    if let Some(path) = &config.status_log_path {
        watcher = watcher.with_status_log(path);
    }

    let summary = if config.run_once {
        watcher.poll_once().await
    } else {
        watcher
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await
    };

    // Let activation listeners print before exiting
    tokio::task::yield_now().await;

    println!();
    println!(
        "{}",
        style(format!(
            "Finished after {} round(s): {} armed, {} triggered",
            summary.round,
            summary.armed,
            summary.fired + summary.already_triggered
        ))
        .green()
        .bold()
    );

    Ok(())
}

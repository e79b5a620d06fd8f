use anyhow::Result;
use colored::Colorize;
use log::{error, info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinSet;

use chainpulse::alerts::{Alert, Severity};
use chainpulse::chains::Chain;
use chainpulse::config::EngineConfig;
use chainpulse::constants::Env;
use chainpulse::core::MonitorEngine;
use chainpulse::utils::setup_logger;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    dotenv::dotenv().ok();
    setup_logger()?;

    info!(
        "{} v{}",
        "chainpulse".bold(),
        env!("CARGO_PKG_VERSION")
    );

    let env = Env::new();
    let config = EngineConfig::from_env(&env);
    config.validate_all()?;

    // Expose engine counters and gauges for scraping
    PrometheusBuilder::new()
        .with_http_listener(([127, 0, 0, 1], env.metrics_port))
        .install()?;

    let engine = Arc::new(MonitorEngine::new(config)?);
    info!("engine up with clients for: {:?}", engine.chains());

    let mut set = JoinSet::new();
    spawn_gas_monitor(&mut set, engine.clone());
    spawn_whale_watch(&mut set, engine.clone());

    info!("monitoring started; ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    set.abort_all();

    Ok(())
}

fn spawn_gas_monitor(set: &mut JoinSet<()>, engine: Arc<MonitorEngine>) {
    set.spawn(async move {
        let mut watch = engine.monitor_gas(15.0, 80.0, vec![Chain::Ethereum], None);
        while let Some(alert) = watch.alerts.recv().await {
            info!(
                "gas {:?} on {}: {:.1} gwei (transfer ~${:.2})",
                alert.kind, alert.quote.chain, alert.quote.total_gwei, alert.quote.transfer_cost_usd
            );
            let outbound = Alert::new(
                format!("Gas {:?} on {}", alert.kind, alert.quote.chain),
                format!("{:.1} gwei observed", alert.quote.total_gwei),
                Severity::Info,
            )
            .with_data(json!({
                "chain": alert.quote.chain,
                "total_gwei": alert.quote.total_gwei,
                "transfer_cost_usd": alert.quote.transfer_cost_usd,
            }));
            deliver(&engine, &outbound).await;
        }
    });
}

fn spawn_whale_watch(set: &mut JoinSet<()>, engine: Arc<MonitorEngine>) {
    set.spawn(async move {
        let tokens = vec!["USDC".to_string(), "WETH".to_string()];
        let mut watch = match engine
            .monitor_whales(&tokens, 1_000_000.0, Chain::Ethereum)
            .await
        {
            Ok(watch) => watch,
            Err(e) => {
                error!("whale watch failed to start: {e}");
                return;
            }
        };

        while let Some(alert) = watch.alerts.recv().await {
            info!(
                "whale {:?}: {:.2} {} (${:.0}) {} -> {}",
                alert.significance,
                alert.tx.amount,
                alert.tx.symbol,
                alert.value_usd,
                alert.tx.from,
                alert.tx.to.as_deref().unwrap_or("?"),
            );
            let outbound = Alert::new(
                format!("Whale {:?} transfer", alert.tx.kind),
                format!(
                    "{:.2} {} (${:.0}){}",
                    alert.tx.amount,
                    alert.tx.symbol,
                    alert.value_usd,
                    alert
                        .wallet_label
                        .as_deref()
                        .map(|l| format!(" involving {l}"))
                        .unwrap_or_default(),
                ),
                Severity::Warning,
            )
            .with_data(json!({
                "chain": alert.tx.chain,
                "hash": alert.tx.hash,
                "value_usd": alert.value_usd,
                "significance": alert.significance,
            }));
            deliver(&engine, &outbound).await;
        }
    });
}

async fn deliver(engine: &MonitorEngine, alert: &Alert) {
    for result in engine.broadcast_alert(alert).await {
        if !result.success {
            warn!(
                "delivery to {} failed: {}",
                result.channel,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

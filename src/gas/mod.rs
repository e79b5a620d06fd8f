use log::warn;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::chains::{Chain, ChainClients, ChainError, FeeEstimate, WatchHandle};
use crate::constants::STANDARD_TRANSFER_GAS;
use crate::prices::PriceCache;

const ALERT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GasAlertKind {
    Low,
    High,
}

/// Computed fresh on every poll; nothing here outlives the tick.
#[derive(Debug, Clone, Serialize)]
pub struct GasQuote {
    pub chain: Chain,
    pub base_fee_gwei: f64,
    pub priority_fee_gwei: f64,
    pub total_gwei: f64,
    pub transfer_cost_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GasAlert {
    pub kind: GasAlertKind,
    pub quote: GasQuote,
}

#[derive(Debug)]
pub struct GasWatch {
    pub alerts: mpsc::Receiver<GasAlert>,
    pub handle: WatchHandle,
}

impl GasWatch {
    pub fn into_stream(self) -> (ReceiverStream<GasAlert>, WatchHandle) {
        (ReceiverStream::new(self.alerts), self.handle)
    }
}

pub fn evaluate_thresholds(total_gwei: f64, low_gwei: f64, high_gwei: f64) -> Option<GasAlertKind> {
    if total_gwei <= low_gwei {
        Some(GasAlertKind::Low)
    } else if total_gwei >= high_gwei {
        Some(GasAlertKind::High)
    } else {
        None
    }
}

pub fn build_quote(chain: Chain, fee: FeeEstimate, native_price_usd: f64) -> GasQuote {
    let total_gwei = fee.total_gwei();
    let transfer_cost_usd =
        total_gwei * 1e-9 * STANDARD_TRANSFER_GAS as f64 * native_price_usd;
    GasQuote {
        chain,
        base_fee_gwei: fee.base_fee_gwei,
        priority_fee_gwei: fee.priority_fee_gwei,
        total_gwei,
        transfer_cost_usd,
    }
}

/// Interval-driven gas polling with low/high threshold alerting. The first
/// check runs immediately, before the cadence begins.
pub struct GasMonitor {
    clients: Arc<ChainClients>,
    prices: Arc<PriceCache>,
}

impl GasMonitor {
    pub fn new(clients: Arc<ChainClients>, prices: Arc<PriceCache>) -> Self {
        Self { clients, prices }
    }

    pub async fn quote(&self, chain: Chain) -> Result<GasQuote, ChainError> {
        let client = self.clients.get(chain)?;
        let fee = client.fee_estimate().await?;
        let native_price = self.prices.native_price(chain).await;
        Ok(build_quote(chain, fee, native_price))
    }

    pub fn monitor(
        &self,
        low_gwei: f64,
        high_gwei: f64,
        chains: Vec<Chain>,
        interval: Duration,
    ) -> GasWatch {
        let (watched, skipped): (Vec<Chain>, Vec<Chain>) =
            chains.into_iter().partition(|c| c.is_evm());
        for chain in skipped {
            warn!("gas monitoring is not available on {chain}, skipping");
        }

        let clients = self.clients.clone();
        let prices = self.prices.clone();
        let (alert_tx, alert_rx) = mpsc::channel(ALERT_CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                // The first tick completes immediately.
                ticker.tick().await;
                for chain in &watched {
                    let client = match clients.get(*chain) {
                        Ok(client) => client,
                        Err(e) => {
                            warn!("{e}");
                            continue;
                        }
                    };
                    let fee = match client.fee_estimate().await {
                        Ok(fee) => fee,
                        Err(e) => {
                            warn!("gas poll on {chain} failed: {e}");
                            metrics::increment_counter!("chainpulse_rpc_failures_total", "chain" => chain.as_str());
                            continue;
                        }
                    };
                    let native_price = prices.native_price(*chain).await;
                    let quote = build_quote(*chain, fee, native_price);
                    metrics::gauge!("chainpulse_gas_price_gwei", quote.total_gwei, "chain" => chain.as_str());

                    if let Some(kind) = evaluate_thresholds(quote.total_gwei, low_gwei, high_gwei)
                    {
                        if alert_tx.send(GasAlert { kind, quote }).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        GasWatch {
            alerts: alert_rx,
            handle: WatchHandle::new(vec![task]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{ChainClient, MockChainClient};
    use crate::prices::{PriceCache, PriceError, PriceProvider, ProviderQuote};
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[test]
    fn test_threshold_evaluation() {
        assert_eq!(evaluate_thresholds(12.0, 15.0, 50.0), Some(GasAlertKind::Low));
        assert_eq!(evaluate_thresholds(55.0, 15.0, 50.0), Some(GasAlertKind::High));
        assert_eq!(evaluate_thresholds(30.0, 15.0, 50.0), None);
        assert_eq!(evaluate_thresholds(15.0, 15.0, 50.0), Some(GasAlertKind::Low));
        assert_eq!(evaluate_thresholds(50.0, 15.0, 50.0), Some(GasAlertKind::High));
    }

    #[test]
    fn test_transfer_cost_estimate() {
        let quote = build_quote(
            Chain::Ethereum,
            FeeEstimate {
                base_fee_gwei: 18.0,
                priority_fee_gwei: 2.0,
            },
            2_500.0,
        );
        assert_eq!(quote.total_gwei, 20.0);
        // 20 gwei * 21,000 gas * $2,500 per ETH
        assert!((quote.transfer_cost_usd - 1.05).abs() < 1e-9);
    }

    struct EthPrice;

    #[async_trait]
    impl PriceProvider for EthPrice {
        async fn fetch_quotes(
            &self,
            _ids: &[&str],
        ) -> Result<HashMap<String, ProviderQuote>, PriceError> {
            Ok(HashMap::from([(
                "ethereum".to_string(),
                ProviderQuote {
                    usd: 2500.0,
                    change_24h: 0.0,
                },
            )]))
        }
    }

    #[tokio::test]
    async fn test_low_gas_emits_exactly_one_low_alert() {
        let mut client = MockChainClient::new();
        client.expect_chain().return_const(Chain::Ethereum);
        client.expect_fee_estimate().returning(|| {
            Ok(FeeEstimate {
                base_fee_gwei: 10.0,
                priority_fee_gwei: 2.0,
            })
        });

        let clients = Arc::new(ChainClients::from_clients([
            Arc::new(client) as Arc<dyn ChainClient>
        ]));
        let prices = Arc::new(PriceCache::new(Arc::new(EthPrice)));
        let monitor = GasMonitor::new(clients, prices);

        let mut watch = monitor.monitor(
            15.0,
            50.0,
            vec![Chain::Ethereum],
            Duration::from_secs(3600),
        );

        // The initial check fires before the interval cadence.
        let alert = tokio::time::timeout(Duration::from_secs(2), watch.alerts.recv())
            .await
            .expect("initial check should emit promptly")
            .expect("alert expected");
        assert_eq!(alert.kind, GasAlertKind::Low);
        assert_eq!(alert.quote.total_gwei, 12.0);

        // 12 gwei is below low only: no high alert follows on this tick.
        assert!(watch.alerts.try_recv().is_err());
        watch.handle.cancel();
    }

    #[tokio::test]
    async fn test_mid_range_gas_stays_silent() {
        let mut client = MockChainClient::new();
        client.expect_chain().return_const(Chain::Ethereum);
        client.expect_fee_estimate().returning(|| {
            Ok(FeeEstimate {
                base_fee_gwei: 28.0,
                priority_fee_gwei: 2.0,
            })
        });
        let clients = Arc::new(ChainClients::from_clients([
            Arc::new(client) as Arc<dyn ChainClient>
        ]));
        let prices = Arc::new(PriceCache::new(Arc::new(EthPrice)));
        let monitor = GasMonitor::new(clients, prices);

        let mut watch = monitor.monitor(
            15.0,
            50.0,
            vec![Chain::Ethereum],
            Duration::from_secs(3600),
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(watch.alerts.try_recv().is_err());
        watch.handle.cancel();
    }
}

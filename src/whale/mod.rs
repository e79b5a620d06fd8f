use futures::future::join_all;
use log::warn;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::chains::{
    Chain, ChainClients, ChainError, ParamValue, RawEvent, TransactionRecord, TxKind, WatchHandle,
};
use crate::constants::{
    WHALE_HIGH_USD, WHALE_MEDIUM_USD, WHALE_SCAN_TX_LIMIT, WHALE_SCAN_WALLETS,
};
use crate::prices::PriceCache;
use crate::registry::{KnownWalletRegistry, TokenRegistry, WalletCategory};
use crate::utils::format_raw_amount;

pub const ERC20_TRANSFER_SIGNATURE: &str =
    "event Transfer(address indexed from, address indexed to, uint256 value)";

// Label markers driving the transfer/swap/bridge heuristic. Best effort,
// not ground truth: a protocol label is all the evidence available here.
const BRIDGE_MARKERS: &[&str] = &["bridge", "portal", "wormhole", "stargate"];
const DEX_MARKERS: &[&str] = &["swap", "dex", "router", "aggregator", "amm"];

const ALERT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignificanceTier {
    High,
    Medium,
    Low,
}

/// Fixed tier thresholds; callers cannot reconfigure them per request.
pub fn significance_for(value_usd: f64) -> SignificanceTier {
    if value_usd >= WHALE_HIGH_USD {
        SignificanceTier::High
    } else if value_usd >= WHALE_MEDIUM_USD {
        SignificanceTier::Medium
    } else {
        SignificanceTier::Low
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WhaleAlert {
    pub tx: TransactionRecord,
    pub value_usd: f64,
    pub wallet_label: Option<String>,
    pub significance: SignificanceTier,
}

/// Live whale feed: alerts on a channel, stopped only through the handle.
#[derive(Debug)]
pub struct WhaleWatch {
    pub alerts: mpsc::Receiver<WhaleAlert>,
    pub handle: WatchHandle,
}

impl WhaleWatch {
    pub fn into_stream(self) -> (ReceiverStream<WhaleAlert>, WatchHandle) {
        (ReceiverStream::new(self.alerts), self.handle)
    }
}

/// Heuristic counterparty classification. If either side is a labeled
/// protocol whose label carries a bridge marker the transfer is a bridge
/// hop; a DEX marker makes it a swap; anything else stays a transfer.
pub fn classify_counterparties(
    known: &KnownWalletRegistry,
    chain: Chain,
    from: &str,
    to: Option<&str>,
) -> (TxKind, Option<String>) {
    let from_entry = known.lookup(chain, from);
    let to_entry = to.and_then(|addr| known.lookup(chain, addr));
    let label = from_entry
        .or(to_entry)
        .map(|entry| entry.label.to_string());

    for entry in [from_entry, to_entry].into_iter().flatten() {
        if entry.category != WalletCategory::Protocol {
            continue;
        }
        let lowered = entry.label.to_ascii_lowercase();
        if BRIDGE_MARKERS.iter().any(|m| lowered.contains(m)) {
            return (TxKind::Bridge, label);
        }
        if DEX_MARKERS.iter().any(|m| lowered.contains(m)) {
            return (TxKind::Swap, label);
        }
    }
    (TxKind::Transfer, label)
}

/// Applies the USD threshold filter to one decoded Transfer event.
pub fn evaluate_transfer(
    event: &RawEvent,
    chain: Chain,
    token_symbol: &str,
    token_decimals: u8,
    unit_price_usd: f64,
    min_value_usd: f64,
    known: &KnownWalletRegistry,
) -> Option<WhaleAlert> {
    if !event.name.eq_ignore_ascii_case("transfer") {
        return None;
    }
    let from = match event.param("from") {
        Some(ParamValue::Address(a)) => a.clone(),
        _ => return None,
    };
    let to = match event.param("to") {
        Some(ParamValue::Address(a)) => Some(a.clone()),
        _ => None,
    };
    let value = match event.param("value") {
        Some(ParamValue::Uint(v)) => *v,
        _ => return None,
    };

    let amount = format_raw_amount(value, token_decimals);
    let value_usd = amount * unit_price_usd;
    if value_usd < min_value_usd {
        return None;
    }

    let (kind, wallet_label) = classify_counterparties(known, chain, &from, to.as_deref());
    Some(WhaleAlert {
        tx: TransactionRecord {
            hash: event.tx_hash.clone(),
            from,
            to,
            amount,
            symbol: token_symbol.to_string(),
            chain,
            timestamp: None,
            kind,
        },
        value_usd,
        wallet_label,
        significance: significance_for(value_usd),
    })
}

/// Watches transfer events and scans known-wallet history for transactions
/// clearing a USD threshold.
pub struct WhaleMonitor {
    clients: Arc<ChainClients>,
    prices: Arc<PriceCache>,
    tokens: Arc<TokenRegistry>,
    known: Arc<KnownWalletRegistry>,
}

impl WhaleMonitor {
    pub fn new(
        clients: Arc<ChainClients>,
        prices: Arc<PriceCache>,
        tokens: Arc<TokenRegistry>,
        known: Arc<KnownWalletRegistry>,
    ) -> Self {
        Self {
            clients,
            prices,
            tokens,
            known,
        }
    }

    /// Live mode: register a transfer listener per requested token and emit
    /// a WhaleAlert for every event whose USD value clears `min_value_usd`.
    pub async fn watch(
        &self,
        token_symbols: &[String],
        min_value_usd: f64,
        chain: Chain,
    ) -> Result<WhaleWatch, ChainError> {
        let client = self.clients.get(chain)?;
        let (alert_tx, alert_rx) = mpsc::channel(ALERT_CHANNEL_CAPACITY);
        let mut handle = WatchHandle::default();
        let mut watching = 0usize;

        for symbol in token_symbols {
            let Some(token) = self.tokens.by_symbol(chain, symbol) else {
                warn!("token {symbol} not in the {chain} registry, skipping");
                continue;
            };
            let watch = client
                .watch_events(token.address, &[ERC20_TRANSFER_SIGNATURE.to_string()])
                .await?;
            handle.absorb(watch.handle);

            let mut raw_rx = watch.receiver;
            let prices = self.prices.clone();
            let known = self.known.clone();
            let out = alert_tx.clone();
            let token = *token;
            handle.push(tokio::spawn(async move {
                while let Some(event) = raw_rx.recv().await {
                    let unit = prices.price(token.symbol).await;
                    let Some(mut alert) = evaluate_transfer(
                        &event,
                        chain,
                        token.symbol,
                        token.decimals,
                        unit,
                        min_value_usd,
                        &known,
                    ) else {
                        continue;
                    };
                    alert.tx.timestamp = Some(chrono::Utc::now().timestamp());
                    metrics::increment_counter!("chainpulse_whale_alerts_total", "chain" => chain.as_str());
                    if out.send(alert).await.is_err() {
                        return;
                    }
                }
            }));
            watching += 1;
        }

        if watching == 0 {
            return Err(ChainError::InvalidConfig(
                "no watchable tokens in request".to_string(),
            ));
        }
        Ok(WhaleWatch {
            alerts: alert_rx,
            handle,
        })
    }

    /// Historic mode: sweep recent transactions of the first known wallets
    /// in registry order and apply the same threshold filter. One wallet's
    /// chain failure never aborts the sweep.
    pub async fn scan_recent(
        &self,
        chain: Chain,
        min_value_usd: f64,
    ) -> Result<Vec<WhaleAlert>, ChainError> {
        let client = self.clients.get(chain)?;
        let native_price = self.prices.native_price(chain).await;
        let wallets: Vec<_> = self
            .known
            .for_chain(chain)
            .into_iter()
            .take(WHALE_SCAN_WALLETS)
            .collect();

        let results = join_all(wallets.into_iter().map(|wallet| {
            let client = client.clone();
            async move {
                (
                    wallet,
                    client
                        .recent_transactions(wallet.address, WHALE_SCAN_TX_LIMIT)
                        .await,
                )
            }
        }))
        .await;

        let mut alerts = Vec::new();
        for (wallet, result) in results {
            let transactions = match result {
                Ok(transactions) => transactions,
                Err(e) => {
                    warn!("scan of {} ({}) failed: {e}", wallet.label, wallet.address);
                    continue;
                }
            };
            for mut tx in transactions {
                let value_usd = tx.amount * native_price;
                if value_usd < min_value_usd {
                    continue;
                }
                let (kind, label) =
                    classify_counterparties(&self.known, chain, &tx.from, tx.to.as_deref());
                tx.kind = kind;
                alerts.push(WhaleAlert {
                    tx,
                    value_usd,
                    wallet_label: label.or_else(|| Some(wallet.label.to_string())),
                    significance: significance_for(value_usd),
                });
            }
        }
        Ok(alerts)
    }
}

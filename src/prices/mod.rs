use async_trait::async_trait;
use dashmap::DashMap;
use log::warn;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::chains::Chain;
use crate::constants::{HTTP_TIMEOUT, PRICE_TTL};

/// Provider-specific asset identifiers for the symbols this engine prices.
/// Symbols missing here resolve to price 0 instead of erroring, so a gap in
/// the map never blocks balance display.
const PROVIDER_IDS: &[(&str, &str)] = &[
    ("ETH", "ethereum"),
    ("WETH", "weth"),
    ("MATIC", "matic-network"),
    ("WMATIC", "wmatic"),
    ("SOL", "solana"),
    ("BTC", "bitcoin"),
    ("WBTC", "wrapped-bitcoin"),
    ("USDC", "usd-coin"),
    ("USDT", "tether"),
    ("DAI", "dai"),
    ("UNI", "uniswap"),
    ("LINK", "chainlink"),
    ("AAVE", "aave"),
    ("ARB", "arbitrum"),
    ("OP", "optimism"),
    ("JUP", "jupiter-exchange-solana"),
    ("BONK", "bonk"),
    ("RAY", "raydium"),
];

pub fn provider_id(symbol: &str) -> Option<&'static str> {
    PROVIDER_IDS
        .iter()
        .find(|(sym, _)| sym.eq_ignore_ascii_case(symbol))
        .map(|(_, id)| *id)
}

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("price request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("price provider error: {0}")]
    Api(String),
}

/// One upstream quote, keyed by provider identifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderQuote {
    pub usd: f64,
    pub change_24h: f64,
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_quotes(&self, ids: &[&str]) -> Result<HashMap<String, ProviderQuote>, PriceError>;
}

/// CoinGecko-style `simple/price` HTTP provider.
pub struct HttpPriceProvider {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPriceProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, PriceError> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl PriceProvider for HttpPriceProvider {
    async fn fetch_quotes(&self, ids: &[&str]) -> Result<HashMap<String, ProviderQuote>, PriceError> {
        let url = format!("{}/simple/price", self.base_url.trim_end_matches('/'));
        let mut request = self.http.get(url).query(&[
            ("ids", ids.join(",")),
            ("vs_currencies", "usd".to_string()),
            ("include_24hr_change", "true".to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(PriceError::Api(format!(
                "http status {}",
                response.status()
            )));
        }

        let body: HashMap<String, HashMap<String, f64>> = response.json().await?;
        Ok(body
            .into_iter()
            .map(|(id, fields)| {
                (
                    id,
                    ProviderQuote {
                        usd: fields.get("usd").copied().unwrap_or(0.0),
                        change_24h: fields.get("usd_24h_change").copied().unwrap_or(0.0),
                    },
                )
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub symbol: String,
    pub usd: f64,
    pub change_24h: f64,
    pub fetched_at: Instant,
}

/// TTL cache over the price provider. Owned by the engine instance, never
/// shared module state; consumers receive copies only. On provider failure
/// stale entries are kept and unknown symbols stay at 0: availability wins
/// over freshness here.
pub struct PriceCache {
    provider: Arc<dyn PriceProvider>,
    quotes: DashMap<String, PriceQuote>,
    last_refresh: RwLock<Option<Instant>>,
    ttl: Duration,
}

impl PriceCache {
    pub fn new(provider: Arc<dyn PriceProvider>) -> Self {
        Self::with_ttl(provider, PRICE_TTL)
    }

    pub fn with_ttl(provider: Arc<dyn PriceProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            quotes: DashMap::new(),
            last_refresh: RwLock::new(None),
            ttl,
        }
    }

    pub async fn price(&self, symbol: &str) -> f64 {
        self.prices(&[symbol])
            .await
            .get(&symbol.to_ascii_uppercase())
            .copied()
            .unwrap_or(0.0)
    }

    pub async fn prices(&self, symbols: &[&str]) -> HashMap<String, f64> {
        let wanted: Vec<String> = symbols.iter().map(|s| s.to_ascii_uppercase()).collect();

        // Batch every stale or missing symbol into one provider call.
        let need: Vec<&str> = wanted
            .iter()
            .filter(|sym| provider_id(sym).is_some() && !self.is_fresh(sym))
            .map(|s| s.as_str())
            .collect();

        if !need.is_empty() {
            let ids: Vec<&str> = need.iter().filter_map(|sym| provider_id(sym)).collect();
            match self.provider.fetch_quotes(&ids).await {
                Ok(fetched) => {
                    let stamp = Instant::now();
                    for sym in &need {
                        let Some(id) = provider_id(sym) else { continue };
                        if let Some(quote) = fetched.get(id) {
                            self.quotes.insert(
                                sym.to_string(),
                                PriceQuote {
                                    symbol: sym.to_string(),
                                    usd: quote.usd,
                                    change_24h: quote.change_24h,
                                    fetched_at: stamp,
                                },
                            );
                        }
                    }
                    *self.last_refresh.write().await = Some(stamp);
                    metrics::increment_counter!("chainpulse_price_fetches_total");
                }
                Err(e) => {
                    warn!("price refresh failed, keeping stale quotes: {e}");
                    metrics::increment_counter!("chainpulse_price_fetch_failures_total");
                }
            }
        } else if !wanted.is_empty() {
            metrics::increment_counter!("chainpulse_price_cache_hits_total");
        }

        wanted
            .into_iter()
            .map(|sym| {
                let usd = self.quotes.get(&sym).map(|q| q.usd).unwrap_or(0.0);
                (sym, usd)
            })
            .collect()
    }

    pub async fn native_price(&self, chain: Chain) -> f64 {
        self.price(chain.native_symbol()).await
    }

    /// Copy of the cached quote, if any; age checks belong to the caller.
    pub fn quote(&self, symbol: &str) -> Option<PriceQuote> {
        self.quotes
            .get(&symbol.to_ascii_uppercase())
            .map(|q| q.value().clone())
    }

    /// Drops every quote and the batch stamp, forcing a full refresh on the
    /// next read.
    pub async fn clear(&self) {
        self.quotes.clear();
        *self.last_refresh.write().await = None;
    }

    pub async fn last_refresh(&self) -> Option<Instant> {
        *self.last_refresh.read().await
    }

    fn is_fresh(&self, symbol: &str) -> bool {
        self.quotes
            .get(symbol)
            .map(|q| q.fetched_at.elapsed() < self.ttl)
            .unwrap_or(false)
    }
}

use async_trait::async_trait;
use chainpulse::chains::{
    Chain, ChainClient, ChainError, EventWatch, FeeEstimate, RawEvent, TokenBalance,
    TransactionRecord, WatchHandle,
};
use chainpulse::prices::{PriceError, PriceProvider, ProviderQuote};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Deterministic in-memory chain used by the integration tests: fixed
/// balances, a fixed activity count, and an optional pre-wired event feed
/// handed to the first `watch_events` subscriber.
pub struct StubChain {
    pub chain: Chain,
    pub native: f64,
    pub token_balances: HashMap<String, TokenBalance>,
    pub tx_count: u64,
    pub transactions: Vec<TransactionRecord>,
    pub fee: Option<FeeEstimate>,
    pub activity_calls: AtomicUsize,
    event_feed: Mutex<Option<mpsc::Receiver<RawEvent>>>,
}

impl StubChain {
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            native: 0.0,
            token_balances: HashMap::new(),
            tx_count: 0,
            transactions: Vec::new(),
            fee: None,
            activity_calls: AtomicUsize::new(0),
            event_feed: Mutex::new(None),
        }
    }

    pub fn with_native(mut self, native: f64) -> Self {
        self.native = native;
        self
    }

    pub fn with_token_balance(mut self, token_address: &str, balance: TokenBalance) -> Self {
        self.token_balances
            .insert(token_address.to_ascii_lowercase(), balance);
        self
    }

    pub fn with_tx_count(mut self, tx_count: u64) -> Self {
        self.tx_count = tx_count;
        self
    }

    /// Wire a channel whose sender side drives the next event watch.
    pub fn with_event_feed(self) -> (Self, mpsc::Sender<RawEvent>) {
        let (tx, rx) = mpsc::channel(64);
        *self.event_feed.lock().unwrap() = Some(rx);
        (self, tx)
    }
}

#[async_trait]
impl ChainClient for StubChain {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn native_balance(&self, _address: &str) -> Result<f64, ChainError> {
        Ok(self.native)
    }

    async fn token_balance(
        &self,
        _wallet: &str,
        token_address: &str,
    ) -> Result<TokenBalance, ChainError> {
        match self
            .token_balances
            .get(&token_address.to_ascii_lowercase())
        {
            Some(balance) => Ok(balance.clone()),
            None => Ok(TokenBalance {
                symbol: "?".to_string(),
                decimals: 18,
                raw_amount: "0".to_string(),
                formatted_amount: 0.0,
            }),
        }
    }

    async fn recent_transactions(
        &self,
        _address: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, ChainError> {
        Ok(self.transactions.iter().take(limit).cloned().collect())
    }

    async fn transaction_count(&self, _address: &str) -> Result<u64, ChainError> {
        self.activity_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.tx_count)
    }

    async fn watch_events(
        &self,
        _address: &str,
        _event_signatures: &[String],
    ) -> Result<EventWatch, ChainError> {
        let receiver = self
            .event_feed
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| mpsc::channel(1).1);
        Ok(EventWatch {
            receiver,
            handle: WatchHandle::default(),
        })
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainError> {
        self.fee.ok_or(ChainError::Unsupported {
            chain: self.chain,
            operation: "fee_estimate",
        })
    }
}

/// Fixed quote table keyed by provider identifier.
pub struct StubPrices {
    quotes: HashMap<String, ProviderQuote>,
}

impl StubPrices {
    pub fn new(quotes: &[(&str, f64)]) -> Self {
        Self {
            quotes: quotes
                .iter()
                .map(|(id, usd)| {
                    (
                        id.to_string(),
                        ProviderQuote {
                            usd: *usd,
                            change_24h: 0.0,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl PriceProvider for StubPrices {
    async fn fetch_quotes(
        &self,
        _ids: &[&str],
    ) -> Result<HashMap<String, ProviderQuote>, PriceError> {
        Ok(self.quotes.clone())
    }
}

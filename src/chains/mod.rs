use async_trait::async_trait;
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub mod evm;
pub mod solana;

pub use evm::EvmClient;
pub use solana::SolanaClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Polygon,
    Arbitrum,
    Optimism,
    Base,
    Solana,
}

impl Chain {
    pub fn all() -> &'static [Chain] {
        &[
            Chain::Ethereum,
            Chain::Polygon,
            Chain::Arbitrum,
            Chain::Optimism,
            Chain::Base,
            Chain::Solana,
        ]
    }

    pub fn evm_chains() -> &'static [Chain] {
        &[
            Chain::Ethereum,
            Chain::Polygon,
            Chain::Arbitrum,
            Chain::Optimism,
            Chain::Base,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Polygon => "polygon",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
            Chain::Solana => "solana",
        }
    }

    /// Short path segment used by provider URL templates.
    pub fn rpc_slug(&self) -> &'static str {
        match self {
            Chain::Ethereum => "eth",
            Chain::Polygon => "polygon",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
            Chain::Solana => "solana",
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Polygon => "MATIC",
            Chain::Solana => "SOL",
            _ => "ETH",
        }
    }

    pub fn is_evm(&self) -> bool {
        !matches!(self, Chain::Solana)
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Chain::Ethereum => Some(1),
            Chain::Optimism => Some(10),
            Chain::Polygon => Some(137),
            Chain::Arbitrum => Some(42161),
            Chain::Base => Some(8453),
            Chain::Solana => None,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(Chain::Ethereum),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "arbitrum" => Ok(Chain::Arbitrum),
            "optimism" => Ok(Chain::Optimism),
            "base" => Ok(Chain::Base),
            "solana" | "sol" => Ok(Chain::Solana),
            other => Err(ChainError::UnknownChain(other.to_string())),
        }
    }
}

/// A (chain, address) pair. EVM addresses compare case-insensitively,
/// Solana addresses are case-sensitive base58.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAddress {
    pub chain: Chain,
    pub address: String,
}

impl WalletAddress {
    pub fn new(chain: Chain, address: impl Into<String>) -> Self {
        Self {
            chain,
            address: address.into(),
        }
    }

    pub fn normalized(&self) -> String {
        if self.chain.is_evm() {
            self.address.to_ascii_lowercase()
        } else {
            self.address.clone()
        }
    }
}

impl PartialEq for WalletAddress {
    fn eq(&self, other: &Self) -> bool {
        self.chain == other.chain && self.normalized() == other.normalized()
    }
}

impl Eq for WalletAddress {}

impl Hash for WalletAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chain.hash(state);
        self.normalized().hash(state);
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.address)
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("{chain} rpc unavailable: {message}")]
    Unavailable { chain: Chain, message: String },

    #[error("invalid {chain} address: {address}")]
    InvalidAddress { chain: Chain, address: String },

    #[error("unknown chain: {0}")]
    UnknownChain(String),

    #[error("no client configured for chain {0}")]
    NoClient(Chain),

    #[error("{operation} is not supported on {chain}")]
    Unsupported {
        chain: Chain,
        operation: &'static str,
    },

    #[error("invalid contract configuration: {0}")]
    InvalidConfig(String),
}

impl ChainError {
    pub fn unavailable(chain: Chain, err: impl fmt::Display) -> Self {
        ChainError::Unavailable {
            chain,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalance {
    pub symbol: String,
    pub decimals: u8,
    pub raw_amount: String,
    pub formatted_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Transfer,
    Swap,
    Bridge,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    /// Native-unit amount (ETH, MATIC, SOL), already scaled by decimals.
    pub amount: f64,
    pub symbol: String,
    pub chain: Chain,
    pub timestamp: Option<i64>,
    pub kind: TxKind,
}

/// One decoded argument of a raw contract event.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Address(String),
    Uint(U256),
    Bool(bool),
    Bytes(String),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Address(a) => f.write_str(a),
            ParamValue::Uint(u) => write!(f, "{}", u),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Bytes(b) => write!(f, "0x{}", b),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

/// A chain event parsed far enough to name it and type its arguments,
/// before pattern classification happens in the event watcher.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub name: String,
    pub params: Vec<(String, ParamValue)>,
    pub tx_hash: String,
    pub block_number: u64,
}

impl RawEvent {
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeEstimate {
    pub base_fee_gwei: f64,
    pub priority_fee_gwei: f64,
}

impl FeeEstimate {
    pub fn total_gwei(&self) -> f64 {
        self.base_fee_gwei + self.priority_fee_gwei
    }
}

/// Cancellation guard for a watch/monitor registration. Aborting is
/// idempotent; dropping the handle cancels delivery as well. In-flight RPC
/// calls are not interrupted mid-request, their results are discarded.
#[derive(Debug, Default)]
pub struct WatchHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl WatchHandle {
    pub fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }

    pub fn push(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    /// Move every task out of `other` so a single handle governs them all.
    pub fn absorb(&mut self, mut other: WatchHandle) {
        self.tasks.append(&mut other.tasks);
    }

    pub fn cancel(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// An active event subscription: typed messages on a channel plus the
/// handle that is the sole way to stop delivery.
#[derive(Debug)]
pub struct EventWatch {
    pub receiver: mpsc::Receiver<RawEvent>,
    pub handle: WatchHandle,
}

/// Uniform balance/transaction/event access for one chain. RPC failures
/// surface as `ChainError::Unavailable` and are never converted to zero
/// balances at this layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain(&self) -> Chain;

    /// Native balance in whole units (ETH, SOL, ...).
    async fn native_balance(&self, address: &str) -> Result<f64, ChainError>;

    async fn token_balance(
        &self,
        wallet: &str,
        token_address: &str,
    ) -> Result<TokenBalance, ChainError>;

    /// Most recent transactions touching the address, newest first.
    async fn recent_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, ChainError>;

    /// Lifetime outbound transaction count, used as an activity signal.
    async fn transaction_count(&self, address: &str) -> Result<u64, ChainError>;

    /// Subscribe to contract events matching the given signatures. Events
    /// are delivered in the order the node reports them.
    async fn watch_events(
        &self,
        address: &str,
        event_signatures: &[String],
    ) -> Result<EventWatch, ChainError>;

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainError>;
}

/// Per-chain client routing table, built once at engine construction.
pub struct ChainClients {
    clients: HashMap<Chain, Arc<dyn ChainClient>>,
}

impl ChainClients {
    pub fn from_clients(clients: impl IntoIterator<Item = Arc<dyn ChainClient>>) -> Self {
        Self {
            clients: clients.into_iter().map(|c| (c.chain(), c)).collect(),
        }
    }

    pub fn get(&self, chain: Chain) -> Result<Arc<dyn ChainClient>, ChainError> {
        self.clients
            .get(&chain)
            .cloned()
            .ok_or(ChainError::NoClient(chain))
    }

    pub fn chains(&self) -> Vec<Chain> {
        self.clients.keys().copied().collect()
    }

    pub fn has(&self, chain: Chain) -> bool {
        self.clients.contains_key(&chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_parsing() {
        assert_eq!("ethereum".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("ETH".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("sol".parse::<Chain>().unwrap(), Chain::Solana);
        assert!("near".parse::<Chain>().is_err());
    }

    #[test]
    fn test_wallet_address_case_rules() {
        let a = WalletAddress::new(Chain::Ethereum, "0xABCDEF0000000000000000000000000000000001");
        let b = WalletAddress::new(Chain::Ethereum, "0xabcdef0000000000000000000000000000000001");
        assert_eq!(a, b);

        let c = WalletAddress::new(Chain::Solana, "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM");
        let d = WalletAddress::new(Chain::Solana, "9wzdxwbbmkg8ztbnmquxvqrayrzzdsgydlvl9zytawwm");
        assert_ne!(c, d);
    }

    #[test]
    fn test_native_symbols() {
        assert_eq!(Chain::Ethereum.native_symbol(), "ETH");
        assert_eq!(Chain::Polygon.native_symbol(), "MATIC");
        assert_eq!(Chain::Solana.native_symbol(), "SOL");
        assert!(Chain::Base.is_evm());
        assert!(!Chain::Solana.is_evm());
    }

    #[tokio::test]
    async fn test_watch_handle_cancel_is_idempotent() {
        let task = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        let handle = WatchHandle::new(vec![task]);
        handle.cancel();
        handle.cancel();
        handle.cancel();
    }

    #[test]
    fn test_clients_routing() {
        let clients = ChainClients::from_clients(Vec::<Arc<dyn ChainClient>>::new());
        assert!(matches!(
            clients.get(Chain::Ethereum),
            Err(ChainError::NoClient(Chain::Ethereum))
        ));
    }
}

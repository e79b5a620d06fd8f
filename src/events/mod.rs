use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ethers::types::U256;
use itertools::Itertools;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::chains::{Chain, ChainClients, ChainError, ParamValue, RawEvent, WatchHandle};
use crate::constants::EVENT_RING_CAPACITY;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const SUMMARY_TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractType {
    Erc20,
    Erc721,
    Erc1155,
    AmmPool,
    LendingPool,
    Custom,
}

pub const ERC20_EVENTS: &[&str] = &[
    "event Transfer(address indexed from, address indexed to, uint256 value)",
    "event Approval(address indexed owner, address indexed spender, uint256 value)",
];

pub const ERC721_EVENTS: &[&str] = &[
    "event Transfer(address indexed from, address indexed to, uint256 indexed tokenId)",
    "event Approval(address indexed owner, address indexed approved, uint256 indexed tokenId)",
    "event ApprovalForAll(address indexed owner, address indexed operator, bool approved)",
];

pub const ERC1155_EVENTS: &[&str] = &[
    "event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value)",
    "event TransferBatch(address indexed operator, address indexed from, address indexed to, uint256[] ids, uint256[] values)",
    "event ApprovalForAll(address indexed account, address indexed operator, bool approved)",
];

pub const AMM_POOL_EVENTS: &[&str] = &[
    "event Swap(address indexed sender, uint256 amount0In, uint256 amount1In, uint256 amount0Out, uint256 amount1Out, address indexed to)",
    "event Mint(address indexed sender, uint256 amount0, uint256 amount1)",
    "event Burn(address indexed sender, uint256 amount0, uint256 amount1, address indexed to)",
    "event Sync(uint112 reserve0, uint112 reserve1)",
];

pub const LENDING_POOL_EVENTS: &[&str] = &[
    "event Deposit(address indexed reserve, address user, address indexed onBehalfOf, uint256 amount, uint16 indexed referral)",
    "event Withdraw(address indexed reserve, address indexed user, address indexed to, uint256 amount)",
    "event Borrow(address indexed reserve, address user, address indexed onBehalfOf, uint256 amount, uint256 borrowRateMode, uint256 borrowRate, uint16 indexed referral)",
    "event Repay(address indexed reserve, address indexed user, address indexed repayer, uint256 amount)",
];

impl ContractType {
    pub fn display_name(&self) -> &'static str {
        match self {
            ContractType::Erc20 => "ERC-20 Token",
            ContractType::Erc721 => "ERC-721 Collection",
            ContractType::Erc1155 => "ERC-1155 Collection",
            ContractType::AmmPool => "AMM Pool",
            ContractType::LendingPool => "Lending Pool",
            ContractType::Custom => "Custom Contract",
        }
    }

    pub fn default_signatures(&self) -> Option<&'static [&'static str]> {
        match self {
            ContractType::Erc20 => Some(ERC20_EVENTS),
            ContractType::Erc721 => Some(ERC721_EVENTS),
            ContractType::Erc1155 => Some(ERC1155_EVENTS),
            ContractType::AmmPool => Some(AMM_POOL_EVENTS),
            ContractType::LendingPool => Some(LENDING_POOL_EVENTS),
            ContractType::Custom => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContractConfig {
    pub address: String,
    pub chain: Chain,
    pub contract_type: Option<ContractType>,
    pub event_signatures: Option<Vec<String>>,
}

impl ContractConfig {
    /// Custom signatures win; otherwise the resolved contract type selects
    /// its default set. A config with neither is malformed and fails hard.
    pub fn resolve_signatures(&self) -> Result<Vec<String>, ChainError> {
        if let Some(custom) = &self.event_signatures {
            if custom.is_empty() {
                return Err(ChainError::InvalidConfig(
                    "custom event signature set is empty".to_string(),
                ));
            }
            return Ok(custom.clone());
        }
        self.contract_type
            .and_then(|t| t.default_signatures())
            .map(|set| set.iter().map(|s| s.to_string()).collect())
            .ok_or_else(|| {
                ChainError::InvalidConfig(
                    "contract config needs a contract type or explicit event signatures"
                        .to_string(),
                )
            })
    }

    pub fn contract_name(&self) -> String {
        self.contract_type
            .unwrap_or(ContractType::Custom)
            .display_name()
            .to_string()
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.address.trim().is_empty() {
            return Err(ChainError::InvalidConfig(
                "contract address is required".to_string(),
            ));
        }
        self.resolve_signatures().map(|_| ())
    }
}

/// Decoded classification of one event, with counterparties and amounts
/// extracted per known pattern. Unmatched events keep their raw arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedKind {
    Transfer { from: String, to: String, value: String },
    Approval { owner: String, spender: String, value: String },
    Swap { sender: String, recipient: String, amount_in: String, amount_out: String },
    Mint { to: String, value: String },
    Burn { from: String, value: String },
    Deposit { account: String, value: String },
    Withdrawal { account: String, value: String },
    Other { params: HashMap<String, String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractEvent {
    pub contract_address: String,
    pub contract_name: String,
    pub event: String,
    pub args: HashMap<String, String>,
    pub tx_hash: String,
    pub block_number: u64,
    pub chain: Chain,
    pub decoded: DecodedKind,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventCount {
    pub event: String,
    pub count: usize,
}

fn named_address(event: &RawEvent, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(ParamValue::Address(a)) = event.param(name) {
            return Some(a.clone());
        }
    }
    None
}

fn nth_address(event: &RawEvent, n: usize) -> Option<String> {
    event
        .params
        .iter()
        .filter_map(|(_, v)| match v {
            ParamValue::Address(a) => Some(a.clone()),
            _ => None,
        })
        .nth(n)
}

fn named_uint(event: &RawEvent, names: &[&str]) -> Option<U256> {
    for name in names {
        if let Some(ParamValue::Uint(v)) = event.param(name) {
            return Some(*v);
        }
    }
    None
}

fn first_uint(event: &RawEvent) -> Option<U256> {
    event.params.iter().find_map(|(_, v)| match v {
        ParamValue::Uint(u) => Some(*u),
        _ => None,
    })
}

fn uint_suffix_sum(event: &RawEvent, suffix: &str) -> U256 {
    event
        .params
        .iter()
        .filter(|(name, _)| name.ends_with(suffix))
        .fold(U256::zero(), |acc, (_, v)| match v {
            ParamValue::Uint(u) => acc.saturating_add(*u),
            _ => acc,
        })
}

fn raw_args(event: &RawEvent) -> HashMap<String, String> {
    event
        .params
        .iter()
        .map(|(name, value)| (name.clone(), value.to_string()))
        .collect()
}

/// Best-effort pattern match over the event name, with argument extraction
/// tailored to each pattern's usual shape.
pub fn classify_event(event: &RawEvent) -> DecodedKind {
    let name = event.name.to_ascii_lowercase();
    let unknown = || "unknown".to_string();
    let zero = || U256::zero().to_string();

    if name.starts_with("transfer") && name != "transferbatch" {
        return DecodedKind::Transfer {
            from: named_address(event, &["from", "src", "sender", "_from"])
                .or_else(|| nth_address(event, 0))
                .unwrap_or_else(unknown),
            to: named_address(event, &["to", "dst", "recipient", "_to"])
                .or_else(|| nth_address(event, 1))
                .unwrap_or_else(unknown),
            value: named_uint(event, &["value", "amount", "wad", "tokenId"])
                .or_else(|| first_uint(event))
                .map(|v| v.to_string())
                .unwrap_or_else(zero),
        };
    }
    if name.starts_with("approval") {
        return DecodedKind::Approval {
            owner: named_address(event, &["owner", "account", "src"])
                .or_else(|| nth_address(event, 0))
                .unwrap_or_else(unknown),
            spender: named_address(event, &["spender", "approved", "operator"])
                .or_else(|| nth_address(event, 1))
                .unwrap_or_else(unknown),
            value: named_uint(event, &["value", "amount", "tokenId"])
                .map(|v| v.to_string())
                .unwrap_or_else(zero),
        };
    }
    if name.starts_with("swap") {
        let amount_in = named_uint(event, &["amountIn", "amount_in"])
            .unwrap_or_else(|| uint_suffix_sum(event, "In"));
        let amount_out = named_uint(event, &["amountOut", "amount_out"])
            .unwrap_or_else(|| uint_suffix_sum(event, "Out"));
        return DecodedKind::Swap {
            sender: named_address(event, &["sender", "from"])
                .or_else(|| nth_address(event, 0))
                .unwrap_or_else(unknown),
            recipient: named_address(event, &["to", "recipient"])
                .or_else(|| nth_address(event, 1))
                .unwrap_or_else(unknown),
            amount_in: amount_in.to_string(),
            amount_out: amount_out.to_string(),
        };
    }
    if name.starts_with("mint") {
        return DecodedKind::Mint {
            to: named_address(event, &["to", "sender", "owner"])
                .or_else(|| nth_address(event, 0))
                .unwrap_or_else(unknown),
            value: first_uint(event).map(|v| v.to_string()).unwrap_or_else(zero),
        };
    }
    if name.starts_with("burn") {
        return DecodedKind::Burn {
            from: named_address(event, &["from", "sender", "owner"])
                .or_else(|| nth_address(event, 0))
                .unwrap_or_else(unknown),
            value: first_uint(event).map(|v| v.to_string()).unwrap_or_else(zero),
        };
    }
    if name.starts_with("deposit") {
        return DecodedKind::Deposit {
            account: named_address(event, &["user", "onBehalfOf", "dst", "caller", "owner"])
                .or_else(|| nth_address(event, 0))
                .unwrap_or_else(unknown),
            value: named_uint(event, &["amount", "value", "wad", "assets"])
                .or_else(|| first_uint(event))
                .map(|v| v.to_string())
                .unwrap_or_else(zero),
        };
    }
    if name.starts_with("withdraw") {
        return DecodedKind::Withdrawal {
            account: named_address(event, &["user", "to", "src", "caller", "owner"])
                .or_else(|| nth_address(event, 0))
                .unwrap_or_else(unknown),
            value: named_uint(event, &["amount", "value", "wad", "assets"])
                .or_else(|| first_uint(event))
                .map(|v| v.to_string())
                .unwrap_or_else(zero),
        };
    }

    DecodedKind::Other {
        params: raw_args(event),
    }
}

fn buffer_key(chain: Chain, address: &str) -> (Chain, String) {
    let normalized = if chain.is_evm() {
        address.to_ascii_lowercase()
    } else {
        address.to_string()
    };
    (chain, normalized)
}

/// Subscribes to contract event streams, decodes them and retains a bounded
/// FIFO history per (chain, contract). The buffers are owned here and never
/// aliased out; readers get copies.
pub struct ContractWatcher {
    clients: Arc<ChainClients>,
    buffers: Arc<DashMap<(Chain, String), VecDeque<ContractEvent>>>,
}

#[derive(Debug)]
pub struct ContractWatch {
    pub events: mpsc::Receiver<ContractEvent>,
    pub handle: WatchHandle,
}

impl ContractWatch {
    pub fn into_stream(self) -> (ReceiverStream<ContractEvent>, WatchHandle) {
        (ReceiverStream::new(self.events), self.handle)
    }
}

impl ContractWatcher {
    pub fn new(clients: Arc<ChainClients>) -> Self {
        Self {
            clients,
            buffers: Arc::new(DashMap::new()),
        }
    }

    pub async fn watch(&self, config: ContractConfig) -> Result<ContractWatch, ChainError> {
        config.validate()?;
        let client = self.clients.get(config.chain)?;
        let signatures = config.resolve_signatures()?;
        let watch = client.watch_events(&config.address, &signatures).await?;

        let chain = config.chain;
        let address = config.address.clone();
        let contract_name = config.contract_name();
        let key = buffer_key(chain, &address);
        let buffers = self.buffers.clone();
        let (out_tx, out_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut raw_rx = watch.receiver;
        let mut handle = watch.handle;
        handle.push(tokio::spawn(async move {
            while let Some(raw) = raw_rx.recv().await {
                let event = decode_contract_event(chain, &address, &contract_name, raw);
                push_event(&buffers, key.clone(), event.clone());
                metrics::increment_counter!("chainpulse_contract_events_total", "chain" => chain.as_str());
                if out_tx.send(event).await.is_err() {
                    return;
                }
            }
        }));

        Ok(ContractWatch {
            events: out_rx,
            handle,
        })
    }

    /// Appends directly into the ring buffer, as the watch task does.
    pub fn record(&self, event: ContractEvent) {
        let key = buffer_key(event.chain, &event.contract_address);
        push_event(&self.buffers, key, event);
    }

    /// Most recent events first, copied out of the buffer.
    pub fn history(&self, chain: Chain, address: &str, limit: usize) -> Vec<ContractEvent> {
        let key = buffer_key(chain, address);
        self.buffers
            .get(&key)
            .map(|buffer| buffer.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Event-name counts inside the lookback window, top five by frequency.
    pub fn event_summary(
        &self,
        chain: Chain,
        address: &str,
        lookback: Duration,
    ) -> Vec<EventCount> {
        let key = buffer_key(chain, address);
        let cutoff = Utc::now()
            - chrono::Duration::from_std(lookback).unwrap_or_else(|_| chrono::Duration::zero());

        let Some(buffer) = self.buffers.get(&key) else {
            return Vec::new();
        };
        buffer
            .iter()
            .filter(|e| e.observed_at >= cutoff)
            .counts_by(|e| e.event.clone())
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)))
            .take(SUMMARY_TOP_N)
            .map(|(event, count)| EventCount { event, count })
            .collect()
    }

    pub fn buffered_len(&self, chain: Chain, address: &str) -> usize {
        self.buffers
            .get(&buffer_key(chain, address))
            .map(|b| b.len())
            .unwrap_or(0)
    }
}

fn decode_contract_event(
    chain: Chain,
    address: &str,
    contract_name: &str,
    raw: RawEvent,
) -> ContractEvent {
    let decoded = classify_event(&raw);
    ContractEvent {
        contract_address: address.to_string(),
        contract_name: contract_name.to_string(),
        event: raw.name.clone(),
        args: raw_args(&raw),
        tx_hash: raw.tx_hash,
        block_number: raw.block_number,
        chain,
        decoded,
        observed_at: Utc::now(),
    }
}

/// Appends are serialized per buffer key by the map shard lock; eviction is
/// strictly oldest-first once the capacity is exceeded.
fn push_event(
    buffers: &DashMap<(Chain, String), VecDeque<ContractEvent>>,
    key: (Chain, String),
    event: ContractEvent,
) {
    let mut buffer = buffers.entry(key).or_default();
    buffer.push_back(event);
    while buffer.len() > EVENT_RING_CAPACITY {
        buffer.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, params: Vec<(&str, ParamValue)>) -> RawEvent {
        RawEvent {
            name: name.to_string(),
            params: params
                .into_iter()
                .map(|(n, v)| (n.to_string(), v))
                .collect(),
            tx_hash: "0xfeed".to_string(),
            block_number: 1,
        }
    }

    fn addr(s: &str) -> ParamValue {
        ParamValue::Address(s.to_string())
    }

    fn uint(v: u64) -> ParamValue {
        ParamValue::Uint(U256::from(v))
    }

    #[test]
    fn test_classify_transfer() {
        let raw = event(
            "Transfer",
            vec![("from", addr("0xa")), ("to", addr("0xb")), ("value", uint(42))],
        );
        assert_eq!(
            classify_event(&raw),
            DecodedKind::Transfer {
                from: "0xa".to_string(),
                to: "0xb".to_string(),
                value: "42".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_v2_swap_sums_directional_amounts() {
        let raw = event(
            "Swap",
            vec![
                ("sender", addr("0xa")),
                ("amount0In", uint(100)),
                ("amount1In", uint(0)),
                ("amount0Out", uint(0)),
                ("amount1Out", uint(95)),
                ("to", addr("0xb")),
            ],
        );
        assert_eq!(
            classify_event(&raw),
            DecodedKind::Swap {
                sender: "0xa".to_string(),
                recipient: "0xb".to_string(),
                amount_in: "100".to_string(),
                amount_out: "95".to_string(),
            }
        );
    }

    #[test]
    fn test_classify_lending_withdraw() {
        let raw = event(
            "Withdraw",
            vec![
                ("reserve", addr("0xr")),
                ("user", addr("0xa")),
                ("to", addr("0xb")),
                ("amount", uint(500)),
            ],
        );
        assert_eq!(
            classify_event(&raw),
            DecodedKind::Withdrawal {
                account: "0xa".to_string(),
                value: "500".to_string(),
            }
        );
    }

    #[test]
    fn test_unmatched_event_keeps_raw_params() {
        let raw = event("Sync", vec![("reserve0", uint(7)), ("reserve1", uint(9))]);
        match classify_event(&raw) {
            DecodedKind::Other { params } => {
                assert_eq!(params["reserve0"], "7");
                assert_eq!(params["reserve1"], "9");
            }
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_signatures_prefers_custom_set() {
        let config = ContractConfig {
            address: "0xpool".to_string(),
            chain: Chain::Ethereum,
            contract_type: Some(ContractType::Erc20),
            event_signatures: Some(vec!["event Ping(uint256 nonce)".to_string()]),
        };
        assert_eq!(config.resolve_signatures().unwrap().len(), 1);
    }

    #[test]
    fn test_custom_type_without_signatures_is_config_error() {
        let config = ContractConfig {
            address: "0xpool".to_string(),
            chain: Chain::Ethereum,
            contract_type: Some(ContractType::Custom),
            event_signatures: None,
        };
        assert!(matches!(
            config.resolve_signatures(),
            Err(ChainError::InvalidConfig(_))
        ));

        let untyped = ContractConfig {
            address: "0xpool".to_string(),
            chain: Chain::Ethereum,
            contract_type: None,
            event_signatures: None,
        };
        assert!(untyped.validate().is_err());
    }

    fn watcher() -> ContractWatcher {
        ContractWatcher::new(Arc::new(ChainClients::from_clients(Vec::new())))
    }

    fn stored_event(n: u64) -> ContractEvent {
        decode_contract_event(
            Chain::Ethereum,
            "0xC0FFEE0000000000000000000000000000000001",
            "ERC-20 Token",
            event("Transfer", vec![("value", uint(n))]),
        )
    }

    #[test]
    fn test_ring_buffer_evicts_oldest_at_capacity() {
        let watcher = watcher();
        for n in 0..=(EVENT_RING_CAPACITY as u64) {
            let mut ev = stored_event(n);
            ev.tx_hash = format!("0x{n:x}");
            watcher.record(ev);
        }

        // 1,001 inserts: capacity holds, the first event is gone and the
        // last one is present.
        let len = watcher.buffered_len(Chain::Ethereum, "0xc0ffee0000000000000000000000000000000001");
        assert_eq!(len, EVENT_RING_CAPACITY);

        let history = watcher.history(
            Chain::Ethereum,
            "0xC0FFEE0000000000000000000000000000000001",
            EVENT_RING_CAPACITY + 10,
        );
        assert_eq!(history.len(), EVENT_RING_CAPACITY);
        assert!(history.iter().all(|e| e.tx_hash != "0x0"));
        assert_eq!(history[0].tx_hash, format!("0x{:x}", EVENT_RING_CAPACITY));
    }

    #[test]
    fn test_buffers_are_keyed_per_chain_and_contract() {
        let watcher = watcher();
        watcher.record(stored_event(1));

        let mut polygon_event = stored_event(2);
        polygon_event.chain = Chain::Polygon;
        watcher.record(polygon_event);

        assert_eq!(
            watcher.buffered_len(Chain::Ethereum, "0xC0FFEE0000000000000000000000000000000001"),
            1
        );
        assert_eq!(
            watcher.buffered_len(Chain::Polygon, "0xC0FFEE0000000000000000000000000000000001"),
            1
        );
    }

    #[test]
    fn test_event_summary_returns_top_five() {
        let watcher = watcher();
        let spec: &[(&str, usize)] = &[
            ("Transfer", 6),
            ("Approval", 5),
            ("Swap", 4),
            ("Mint", 3),
            ("Burn", 2),
            ("Sync", 1),
        ];
        for (name, count) in spec {
            for _ in 0..*count {
                let mut ev = stored_event(1);
                ev.event = name.to_string();
                watcher.record(ev);
            }
        }

        let summary = watcher.event_summary(
            Chain::Ethereum,
            "0xC0FFEE0000000000000000000000000000000001",
            Duration::from_secs(3600),
        );
        assert_eq!(summary.len(), 5);
        assert_eq!(summary[0].event, "Transfer");
        assert_eq!(summary[0].count, 6);
        assert!(summary.iter().all(|c| c.event != "Sync"));
    }

    #[test]
    fn test_event_summary_respects_lookback_window() {
        let watcher = watcher();
        let mut old = stored_event(1);
        old.observed_at = Utc::now() - chrono::Duration::hours(2);
        watcher.record(old);
        watcher.record(stored_event(2));

        let summary = watcher.event_summary(
            Chain::Ethereum,
            "0xC0FFEE0000000000000000000000000000000001",
            Duration::from_secs(3600),
        );
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].count, 1);
    }
}

use async_trait::async_trait;
use ethers::prelude::abigen;
use ethers::types::{Address, BlockNumber, Filter, Log, ValueOrArray, H256, U64};
use ethers::utils::format_units;
use ethers_core::abi::{Event as AbiEvent, HumanReadableParser, RawLog, Token};
use ethers_providers::{Http, Middleware, Provider};
use log::warn;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::chains::{
    Chain, ChainClient, ChainError, EventWatch, FeeEstimate, ParamValue, RawEvent, TokenBalance,
    TransactionRecord, TxKind, WatchHandle,
};
use crate::constants::RECENT_TX_BLOCK_WINDOW;
use crate::utils::format_raw_amount;

abigen!(
    Erc20Token,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
        function decimals() external view returns (uint8)
        function symbol() external view returns (string)
    ]"#
);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// JSON-RPC client for one named EVM chain. One instance per chain; the
/// engine resolves the endpoint from a provider URL template.
pub struct EvmClient {
    chain: Chain,
    provider: Arc<Provider<Http>>,
    poll_interval: Duration,
}

impl EvmClient {
    pub fn new(chain: Chain, rpc_url: &str, poll_interval: Duration) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ChainError::InvalidConfig(format!("bad rpc url for {chain}: {e}")))?;
        Ok(Self {
            chain,
            provider: Arc::new(provider),
            poll_interval,
        })
    }

    fn parse_address(&self, address: &str) -> Result<Address, ChainError> {
        Address::from_str(address.trim()).map_err(|_| ChainError::InvalidAddress {
            chain: self.chain,
            address: address.to_string(),
        })
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn native_balance(&self, address: &str) -> Result<f64, ChainError> {
        let addr = self.parse_address(address)?;
        let wei = self
            .provider
            .get_balance(addr, None)
            .await
            .map_err(|e| ChainError::unavailable(self.chain, e))?;
        format_units(wei, "ether")
            .map_err(|e| ChainError::unavailable(self.chain, e))?
            .parse::<f64>()
            .map_err(|e| ChainError::unavailable(self.chain, e))
    }

    async fn token_balance(
        &self,
        wallet: &str,
        token_address: &str,
    ) -> Result<TokenBalance, ChainError> {
        let owner = self.parse_address(wallet)?;
        let token = self.parse_address(token_address)?;
        let contract = Erc20Token::new(token, self.provider.clone());

        let balance_call = contract.balance_of(owner);
        let decimals_call = contract.decimals();
        let symbol_call = contract.symbol();
        let (raw, decimals, symbol) = tokio::try_join!(
            balance_call.call(),
            decimals_call.call(),
            symbol_call.call(),
        )
        .map_err(|e| ChainError::unavailable(self.chain, e))?;

        Ok(TokenBalance {
            symbol,
            decimals,
            raw_amount: raw.to_string(),
            formatted_amount: format_raw_amount(raw, decimals),
        })
    }

    async fn recent_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, ChainError> {
        let addr = self.parse_address(address)?;
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::unavailable(self.chain, e))?
            .as_u64();
        let start = head.saturating_sub(RECENT_TX_BLOCK_WINDOW);

        // Plain JSON-RPC has no per-address history index, so this walks the
        // most recent blocks. Coverage is best-effort and bounded.
        let mut records = Vec::new();
        for number in (start..=head).rev() {
            let block = match self
                .provider
                .get_block_with_txs(U64::from(number))
                .await
                .map_err(|e| ChainError::unavailable(self.chain, e))?
            {
                Some(block) => block,
                None => continue,
            };
            let timestamp = block.timestamp.as_u64() as i64;
            for tx in block.transactions {
                if tx.from != addr && tx.to != Some(addr) {
                    continue;
                }
                records.push(TransactionRecord {
                    hash: format!("{:?}", tx.hash),
                    from: format!("{:?}", tx.from),
                    to: tx.to.map(|t| format!("{:?}", t)),
                    amount: format_raw_amount(tx.value, 18),
                    symbol: self.chain.native_symbol().to_string(),
                    chain: self.chain,
                    timestamp: Some(timestamp),
                    kind: TxKind::Unknown,
                });
                if records.len() >= limit {
                    return Ok(records);
                }
            }
        }
        Ok(records)
    }

    async fn transaction_count(&self, address: &str) -> Result<u64, ChainError> {
        let addr = self.parse_address(address)?;
        let nonce = self
            .provider
            .get_transaction_count(addr, None)
            .await
            .map_err(|e| ChainError::unavailable(self.chain, e))?;
        Ok(nonce.as_u64())
    }

    async fn watch_events(
        &self,
        address: &str,
        event_signatures: &[String],
    ) -> Result<EventWatch, ChainError> {
        let addr = self.parse_address(address)?;
        let events = event_signatures
            .iter()
            .map(|s| parse_event_signature(s))
            .collect::<Result<Vec<_>, _>>()?;
        if events.is_empty() {
            return Err(ChainError::InvalidConfig(
                "watch_events requires at least one event signature".to_string(),
            ));
        }

        let start = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::unavailable(self.chain, e))?
            .as_u64();

        let topics: Vec<H256> = events.iter().map(|e| e.signature()).collect();
        let by_topic: HashMap<H256, AbiEvent> =
            events.into_iter().map(|e| (e.signature(), e)).collect();

        let provider = self.provider.clone();
        let chain = self.chain;
        let interval = self.poll_interval;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut last_block = start;
            loop {
                tokio::time::sleep(interval).await;

                let head = match provider.get_block_number().await {
                    Ok(n) => n.as_u64(),
                    Err(e) => {
                        warn!("{chain} head poll failed: {e}");
                        metrics::increment_counter!("chainpulse_rpc_failures_total", "chain" => chain.as_str());
                        continue;
                    }
                };
                if head <= last_block {
                    continue;
                }

                let filter = Filter::new()
                    .address(addr)
                    .topic0(ValueOrArray::Array(topics.clone()))
                    .from_block(BlockNumber::Number(U64::from(last_block + 1)))
                    .to_block(BlockNumber::Number(U64::from(head)));

                match provider.get_logs(&filter).await {
                    Ok(logs) => {
                        for log in logs {
                            let Some(event) = decode_log(&by_topic, &log) else {
                                continue;
                            };
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        last_block = head;
                    }
                    Err(e) => {
                        warn!("{chain} log poll failed: {e}");
                        metrics::increment_counter!("chainpulse_rpc_failures_total", "chain" => chain.as_str());
                    }
                }
            }
        });

        Ok(EventWatch {
            receiver: rx,
            handle: WatchHandle::new(vec![task]),
        })
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, ChainError> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| ChainError::unavailable(self.chain, e))?
            .ok_or_else(|| ChainError::unavailable(self.chain, "no latest block"))?;
        let base_fee = block.base_fee_per_gas.unwrap_or_default();

        let (_, priority_fee) = self
            .provider
            .estimate_eip1559_fees(None)
            .await
            .map_err(|e| ChainError::unavailable(self.chain, e))?;

        Ok(FeeEstimate {
            base_fee_gwei: crate::utils::wei_to_gwei(base_fee),
            priority_fee_gwei: crate::utils::wei_to_gwei(priority_fee),
        })
    }
}

/// Accepts either a bare signature (`Transfer(address,address,uint256)`) or
/// a full human-readable declaration with names and `indexed` markers.
pub fn parse_event_signature(signature: &str) -> Result<AbiEvent, ChainError> {
    let trimmed = signature.trim();
    let canonical = if trimmed.starts_with("event ") {
        trimmed.to_string()
    } else {
        format!("event {trimmed}")
    };
    HumanReadableParser::parse_event(&canonical)
        .map_err(|e| ChainError::InvalidConfig(format!("bad event signature `{signature}`: {e}")))
}

fn decode_log(events: &HashMap<H256, AbiEvent>, log: &Log) -> Option<RawEvent> {
    let topic0 = log.topics.first()?;
    let event = events.get(topic0)?;
    let parsed = event
        .parse_log(RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        })
        .ok()?;

    let params = parsed
        .params
        .into_iter()
        .map(|p| (p.name, token_to_param(p.value)))
        .collect();

    Some(RawEvent {
        name: event.name.clone(),
        params,
        tx_hash: log
            .transaction_hash
            .map(|h| format!("{h:?}"))
            .unwrap_or_default(),
        block_number: log.block_number.map(|n| n.as_u64()).unwrap_or_default(),
    })
}

fn token_to_param(token: Token) -> ParamValue {
    match token {
        Token::Address(a) => ParamValue::Address(format!("{a:?}")),
        Token::Uint(u) => ParamValue::Uint(u),
        Token::Int(i) => ParamValue::Uint(i),
        Token::Bool(b) => ParamValue::Bool(b),
        Token::String(s) => ParamValue::Str(s),
        Token::Bytes(b) => ParamValue::Bytes(hex::encode(b)),
        Token::FixedBytes(b) => ParamValue::Bytes(hex::encode(b)),
        other => ParamValue::Str(format!("{other:?}")),
    }
}

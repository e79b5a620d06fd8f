use async_trait::async_trait;
use log::warn;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::UiTransactionEncoding;
use spl_associated_token_account::get_associated_token_address;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::chains::{
    Chain, ChainClient, ChainError, EventWatch, FeeEstimate, ParamValue, RawEvent, TokenBalance,
    TransactionRecord, TxKind, WatchHandle,
};
use crate::utils::lamports_to_sol;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const WATCH_SIGNATURE_BATCH: usize = 25;

pub struct SolanaClient {
    rpc: Arc<RpcClient>,
    poll_interval: Duration,
}

impl SolanaClient {
    pub fn new(rpc_url: &str, poll_interval: Duration) -> Self {
        Self {
            rpc: Arc::new(RpcClient::new(rpc_url.to_string())),
            poll_interval,
        }
    }

    fn parse_pubkey(&self, address: &str) -> Result<Pubkey, ChainError> {
        Pubkey::from_str(address.trim()).map_err(|_| ChainError::InvalidAddress {
            chain: Chain::Solana,
            address: address.to_string(),
        })
    }

    /// Net lamports moved by the fee payer, fees excluded. Best effort: any
    /// lookup problem degrades to `None`, not an error.
    async fn transfer_amount(&self, signature: &Signature) -> Option<f64> {
        let tx = self
            .rpc
            .get_transaction(signature, UiTransactionEncoding::Json)
            .await
            .ok()?;
        let meta = tx.transaction.meta?;
        let pre = meta.pre_balances.first().copied()?;
        let post = meta.post_balances.first().copied()?;
        let moved = pre.abs_diff(post).saturating_sub(meta.fee);
        Some(lamports_to_sol(moved))
    }
}

#[async_trait]
impl ChainClient for SolanaClient {
    fn chain(&self) -> Chain {
        Chain::Solana
    }

    async fn native_balance(&self, address: &str) -> Result<f64, ChainError> {
        let pubkey = self.parse_pubkey(address)?;
        let lamports = self
            .rpc
            .get_balance(&pubkey)
            .await
            .map_err(|e| ChainError::unavailable(Chain::Solana, e))?;
        Ok(lamports_to_sol(lamports))
    }

    async fn token_balance(
        &self,
        wallet: &str,
        token_address: &str,
    ) -> Result<TokenBalance, ChainError> {
        let owner = self.parse_pubkey(wallet)?;
        let mint = self.parse_pubkey(token_address)?;
        let ata = get_associated_token_address(&owner, &mint);

        match self.rpc.get_token_account_balance(&ata).await {
            Ok(amount) => Ok(TokenBalance {
                symbol: short_mint(token_address),
                decimals: amount.decimals,
                formatted_amount: amount
                    .ui_amount
                    .or_else(|| amount.ui_amount_string.parse().ok())
                    .unwrap_or(0.0),
                raw_amount: amount.amount,
            }),
            // A wallet that never held the token has no associated token
            // account; that is a genuine zero, not an RPC failure.
            Err(e) if is_missing_account(&e.to_string()) => Ok(TokenBalance {
                symbol: short_mint(token_address),
                decimals: 0,
                raw_amount: "0".to_string(),
                formatted_amount: 0.0,
            }),
            Err(e) => Err(ChainError::unavailable(Chain::Solana, e)),
        }
    }

    async fn recent_transactions(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, ChainError> {
        let pubkey = self.parse_pubkey(address)?;
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit.min(WATCH_SIGNATURE_BATCH)),
            commitment: Some(CommitmentConfig::confirmed()),
        };
        let signatures = self
            .rpc
            .get_signatures_for_address_with_config(&pubkey, config)
            .await
            .map_err(|e| ChainError::unavailable(Chain::Solana, e))?;

        let mut records = Vec::with_capacity(signatures.len());
        for info in signatures.into_iter().take(limit) {
            let amount = match Signature::from_str(&info.signature) {
                Ok(sig) => self.transfer_amount(&sig).await.unwrap_or(0.0),
                Err(_) => 0.0,
            };
            records.push(TransactionRecord {
                hash: info.signature,
                from: address.to_string(),
                to: None,
                amount,
                symbol: Chain::Solana.native_symbol().to_string(),
                chain: Chain::Solana,
                timestamp: info.block_time,
                kind: TxKind::Unknown,
            });
        }
        Ok(records)
    }

    async fn transaction_count(&self, address: &str) -> Result<u64, ChainError> {
        let pubkey = self.parse_pubkey(address)?;
        // The RPC caps this at its page size; enough as an activity signal.
        let signatures = self
            .rpc
            .get_signatures_for_address(&pubkey)
            .await
            .map_err(|e| ChainError::unavailable(Chain::Solana, e))?;
        Ok(signatures.len() as u64)
    }

    async fn watch_events(
        &self,
        address: &str,
        _event_signatures: &[String],
    ) -> Result<EventWatch, ChainError> {
        let pubkey = self.parse_pubkey(address)?;
        let rpc = self.rpc.clone();
        let interval = self.poll_interval;
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // Solana programs have no ABI event log; new confirmed signatures
        // against the account are delivered as generic transaction events.
        let task = tokio::spawn(async move {
            let mut watermark: Option<Signature> = None;
            loop {
                tokio::time::sleep(interval).await;

                let config = GetConfirmedSignaturesForAddress2Config {
                    before: None,
                    until: watermark,
                    limit: Some(WATCH_SIGNATURE_BATCH),
                    commitment: Some(CommitmentConfig::confirmed()),
                };
                match rpc
                    .get_signatures_for_address_with_config(&pubkey, config)
                    .await
                {
                    Ok(signatures) => {
                        let had_watermark = watermark.is_some();
                        if let Some(newest) = signatures.first() {
                            watermark = Signature::from_str(&newest.signature)
                                .ok()
                                .or(watermark);
                        }
                        if !had_watermark {
                            continue;
                        }
                        for info in signatures.into_iter().rev() {
                            let event = RawEvent {
                                name: "Transaction".to_string(),
                                params: vec![(
                                    "signature".to_string(),
                                    ParamValue::Str(info.signature.clone()),
                                )],
                                tx_hash: info.signature,
                                block_number: info.slot,
                            };
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("solana signature poll failed: {e}");
                        metrics::increment_counter!("chainpulse_rpc_failures_total", "chain" => "solana");
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
        Err(ChainError::Unsupported {
            chain: Chain::Solana,
            operation: "fee_estimate",
        })
    }
}

fn is_missing_account(message: &str) -> bool {
    message.contains("could not find account") || message.contains("AccountNotFound")
}

fn short_mint(mint: &str) -> String {
    if mint.len() <= 8 {
        mint.to_string()
    } else {
        format!("{}..{}", &mint[..4], &mint[mint.len() - 4..])
    }
}

use futures::future::join_all;
use log::warn;
use serde::Serialize;
use std::sync::Arc;

use crate::chains::{ChainClients, ChainError, WalletAddress};
use crate::prices::PriceCache;
use crate::registry::TokenRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct TokenValue {
    pub symbol: String,
    pub decimals: u8,
    pub raw_amount: String,
    pub formatted_amount: f64,
    pub value_usd: f64,
}

/// Point-in-time valuation of one wallet. Recomputed per request, never
/// persisted or cached.
#[derive(Debug, Clone, Serialize)]
pub struct WalletPortfolio {
    pub wallet: WalletAddress,
    pub native_symbol: String,
    pub native_balance: f64,
    pub native_value_usd: f64,
    pub tokens: Vec<TokenValue>,
    pub total_value_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioFailure {
    pub wallet: WalletAddress,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioSummary {
    pub portfolios: Vec<WalletPortfolio>,
    pub failures: Vec<PortfolioFailure>,
    pub total_value_usd: f64,
}

/// Combines native + token balances + prices into USD portfolios. Token
/// lookups that fail are skipped, not zeroed, so a degraded RPC never reads
/// as an empty wallet.
pub struct PortfolioAggregator {
    clients: Arc<ChainClients>,
    prices: Arc<PriceCache>,
    tokens: Arc<TokenRegistry>,
}

impl PortfolioAggregator {
    pub fn new(
        clients: Arc<ChainClients>,
        prices: Arc<PriceCache>,
        tokens: Arc<TokenRegistry>,
    ) -> Self {
        Self {
            clients,
            prices,
            tokens,
        }
    }

    pub async fn portfolio(&self, wallet: &WalletAddress) -> Result<WalletPortfolio, ChainError> {
        let client = self.clients.get(wallet.chain)?;
        let native_balance = client.native_balance(&wallet.address).await?;
        let native_price = self.prices.native_price(wallet.chain).await;

        let catalog = self.tokens.for_chain(wallet.chain);
        let symbols: Vec<&str> = catalog.iter().map(|t| t.symbol).collect();
        let unit_prices = self.prices.prices(&symbols).await;

        let lookups = join_all(catalog.iter().map(|token| {
            let client = client.clone();
            let address = wallet.address.clone();
            async move { (token, client.token_balance(&address, token.address).await) }
        }))
        .await;

        let mut tokens_out = Vec::new();
        for (token, result) in lookups {
            match result {
                Ok(balance) if balance.formatted_amount > 0.0 => {
                    let unit = unit_prices
                        .get(&token.symbol.to_ascii_uppercase())
                        .copied()
                        .unwrap_or(0.0);
                    tokens_out.push(TokenValue {
                        symbol: token.symbol.to_string(),
                        decimals: balance.decimals,
                        raw_amount: balance.raw_amount,
                        formatted_amount: balance.formatted_amount,
                        value_usd: balance.formatted_amount * unit,
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "skipping token {} for {}: {e}",
                        token.symbol, wallet.address
                    );
                }
            }
        }

        let native_value_usd = native_balance * native_price;
        let total_value_usd =
            native_value_usd + tokens_out.iter().map(|t| t.value_usd).sum::<f64>();

        Ok(WalletPortfolio {
            wallet: wallet.clone(),
            native_symbol: wallet.chain.native_symbol().to_string(),
            native_balance,
            native_value_usd,
            tokens: tokens_out,
            total_value_usd,
        })
    }

    /// Multi-wallet aggregation. Wallets are valued concurrently and
    /// independently; one chain failing degrades that wallet to a failure
    /// entry without touching its siblings.
    pub async fn summary(&self, wallets: &[WalletAddress]) -> PortfolioSummary {
        let results = join_all(
            wallets
                .iter()
                .map(|wallet| async move { (wallet.clone(), self.portfolio(wallet).await) }),
        )
        .await;

        let mut portfolios = Vec::new();
        let mut failures = Vec::new();
        for (wallet, result) in results {
            match result {
                Ok(portfolio) => portfolios.push(portfolio),
                Err(e) => failures.push(PortfolioFailure {
                    wallet,
                    error: e.to_string(),
                }),
            }
        }

        let total_value_usd = portfolios.iter().map(|p| p.total_value_usd).sum();
        PortfolioSummary {
            portfolios,
            failures,
            total_value_usd,
        }
    }
}

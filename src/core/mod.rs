use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::airdrops::EligibilityCheck;
use crate::airdrops::EligibilityEngine;
use crate::alerts::{Alert, AlertDispatcher, ChannelConfig, DeliveryResult};
use crate::chains::{
    Chain, ChainClient, ChainClients, ChainError, EvmClient, SolanaClient, WalletAddress,
};
use crate::config::EngineConfig;
use crate::events::{ContractConfig, ContractEvent, ContractWatch, ContractWatcher, EventCount};
use crate::gas::{GasMonitor, GasQuote, GasWatch};
use crate::portfolio::{PortfolioAggregator, PortfolioSummary, WalletPortfolio};
use crate::prices::{HttpPriceProvider, PriceCache, PriceProvider};
use crate::registry::{KnownWalletRegistry, TokenRegistry};
use crate::whale::{WhaleAlert, WhaleMonitor, WhaleWatch};

/// The engine facade: owns every component instance (caches included, so
/// independent engines never share state) and exposes the operations the
/// hosting agent runtime calls into.
pub struct MonitorEngine {
    config: EngineConfig,
    clients: Arc<ChainClients>,
    prices: Arc<PriceCache>,
    tokens: Arc<TokenRegistry>,
    known_wallets: Arc<KnownWalletRegistry>,
    portfolio: PortfolioAggregator,
    whales: WhaleMonitor,
    airdrops: EligibilityEngine,
    events: ContractWatcher,
    gas: GasMonitor,
    dispatcher: AlertDispatcher,
}

impl MonitorEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate_all()?;

        let mut clients: Vec<Arc<dyn ChainClient>> = Vec::new();
        for chain in Chain::evm_chains() {
            if let Some(url) = config.resolve_evm_url(*chain) {
                clients.push(Arc::new(EvmClient::new(
                    *chain,
                    &url,
                    config.event_poll_interval,
                )?));
            }
        }
        if let Some(url) = &config.solana_rpc_url {
            clients.push(Arc::new(SolanaClient::new(url, config.event_poll_interval)));
        }

        let provider = Arc::new(HttpPriceProvider::new(
            config.price_api_url.clone(),
            config.price_api_key.clone(),
        )?);
        Self::with_clients(config, ChainClients::from_clients(clients), provider)
    }

    /// Construction seam for embedders and tests that bring their own chain
    /// clients or price provider.
    pub fn with_clients(
        config: EngineConfig,
        clients: ChainClients,
        price_provider: Arc<dyn PriceProvider>,
    ) -> Result<Self> {
        let clients = Arc::new(clients);
        let prices = Arc::new(PriceCache::new(price_provider));
        let tokens = Arc::new(TokenRegistry::new());
        let known_wallets = Arc::new(KnownWalletRegistry::new());

        Ok(Self {
            portfolio: PortfolioAggregator::new(clients.clone(), prices.clone(), tokens.clone()),
            whales: WhaleMonitor::new(
                clients.clone(),
                prices.clone(),
                tokens.clone(),
                known_wallets.clone(),
            ),
            airdrops: EligibilityEngine::new(clients.clone()),
            events: ContractWatcher::new(clients.clone()),
            gas: GasMonitor::new(clients.clone(), prices.clone()),
            dispatcher: AlertDispatcher::new()?,
            config,
            clients,
            prices,
            tokens,
            known_wallets,
        })
    }

    pub async fn portfolio_summary(&self, wallets: &[WalletAddress]) -> PortfolioSummary {
        self.portfolio.summary(wallets).await
    }

    pub async fn wallet_portfolio(
        &self,
        wallet: &WalletAddress,
    ) -> Result<WalletPortfolio, ChainError> {
        self.portfolio.portfolio(wallet).await
    }

    pub async fn monitor_whales(
        &self,
        token_symbols: &[String],
        min_value_usd: f64,
        chain: Chain,
    ) -> Result<WhaleWatch, ChainError> {
        self.whales.watch(token_symbols, min_value_usd, chain).await
    }

    pub async fn scan_whale_activity(
        &self,
        chain: Chain,
        min_value_usd: f64,
    ) -> Result<Vec<WhaleAlert>, ChainError> {
        self.whales.scan_recent(chain, min_value_usd).await
    }

    pub async fn check_airdrop_eligibility(
        &self,
        wallet: &str,
        protocols: Option<&[String]>,
        chain: Option<Chain>,
    ) -> EligibilityCheck {
        self.airdrops.check(wallet, protocols, chain).await
    }

    pub async fn watch_contract(&self, config: ContractConfig) -> Result<ContractWatch, ChainError> {
        self.events.watch(config).await
    }

    pub fn contract_history(
        &self,
        chain: Chain,
        address: &str,
        limit: usize,
    ) -> Vec<ContractEvent> {
        self.events.history(chain, address, limit)
    }

    pub fn contract_event_summary(
        &self,
        chain: Chain,
        address: &str,
        lookback: Duration,
    ) -> Vec<EventCount> {
        self.events.event_summary(chain, address, lookback)
    }

    pub fn monitor_gas(
        &self,
        low_gwei: f64,
        high_gwei: f64,
        chains: Vec<Chain>,
        interval: Option<Duration>,
    ) -> GasWatch {
        self.gas.monitor(
            low_gwei,
            high_gwei,
            chains,
            interval.unwrap_or(self.config.gas_poll_interval),
        )
    }

    pub async fn gas_quote(&self, chain: Chain) -> Result<GasQuote, ChainError> {
        self.gas.quote(chain).await
    }

    pub async fn send_alert(&self, alert: &Alert, channel: &ChannelConfig) -> DeliveryResult {
        self.dispatcher.send(alert, channel).await
    }

    /// One delivery attempt per configured channel.
    pub async fn broadcast_alert(&self, alert: &Alert) -> Vec<DeliveryResult> {
        self.dispatcher.send_all(alert, &self.config.channels).await
    }

    pub fn price_cache(&self) -> &Arc<PriceCache> {
        &self.prices
    }

    pub fn token_registry(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    pub fn known_wallets(&self) -> &Arc<KnownWalletRegistry> {
        &self.known_wallets
    }

    pub fn chains(&self) -> Vec<Chain> {
        self.clients.chains()
    }
}

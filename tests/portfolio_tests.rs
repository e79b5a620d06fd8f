mod common;

use chainpulse::chains::{Chain, ChainClient, ChainClients, TokenBalance, WalletAddress};
use chainpulse::portfolio::PortfolioAggregator;
use chainpulse::prices::PriceCache;
use chainpulse::registry::TokenRegistry;
use common::{StubChain, StubPrices};
use std::sync::Arc;
use test_log::test;

fn aggregator(chains: Vec<Arc<dyn ChainClient>>, prices: &[(&str, f64)]) -> PortfolioAggregator {
    PortfolioAggregator::new(
        Arc::new(ChainClients::from_clients(chains)),
        Arc::new(PriceCache::new(Arc::new(StubPrices::new(prices)))),
        Arc::new(TokenRegistry::new()),
    )
}

#[test(tokio::test)]
async fn zero_token_wallet_is_priced_from_native_balance_alone() {
    let chain = StubChain::new(Chain::Ethereum).with_native(2.0);
    let aggregator = aggregator(vec![Arc::new(chain)], &[("ethereum", 2500.0)]);

    let wallet = WalletAddress::new(Chain::Ethereum, "0x000000000000000000000000000000000000beef");
    let summary = aggregator.summary(&[wallet]).await;

    assert_eq!(summary.portfolios.len(), 1);
    assert!(summary.failures.is_empty());
    let portfolio = &summary.portfolios[0];
    assert!(portfolio.tokens.is_empty());
    assert_eq!(portfolio.total_value_usd, 2.0 * 2500.0);
    assert_eq!(summary.total_value_usd, portfolio.total_value_usd);
}

#[test(tokio::test)]
async fn token_holdings_are_priced_and_added() {
    let chain = StubChain::new(Chain::Ethereum)
        .with_native(1.0)
        .with_token_balance(
            "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
            TokenBalance {
                symbol: "USDC".to_string(),
                decimals: 6,
                raw_amount: "1000000000".to_string(),
                formatted_amount: 1000.0,
            },
        );
    let aggregator = aggregator(
        vec![Arc::new(chain)],
        &[("ethereum", 2500.0), ("usd-coin", 1.0)],
    );

    let wallet = WalletAddress::new(Chain::Ethereum, "0x000000000000000000000000000000000000beef");
    let portfolio = aggregator.portfolio(&wallet).await.unwrap();

    assert_eq!(portfolio.tokens.len(), 1);
    assert_eq!(portfolio.tokens[0].symbol, "USDC");
    assert_eq!(portfolio.tokens[0].value_usd, 1000.0);
    assert_eq!(portfolio.total_value_usd, 2500.0 + 1000.0);
}

#[test(tokio::test)]
async fn cross_chain_summary_spans_evm_and_solana() {
    let ethereum = StubChain::new(Chain::Ethereum).with_native(1.0);
    let solana = StubChain::new(Chain::Solana).with_native(10.0);
    let aggregator = aggregator(
        vec![Arc::new(ethereum), Arc::new(solana)],
        &[("ethereum", 2500.0), ("solana", 150.0)],
    );

    let wallets = vec![
        WalletAddress::new(Chain::Ethereum, "0x000000000000000000000000000000000000beef"),
        WalletAddress::new(Chain::Solana, "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM"),
    ];
    let summary = aggregator.summary(&wallets).await;

    assert_eq!(summary.portfolios.len(), 2);
    assert_eq!(summary.total_value_usd, 2500.0 + 1500.0);
}

#[test(tokio::test)]
async fn missing_chain_client_degrades_only_that_wallet() {
    let ethereum = StubChain::new(Chain::Ethereum).with_native(1.0);
    let aggregator = aggregator(vec![Arc::new(ethereum)], &[("ethereum", 2500.0)]);

    let wallets = vec![
        WalletAddress::new(Chain::Ethereum, "0x000000000000000000000000000000000000beef"),
        WalletAddress::new(Chain::Polygon, "0x000000000000000000000000000000000000beef"),
    ];
    let summary = aggregator.summary(&wallets).await;

    assert_eq!(summary.portfolios.len(), 1);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].wallet.chain, Chain::Polygon);
    assert_eq!(summary.total_value_usd, 2500.0);
}

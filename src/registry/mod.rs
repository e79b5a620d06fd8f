use serde::{Deserialize, Serialize};

use crate::chains::Chain;

/// A known fungible token on one chain. Per-chain catalogs are static and
/// change only with a redeploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub symbol: &'static str,
    pub address: &'static str,
    pub decimals: u8,
}

const ETHEREUM_TOKENS: &[TokenDescriptor] = &[
    TokenDescriptor { symbol: "USDC", address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", decimals: 6 },
    TokenDescriptor { symbol: "USDT", address: "0xdAC17F958D2ee523a2206206994597C13D831ec7", decimals: 6 },
    TokenDescriptor { symbol: "DAI", address: "0x6B175474E89094C44Da98b954EedeAC495271d0F", decimals: 18 },
    TokenDescriptor { symbol: "WETH", address: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", decimals: 18 },
    TokenDescriptor { symbol: "WBTC", address: "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599", decimals: 8 },
    TokenDescriptor { symbol: "UNI", address: "0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984", decimals: 18 },
    TokenDescriptor { symbol: "LINK", address: "0x514910771AF9Ca656af840dff83E8264EcF986CA", decimals: 18 },
    TokenDescriptor { symbol: "AAVE", address: "0x7Fc66500c84A76Ad7e9c93437bFc5Ac33E2DDaE9", decimals: 18 },
];

const POLYGON_TOKENS: &[TokenDescriptor] = &[
    TokenDescriptor { symbol: "USDC", address: "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", decimals: 6 },
    TokenDescriptor { symbol: "USDT", address: "0xc2132D05D31c914a87C6611C10748AEb04B58e8F", decimals: 6 },
    TokenDescriptor { symbol: "WETH", address: "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619", decimals: 18 },
    TokenDescriptor { symbol: "WMATIC", address: "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270", decimals: 18 },
];

const ARBITRUM_TOKENS: &[TokenDescriptor] = &[
    TokenDescriptor { symbol: "USDC", address: "0xaf88d065e77c8cC2239327C5EDb3A432268e5831", decimals: 6 },
    TokenDescriptor { symbol: "USDT", address: "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9", decimals: 6 },
    TokenDescriptor { symbol: "WETH", address: "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1", decimals: 18 },
    TokenDescriptor { symbol: "ARB", address: "0x912CE59144191C1204E64559FE8253a0e49E6548", decimals: 18 },
];

const OPTIMISM_TOKENS: &[TokenDescriptor] = &[
    TokenDescriptor { symbol: "USDC", address: "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85", decimals: 6 },
    TokenDescriptor { symbol: "WETH", address: "0x4200000000000000000000000000000000000006", decimals: 18 },
    TokenDescriptor { symbol: "OP", address: "0x4200000000000000000000000000000000000042", decimals: 18 },
];

const BASE_TOKENS: &[TokenDescriptor] = &[
    TokenDescriptor { symbol: "USDC", address: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", decimals: 6 },
    TokenDescriptor { symbol: "WETH", address: "0x4200000000000000000000000000000000000006", decimals: 18 },
    TokenDescriptor { symbol: "DAI", address: "0x50c5725949A6F0c72E6C4a641F24049A917DB0Cb", decimals: 18 },
];

const SOLANA_TOKENS: &[TokenDescriptor] = &[
    TokenDescriptor { symbol: "USDC", address: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", decimals: 6 },
    TokenDescriptor { symbol: "USDT", address: "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", decimals: 6 },
    TokenDescriptor { symbol: "JUP", address: "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", decimals: 6 },
    TokenDescriptor { symbol: "BONK", address: "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", decimals: 5 },
    TokenDescriptor { symbol: "RAY", address: "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R", decimals: 6 },
];

/// Per-chain lookups over the static token catalog.
pub struct TokenRegistry;

impl TokenRegistry {
    pub fn new() -> Self {
        TokenRegistry
    }

    pub fn for_chain(&self, chain: Chain) -> &'static [TokenDescriptor] {
        match chain {
            Chain::Ethereum => ETHEREUM_TOKENS,
            Chain::Polygon => POLYGON_TOKENS,
            Chain::Arbitrum => ARBITRUM_TOKENS,
            Chain::Optimism => OPTIMISM_TOKENS,
            Chain::Base => BASE_TOKENS,
            Chain::Solana => SOLANA_TOKENS,
        }
    }

    pub fn by_symbol(&self, chain: Chain, symbol: &str) -> Option<&'static TokenDescriptor> {
        self.for_chain(chain)
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn by_address(&self, chain: Chain, address: &str) -> Option<&'static TokenDescriptor> {
        self.for_chain(chain).iter().find(|t| {
            if chain.is_evm() {
                t.address.eq_ignore_ascii_case(address)
            } else {
                t.address == address
            }
        })
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletCategory {
    Exchange,
    Fund,
    Protocol,
    Individual,
}

/// A labeled address from the static known-wallet catalog. Lookup is
/// chain-aware: address formats only collide across networks by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownWalletEntry {
    pub chain: Chain,
    pub address: &'static str,
    pub label: &'static str,
    pub category: WalletCategory,
}

const KNOWN_WALLETS: &[KnownWalletEntry] = &[
    // Exchanges
    KnownWalletEntry { chain: Chain::Ethereum, address: "0x28C6c06298d514Db089934071355E5743bf21d60", label: "Binance 14", category: WalletCategory::Exchange },
    KnownWalletEntry { chain: Chain::Ethereum, address: "0xDFd5293D8e347dFe59E90eFd55b2956a1343963d", label: "Binance 16", category: WalletCategory::Exchange },
    KnownWalletEntry { chain: Chain::Ethereum, address: "0x71660c4005BA85c37ccec55d0C4493E66Fe775d3", label: "Coinbase 1", category: WalletCategory::Exchange },
    KnownWalletEntry { chain: Chain::Ethereum, address: "0x2910543Af39abA0Cd09dBb2D50200b3E800A63D2", label: "Kraken 4", category: WalletCategory::Exchange },
    KnownWalletEntry { chain: Chain::Ethereum, address: "0x6cC5F688a315f3dC28A7781717a9A798a59fDA7b", label: "OKX", category: WalletCategory::Exchange },
    // Funds
    KnownWalletEntry { chain: Chain::Ethereum, address: "0xf584F8728B874a6a5c7A8d4d387C9aae9172D621", label: "Jump Trading", category: WalletCategory::Fund },
    KnownWalletEntry { chain: Chain::Ethereum, address: "0xDBF5E9c5206d0dB70a90108bf936DA60221dC080", label: "Wintermute", category: WalletCategory::Fund },
    // Protocols
    KnownWalletEntry { chain: Chain::Ethereum, address: "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D", label: "Uniswap V2: Router", category: WalletCategory::Protocol },
    KnownWalletEntry { chain: Chain::Ethereum, address: "0x8731d54E9D02c286767d56ac03e8037C07e01e98", label: "Stargate: Bridge", category: WalletCategory::Protocol },
    KnownWalletEntry { chain: Chain::Ethereum, address: "0x3ee18B2214AFF97000D974cf647E7C347E8fa585", label: "Wormhole: Portal Bridge", category: WalletCategory::Protocol },
    KnownWalletEntry { chain: Chain::Polygon, address: "0xA0c68C638235ee32657e8f720a23ceC1bFc77C77", label: "Polygon: PoS Bridge", category: WalletCategory::Protocol },
    KnownWalletEntry { chain: Chain::Arbitrum, address: "0x5288c571Fd7aD117beA99bF60FE0846C4E84F933", label: "Arbitrum: Gateway Bridge", category: WalletCategory::Protocol },
    // Solana
    KnownWalletEntry { chain: Chain::Solana, address: "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", label: "Binance Hot Wallet", category: WalletCategory::Exchange },
    KnownWalletEntry { chain: Chain::Solana, address: "H8sMJSCQxfKiFTCfDR3DUMLPwcRbM61LGFJ8N4dK3WjS", label: "Coinbase Hot Wallet", category: WalletCategory::Exchange },
    KnownWalletEntry { chain: Chain::Solana, address: "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4", label: "Jupiter: Swap Aggregator", category: WalletCategory::Protocol },
    KnownWalletEntry { chain: Chain::Solana, address: "worm2ZoG2kUd4vFXhvjh93UUH596ayRfgQ2MgjNMTth", label: "Wormhole: Bridge", category: WalletCategory::Protocol },
    KnownWalletEntry { chain: Chain::Solana, address: "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8", label: "Raydium: AMM", category: WalletCategory::Protocol },
];

/// Static address -> label/category table for exchanges, funds, protocols
/// and bridges, loaded once at startup.
pub struct KnownWalletRegistry;

impl KnownWalletRegistry {
    pub fn new() -> Self {
        KnownWalletRegistry
    }

    /// EVM addresses are lower-cased before comparison; Solana addresses
    /// match case-sensitively.
    pub fn lookup(&self, chain: Chain, address: &str) -> Option<&'static KnownWalletEntry> {
        KNOWN_WALLETS.iter().find(|w| {
            w.chain == chain
                && if chain.is_evm() {
                    w.address.eq_ignore_ascii_case(address)
                } else {
                    w.address == address
                }
        })
    }

    /// Entries for one chain, in catalog order.
    pub fn for_chain(&self, chain: Chain) -> Vec<&'static KnownWalletEntry> {
        KNOWN_WALLETS.iter().filter(|w| w.chain == chain).collect()
    }

    pub fn all(&self) -> &'static [KnownWalletEntry] {
        KNOWN_WALLETS
    }
}

impl Default for KnownWalletRegistry {
    fn default() -> Self {
        Self::new()
    }
}

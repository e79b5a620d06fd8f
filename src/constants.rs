use std::env;
use std::time::Duration;

/// Whale significance tier floor, high (USD)
pub const WHALE_HIGH_USD: f64 = 10_000_000.0;

/// Whale significance tier floor, medium (USD)
pub const WHALE_MEDIUM_USD: f64 = 1_000_000.0;

/// Lifetime of a cached price quote
pub const PRICE_TTL: Duration = Duration::from_secs(60);

/// Lifetime of a cached eligibility result per (wallet, filters) key
pub const ELIGIBILITY_TTL: Duration = Duration::from_secs(300);

/// Decoded events retained per (chain, contract), oldest evicted first
pub const EVENT_RING_CAPACITY: usize = 1_000;

/// Known wallets covered by one historic whale sweep, in registry order
pub const WHALE_SCAN_WALLETS: usize = 10;

/// Recent transactions pulled per wallet during a whale sweep
pub const WHALE_SCAN_TX_LIMIT: usize = 20;

/// Gas units of a plain native transfer
pub const STANDARD_TRANSFER_GAS: u64 = 21_000;

/// Blocks scanned backwards when reconstructing recent EVM activity
pub const RECENT_TX_BLOCK_WINDOW: u64 = 10;

/// Default cadence for contract event log polling
pub const EVENT_POLL_INTERVAL: Duration = Duration::from_secs(12);

/// Default cadence for gas price polling
pub const GAS_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Timeout applied to outbound HTTP calls (price provider, alert channels)
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Env {
    pub rpc_url_template: String,
    pub solana_rpc_url: String,
    pub price_api_url: String,
    pub price_api_key: Option<String>,
    pub webhook_url: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub metrics_port: u16,
}

impl Env {
    pub fn new() -> Self {
        Env {
            rpc_url_template: env::var("RPC_URL_TEMPLATE")
                .unwrap_or_else(|_| String::from("https://rpc.ankr.com/{chain}")),
            solana_rpc_url: env::var("SOLANA_RPC_URL")
                .unwrap_or_else(|_| String::from("https://api.mainnet-beta.solana.com")),
            price_api_url: env::var("PRICE_API_URL")
                .unwrap_or_else(|_| String::from("https://api.coingecko.com/api/v3")),
            price_api_key: env::var("PRICE_API_KEY").ok(),
            webhook_url: env::var("ALERT_WEBHOOK_URL").ok(),
            discord_webhook_url: env::var("DISCORD_WEBHOOK_URL").ok(),
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),
            metrics_port: env::var("METRICS_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9090),
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Env::new()
    }
}

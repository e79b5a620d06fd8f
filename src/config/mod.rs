use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::alerts::ChannelConfig;
use crate::chains::Chain;
use crate::constants::{Env, EVENT_POLL_INTERVAL, GAS_POLL_INTERVAL};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    // Network configuration
    /// Provider URL template with a `{chain}` placeholder, e.g.
    /// `https://rpc.ankr.com/{chain}`.
    pub rpc_url_template: Option<String>,
    pub evm_rpc_overrides: HashMap<Chain, String>,
    pub solana_rpc_url: Option<String>,

    // Price provider
    pub price_api_url: String,
    pub price_api_key: Option<String>,

    // Alert channels
    pub channels: Vec<ChannelConfig>,

    // Polling cadences
    pub event_poll_interval: Duration,
    pub gas_poll_interval: Duration,
}

impl EngineConfig {
    pub fn from_env(env: &Env) -> Self {
        let mut channels = Vec::new();
        if let Some(url) = &env.webhook_url {
            channels.push(ChannelConfig::Webhook { url: url.clone() });
        }
        if let Some(url) = &env.discord_webhook_url {
            channels.push(ChannelConfig::Discord {
                webhook_url: url.clone(),
            });
        }
        if let (Some(bot_token), Some(chat_id)) = (&env.telegram_bot_token, &env.telegram_chat_id)
        {
            channels.push(ChannelConfig::Telegram {
                bot_token: bot_token.clone(),
                chat_id: chat_id.clone(),
            });
        }

        Self {
            rpc_url_template: Some(env.rpc_url_template.clone()),
            evm_rpc_overrides: HashMap::new(),
            solana_rpc_url: Some(env.solana_rpc_url.clone()),
            price_api_url: env.price_api_url.clone(),
            price_api_key: env.price_api_key.clone(),
            channels,
            event_poll_interval: EVENT_POLL_INTERVAL,
            gas_poll_interval: GAS_POLL_INTERVAL,
        }
    }

    /// Explicit per-chain override wins; otherwise the template resolves.
    pub fn resolve_evm_url(&self, chain: Chain) -> Option<String> {
        if !chain.is_evm() {
            return None;
        }
        if let Some(url) = self.evm_rpc_overrides.get(&chain) {
            return Some(url.clone());
        }
        self.rpc_url_template
            .as_ref()
            .map(|template| template.replace("{chain}", chain.rpc_slug()))
    }

    pub fn validate_all(&self) -> Result<()> {
        if self.rpc_url_template.is_none()
            && self.evm_rpc_overrides.is_empty()
            && self.solana_rpc_url.is_none()
        {
            return Err(anyhow!("at least one rpc endpoint must be configured"));
        }

        for chain in self.evm_rpc_overrides.keys() {
            if !chain.is_evm() {
                return Err(anyhow!("rpc override for non-EVM chain {chain}"));
            }
        }
        for chain in Chain::evm_chains() {
            if let Some(url) = self.resolve_evm_url(*chain) {
                validate_endpoint_url(&url)?;
            }
        }
        if let Some(url) = &self.solana_rpc_url {
            validate_endpoint_url(url)?;
        }
        validate_endpoint_url(&self.price_api_url)?;

        for channel in &self.channels {
            validate_channel(channel)?;
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc_url_template: None,
            evm_rpc_overrides: HashMap::new(),
            solana_rpc_url: None,
            price_api_url: String::from("https://api.coingecko.com/api/v3"),
            price_api_key: None,
            channels: Vec::new(),
            event_poll_interval: EVENT_POLL_INTERVAL,
            gas_poll_interval: GAS_POLL_INTERVAL,
        }
    }
}

fn validate_endpoint_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| anyhow!("invalid url `{url}`: {e}"))?;
    match parsed.scheme() {
        "http" | "https" | "ws" | "wss" => Ok(()),
        other => Err(anyhow!("unsupported url scheme `{other}` in `{url}`")),
    }
}

fn validate_channel(channel: &ChannelConfig) -> Result<()> {
    match channel {
        ChannelConfig::Webhook { url } => validate_endpoint_url(url),
        ChannelConfig::Discord { webhook_url } => validate_endpoint_url(webhook_url),
        ChannelConfig::Telegram { bot_token, chat_id } => {
            if bot_token.trim().is_empty() || chat_id.trim().is_empty() {
                return Err(anyhow!("telegram channel needs a bot token and chat id"));
            }
            Ok(())
        }
    }
}

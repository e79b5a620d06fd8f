use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::constants::HTTP_TIMEOUT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Immutable once constructed; the dispatcher only ever derives
/// channel-specific payloads from it.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Delivery destinations are supplied by configuration, never hard-coded.
#[derive(Debug, Clone)]
pub enum ChannelConfig {
    Webhook { url: String },
    Discord { webhook_url: String },
    Telegram { bot_token: String, chat_id: String },
}

impl ChannelConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelConfig::Webhook { .. } => "webhook",
            ChannelConfig::Discord { .. } => "discord",
            ChannelConfig::Telegram { .. } => "telegram",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
}

fn severity_color(severity: Severity) -> u32 {
    match severity {
        Severity::Info => 0x3498db,
        Severity::Warning => 0xf39c12,
        Severity::Critical => 0xe74c3c,
    }
}

/// Plain JSON body for generic webhooks.
pub fn webhook_payload(alert: &Alert) -> Value {
    json!({
        "title": alert.title,
        "message": alert.message,
        "severity": alert.severity,
        "data": alert.data,
        "timestamp": alert.timestamp.to_rfc3339(),
    })
}

/// Discord-style embed, structured data flattened into embed fields.
pub fn discord_payload(alert: &Alert) -> Value {
    let fields: Vec<Value> = alert
        .data
        .as_ref()
        .and_then(|d| d.as_object())
        .map(|obj| {
            obj.iter()
                .map(|(name, value)| {
                    json!({
                        "name": name,
                        "value": display_value(value),
                        "inline": true,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "embeds": [{
            "title": alert.title,
            "description": alert.message,
            "color": severity_color(alert.severity),
            "fields": fields,
            "timestamp": alert.timestamp.to_rfc3339(),
        }]
    })
}

/// Markdown text for Telegram-style channels.
pub fn telegram_text(alert: &Alert) -> String {
    let mut text = format!("*{}*\n{}", alert.title, alert.message);
    if let Some(obj) = alert.data.as_ref().and_then(|d| d.as_object()) {
        for (name, value) in obj {
            text.push_str(&format!("\n`{}: {}`", name, display_value(value)));
        }
    }
    text.push_str(&format!("\n_severity: {:?}_", alert.severity));
    text
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Formats and delivers alerts to configured channel sinks. One attempt per
/// channel; a non-2xx or transport error becomes a typed failure result,
/// never a retry or a queue entry.
pub struct AlertDispatcher {
    http: Client,
}

impl AlertDispatcher {
    pub fn new() -> Result<Self> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { http })
    }

    pub async fn send(&self, alert: &Alert, channel: &ChannelConfig) -> DeliveryResult {
        let (url, payload) = match channel {
            ChannelConfig::Webhook { url } => (url.clone(), webhook_payload(alert)),
            ChannelConfig::Discord { webhook_url } => (webhook_url.clone(), discord_payload(alert)),
            ChannelConfig::Telegram { bot_token, chat_id } => (
                format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
                json!({
                    "chat_id": chat_id,
                    "text": telegram_text(alert),
                    "parse_mode": "Markdown",
                }),
            ),
        };

        metrics::increment_counter!("chainpulse_alert_deliveries_total", "channel" => channel.kind());
        match self.http.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => DeliveryResult {
                channel: channel.kind().to_string(),
                success: true,
                error: None,
            },
            Ok(response) => {
                metrics::increment_counter!("chainpulse_alert_delivery_failures_total", "channel" => channel.kind());
                DeliveryResult {
                    channel: channel.kind().to_string(),
                    success: false,
                    error: Some(format!("http status {}", response.status())),
                }
            }
            Err(e) => {
                metrics::increment_counter!("chainpulse_alert_delivery_failures_total", "channel" => channel.kind());
                DeliveryResult {
                    channel: channel.kind().to_string(),
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// One delivery attempt per channel, all issued concurrently.
    pub async fn send_all(
        &self,
        alert: &Alert,
        channels: &[ChannelConfig],
    ) -> Vec<DeliveryResult> {
        join_all(channels.iter().map(|channel| self.send(alert, channel))).await
    }
}

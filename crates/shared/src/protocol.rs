//! Wire shapes of the trading backend's REST surface.
//!
//! Every field the backend may omit is optional here; the console decides
//! what a missing field means.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ProductId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub symbol: String,
    pub id: ProductId,
    #[serde(default, deserialize_with = "string_or_number")]
    pub min_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductsResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub products: Option<Vec<ProductRecord>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceResponse {
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub side: String,
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub time: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub pnl: Option<f64>,
    #[serde(default)]
    pub equity: Option<f64>,
    #[serde(default)]
    pub health: Option<f64>,
    #[serde(default)]
    pub liq_price: Option<f64>,
    #[serde(default)]
    pub active_pos: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub volume_rate_min: Option<f64>,
    #[serde(default)]
    pub active_orders: Option<Vec<OrderRecord>>,
    #[serde(default)]
    pub trades: Option<Vec<TradeRecord>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub entry_price: f64,
    #[serde(default)]
    pub liq_price: f64,
    #[serde(default)]
    pub pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    #[serde(default)]
    pub orders: Option<Vec<Value>>,
    #[serde(default)]
    pub position: Option<PositionRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Reply to any of the control POSTs. Only `status` is always inspected;
/// the remaining fields depend on the command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandReply {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A control reply together with the body it was parsed from, so failures
/// can be shown to the operator verbatim.
#[derive(Debug, Clone)]
pub struct RawReply {
    pub reply: CommandReply,
    pub body: String,
}

impl RawReply {
    pub fn parse(body: impl Into<String>) -> Self {
        let body = body.into();
        let reply = serde_json::from_str::<CommandReply>(&body).unwrap_or_default();
        Self { reply, body }
    }

    pub fn status_is(&self, expected: &str) -> bool {
        self.reply.status.as_deref() == Some(expected)
    }

    /// Backend-supplied error text when present, otherwise the raw body.
    pub fn failure_text(&self) -> String {
        match &self.reply.error {
            Some(err) if !err.is_empty() => err.clone(),
            _ => self.body.clone(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

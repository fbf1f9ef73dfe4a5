use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ProductId);

/// Health below this value is the backend's liquidation danger zone.
pub const MARGIN_DANGER_THRESHOLD: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Stopped,
    Running,
}

impl SessionStatus {
    pub fn is_running(self) -> bool {
        self == SessionStatus::Running
    }

    /// Maps the backend's status string. Anything other than `running` is
    /// treated as stopped.
    pub fn from_backend(raw: Option<&str>) -> Self {
        match raw {
            Some(value) if value.eq_ignore_ascii_case("running") => SessionStatus::Running,
            _ => SessionStatus::Stopped,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Stopped => write!(f, "stopped"),
            SessionStatus::Running => write!(f, "running"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "buy" | "bid" | "long" => Some(Side::Buy),
            "sell" | "ask" | "short" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Operator-editable strategy parameters. Serialized as the `/start` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub ticker: String,
    pub quantity: f64,
    pub spread: f64,
    /// Seconds between strategy cycles on the backend.
    pub interval: u64,
    pub boost_mode: bool,
    pub max_exposure: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ticker: "ETH-PERP".into(),
            quantity: 0.05,
            spread: 0.0005,
            interval: 5,
            boost_mode: false,
            max_exposure: 200.0,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.ticker.trim().is_empty() {
            return Err("ticker must not be empty".into());
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(format!("quantity must be positive, got {}", self.quantity));
        }
        if !self.spread.is_finite() || self.spread < 0.0 {
            return Err(format!("spread must not be negative, got {}", self.spread));
        }
        if self.interval == 0 {
            return Err("interval must be at least one second".into());
        }
        if !self.max_exposure.is_finite() || self.max_exposure < 0.0 {
            return Err(format!(
                "max exposure must not be negative, got {}",
                self.max_exposure
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub id: ProductId,
    pub min_size: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderView {
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeView {
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub time: Option<String>,
}

/// One complete `/stats` reading. Never merged with a previous reading.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub pnl: f64,
    pub equity: f64,
    pub health: f64,
    pub liq_price: f64,
    pub active_pos: f64,
    pub volume: f64,
    pub volume_rate_min: f64,
    pub active_orders: Vec<OrderView>,
    pub trades: Vec<TradeView>,
}

impl TelemetrySnapshot {
    pub fn has_position(&self) -> bool {
        self.active_pos != 0.0
    }

    pub fn in_danger_zone(&self) -> bool {
        self.health < MARGIN_DANGER_THRESHOLD
    }

    /// Liquidation price is only meaningful with an open position.
    pub fn liquidation_price(&self) -> Option<f64> {
        self.has_position().then_some(self.liq_price)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionDetail {
    pub size: f64,
    pub entry_price: f64,
    pub liq_price: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountDetail {
    pub orders: Vec<serde_json::Value>,
    pub position: PositionDetail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Tags a backend log line. The backend formats lines as
    /// `HH:MM:SS [LEVEL] message`; when no level is present the marker words
    /// the operator watches for decide.
    pub fn classify_backend_line(line: &str) -> Self {
        if let Some(level) = bracketed_level(line) {
            match level.as_str() {
                "CRITICAL" => return Severity::Critical,
                "ERROR" => return Severity::Error,
                "WARNING" | "WARN" => return Severity::Warning,
                _ => {}
            }
        }
        if line.contains("PANIC") || line.contains("Limit") || line.contains("Rejected") {
            Severity::Warning
        } else if line.contains('✅') || line.contains("Placing") {
            Severity::Success
        } else {
            Severity::Info
        }
    }
}

fn bracketed_level(line: &str) -> Option<String> {
    let start = line.find('[')?;
    let end = line[start..].find(']')? + start;
    let level = line[start + 1..end].trim();
    if level.is_empty() || !level.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(level.to_ascii_uppercase())
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub text: String,
    pub severity: Severity,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity,
            at: Utc::now(),
        }
    }

    pub fn from_backend(line: impl Into<String>) -> Self {
        let text = line.into();
        Self::new(Severity::classify_backend_line(&text), text)
    }
}

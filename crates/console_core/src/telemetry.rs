use std::{sync::Arc, time::Duration};

use serde_json::Value;
use shared::{
    domain::{
        AccountDetail, Instrument, OrderView, PositionDetail, SessionStatus, Side,
        TelemetrySnapshot, TradeView,
    },
    protocol::{StatsResponse, TradeRecord},
};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{error::BackendError, events::FeedEvent, transport::BackendApi};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Typed queries against the backend. Cheap to clone.
#[derive(Clone)]
pub struct TelemetryClient {
    api: Arc<dyn BackendApi>,
}

impl TelemetryClient {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self { api }
    }

    pub async fn fetch_status(&self) -> Result<SessionStatus, BackendError> {
        let res = self.api.status().await?;
        Ok(SessionStatus::from_backend(res.status.as_deref()))
    }

    pub async fn fetch_catalog(&self) -> Result<Vec<Instrument>, BackendError> {
        let res = self.api.products().await?;
        if let Some(err) = res.error {
            return Err(BackendError::malformed("/products", err));
        }
        let products = res
            .products
            .ok_or_else(|| BackendError::malformed("/products", "missing products list"))?;
        Ok(products
            .into_iter()
            .map(|p| Instrument {
                symbol: p.symbol,
                id: p.id,
                min_size: p.min_size,
            })
            .collect())
    }

    /// Latest reference price. The backend reports `0` when it has none.
    pub async fn fetch_price(&self, symbol: &str) -> Result<f64, BackendError> {
        let res = self.api.price(symbol).await?;
        match res.price {
            Some(price) if price.is_finite() && price >= 0.0 => Ok(price),
            Some(price) => Err(BackendError::malformed(
                format!("/price/{symbol}"),
                format!("unusable price {price}"),
            )),
            None => Ok(0.0),
        }
    }

    pub async fn fetch_stats(&self) -> Result<TelemetrySnapshot, BackendError> {
        let res = self.api.stats().await?;
        normalize_stats(res).map_err(|reason| BackendError::malformed("/stats", reason))
    }

    pub async fn fetch_account(&self) -> Result<AccountDetail, BackendError> {
        let res = self.api.account().await?;
        if let Some(err) = res.error {
            return Err(BackendError::malformed("/account", err));
        }
        let position = res
            .position
            .ok_or_else(|| BackendError::malformed("/account", "missing position"))?;
        Ok(AccountDetail {
            orders: res.orders.unwrap_or_default(),
            position: PositionDetail {
                size: position.size,
                entry_price: position.entry_price,
                liq_price: position.liq_price,
                pnl: position.pnl,
            },
        })
    }
}

/// Turns a `/stats` body into a complete snapshot, or explains why it is
/// not one. A body that is missing any headline figure is rejected whole.
pub fn normalize_stats(raw: StatsResponse) -> Result<TelemetrySnapshot, String> {
    if let Some(err) = raw.error {
        return Err(format!("backend reported: {err}"));
    }

    fn required(value: Option<f64>, field: &str) -> Result<f64, String> {
        match value {
            Some(v) if v.is_finite() => Ok(v),
            Some(v) => Err(format!("field {field} is not finite ({v})")),
            None => Err(format!("missing field {field}")),
        }
    }

    let active_orders = raw
        .active_orders
        .unwrap_or_default()
        .into_iter()
        .map(|o| {
            let side = Side::parse(&o.side).ok_or_else(|| format!("unknown order side '{}'", o.side))?;
            Ok(OrderView {
                side,
                price: o.price,
                size: o.size,
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    let trades = raw
        .trades
        .unwrap_or_default()
        .into_iter()
        .map(normalize_trade)
        .collect::<Result<Vec<_>, String>>()?;

    Ok(TelemetrySnapshot {
        pnl: required(raw.pnl, "pnl")?,
        equity: required(raw.equity, "equity")?,
        health: required(raw.health, "health")?,
        liq_price: required(raw.liq_price, "liq_price")?,
        active_pos: required(raw.active_pos, "active_pos")?,
        volume: required(raw.volume, "volume")?,
        volume_rate_min: required(raw.volume_rate_min, "volume_rate_min")?,
        active_orders,
        trades,
    })
}

fn normalize_trade(trade: TradeRecord) -> Result<TradeView, String> {
    let side = trade
        .side
        .as_deref()
        .and_then(Side::parse)
        .ok_or_else(|| format!("trade with unknown side {:?}", trade.side))?;
    let (Some(price), Some(size)) = (trade.price, trade.size) else {
        return Err("trade missing price or size".into());
    };
    let time = match trade.time {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    };
    Ok(TradeView {
        side,
        price,
        size,
        time,
    })
}

/// Polls `/stats` every `period` for as long as the session is running.
///
/// The task parks on the status channel while stopped and issues no
/// requests. A transition to stopped ends the current polling run before the
/// next tick. Results are forwarded to `feed`; the task exits when either the
/// status sender or the feed receiver goes away.
pub fn spawn_stats_poller(
    telemetry: TelemetryClient,
    mut status_rx: watch::Receiver<SessionStatus>,
    period: Duration,
    feed: mpsc::Sender<FeedEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            loop {
                let running = status_rx.borrow_and_update().is_running();
                if running {
                    break;
                }
                if status_rx.changed().await.is_err() {
                    return;
                }
            }

            info!(period_ms = period.as_millis() as u64, "telemetry: polling started");
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = status_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        let running = status_rx.borrow_and_update().is_running();
                        if !running {
                            info!("telemetry: polling stopped");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let running = status_rx.borrow().is_running();
                        if !running {
                            break;
                        }
                        let outcome = match telemetry.fetch_stats().await {
                            Ok(snapshot) => {
                                debug!(volume = snapshot.volume, "telemetry: snapshot received");
                                Ok(snapshot)
                            }
                            Err(err) => {
                                warn!("telemetry: discarding stats poll: {err}");
                                Err(err.to_string())
                            }
                        };
                        if feed.send(FeedEvent::Stats(outcome)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/telemetry_tests.rs"]
mod tests;

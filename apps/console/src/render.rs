use console_core::{CommandOutcome, ConsoleView, StopReconciliation};
use shared::domain::{AccountDetail, Instrument, LogEntry, Severity, TelemetrySnapshot};

pub fn log_line(entry: &LogEntry) -> String {
    let tag = match entry.severity {
        Severity::Info => "info ",
        Severity::Success => "ok   ",
        Severity::Warning => "warn ",
        Severity::Error => "error",
        Severity::Critical => "CRIT ",
    };
    format!("{} {tag} {}", entry.at.format("%H:%M:%S"), entry.text)
}

pub fn snapshot(snapshot: &TelemetrySnapshot) -> String {
    let mut out = format!(
        "pnl {:+.2}  equity {:.2}  health {:.1}%{}\n",
        snapshot.pnl,
        snapshot.equity,
        snapshot.health,
        if snapshot.in_danger_zone() {
            "  DANGER"
        } else {
            ""
        }
    );
    match snapshot.liquidation_price() {
        Some(liq) => out.push_str(&format!("position {}  liq {liq:.2}\n", snapshot.active_pos)),
        None => out.push_str("position flat\n"),
    }
    out.push_str(&format!(
        "volume {:.0}  rate {:.0}/min  orders {}  trades {}",
        snapshot.volume,
        snapshot.volume_rate_min,
        snapshot.active_orders.len(),
        snapshot.trades.len()
    ));
    out
}

pub fn catalog(instruments: &[Instrument]) -> String {
    instruments
        .iter()
        .map(|i| format!("{:<12} id={:<4} min_size={}", i.symbol, i.id.0, i.min_size))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn account(detail: &AccountDetail) -> String {
    format!(
        "open orders {}  size {}  entry {:.2}  liq {:.2}  pnl {:+.2}",
        detail.orders.len(),
        detail.position.size,
        detail.position.entry_price,
        detail.position.liq_price,
        detail.position.pnl
    )
}

pub fn outcome(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Started => "started".into(),
        CommandOutcome::Stopped(StopReconciliation::Confirmed) => "stopped".into(),
        CommandOutcome::Stopped(StopReconciliation::BackendStillRunning) => {
            "stopped locally, but the backend still reports running".into()
        }
        CommandOutcome::Stopped(StopReconciliation::Unverified(reason)) => {
            format!("stopped locally, backend status unverified: {reason}")
        }
        CommandOutcome::Closed { size, side } => format!(
            "closed {} {}",
            size.map_or_else(|| "?".to_string(), |s| s.to_string()),
            side.as_deref().unwrap_or("?")
        ),
        CommandOutcome::NoPosition => "no position to close".into(),
        CommandOutcome::Cancelled => "all orders cancelled".into(),
    }
}

pub fn view(view: &ConsoleView) -> String {
    let config = &view.config;
    let mut out = format!(
        "status {}{}{}\n",
        view.status,
        view.in_flight
            .map(|kind| format!("  ({} in flight)", kind.label()))
            .unwrap_or_default(),
        if view.telemetry_stale {
            "  TELEMETRY STALE"
        } else {
            ""
        }
    );
    out.push_str(&format!(
        "config {} qty {} spread {} interval {}s boost {} max exposure {}\n",
        config.ticker,
        config.quantity,
        config.spread,
        config.interval,
        if config.boost_mode { "on" } else { "off" },
        config.max_exposure
    ));
    if let Some(price) = view.price {
        out.push_str(&format!("price {price:.2}"));
        if let Some(notional) = view.order_notional {
            out.push_str(&format!("  order ≈ ${notional:.2}"));
        }
        if let Some(spread) = view.spread_in_price {
            out.push_str(&format!("  spread ≈ ${spread:.2}"));
        }
        out.push('\n');
    }
    match &view.snapshot {
        Some(s) => {
            out.push_str(&snapshot(s));
            out.push('\n');
        }
        None => out.push_str("no telemetry\n"),
    }
    if let Some(projection) = view.projection {
        out.push_str(&format!(
            "planner target {:.0}  remaining {:.0}  eta {}  est. fees ${:.2}\n",
            view.planner.target_volume,
            projection.remaining,
            projection.time_to_target,
            projection.estimated_fees
        ));
    }
    if !view.log_stream_open {
        out.push_str("log stream disconnected\n");
    }
    out
}

//! Events flowing into and out of the console controller.

use shared::domain::{Instrument, LogEntry, SessionStatus, TelemetrySnapshot};

/// Produced by the two background feeds (stats poller, log stream) and
/// consumed by a single controller task. The feeds share one channel but
/// make no ordering promise relative to each other.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Stats(Result<TelemetrySnapshot, String>),
    Log(LogEntry),
    LogStreamClosed(Option<String>),
}

/// Published to presentation subscribers.
#[derive(Debug, Clone)]
pub enum ConsoleEvent {
    Log(LogEntry),
    StatusChanged(SessionStatus),
    SnapshotUpdated(TelemetrySnapshot),
    PollFailed(String),
    CatalogLoaded(Vec<Instrument>),
    PriceUpdated { symbol: String, price: f64 },
    /// Local status and the backend's own report disagree.
    StatusDiscrepancy {
        local: SessionStatus,
        backend: SessionStatus,
    },
    LogStreamClosed(Option<String>),
}

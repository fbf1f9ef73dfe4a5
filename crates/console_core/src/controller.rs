//! The console controller: one owner for session, telemetry, log and planner
//! state, a command interface for the operator, and read-only
//! [`ConsoleView`] projections for whatever renders it.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use shared::{
    domain::{
        AccountDetail, Instrument, LogEntry, SessionStatus, StrategyConfig, TelemetrySnapshot,
    },
    error::CommandKind,
};
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    dispatcher::{CommandDispatcher, CommandOutcome, CommandResult, StopReconciliation},
    error::BackendError,
    events::{ConsoleEvent, FeedEvent},
    log_stream::LogStreamListener,
    logbook::LogBook,
    planner::{PlannerState, VolumeProjection},
    session::{ControlAvailability, SessionStateMachine},
    settings::ConsoleSettings,
    telemetry::{spawn_stats_poller, TelemetryClient},
    transport::{BackendApi, HttpBackend},
};

const FEED_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 1024;

#[derive(Default)]
struct ConsoleState {
    catalog: Vec<Instrument>,
    snapshot: Option<TelemetrySnapshot>,
    snapshot_at: Option<Instant>,
    running_since: Option<Instant>,
    price: Option<(String, f64)>,
    planner: PlannerState,
    log_stream_open: bool,
}

/// Long-lived resources of a mounted console.
struct MountedFeeds {
    listener: Option<LogStreamListener>,
    poller: Option<JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
}

impl MountedFeeds {
    async fn release(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
        for task in [self.poller.take(), self.consumer.take()].into_iter().flatten() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for MountedFeeds {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if let Some(consumer) = self.consumer.take() {
            consumer.abort();
        }
    }
}

/// Everything a presentation layer needs for one render.
#[derive(Debug, Clone)]
pub struct ConsoleView {
    pub status: SessionStatus,
    pub controls: ControlAvailability,
    pub in_flight: Option<CommandKind>,
    pub config: StrategyConfig,
    pub catalog: Vec<Instrument>,
    pub snapshot: Option<TelemetrySnapshot>,
    /// Running, but no fresh snapshot within the stale threshold.
    pub telemetry_stale: bool,
    pub price: Option<f64>,
    pub order_notional: Option<f64>,
    pub spread_in_price: Option<f64>,
    pub planner: PlannerState,
    pub projection: Option<VolumeProjection>,
    pub logs: Vec<LogEntry>,
    pub log_stream_open: bool,
}

pub struct ConsoleController {
    settings: ConsoleSettings,
    api: Arc<dyn BackendApi>,
    telemetry: TelemetryClient,
    session: Arc<SessionStateMachine>,
    log: Arc<LogBook>,
    dispatcher: CommandDispatcher,
    inner: Arc<Mutex<ConsoleState>>,
    events: broadcast::Sender<ConsoleEvent>,
    mounted: Mutex<Option<MountedFeeds>>,
}

impl ConsoleController {
    pub fn new(settings: ConsoleSettings) -> Result<Self, BackendError> {
        let api = HttpBackend::new(&settings.backend_url, settings.request_timeout)?;
        Ok(Self::with_backend(settings, Arc::new(api)))
    }

    pub fn with_backend(settings: ConsoleSettings, api: Arc<dyn BackendApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let session = Arc::new(SessionStateMachine::new(settings.strategy.clone()));
        let log = Arc::new(LogBook::new(settings.log_capacity, events.clone()));
        let dispatcher =
            CommandDispatcher::new(Arc::clone(&api), Arc::clone(&session), Arc::clone(&log));
        let planner = PlannerState {
            target_volume: settings.planner_target,
            is_active: false,
        };
        Self {
            telemetry: TelemetryClient::new(Arc::clone(&api)),
            api,
            session,
            log,
            dispatcher,
            inner: Arc::new(Mutex::new(ConsoleState {
                planner,
                ..ConsoleState::default()
            })),
            events,
            mounted: Mutex::new(None),
            settings,
        }
    }

    pub fn settings(&self) -> &ConsoleSettings {
        &self.settings
    }

    pub fn telemetry(&self) -> &TelemetryClient {
        &self.telemetry
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConsoleEvent> {
        self.events.subscribe()
    }

    /// Reads the backend status and catalog, then opens the log stream and
    /// the stats poller. Mounting again first releases the previous feeds.
    /// Backend failures are logged; mounting itself never fails.
    pub async fn mount(&self) {
        self.unmount().await;

        let status = self.adopt_backend_status().await;
        self.load_catalog().await;
        self.refresh_price().await;

        let (feed_tx, feed_rx) = mpsc::channel(FEED_BUFFER);
        let listener = match self.api.log_stream_url() {
            Ok(url) => {
                let handshake = self.settings.request_timeout;
                match LogStreamListener::connect(url, handshake, feed_tx.clone()).await {
                    Ok(listener) => Some(listener),
                    Err(err) => {
                        self.log.error(format!("!! {err}")).await;
                        None
                    }
                }
            }
            Err(err) => {
                self.log.error(format!("!! {err}")).await;
                None
            }
        };
        self.inner.lock().await.log_stream_open = listener.is_some();

        let poller = spawn_stats_poller(
            self.telemetry.clone(),
            self.session.subscribe(),
            self.settings.poll_interval,
            feed_tx,
        );
        let consumer = tokio::spawn(run_feed_consumer(
            Arc::clone(&self.inner),
            Arc::clone(&self.log),
            self.events.clone(),
            feed_rx,
        ));

        *self.mounted.lock().await = Some(MountedFeeds {
            listener,
            poller: Some(poller),
            consumer: Some(consumer),
        });
        info!(%status, "console: mounted");
    }

    /// The status-reading half of [`ConsoleController::mount`], for one-shot
    /// commands that need correct control gating but no live feeds.
    pub async fn mount_status_only(&self) -> SessionStatus {
        self.unmount().await;
        self.adopt_backend_status().await
    }

    /// Adopts the backend's own status report. An unreachable backend is
    /// treated as stopped. Only mounting may call this.
    pub(crate) async fn adopt_backend_status(&self) -> SessionStatus {
        let status = match self.telemetry.fetch_status().await {
            Ok(status) => status,
            Err(err) => {
                self.log
                    .warning(format!("could not read backend status, assuming stopped: {err}"))
                    .await;
                SessionStatus::Stopped
            }
        };
        self.session.adopt_mount_status(status);
        self.inner.lock().await.running_since = status.is_running().then(Instant::now);
        let _ = self.events.send(ConsoleEvent::StatusChanged(status));
        status
    }

    /// Closes the log stream and stops the poller. Safe to call repeatedly.
    pub async fn unmount(&self) {
        let feeds = self.mounted.lock().await.take();
        if let Some(feeds) = feeds {
            feeds.release().await;
            self.inner.lock().await.log_stream_open = false;
            info!("console: unmounted");
        }
    }

    pub async fn is_mounted(&self) -> bool {
        self.mounted.lock().await.is_some()
    }

    async fn load_catalog(&self) {
        match self.telemetry.fetch_catalog().await {
            Ok(catalog) => {
                self.inner.lock().await.catalog = catalog.clone();
                let _ = self.events.send(ConsoleEvent::CatalogLoaded(catalog));
            }
            Err(err) => warn!("console: catalog unavailable: {err}"),
        }
    }

    /// Re-reads the reference price of the selected instrument.
    pub async fn refresh_price(&self) -> Option<f64> {
        let symbol = self.session.config().await.ticker;
        match self.telemetry.fetch_price(&symbol).await {
            Ok(price) => {
                self.inner.lock().await.price = Some((symbol.clone(), price));
                let _ = self
                    .events
                    .send(ConsoleEvent::PriceUpdated { symbol, price });
                Some(price)
            }
            Err(err) => {
                warn!(%symbol, "console: price unavailable: {err}");
                None
            }
        }
    }

    pub async fn config(&self) -> StrategyConfig {
        self.session.config().await
    }

    /// Applies an operator edit. Changing the instrument re-issues the price
    /// lookup.
    pub async fn edit_config<F>(&self, edit: F) -> StrategyConfig
    where
        F: FnOnce(&mut StrategyConfig),
    {
        let previous_ticker = self.session.config().await.ticker;
        let updated = self.session.edit_config(edit).await;
        if updated.ticker != previous_ticker {
            self.refresh_price().await;
        }
        updated
    }

    /// Selects an instrument from the loaded catalog. With no catalog any
    /// symbol is accepted.
    pub async fn select_instrument(&self, symbol: &str) -> Result<StrategyConfig, String> {
        let known = {
            let guard = self.inner.lock().await;
            guard.catalog.is_empty() || guard.catalog.iter().any(|i| i.symbol == symbol)
        };
        if !known {
            return Err(format!("unknown instrument {symbol}"));
        }
        let symbol = symbol.to_string();
        Ok(self.edit_config(move |config| config.ticker = symbol).await)
    }

    pub async fn start(&self) -> CommandResult {
        let config = self.session.config().await;
        let result = self.dispatcher.start(config).await;
        if matches!(result, Ok(CommandOutcome::Started)) {
            self.inner.lock().await.running_since = Some(Instant::now());
            let _ = self
                .events
                .send(ConsoleEvent::StatusChanged(SessionStatus::Running));
        }
        result
    }

    pub async fn stop(&self) -> CommandResult {
        let result = self.dispatcher.stop().await;
        if let Ok(CommandOutcome::Stopped(reconciliation)) = &result {
            self.inner.lock().await.running_since = None;
            let _ = self
                .events
                .send(ConsoleEvent::StatusChanged(SessionStatus::Stopped));
            if *reconciliation == StopReconciliation::BackendStillRunning {
                let _ = self.events.send(ConsoleEvent::StatusDiscrepancy {
                    local: SessionStatus::Stopped,
                    backend: SessionStatus::Running,
                });
            }
        }
        result
    }

    pub async fn close_all(&self) -> CommandResult {
        self.dispatcher.close_all().await
    }

    pub async fn cancel_all(&self) -> CommandResult {
        self.dispatcher.cancel_all().await
    }

    pub async fn account(&self) -> Result<AccountDetail, BackendError> {
        self.telemetry.fetch_account().await
    }

    pub async fn set_planner_target(&self, target_volume: f64) -> Result<(), String> {
        self.inner.lock().await.planner.set_target(target_volume)
    }

    pub async fn toggle_planner(&self) -> bool {
        self.inner.lock().await.planner.toggle()
    }

    pub async fn view(&self) -> ConsoleView {
        let status = self.session.status();
        let config = self.session.config().await;
        let logs = self.log.snapshot().await;
        let guard = self.inner.lock().await;

        let price = guard
            .price
            .as_ref()
            .filter(|(symbol, _)| *symbol == config.ticker)
            .map(|(_, price)| *price)
            .filter(|price| *price > 0.0);
        let order_notional = price.map(|p| config.quantity * p);
        let spread_in_price = price
            .filter(|_| !config.boost_mode)
            .map(|p| config.spread * p);

        ConsoleView {
            status,
            controls: ControlAvailability::for_status(status),
            in_flight: self.dispatcher.in_flight(),
            catalog: guard.catalog.clone(),
            snapshot: guard.snapshot.clone(),
            telemetry_stale: telemetry_stale(
                status,
                guard.snapshot_at,
                guard.running_since,
                self.settings.stale_after,
                Instant::now(),
            ),
            price,
            order_notional,
            spread_in_price,
            planner: guard.planner,
            projection: guard
                .planner
                .projection(guard.snapshot.as_ref(), self.settings.fee_rate),
            logs,
            log_stream_open: guard.log_stream_open,
            config,
        }
    }
}

fn telemetry_stale(
    status: SessionStatus,
    snapshot_at: Option<Instant>,
    running_since: Option<Instant>,
    stale_after: Duration,
    now: Instant,
) -> bool {
    if !status.is_running() {
        return false;
    }
    let reference = match (snapshot_at, running_since) {
        (Some(snapshot), Some(since)) => Some(snapshot.max(since)),
        (snapshot, since) => snapshot.or(since),
    };
    reference.map_or(false, |at| now.saturating_duration_since(at) > stale_after)
}

async fn run_feed_consumer(
    inner: Arc<Mutex<ConsoleState>>,
    log: Arc<LogBook>,
    events: broadcast::Sender<ConsoleEvent>,
    mut feed_rx: mpsc::Receiver<FeedEvent>,
) {
    while let Some(event) = feed_rx.recv().await {
        match event {
            FeedEvent::Stats(Ok(snapshot)) => {
                {
                    let mut guard = inner.lock().await;
                    guard.snapshot = Some(snapshot.clone());
                    guard.snapshot_at = Some(Instant::now());
                }
                let _ = events.send(ConsoleEvent::SnapshotUpdated(snapshot));
            }
            FeedEvent::Stats(Err(reason)) => {
                let _ = events.send(ConsoleEvent::PollFailed(reason));
            }
            FeedEvent::Log(entry) => log.record(entry).await,
            FeedEvent::LogStreamClosed(reason) => {
                inner.lock().await.log_stream_open = false;
                let text = match &reason {
                    Some(reason) => format!("log stream closed: {reason}"),
                    None => "log stream closed by backend".to_string(),
                };
                log.warning(text).await;
                let _ = events.send(ConsoleEvent::LogStreamClosed(reason));
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;

//! In-process fake of the trading backend for tests.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::{
    net::TcpListener,
    sync::{broadcast, Mutex},
};

use crate::transport::{BackendApi, HttpBackend};

/// Sending this line makes the fake close the websocket from its side.
pub(crate) const CLOSE_STREAM: &str = "__close_stream__";

pub(crate) struct FakeState {
    pub status_body: Mutex<String>,
    pub products_body: Mutex<String>,
    pub price_body: Mutex<String>,
    pub stats_body: Mutex<String>,
    pub account_body: Mutex<String>,
    pub start_body: Mutex<String>,
    pub stop_body: Mutex<String>,
    pub close_body: Mutex<String>,
    pub cancel_body: Mutex<String>,
    pub command_delay: Mutex<Duration>,
    pub status_hits: AtomicUsize,
    pub stats_hits: AtomicUsize,
    pub start_hits: AtomicUsize,
    pub stop_hits: AtomicUsize,
    pub close_hits: AtomicUsize,
    pub cancel_hits: AtomicUsize,
    pub price_symbols: Mutex<Vec<String>>,
    pub start_payloads: Mutex<Vec<Value>>,
    pub ws_lines: broadcast::Sender<String>,
    pub ws_connections: AtomicUsize,
    pub ws_disconnects: AtomicUsize,
}

#[derive(Clone)]
pub(crate) struct FakeBackend {
    pub state: Arc<FakeState>,
    pub url: String,
}

pub(crate) fn stats_json(volume: f64, volume_rate_min: f64) -> Value {
    json!({
        "pnl": 12.5,
        "equity": 1012.5,
        "health": 87.0,
        "liq_price": 0.0,
        "active_pos": 0.0,
        "volume": volume,
        "volume_rate_min": volume_rate_min,
        "active_orders": [
            {"side": "buy", "price": 3100.5, "size": 0.05, "id": "o-1"},
            {"side": "sell", "price": 3102.0, "size": 0.05, "id": "o-2"}
        ],
        "trades": [
            {"side": "buy", "price": 3101.0, "size": 0.05, "time": "12:00:01"}
        ]
    })
}

impl FakeBackend {
    pub async fn spawn() -> Self {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let (ws_lines, _) = broadcast::channel(64);
        let state = Arc::new(FakeState {
            status_body: Mutex::new(json!({"status": "stopped"}).to_string()),
            products_body: Mutex::new(
                json!({
                    "status": "success",
                    "products": [
                        {"symbol": "ETH-PERP", "id": 4, "min_size": "0.01"},
                        {"symbol": "BTC-PERP", "id": 2, "min_size": "0.001"}
                    ]
                })
                .to_string(),
            ),
            price_body: Mutex::new(json!({"price": 3000.0}).to_string()),
            stats_body: Mutex::new(stats_json(400_000.0, 5_000.0).to_string()),
            account_body: Mutex::new(json!({"error": "Bot not running"}).to_string()),
            start_body: Mutex::new(json!({"status": "started", "config": {}}).to_string()),
            stop_body: Mutex::new(json!({"status": "stopped"}).to_string()),
            close_body: Mutex::new(json!({"status": "no_position"}).to_string()),
            cancel_body: Mutex::new(json!({"status": "cancelled"}).to_string()),
            command_delay: Mutex::new(Duration::ZERO),
            status_hits: AtomicUsize::new(0),
            stats_hits: AtomicUsize::new(0),
            start_hits: AtomicUsize::new(0),
            stop_hits: AtomicUsize::new(0),
            close_hits: AtomicUsize::new(0),
            cancel_hits: AtomicUsize::new(0),
            price_symbols: Mutex::new(Vec::new()),
            start_payloads: Mutex::new(Vec::new()),
            ws_lines,
            ws_connections: AtomicUsize::new(0),
            ws_disconnects: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/status", get(handle_status))
            .route("/products", get(handle_products))
            .route("/price/:symbol", get(handle_price))
            .route("/stats", get(handle_stats))
            .route("/account", get(handle_account))
            .route("/start", post(handle_start))
            .route("/stop", post(handle_stop))
            .route("/close_all", post(handle_close_all))
            .route("/cancel_all", post(handle_cancel_all))
            .route("/ws", get(handle_ws))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            state,
            url: format!("http://{addr}"),
        }
    }

    pub fn api(&self) -> Arc<dyn BackendApi> {
        Arc::new(HttpBackend::new(&self.url, Duration::from_secs(2)).expect("backend"))
    }

    pub async fn set_status(&self, status: &str) {
        *self.state.status_body.lock().await = json!({ "status": status }).to_string();
    }

    pub async fn set_stats(&self, body: Value) {
        *self.state.stats_body.lock().await = body.to_string();
    }

    pub async fn set_stats_raw(&self, body: &str) {
        *self.state.stats_body.lock().await = body.to_string();
    }

    pub async fn set_start_reply(&self, body: &str) {
        *self.state.start_body.lock().await = body.to_string();
    }

    pub async fn set_stop_reply(&self, body: &str) {
        *self.state.stop_body.lock().await = body.to_string();
    }

    pub async fn set_close_reply(&self, body: &str) {
        *self.state.close_body.lock().await = body.to_string();
    }

    pub async fn set_cancel_reply(&self, body: &str) {
        *self.state.cancel_body.lock().await = body.to_string();
    }

    pub async fn set_account_reply(&self, body: Value) {
        *self.state.account_body.lock().await = body.to_string();
    }

    pub async fn set_command_delay(&self, delay: Duration) {
        *self.state.command_delay.lock().await = delay;
    }

    pub fn push_log(&self, line: &str) {
        let _ = self.state.ws_lines.send(line.to_string());
    }

    pub fn hits(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Polls `cond` every 10ms until it holds or `timeout` elapses.
pub(crate) async fn wait_until<F>(mut cond: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn json_reply(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn command_reply(state: &FakeState, slot: &Mutex<String>) -> Response {
    let delay = *state.command_delay.lock().await;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    json_reply(slot.lock().await.clone())
}

async fn handle_status(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    state.status_hits.fetch_add(1, Ordering::SeqCst);
    json_reply(state.status_body.lock().await.clone())
}

async fn handle_products(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    json_reply(state.products_body.lock().await.clone())
}

async fn handle_price(
    State(state): State<Arc<FakeState>>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    state.price_symbols.lock().await.push(symbol);
    json_reply(state.price_body.lock().await.clone())
}

async fn handle_stats(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    state.stats_hits.fetch_add(1, Ordering::SeqCst);
    json_reply(state.stats_body.lock().await.clone())
}

async fn handle_account(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    json_reply(state.account_body.lock().await.clone())
}

async fn handle_start(
    State(state): State<Arc<FakeState>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    state.start_hits.fetch_add(1, Ordering::SeqCst);
    state.start_payloads.lock().await.push(payload);
    command_reply(&state, &state.start_body).await
}

async fn handle_stop(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    state.stop_hits.fetch_add(1, Ordering::SeqCst);
    command_reply(&state, &state.stop_body).await
}

async fn handle_close_all(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    state.close_hits.fetch_add(1, Ordering::SeqCst);
    command_reply(&state, &state.close_body).await
}

async fn handle_cancel_all(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    state.cancel_hits.fetch_add(1, Ordering::SeqCst);
    command_reply(&state, &state.cancel_body).await
}

async fn handle_ws(ws: WebSocketUpgrade, State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_log_socket(socket, state))
}

async fn serve_log_socket(socket: WebSocket, state: Arc<FakeState>) {
    let mut lines = state.ws_lines.subscribe();
    state.ws_connections.fetch_add(1, Ordering::SeqCst);
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Ok(line) if line == CLOSE_STREAM => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
                Ok(line) => {
                    if sender.send(Message::Text(line)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    state.ws_disconnects.fetch_add(1, Ordering::SeqCst);
}

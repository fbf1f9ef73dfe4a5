use std::time::Duration;

use futures::{SinkExt, StreamExt};
use shared::domain::LogEntry;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use url::Url;

use crate::{error::BackendError, events::FeedEvent};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Owns the backend log websocket for the lifetime of a mounted console.
///
/// Each text message becomes one [`LogEntry`] on the feed channel. The
/// connection is released on [`LogStreamListener::shutdown`] (close frame,
/// then wait) or, failing that, on drop (task aborted, socket dropped).
pub struct LogStreamListener {
    url: Url,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LogStreamListener {
    /// Opens the stream. The websocket handshake must finish within
    /// `handshake_timeout`.
    pub async fn connect(
        url: Url,
        handshake_timeout: Duration,
        feed: mpsc::Sender<FeedEvent>,
    ) -> Result<Self, BackendError> {
        let (ws_stream, _) = tokio::time::timeout(handshake_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| BackendError::LogStream {
                url: url.to_string(),
                reason: format!("handshake timed out after {handshake_timeout:?}"),
            })?
            .map_err(|err| BackendError::LogStream {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        info!(%url, "log stream: connected");
        let (mut writer, mut reader) = ws_stream.split();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let closed_reason = loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        let _ = writer.send(Message::Close(None)).await;
                        let _ = writer.close().await;
                        return;
                    }
                    msg = reader.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if feed.send(FeedEvent::Log(LogEntry::from_backend(text))).await.is_err() {
                                let _ = writer.send(Message::Close(None)).await;
                                return;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break None,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => break Some(format!("websocket receive failed: {err}")),
                    }
                }
            };
            warn!(reason = ?closed_reason, "log stream: closed by backend");
            let _ = feed.send(FeedEvent::LogStreamClosed(closed_reason)).await;
        });

        Ok(Self {
            url,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Sends a close frame and waits briefly for the reader task to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!(url = %self.url, "log stream: close timed out, aborting");
                task.abort();
            }
        }
        info!(url = %self.url, "log stream: released");
    }
}

impl Drop for LogStreamListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/log_stream_tests.rs"]
mod tests;

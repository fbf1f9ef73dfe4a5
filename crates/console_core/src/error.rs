use thiserror::Error;

/// Failure of a single backend round-trip.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid backend url '{url}': {reason}")]
    Url { url: String, reason: String },
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} returned HTTP {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },
    #[error("{path} returned an undecodable body: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} returned an unusable body: {reason}")]
    Malformed { path: String, reason: String },
    #[error("failed to open log stream {url}: {reason}")]
    LogStream { url: String, reason: String },
}

impl BackendError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when the request never produced a response body.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BackendError::Client(_) | BackendError::Transport { .. } | BackendError::LogStream { .. }
        )
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::{
    domain::StrategyConfig,
    protocol::{
        AccountResponse, PriceResponse, ProductsResponse, RawReply, StatsResponse, StatusResponse,
    },
};
use tracing::debug;
use url::Url;

use crate::error::BackendError;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";

/// Request/response surface of the trading backend.
///
/// Queries decode into wire types and fail on transport or decode errors.
/// Control commands only fail on transport errors: whatever body comes back
/// is handed to the caller so it can be classified and shown verbatim.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn status(&self) -> Result<StatusResponse, BackendError>;
    async fn products(&self) -> Result<ProductsResponse, BackendError>;
    async fn price(&self, symbol: &str) -> Result<PriceResponse, BackendError>;
    async fn stats(&self) -> Result<StatsResponse, BackendError>;
    async fn account(&self) -> Result<AccountResponse, BackendError>;
    async fn start(&self, config: &StrategyConfig) -> Result<RawReply, BackendError>;
    async fn stop(&self) -> Result<RawReply, BackendError>;
    async fn close_all(&self) -> Result<RawReply, BackendError>;
    async fn cancel_all(&self) -> Result<RawReply, BackendError>;
    fn log_stream_url(&self) -> Result<Url, BackendError>;
}

pub struct HttpBackend {
    http: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, BackendError> {
        let parsed = Url::parse(base_url).map_err(|err| BackendError::Url {
            url: base_url.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackendError::Url {
                url: base_url.to_string(),
                reason: "backend url must start with http:// or https://".into(),
            });
        }
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(BackendError::Client)?;
        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Url {
                url: self.base_url.to_string(),
                reason: "backend url cannot carry a path".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, BackendError> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        debug!(%path, "backend query");
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                path: path.clone(),
                source,
            })?;
        let status = res.status();
        let body = res.text().await.map_err(|source| BackendError::Transport {
            path: path.clone(),
            source,
        })?;
        if !status.is_success() {
            return Err(BackendError::Status {
                path,
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|source| BackendError::Decode { path, source })
    }

    async fn post_command(
        &self,
        segment: &str,
        payload: Option<&StrategyConfig>,
    ) -> Result<RawReply, BackendError> {
        let url = self.endpoint(&[segment])?;
        let path = url.path().to_string();
        debug!(%path, "backend command");
        let mut request = self.http.post(url);
        if let Some(payload) = payload {
            request = request.json(payload);
        }
        let res = request
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                path: path.clone(),
                source,
            })?;
        let body = res
            .text()
            .await
            .map_err(|source| BackendError::Transport { path, source })?;
        Ok(RawReply::parse(body))
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn status(&self) -> Result<StatusResponse, BackendError> {
        self.get_json(&["status"]).await
    }

    async fn products(&self) -> Result<ProductsResponse, BackendError> {
        self.get_json(&["products"]).await
    }

    async fn price(&self, symbol: &str) -> Result<PriceResponse, BackendError> {
        self.get_json(&["price", symbol]).await
    }

    async fn stats(&self) -> Result<StatsResponse, BackendError> {
        self.get_json(&["stats"]).await
    }

    async fn account(&self) -> Result<AccountResponse, BackendError> {
        self.get_json(&["account"]).await
    }

    async fn start(&self, config: &StrategyConfig) -> Result<RawReply, BackendError> {
        self.post_command("start", Some(config)).await
    }

    async fn stop(&self) -> Result<RawReply, BackendError> {
        self.post_command("stop", None).await
    }

    async fn close_all(&self) -> Result<RawReply, BackendError> {
        self.post_command("close_all", None).await
    }

    async fn cancel_all(&self) -> Result<RawReply, BackendError> {
        self.post_command("cancel_all", None).await
    }

    fn log_stream_url(&self) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&["ws"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| BackendError::Url {
            url: self.base_url.to_string(),
            reason: format!("cannot derive {scheme} url"),
        })?;
        Ok(url)
    }
}

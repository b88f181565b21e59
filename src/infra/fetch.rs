//! HTTP retrieval of remote assets.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::config::FetchSettings;
use crate::engine::{AssetError, RemoteFetch};

use super::error::InfraError;

const METRIC_REMOTE_FETCH: &str = "trellis_remote_fetch_total";

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_seconds.get()))
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteFetch for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Bytes, AssetError> {
        let response = self.client.get(url.clone()).send().await.map_err(|err| {
            counter!(METRIC_REMOTE_FETCH, "result" => "transport_error").increment(1);
            warn!(url = %url, error = %err, "Remote asset request failed");
            AssetError::remote_transport(url.as_str(), err.to_string())
        })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            counter!(METRIC_REMOTE_FETCH, "result" => "status_error").increment(1);
            warn!(url = %url, status = status.as_u16(), "Remote asset rejected");
            return Err(AssetError::remote_status(url.as_str(), status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| AssetError::remote_transport(url.as_str(), err.to_string()))?;
        counter!(METRIC_REMOTE_FETCH, "result" => "ok").increment(1);
        debug!(url = %url, bytes = body.len(), "Fetched remote asset");
        Ok(body)
    }
}

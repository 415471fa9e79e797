//! Remote client for an HTTP/JSON bridge
//!
//! The bridge exposes the three remote calls as plain HTTP endpoints:
//!
//! - `GET {base}/containers/{id}` returns a JSON array of [`PeerInfo`]
//! - `GET {base}/containers/{id}/messages?ids=..&access_hash=..` returns a JSON
//!   array of [`Message`]
//! - `POST {base}/blocks?offset=..&limit=..` with a JSON [`FileLocation`] body
//!   returns the raw block bytes, or `303 See Other` pointing at a CDN node
//!
//! Every request is authenticated with the worker's bearer token.

use super::{BlockPayload, Message, PeerHandle, PeerInfo, RemoteClient};
use crate::error::{Result, StreamError};
use crate::models::FileLocation;
use async_trait::async_trait;
use reqwest::{redirect, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Remote client speaking to an HTTP bridge
pub struct HttpRemoteClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpRemoteClient {
    /// Create a new client with a default 30 second request timeout
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, token, Duration::from_secs(30))
    }

    /// Create a new client with a custom request timeout
    pub fn with_timeout(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            // CDN redirects are reported to the caller, not followed
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| StreamError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpRemoteClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn check_status(status: StatusCode, call: &str) -> Result<()> {
        if status.is_success() {
            return Ok(());
        }
        warn!("Remote {} call failed: status={}", call, status);
        Err(StreamError::RemoteFetchError(format!(
            "{} returned status {}",
            call, status
        )))
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn get_container_info(&self, id: i64) -> Result<Vec<PeerInfo>> {
        let url = format!("{}/containers/{}", self.base_url, id);
        debug!("Fetching container info: url={}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        // The bridge answers 404 for containers it cannot see
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        Self::check_status(response.status(), "get_container_info")?;

        response
            .json::<Vec<PeerInfo>>()
            .await
            .map_err(|e| StreamError::UnexpectedResponseShape(format!("container info: {}", e)))
    }

    async fn get_messages_by_id(&self, peer: &PeerHandle, ids: &[i32]) -> Result<Vec<Message>> {
        let url = format!("{}/containers/{}/messages", self.base_url, peer.id);
        let ids = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        debug!("Fetching messages: url={}, ids={}", url, ids);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("ids", ids), ("access_hash", peer.access_hash.to_string())])
            .send()
            .await?;
        Self::check_status(response.status(), "get_messages_by_id")?;

        response
            .json::<Vec<Message>>()
            .await
            .map_err(|e| StreamError::UnexpectedResponseShape(format!("messages: {}", e)))
    }

    async fn fetch_block(&self, location: &FileLocation, offset: u64, limit: u32) -> Result<BlockPayload> {
        let url = format!("{}/blocks", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .query(&[("offset", offset.to_string()), ("limit", limit.to_string())])
            .json(location)
            .send()
            .await?;

        if response.status() == StatusCode::SEE_OTHER {
            let target = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            debug!("Block fetch redirected to CDN: {}", target);
            return Ok(BlockPayload::CdnRedirect { location: target });
        }
        Self::check_status(response.status(), "fetch_block")?;

        let data = response.bytes().await?;
        debug!(
            "Fetched block: media={}, offset={}, limit={}, size={}",
            location.id(),
            offset,
            limit,
            data.len()
        );
        Ok(BlockPayload::Bytes(data))
    }
}

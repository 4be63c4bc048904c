//! Authenticated HTTP client
//!
//! Issues bearer-authorized GETs against the assets host (manifest and shards)
//! and plain GETs against the backend status route. No retries happen here;
//! every failure goes straight back to the caller.

use crate::api::endpoints;
use crate::config::Config;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use ontosync_common::{BackendStatus, Manifest, ManifestEntry};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Raw shard body, chunk by chunk, in transfer order
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Supplies the bearer token for authorized requests.
///
/// Token acquisition (login flows, refresh) lives outside the engine; this is
/// the seam it plugs into.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// A fixed token, e.g. a development token from the config file
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Used when no token is configured; authorized calls fail with a clear error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToken;

#[async_trait]
impl TokenProvider for NoToken {
    async fn token(&self) -> Result<String> {
        Err(SyncError::token(
            "no token configured; set dev_token in the config file or ONTOSYNC_TOKEN",
        ))
    }
}

/// HTTP client for the assets host and the backend
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    pub fn new(tokens: Arc<dyn TokenProvider>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::config(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self { client, tokens })
    }

    /// Client using the configured timeout and development token.
    pub fn from_config(config: &Config) -> Result<Self> {
        let tokens: Arc<dyn TokenProvider> = match &config.dev_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(NoToken),
        };
        Self::new(tokens, Duration::from_secs(config.api_timeout_secs))
    }

    /// Ask the token provider for a bearer token.
    pub async fn token(&self) -> Result<String> {
        self.tokens.token().await
    }

    /// Fetch and parse `{base}/manifest.json`.
    #[instrument(skip(self, token))]
    pub async fn fetch_manifest(&self, base_url: &str, token: &str) -> Result<Manifest> {
        let url = endpoints::manifest_url(base_url);
        let manifest: Manifest = self.get_json(&url, Some(token), "manifest").await?;

        debug!(
            shards = manifest.files.len(),
            total_codes = manifest.total_codes(),
            "Fetched manifest"
        );
        Ok(manifest)
    }

    /// Open the body of one shard as a byte stream.
    #[instrument(skip(self, token, entry), fields(shard = %entry.name))]
    pub async fn fetch_shard(
        &self,
        base_url: &str,
        entry: &ManifestEntry,
        token: &str,
    ) -> Result<ByteStream> {
        let url = endpoints::shard_url(base_url, &entry.name);
        let response = self.get(&url, Some(token)).await?;

        let stream = response
            .bytes_stream()
            .map(move |chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| SyncError::network(url.clone(), e))
            })
            .boxed();

        Ok(stream)
    }

    /// Current backend status (`{status, version}`). Unauthenticated.
    #[instrument(skip(self))]
    pub async fn backend_status(&self, status_url: &str) -> Result<BackendStatus> {
        self.get_json(status_url, None, "backend status").await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: Option<&str>,
        context: &str,
    ) -> Result<T> {
        let body = self
            .get(url, token)
            .await?
            .text()
            .await
            .map_err(|e| SyncError::network(url, e))?;

        serde_json::from_str(&body).map_err(|e| SyncError::parse(context, e))
    }

    async fn get(&self, url: &str, token: Option<&str>) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| SyncError::network(url, e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let client = ApiClient::new(Arc::new(StaticToken::new("abc")), Duration::from_secs(5)).unwrap();
        assert_eq!(client.token().await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_missing_token() {
        let client = ApiClient::from_config(&Config::default()).unwrap();
        assert!(matches!(client.token().await, Err(SyncError::Token(_))));
    }

    #[tokio::test]
    async fn test_unreachable_manifest_is_network_error() {
        let client = ApiClient::new(Arc::new(NoToken), Duration::from_secs(2)).unwrap();
        let result = client.fetch_manifest("http://127.0.0.1:9", "token").await;
        assert!(matches!(result, Err(SyncError::Network { .. })));
    }
}

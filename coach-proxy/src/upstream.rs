//! Seam between the proxy and the model API.

use std::pin::Pin;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use coach_shared::CompletionRequest;
use futures_util::{Stream, StreamExt, TryStreamExt};
use thiserror::Error;
use tracing::debug;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// No HTTP status was obtained, or the body broke off mid-read.
    #[error("upstream transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError::Transport(e.to_string())
    }
}

/// Status plus an unread body. Buffered callers collect it with
/// [`UpstreamReply::text`]; streaming callers relay [`UpstreamReply::body`].
pub struct UpstreamReply {
    pub status: StatusCode,
    pub body: ByteStream,
}

impl UpstreamReply {
    pub fn new(status: StatusCode, body: ByteStream) -> Self {
        Self { status, body }
    }

    pub async fn text(mut self) -> Result<String, UpstreamError> {
        let mut collected = Vec::new();
        while let Some(chunk) = self.body.next().await {
            collected.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&collected).into_owned())
    }
}

impl std::fmt::Debug for UpstreamReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamReply")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Sends one completion request. Any HTTP status is `Ok`; only transport
    /// failures are `Err`.
    async fn send(&self, request: &CompletionRequest, credential: &str)
        -> Result<UpstreamReply, UpstreamError>;
}

/// OpenAI-compatible HTTP endpoint, e.g. `https://api.deepseek.com`.
pub struct HttpUpstream {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUpstream {
    pub fn new(base_url: &str) -> Self {
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        debug!(%endpoint, "upstream endpoint configured");
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(
        &self,
        request: &CompletionRequest,
        credential: &str,
    ) -> Result<UpstreamReply, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes_stream().map_err(UpstreamError::from).boxed();
        Ok(UpstreamReply::new(status, body))
    }
}

use anyhow::{Context, Result, anyhow, bail};
use bytes::Bytes;
use coach_shared::sse::SseDecoder;
use coach_shared::{
    ChatCompletion, ChatMessage, CompletionRequest, DEFAULT_MODEL, ErrorBody, ProxyRequest,
};
use futures_util::{Stream, StreamExt};
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::config::{ClientConfig, Endpoint};

pub struct CoachClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    model: Option<String>,
}

impl CoachClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        }
    }

    fn request(&self, messages: Vec<ChatMessage>, stream: bool) -> reqwest::RequestBuilder {
        match &self.endpoint {
            Endpoint::Proxy { url } => self.http.post(url).json(&ProxyRequest {
                messages,
                model: self.model.clone(),
                stream: Some(stream),
            }),
            Endpoint::Direct { url, api_key } => {
                let model = self.model.as_deref().unwrap_or(DEFAULT_MODEL);
                self.http
                    .post(url)
                    .bearer_auth(api_key)
                    .json(&CompletionRequest::new(model, messages, stream))
            }
        }
    }

    /// Buffered completion; returns the assistant's reply.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        info!(messages = messages.len(), "sending buffered chat request");
        let response = self
            .request(messages, false)
            .send()
            .await
            .context("failed to reach the chat endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(error_message(status, &body));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .context("chat endpoint returned an invalid completion")?;
        completion
            .content()
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("completion contained no message"))
    }

    /// Streaming completion. `on_delta` sees each text fragment as it
    /// arrives; the concatenated reply is returned at the end.
    pub async fn stream_chat<F>(&self, messages: Vec<ChatMessage>, on_delta: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        info!(messages = messages.len(), "sending streaming chat request");
        let response = self
            .request(messages, true)
            .send()
            .await
            .context("failed to reach the chat endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(error_message(status, &body));
        }

        read_deltas(response.bytes_stream(), on_delta).await
    }
}

/// The `error.message` of a structured error body, or `API Error: <status>`.
pub fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|body| body.error.message)
        .unwrap_or_else(|_| format!("API Error: {}", status.as_u16()))
}

/// Drives an [`SseDecoder`] over a byte stream.
///
/// Reading stops at the terminator frame or end of stream. A transport error
/// aborts with whatever was delivered so far already passed to `on_delta`.
pub async fn read_deltas<S, E, F>(stream: S, mut on_delta: F) -> Result<String>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::error::Error + Send + Sync + 'static,
    F: FnMut(&str),
{
    let mut decoder = SseDecoder::new();
    let mut reply = String::new();
    let mut stream = std::pin::pin!(stream);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("response stream interrupted")?;
        for delta in decoder.push(&chunk) {
            on_delta(&delta);
            reply.push_str(&delta);
        }
        if decoder.is_done() {
            break;
        }
    }
    for delta in decoder.finish() {
        on_delta(&delta);
        reply.push_str(&delta);
    }

    debug!(chars = reply.chars().count(), "stream finished");
    Ok(reply)
}

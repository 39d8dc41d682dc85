//! Scripted upstream for handler and retry tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use coach_shared::CompletionRequest;
use futures_util::{stream, StreamExt};

use crate::config::Config;
use crate::retry::RetryPolicy;
use crate::upstream::{Upstream, UpstreamError, UpstreamReply};

pub enum Scripted {
    Reply(StatusCode, Vec<&'static str>),
    Fail(&'static str),
}

impl Scripted {
    pub fn json(status: u16, body: &'static str) -> Self {
        Scripted::Reply(StatusCode::from_u16(status).unwrap(), vec![body])
    }

    pub fn chunks(status: u16, chunks: Vec<&'static str>) -> Self {
        Scripted::Reply(StatusCode::from_u16(status).unwrap(), chunks)
    }

    pub fn fail(message: &'static str) -> Self {
        Scripted::Fail(message)
    }
}

/// Answers each call with the next scripted outcome and records what it was
/// sent.
pub struct ScriptedUpstream {
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
    sent: Mutex<Vec<(CompletionRequest, String)>>,
}

impl ScriptedUpstream {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_call(&self) -> Option<(CompletionRequest, String)> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn send(
        &self,
        request: &CompletionRequest,
        credential: &str,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent
            .lock()
            .unwrap()
            .push((request.clone(), credential.to_owned()));

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Reply(status, chunks)) => {
                let body = stream::iter(
                    chunks
                        .into_iter()
                        .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes()))),
                )
                .boxed();
                Ok(UpstreamReply::new(status, body))
            }
            Some(Scripted::Fail(message)) => Err(UpstreamError::Transport(message.to_owned())),
            None => Err(UpstreamError::Transport("script exhausted".to_owned())),
        }
    }
}

pub fn config(credential: Option<&str>) -> Config {
    Config {
        bind_address: "127.0.0.1:0".into(),
        upstream_url: "http://upstream.invalid".into(),
        credential: credential.map(str::to_owned),
        default_model: coach_shared::DEFAULT_MODEL.into(),
        default_stream: false,
        retry: RetryPolicy::default(),
        log_level: "debug".into(),
        log_json: false,
    }
}

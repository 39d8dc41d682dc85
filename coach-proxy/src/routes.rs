//! HTTP surface: `POST /chat` and `GET /health`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use coach_shared::{CompletionRequest, ProxyRequest};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ProxyError;
use crate::proxy::{forward_buffered, forward_streaming, ProxyReply};
use crate::state::AppState;

pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat).fallback(method_not_allowed))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

/// The credential is checked before the body is parsed.
async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Result<ProxyReply, ProxyError> {
    let Some(credential) = state.config.credential.as_deref() else {
        return Err(ProxyError::MissingCredential);
    };

    let request: ProxyRequest = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::BadRequest(format!("invalid chat request: {e}")))?;

    let stream = request.stream.unwrap_or(state.config.default_stream);
    let model = request
        .model
        .filter(|model| !model.trim().is_empty())
        .unwrap_or_else(|| state.config.default_model.clone());
    let received = request.messages.len();
    let completion = CompletionRequest::new(model, request.messages, stream);

    info!(
        model = %completion.model,
        messages = completion.messages.len(),
        dropped_blank = received - completion.messages.len(),
        stream,
        "chat request"
    );

    if stream {
        forward_streaming(state.upstream.as_ref(), credential, &completion).await
    } else {
        forward_buffered(
            state.upstream.as_ref(),
            credential,
            state.config.retry,
            &completion,
        )
        .await
    }
}

//! Proxy error type.
//!
//! Handlers return `Result<_, ProxyError>`; [`IntoResponse`] turns each
//! variant into the status and `{ "error": { ... } }` body the client expects.
//! Raw upstream diagnostics only ever travel in `details`, never in the
//! primary message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coach_shared::ErrorBody;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

pub const MISSING_CREDENTIAL_MESSAGE: &str =
    "Server configuration error provided. API Key missing.";
pub const UNAVAILABLE_MESSAGE: &str =
    "The model provider is currently overloaded or unreachable. Please try again in a moment.";

#[derive(Debug, Error)]
pub enum ProxyError {
    /// No credential among the configured environment variables.
    #[error("upstream credential is not configured")]
    MissingCredential,

    /// The inbound body could not be read as a chat request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Upstream answered with a client error. Relayed with its own status.
    #[error("upstream rejected the request with status {status}")]
    UpstreamRejected { status: StatusCode, body: Value },

    /// Retries exhausted, or a streaming call failed.
    #[error("upstream unavailable: {details}")]
    UpstreamUnavailable { details: String },
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::MissingCredential => {
                error!("upstream credential missing; set DEEPSEEK_API_KEY");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new(MISSING_CREDENTIAL_MESSAGE)),
                )
                    .into_response()
            }
            ProxyError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::new(message))).into_response()
            }
            ProxyError::UpstreamRejected { status, body } => (status, Json(body)).into_response(),
            ProxyError::UpstreamUnavailable { details } => (
                StatusCode::BAD_GATEWAY,
                Json(ErrorBody::with_details(UNAVAILABLE_MESSAGE, details)),
            )
                .into_response(),
        }
    }
}

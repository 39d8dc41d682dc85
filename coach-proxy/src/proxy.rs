//! Forwarding of one chat request to the upstream, in either response mode.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use coach_shared::CompletionRequest;
use serde::de::IgnoredAny;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::ProxyError;
use crate::retry::{classify, AttemptOutcome, RetryPolicy};
use crate::upstream::{ByteStream, Upstream, UpstreamReply};

/// Successful proxy outcome.
pub enum ProxyReply {
    /// Upstream JSON body, relayed byte for byte.
    Json(String),
    /// Upstream SSE body, piped through untouched.
    EventStream(ByteStream),
}

impl IntoResponse for ProxyReply {
    fn into_response(self) -> Response {
        match self {
            ProxyReply::Json(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response(),
            ProxyReply::EventStream(stream) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/event-stream"),
                    (header::CACHE_CONTROL, "no-cache"),
                    (header::CONNECTION, "keep-alive"),
                ],
                Body::from_stream(stream),
            )
                .into_response(),
        }
    }
}

impl std::fmt::Debug for ProxyReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyReply::Json(body) => f.debug_tuple("Json").field(body).finish(),
            ProxyReply::EventStream(_) => f.write_str("EventStream(..)"),
        }
    }
}

/// Buffered mode: up to `policy.max_attempts` sequential attempts.
///
/// 2xx returns at once. 4xx is relayed without retrying. 5xx and transport
/// failures wait `policy.delay` and try again, except after the last attempt.
pub async fn forward_buffered(
    upstream: &dyn Upstream,
    credential: &str,
    policy: RetryPolicy,
    request: &CompletionRequest,
) -> Result<ProxyReply, ProxyError> {
    let mut last_error = String::from("no upstream attempt was made");

    for attempt in 1..=policy.max_attempts {
        info!(attempt, max_attempts = policy.max_attempts, "calling upstream");

        let failure = match upstream.send(request, credential).await {
            Ok(reply) => match classify(reply.status) {
                AttemptOutcome::Success => match read_json(reply).await {
                    Ok(body) => {
                        info!(attempt, "upstream completion received");
                        return Ok(ProxyReply::Json(body));
                    }
                    Err(details) => details,
                },
                AttemptOutcome::Terminal => {
                    let status = reply.status;
                    // Best effort: a body that is not JSON becomes `{}`.
                    let body = reply
                        .text()
                        .await
                        .ok()
                        .and_then(|text| serde_json::from_str(&text).ok())
                        .unwrap_or_else(|| json!({}));
                    warn!(attempt, status = status.as_u16(), "upstream rejected request, not retrying");
                    return Err(ProxyError::UpstreamRejected { status, body });
                }
                AttemptOutcome::Retryable => describe_failure(reply).await,
            },
            Err(e) => e.to_string(),
        };

        warn!(attempt, error = %failure, "upstream attempt failed");
        last_error = failure;

        if policy.should_wait_after(attempt) {
            tokio::time::sleep(policy.delay).await;
        }
    }

    error!(details = %last_error, "upstream retries exhausted");
    Err(ProxyError::UpstreamUnavailable {
        details: last_error,
    })
}

/// Streaming mode: a single attempt whose body is relayed as is.
pub async fn forward_streaming(
    upstream: &dyn Upstream,
    credential: &str,
    request: &CompletionRequest,
) -> Result<ProxyReply, ProxyError> {
    let reply = match upstream.send(request, credential).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "failed to open upstream stream");
            return Err(ProxyError::UpstreamUnavailable {
                details: e.to_string(),
            });
        }
    };

    if !reply.status.is_success() {
        let details = describe_failure(reply).await;
        error!(details = %details, "upstream refused stream");
        return Err(ProxyError::UpstreamUnavailable { details });
    }

    info!("relaying upstream event stream");
    Ok(ProxyReply::EventStream(reply.body))
}

/// Collects the body and checks that it is JSON, without re-serializing it.
async fn read_json(reply: UpstreamReply) -> Result<String, String> {
    let text = reply.text().await.map_err(|e| e.to_string())?;
    serde_json::from_str::<IgnoredAny>(&text)
        .map_err(|e| format!("upstream returned invalid JSON: {e}"))?;
    Ok(text)
}

async fn describe_failure(reply: UpstreamReply) -> String {
    let status = reply.status;
    let text = reply
        .text()
        .await
        .unwrap_or_else(|e| format!("<body unreadable: {e}>"));
    format!("upstream returned {}: {}", status.as_u16(), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Scripted, ScriptedUpstream};
    use coach_shared::{ChatMessage, DEFAULT_MODEL};
    use std::time::Duration;
    use tokio::time::Instant;

    const OK_BODY: &str = r#"{"id":"cmpl-1","choices":[{"message":{"role":"assistant","content":"Hello"}}]}"#;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(DEFAULT_MODEL, vec![ChatMessage::user("hi")], false)
    }

    fn delays(elapsed: Duration) -> u128 {
        elapsed.as_millis() / policy().delay.as_millis()
    }

    async fn buffered(upstream: &ScriptedUpstream) -> (Result<ProxyReply, ProxyError>, Duration) {
        let start = Instant::now();
        let result = forward_buffered(upstream, "sk-test", policy(), &request()).await;
        (result, start.elapsed())
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_has_no_delay() {
        let upstream = ScriptedUpstream::new([Scripted::json(200, OK_BODY)]);
        let (result, elapsed) = buffered(&upstream).await;

        match result.unwrap() {
            ProxyReply::Json(body) => assert_eq!(body, OK_BODY),
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(upstream.calls(), 1);
        assert_eq!(delays(elapsed), 0);
    }

    #[tokio::test]
    async fn success_body_is_relayed_byte_for_byte() {
        const UNSORTED: &str = r#"{"id":"cmpl-1","object":"chat.completion","choices":[],"created":1700000000,"usage":{"total_tokens":5,"prompt_tokens":3}}"#;
        let upstream = ScriptedUpstream::new([Scripted::json(200, UNSORTED)]);
        let reply = forward_buffered(&upstream, "sk-test", policy(), &request())
            .await
            .unwrap();

        let response = reply.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes, UNSORTED.as_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn two_server_errors_then_success() {
        let upstream = ScriptedUpstream::new([
            Scripted::json(503, "busy"),
            Scripted::json(503, "busy"),
            Scripted::json(200, r#"{"attempt":3}"#),
        ]);
        let (result, elapsed) = buffered(&upstream).await;

        match result.unwrap() {
            ProxyReply::Json(body) => assert_eq!(body, r#"{"attempt":3}"#),
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(upstream.calls(), 3);
        assert_eq!(delays(elapsed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_map_to_unavailable() {
        let upstream = ScriptedUpstream::new([
            Scripted::json(503, "busy 1"),
            Scripted::json(503, "busy 2"),
            Scripted::json(503, "busy 3"),
        ]);
        let (result, elapsed) = buffered(&upstream).await;

        match result {
            Err(ProxyError::UpstreamUnavailable { details }) => {
                assert_eq!(details, "upstream returned 503: busy 3")
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(upstream.calls(), 3);
        assert_eq!(delays(elapsed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_is_relayed_immediately() {
        let upstream = ScriptedUpstream::new([
            Scripted::json(404, r#"{"error":{"message":"Model Not Exist"}}"#),
            Scripted::json(200, OK_BODY),
        ]);
        let (result, elapsed) = buffered(&upstream).await;

        match result {
            Err(ProxyError::UpstreamRejected { status, body }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body["error"]["message"], "Model Not Exist");
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(upstream.calls(), 1);
        assert_eq!(delays(elapsed), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_with_non_json_body_becomes_empty_object() {
        let upstream = ScriptedUpstream::new([Scripted::json(401, "Unauthorized")]);
        let (result, _) = buffered(&upstream).await;

        match result {
            Err(ProxyError::UpstreamRejected { status, body }) => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(body, json!({}));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_retried() {
        let upstream = ScriptedUpstream::new([
            Scripted::fail("connection refused"),
            Scripted::json(200, OK_BODY),
        ]);
        let (result, elapsed) = buffered(&upstream).await;

        assert!(matches!(result, Ok(ProxyReply::Json(_))));
        assert_eq!(upstream.calls(), 2);
        assert_eq!(delays(elapsed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_with_invalid_json_is_retried() {
        let upstream = ScriptedUpstream::new([
            Scripted::json(200, "<html>gateway</html>"),
            Scripted::fail("connection reset"),
            Scripted::fail("connection reset"),
        ]);
        let (result, elapsed) = buffered(&upstream).await;

        match result {
            Err(ProxyError::UpstreamUnavailable { details }) => {
                assert!(details.contains("connection reset"), "{details}")
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(upstream.calls(), 3);
        assert_eq!(delays(elapsed), 2);
    }

    #[tokio::test]
    async fn credential_and_request_are_forwarded() {
        let upstream = ScriptedUpstream::new([Scripted::json(200, OK_BODY)]);
        forward_buffered(&upstream, "sk-test", policy(), &request())
            .await
            .unwrap();

        let (sent, credential) = upstream.last_call().unwrap();
        assert_eq!(credential, "sk-test");
        assert_eq!(sent, request());
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_failure_is_not_retried() {
        let upstream = ScriptedUpstream::new([
            Scripted::json(500, "internal"),
            Scripted::json(200, OK_BODY),
        ]);
        let start = Instant::now();
        let result = forward_streaming(&upstream, "sk-test", &request()).await;

        match result {
            Err(ProxyError::UpstreamUnavailable { details }) => {
                assert_eq!(details, "upstream returned 500: internal")
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(upstream.calls(), 1);
        assert_eq!(delays(start.elapsed()), 0);
    }

    #[tokio::test]
    async fn streaming_transport_failure_is_unavailable() {
        let upstream = ScriptedUpstream::new([Scripted::fail("dns error")]);
        let result = forward_streaming(&upstream, "sk-test", &request()).await;
        match result {
            Err(ProxyError::UpstreamUnavailable { details }) => {
                assert!(details.contains("dns error"))
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}

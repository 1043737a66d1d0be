use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap},
    response::Response,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::proxy::handlers::errors;
use crate::proxy::handlers::streaming::{build_stream_response, with_session_cookie};
use crate::proxy::mappers::stream::{
    create_client_stream, merge_client_stream, spawn_stream_inspector, split_upstream_stream,
    InspectorContext,
};
use crate::proxy::middleware::client_ip::extract_client_ip;
use crate::proxy::middleware::cors::normalize_origin;
use crate::proxy::rate_limit::WidgetRateLimiter;
use crate::proxy::sanitize;
use crate::proxy::state::AppState;
use crate::proxy::upstream::UpstreamChatRequest;

// The full pipeline: identity -> admission -> sanitize -> memory read ->
// dispatch -> tee into {transformer -> client, inspector -> memory}.
pub async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id: String =
        rand::Rng::sample_iter(rand::thread_rng(), &rand::distributions::Alphanumeric)
            .take(6)
            .map(char::from)
            .collect::<String>()
            .to_lowercase();

    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let normalized_origin = normalize_origin(origin.as_deref());

    let (session, set_cookie) = state.core.sessions.ensure_session(&headers);

    let client_ip = extract_client_ip(&headers);
    let bucket_key = WidgetRateLimiter::bucket_key(&session.user_id, &client_ip);
    let decision = state.core.rate_limiter.check(&bucket_key);
    if !decision.allowed {
        tracing::info!("[{}] Rate limit exceeded", trace_id);
        return with_session_cookie(
            errors::rate_limited_response(decision.retry_after_ms),
            set_cookie.as_deref(),
        );
    }

    let Ok(raw) = serde_json::from_slice::<Value>(&body) else {
        return with_session_cookie(errors::invalid_json_response(), set_cookie.as_deref());
    };
    let payload = match sanitize::parse_chat_payload(raw) {
        Ok(payload) => payload,
        Err(detail) => {
            return with_session_cookie(
                errors::validation_error_response(&detail),
                set_cookie.as_deref(),
            );
        }
    };
    let payload = sanitize::sanitize_payload(payload);

    tracing::info!(
        "[{}] Chat request | Messages: {} | Origin: {:?}",
        trace_id,
        payload.messages.len(),
        normalized_origin
    );

    let server_memory = state.core.memory.fetch(&session.user_id).await;

    let upstream_response = match state
        .core
        .upstream
        .dispatch_chat(UpstreamChatRequest {
            user_id: &session.user_id,
            origin: normalized_origin.as_deref(),
            payload: &payload,
            server_memory,
        })
        .await
    {
        Ok(response) => response,
        Err(e) => {
            return with_session_cookie(
                errors::upstream_error_response(&e.to_string()),
                set_cookie.as_deref(),
            );
        }
    };

    let branches = split_upstream_stream(upstream_response.bytes_stream());
    let (sources_tx, sources_rx) = mpsc::unbounded_channel();
    // Detached on purpose: the response must never wait on the inspector.
    let _inspector = spawn_stream_inspector(
        branches.inspect,
        sources_tx,
        InspectorContext {
            user_id: session.user_id.clone(),
            memory: state.core.memory.clone(),
            log_pii: state.config.log_pii,
            trace_id: trace_id.clone(),
        },
    );

    let client_stream = create_client_stream(branches.primary, trace_id);
    let merged = merge_client_stream(client_stream, sources_rx);

    build_stream_response(Body::from_stream(merged), set_cookie.as_deref())
}

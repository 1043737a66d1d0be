use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::proxy::handlers::errors;
use crate::proxy::handlers::streaming::with_session_cookie;
use crate::proxy::sanitize::MAX_DISPLAY_NAME_CHARS;
use crate::proxy::session::SessionService;
use crate::proxy::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionEcho {
    user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSessionPayload {
    #[serde(default)]
    display_name: Option<String>,
}

pub async fn handle_get_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session, set_cookie) = state.core.sessions.ensure_session(&headers);
    let display_name = SessionService::read_display_name(&headers);

    let mut response = Json(SessionEcho {
        user_id: session.user_id,
        display_name: display_name.clone(),
    })
    .into_response();

    if let Some(name) = display_name {
        if let Ok(value) = HeaderValue::from_str(&name) {
            response.headers_mut().insert("X-Chat-Display-Name", value);
        }
    }

    with_session_cookie(response, set_cookie.as_deref())
}

pub async fn handle_update_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // An empty or unreadable body just clears the display name.
    let raw: Value = serde_json::from_slice(&body).unwrap_or_else(|_| Value::Object(Default::default()));
    let payload: UpdateSessionPayload = match serde_json::from_value(raw) {
        Ok(payload) => payload,
        Err(e) => {
            return errors::validation_error_response(&format!("Invalid session payload: {}", e));
        }
    };

    let display_name = payload
        .display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    if let Some(name) = &display_name {
        if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
            return errors::validation_error_response(&format!(
                "Invalid session payload: displayName exceeds {} characters",
                MAX_DISPLAY_NAME_CHARS
            ));
        }
    }

    let (session, set_cookie) = state.core.sessions.ensure_session(&headers);
    let name_cookie = state
        .core
        .sessions
        .display_name_set_cookie(display_name.as_deref());

    let mut response = Json(SessionEcho {
        user_id: session.user_id,
        display_name,
    })
    .into_response();
    if let Ok(value) = HeaderValue::from_str(&name_cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }

    with_session_cookie(response, set_cookie.as_deref())
}

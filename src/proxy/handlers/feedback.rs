use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::proxy::handlers::errors;
use crate::proxy::handlers::streaming::with_session_cookie;
use crate::proxy::state::AppState;

const MAX_COMMENT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackPayload {
    message_id: String,
    rating: FeedbackRating,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedbackEntry {
    pub message_id: String,
    pub rating: FeedbackRating,
    pub comment: Option<String>,
    pub user_id: String,
    pub created_at: i64,
}

/// In-process feedback storage, keyed `userId:messageId` so a re-rating
/// overwrites the earlier one. Process-lifetime only by contract.
#[derive(Default)]
pub struct FeedbackStore {
    entries: DashMap<String, FeedbackEntry>,
}

impl FeedbackStore {
    pub fn record(&self, entry: FeedbackEntry) {
        let key = format!("{}:{}", entry.user_id, entry.message_id);
        self.entries.insert(key, entry);
    }

    pub fn get(&self, user_id: &str, message_id: &str) -> Option<FeedbackEntry> {
        self.entries
            .get(&format!("{}:{}", user_id, message_id))
            .map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub async fn handle_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (session, set_cookie) = state.core.sessions.ensure_session(&headers);

    let Ok(raw) = serde_json::from_slice::<Value>(&body) else {
        return with_session_cookie(errors::invalid_json_response(), set_cookie.as_deref());
    };
    let payload: FeedbackPayload = match serde_json::from_value(raw) {
        Ok(payload) => payload,
        Err(e) => {
            return with_session_cookie(
                errors::validation_error_response(&format!("Invalid feedback payload: {}", e)),
                set_cookie.as_deref(),
            );
        }
    };

    let message_id = payload.message_id.trim().to_string();
    if message_id.is_empty() {
        return with_session_cookie(
            errors::validation_error_response("Invalid feedback payload: messageId must not be empty"),
            set_cookie.as_deref(),
        );
    }
    let comment = payload
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(comment) = &comment {
        if comment.chars().count() > MAX_COMMENT_CHARS {
            return with_session_cookie(
                errors::validation_error_response(&format!(
                    "Invalid feedback payload: comment exceeds {} characters",
                    MAX_COMMENT_CHARS
                )),
                set_cookie.as_deref(),
            );
        }
    }

    if state.config.log_pii {
        tracing::info!(
            "Feedback received | Message: {} | Rating: {:?}",
            message_id,
            payload.rating
        );
    }

    state.core.feedback.record(FeedbackEntry {
        message_id,
        rating: payload.rating,
        comment,
        user_id: session.user_id,
        created_at: chrono::Utc::now().timestamp_millis(),
    });

    with_session_cookie(StatusCode::NO_CONTENT.into_response(), set_cookie.as_deref())
}

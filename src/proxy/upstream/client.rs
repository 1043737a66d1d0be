use reqwest::{header, Client};
use serde::Serialize;
use tokio::time::Duration;

use crate::error::{AppError, AppResult};
use crate::modules::system::config::WidgetConfig;
use crate::proxy::sanitize::{ChatPayload, ChatTurn, Role};

/// One outbound dispatch to the upstream chat service. The upstream contract
/// is latest-user-message + history (see DESIGN.md); `message` is always the
/// most recent user turn.
#[derive(Debug, Serialize)]
pub struct UpstreamChatBody {
    pub message: String,
    pub history: Vec<ChatTurn>,
    pub metadata: UpstreamMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub user_id: String,
    pub server_memory: Option<String>,
}

pub struct UpstreamChatRequest<'a> {
    pub user_id: &'a str,
    pub origin: Option<&'a str>,
    pub payload: &'a ChatPayload,
    pub server_memory: Option<String>,
}

pub(crate) fn build_chat_body(
    payload: &ChatPayload,
    user_id: &str,
    server_memory: Option<String>,
) -> Result<UpstreamChatBody, String> {
    let Some(latest_index) = payload
        .messages
        .iter()
        .rposition(|turn| turn.role == Role::User)
    else {
        return Err("No user message found to forward".to_string());
    };

    let message = payload.messages[latest_index].content.clone();
    let history = payload
        .messages
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != latest_index)
        .map(|(_, turn)| turn.clone())
        .collect();

    Ok(UpstreamChatBody {
        message,
        history,
        metadata: UpstreamMetadata {
            display_name: payload
                .metadata
                .as_ref()
                .and_then(|m| m.display_name.clone()),
            user_id: user_id.to_string(),
            server_memory,
        },
    })
}

pub struct UpstreamClient {
    chat_api_url: String,
    client: Client,
}

impl UpstreamClient {
    pub fn new(config: &WidgetConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(600))
            .build()
            .expect("Failed to create upstream HTTP client");

        Self {
            chat_api_url: config.chat_api_url.clone(),
            client,
        }
    }

    /// Issues the outbound request. A transport failure or non-2xx status is
    /// a hard failure surfaced with whatever error text the upstream gave;
    /// retries, if wanted, belong to a higher-level policy.
    pub async fn dispatch_chat(
        &self,
        request: UpstreamChatRequest<'_>,
    ) -> AppResult<reqwest::Response> {
        let body = build_chat_body(request.payload, request.user_id, request.server_memory)
            .map_err(AppError::Upstream)?;

        tracing::info!(
            "Forwarding chat request | Target: {} | History: {}",
            self.chat_api_url,
            body.history.len()
        );

        let response = self
            .client
            .post(&self.chat_api_url)
            .header(header::ACCEPT, "text/event-stream")
            .header("X-Widget-UserId", request.user_id)
            .header("X-Widget-Origin", request.origin.unwrap_or(""))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| {
                status
                    .canonical_reason()
                    .unwrap_or("upstream error")
                    .to_string()
            });
            tracing::error!(
                "Upstream chat error | Status: {} | {}",
                status.as_u16(),
                error_text
            );
            return Err(AppError::Upstream(format!(
                "Upstream chat service responded with {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::sanitize::ChatMetadata;

    fn turn(role: Role, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn latest_user_turn_becomes_message() {
        let payload = ChatPayload {
            messages: vec![
                turn(Role::System, "rules"),
                turn(Role::User, "first question"),
                turn(Role::Assistant, "first answer"),
                turn(Role::User, "second question"),
            ],
            metadata: None,
        };
        let body = build_chat_body(&payload, "u-1", None).expect("body");
        assert_eq!(body.message, "second question");
        assert_eq!(body.history.len(), 3);
        assert_eq!(body.history[1].content, "first question");
    }

    #[test]
    fn fails_without_any_user_turn() {
        let payload = ChatPayload {
            messages: vec![turn(Role::Assistant, "hello")],
            metadata: None,
        };
        let err = build_chat_body(&payload, "u-1", None).expect_err("should fail");
        assert!(err.contains("No user message"));
    }

    #[test]
    fn metadata_serializes_with_camel_case_and_null_memory() {
        let payload = ChatPayload {
            messages: vec![turn(Role::User, "hi")],
            metadata: Some(ChatMetadata {
                display_name: Some("Ada".to_string()),
            }),
        };
        let body = build_chat_body(&payload, "u-1", None).expect("body");
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["metadata"]["displayName"], "Ada");
        assert_eq!(value["metadata"]["userId"], "u-1");
        assert!(value["metadata"]["serverMemory"].is_null());
    }

    #[test]
    fn display_name_is_omitted_when_absent() {
        let payload = ChatPayload {
            messages: vec![turn(Role::User, "hi")],
            metadata: None,
        };
        let body = build_chat_body(&payload, "u-1", Some("summary".to_string())).expect("body");
        let value = serde_json::to_value(&body).expect("serialize");
        assert!(value["metadata"].get("displayName").is_none());
        assert_eq!(value["metadata"]["serverMemory"], "summary");
    }
}

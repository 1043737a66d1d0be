use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_CONTENT_CHARS: usize = 2000;
pub const MAX_TURNS: usize = 20;
pub const MAX_DISPLAY_NAME_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub metadata: Option<ChatMetadata>,
}

/// Schema validation for the inbound chat body. The error string becomes the
/// 422 response body verbatim.
pub fn parse_chat_payload(value: Value) -> Result<ChatPayload, String> {
    let payload: ChatPayload =
        serde_json::from_value(value).map_err(|e| format!("Invalid chat payload: {}", e))?;

    if payload.messages.is_empty() {
        return Err("Invalid chat payload: messages must not be empty".to_string());
    }
    for (i, turn) in payload.messages.iter().enumerate() {
        if turn.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(format!(
                "Invalid chat payload: messages[{}].content exceeds {} characters",
                i, MAX_CONTENT_CHARS
            ));
        }
    }
    if let Some(name) = payload
        .metadata
        .as_ref()
        .and_then(|m| m.display_name.as_ref())
    {
        if name.trim().chars().count() > MAX_DISPLAY_NAME_CHARS {
            return Err(format!(
                "Invalid chat payload: metadata.displayName exceeds {} characters",
                MAX_DISPLAY_NAME_CHARS
            ));
        }
    }

    Ok(payload)
}

pub fn sanitize_content(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

// Sliding window: the most recent `limit` turns survive, oldest dropped
// first, relative order preserved.
pub fn clamp_turns<T>(mut turns: Vec<T>, limit: usize) -> Vec<T> {
    let excess = turns.len().saturating_sub(limit);
    if excess > 0 {
        turns.drain(..excess);
    }
    turns
}

/// The sanitized payload is the only representation that travels downstream;
/// the raw input is discarded here.
pub fn sanitize_payload(payload: ChatPayload) -> ChatPayload {
    let messages = clamp_turns(payload.messages, MAX_TURNS)
        .into_iter()
        .map(|turn| ChatTurn {
            role: turn.role,
            content: sanitize_content(&turn.content),
        })
        .collect();
    let metadata = payload.metadata.map(|m| ChatMetadata {
        display_name: m
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty()),
    });

    ChatPayload { messages, metadata }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turn(role: Role, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn rejects_empty_message_list() {
        let err = parse_chat_payload(json!({ "messages": [] })).expect_err("should fail");
        assert!(err.contains("must not be empty"));
    }

    #[test]
    fn rejects_unknown_role() {
        let err = parse_chat_payload(json!({
            "messages": [{ "role": "robot", "content": "hi" }]
        }))
        .expect_err("should fail");
        assert!(err.starts_with("Invalid chat payload"));
    }

    #[test]
    fn rejects_oversized_content() {
        let err = parse_chat_payload(json!({
            "messages": [{ "role": "user", "content": "x".repeat(2001) }]
        }))
        .expect_err("should fail");
        assert!(err.contains("messages[0].content"));
    }

    #[test]
    fn rejects_oversized_display_name() {
        let err = parse_chat_payload(json!({
            "messages": [{ "role": "user", "content": "hi" }],
            "metadata": { "displayName": "n".repeat(81) }
        }))
        .expect_err("should fail");
        assert!(err.contains("displayName"));
    }

    #[test]
    fn accepts_all_three_roles() {
        let payload = parse_chat_payload(json!({
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hi" },
                { "role": "assistant", "content": "hello" }
            ]
        }))
        .expect("valid payload");
        assert_eq!(payload.messages.len(), 3);
    }

    #[test]
    fn strips_control_characters_and_trims() {
        assert_eq!(sanitize_content("hi\u{0007}there"), "hithere");
        assert_eq!(sanitize_content("  padded \u{0000}text  "), "padded text");
        assert_eq!(sanitize_content("\u{001F}\u{007F}"), "");
    }

    #[test]
    fn clamps_to_most_recent_turns_in_order() {
        let turns: Vec<ChatTurn> = (0..25)
            .map(|i| turn(Role::User, &format!("m{}", i)))
            .collect();
        let clamped = clamp_turns(turns, MAX_TURNS);
        assert_eq!(clamped.len(), 20);
        assert_eq!(clamped.first().unwrap().content, "m5");
        assert_eq!(clamped.last().unwrap().content, "m24");
    }

    #[test]
    fn clamp_is_noop_under_limit() {
        let turns = vec![turn(Role::User, "only")];
        assert_eq!(clamp_turns(turns, MAX_TURNS).len(), 1);
    }

    #[test]
    fn sanitize_payload_cleans_every_turn_and_display_name() {
        let payload = ChatPayload {
            messages: vec![turn(Role::User, " hi\u{0007} ")],
            metadata: Some(ChatMetadata {
                display_name: Some("  Ada  ".to_string()),
            }),
        };
        let sanitized = sanitize_payload(payload);
        assert_eq!(sanitized.messages[0].content, "hi");
        assert_eq!(
            sanitized.metadata.unwrap().display_name,
            Some("Ada".to_string())
        );
    }

    #[test]
    fn blank_display_name_is_dropped() {
        let payload = ChatPayload {
            messages: vec![turn(Role::User, "hi")],
            metadata: Some(ChatMetadata {
                display_name: Some("   ".to_string()),
            }),
        };
        let sanitized = sanitize_payload(payload);
        assert_eq!(sanitized.metadata.unwrap().display_name, None);
    }
}

use bytes::Bytes;
use serde_json::Value;

// Client-facing data-stream framing: one `<code>:<json>\n` line per part.
// The widget's reader dispatches on the leading code, so these encodings are
// a wire contract, not a presentation choice.

pub fn text_part(token: &str) -> Bytes {
    Bytes::from(format!("0:{}\n", Value::String(token.to_string())))
}

pub fn data_part(values: &Value) -> Bytes {
    Bytes::from(format!("2:{}\n", Value::Array(vec![values.clone()])))
}

pub fn error_part(message: &str) -> Bytes {
    Bytes::from(format!("3:{}\n", Value::String(message.to_string())))
}

pub fn finish_part() -> Bytes {
    Bytes::from_static(b"d:{\"finishReason\":\"stop\"}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_part_json_escapes_token() {
        assert_eq!(text_part("Hel"), Bytes::from("0:\"Hel\"\n"));
        assert_eq!(text_part("a\"b\n"), Bytes::from("0:\"a\\\"b\\n\"\n"));
    }

    #[test]
    fn data_part_wraps_value_in_array() {
        let part = data_part(&json!({ "type": "sources", "sources": [] }));
        assert_eq!(
            part,
            Bytes::from("2:[{\"sources\":[],\"type\":\"sources\"}]\n")
        );
    }

    #[test]
    fn error_part_carries_message_as_json_string() {
        assert_eq!(error_part("boom"), Bytes::from("3:\"boom\"\n"));
    }

    #[test]
    fn finish_part_reports_stop_reason() {
        assert_eq!(finish_part(), Bytes::from("d:{\"finishReason\":\"stop\"}\n"));
    }
}

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

// Rejection builders for the pipeline's error taxonomy. CORS headers are
// attached by the middleware on the way out, so every one of these reaches
// the browser readable.

pub fn invalid_json_response() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid JSON").into_response()
}

pub fn validation_error_response(detail: &str) -> Response {
    (StatusCode::UNPROCESSABLE_ENTITY, detail.to_string()).into_response()
}

pub fn rate_limited_response(retry_after_ms: Option<u64>) -> Response {
    match retry_after_ms {
        Some(ms) => {
            let retry_after_secs = ((ms + 999) / 1000).max(1);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                "Rate limit exceeded",
            )
                .into_response()
        }
        None => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response(),
    }
}

pub fn upstream_error_response(message: &str) -> Response {
    (StatusCode::BAD_GATEWAY, message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        let response = rate_limited_response(Some(1200));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn retry_after_is_always_positive() {
        let response = rate_limited_response(Some(0));
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "1");
    }

    #[test]
    fn missing_hint_omits_header() {
        let response = rate_limited_response(None);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn validation_detail_becomes_body() {
        let response = validation_error_response("messages must not be empty");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

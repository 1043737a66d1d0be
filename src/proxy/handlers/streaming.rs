use axum::{
    body::Body,
    http::{header, HeaderValue},
    response::Response,
};

/// Response envelope for the translated stream. `X-Accel-Buffering: no`
/// keeps intermediary proxies from batching the deltas;
/// `X-Experimental-Stream-Data` tells the widget reader that side-channel
/// frames may be interleaved.
pub fn build_stream_response(body: Body, set_cookie: Option<&str>) -> Response {
    let mut builder = Response::builder()
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Cache-Control", "no-cache")
        .header("X-Accel-Buffering", "no")
        .header("X-Experimental-Stream-Data", "true");

    if let Some(cookie) = set_cookie {
        builder = builder.header(header::SET_COOKIE, cookie);
    }

    builder.body(body).unwrap()
}

pub fn with_session_cookie(mut response: Response, set_cookie: Option<&str>) -> Response {
    if let Some(cookie) = set_cookie {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn stream_response_carries_streaming_headers_and_cookie() {
        let response = build_stream_response(Body::empty(), Some("cw_session=abc; Path=/"));
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers().get("X-Accel-Buffering").unwrap(), "no");
        assert_eq!(
            response.headers().get(header::SET_COOKIE).unwrap(),
            "cw_session=abc; Path=/"
        );
    }

    #[test]
    fn with_session_cookie_appends_without_clobbering() {
        let base = (
            StatusCode::OK,
            [(header::SET_COOKIE, "cw_display_name=QWRh; Path=/")],
            "ok",
        )
            .into_response();
        let response = with_session_cookie(base, Some("cw_session=abc; Path=/"));
        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn with_session_cookie_is_noop_when_absent() {
        let response = with_session_cookie((StatusCode::OK, "ok").into_response(), None);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}

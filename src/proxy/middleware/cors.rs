use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::modules::system::config::WidgetConfig;
use crate::proxy::state::AppState;

const ALLOWED_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept, Authorization";
const ALLOWED_METHODS: &str = "GET,POST,OPTIONS";

// Keeps only scheme://host[:port]; default ports disappear with the url
// crate's `port()`, which matches how browsers send the Origin header.
pub fn normalize_origin(origin: Option<&str>) -> Option<String> {
    let raw = origin?;
    let url = url::Url::parse(raw).ok()?;
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

pub fn is_origin_allowed(origin: Option<&str>, allowed_origins: &[String]) -> bool {
    let Some(raw) = origin else {
        // Same-origin or non-browser caller.
        return true;
    };
    let Some(normalized) = normalize_origin(Some(raw)) else {
        return false;
    };
    if allowed_origins.is_empty() {
        return true;
    }
    allowed_origins.iter().any(|o| o == &normalized)
}

fn allow_origin_value(origin: Option<&str>, config: &WidgetConfig) -> String {
    let normalized = normalize_origin(origin);
    let allow = if config.allowed_origins.is_empty() {
        normalized.or_else(|| Some("*".to_string()))
    } else {
        match normalized {
            Some(n) if config.allowed_origins.iter().any(|o| o == &n) => Some(n),
            _ => config.allowed_origins.first().cloned(),
        }
    };
    allow.unwrap_or_else(|| config.widget_base_url.clone())
}

pub fn apply_cors_headers(response: &mut Response, origin: Option<&str>, config: &WidgetConfig) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&allow_origin_value(origin, config)) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
}

// Denials short-circuit before any other component runs, and every response
// (rejections included) leaves with the full CORS header set so the browser
// can read the failure.
pub async fn cors_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    if !is_origin_allowed(origin.as_deref(), &state.config.allowed_origins) {
        tracing::warn!("Origin denied: {:?}", origin);
        let mut response = (StatusCode::FORBIDDEN, "Forbidden").into_response();
        apply_cors_headers(&mut response, origin.as_deref(), &state.config);
        return response;
    }

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(&mut response, origin.as_deref(), &state.config);
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(&mut response, origin.as_deref(), &state.config);
    response
}

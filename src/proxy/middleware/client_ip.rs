use axum::http::HeaderMap;

// First forwarded-for entry approximates the client IP without trusting it
// fully; it only widens the rate-limit key space. The gateway always sits
// behind the widget host's proxy, so the socket address is useless here.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| {
            raw.split(',')
                .map(str::trim)
                .find(|entry| !entry.is_empty())
                .map(ToString::to_string)
        })
        .unwrap_or_else(|| "local".to_string())
}

#[cfg(test)]
mod tests {
    use super::extract_client_ip;
    use axum::http::HeaderMap;

    #[test]
    fn takes_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.10, 198.51.100.4".parse().unwrap());
        assert_eq!(extract_client_ip(&headers), "203.0.113.10");
    }

    #[test]
    fn skips_empty_entries() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", " , 198.51.100.4".parse().unwrap());
        assert_eq!(extract_client_ip(&headers), "198.51.100.4");
    }

    #[test]
    fn falls_back_to_local_marker() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), "local");
    }
}

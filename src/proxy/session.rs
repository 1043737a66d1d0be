use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::modules::system::config::WidgetConfig;

pub const DISPLAY_NAME_COOKIE: &str = "cw_display_name";

type HmacSha256 = Hmac<Sha256>;

/// Identity minted once per browser and re-validated, never re-derived, on
/// every request. The cookie value is `base64url(json).base64url(hmac)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    pub user_id: String,
}

fn constant_time_str_eq(left: &str, right: &str) -> bool {
    let left_bytes = left.as_bytes();
    let right_bytes = right.as_bytes();
    let max_len = left_bytes.len().max(right_bytes.len());
    let mut diff = left_bytes.len() ^ right_bytes.len();

    for i in 0..max_len {
        let l = left_bytes.get(i).copied().unwrap_or(0);
        let r = right_bytes.get(i).copied().unwrap_or(0);
        diff |= (l ^ r) as usize;
    }

    diff == 0
}

fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for pair in raw.split(';') {
            let pair = pair.trim();
            if let Some((key, val)) = pair.split_once('=') {
                if key == name {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}

pub struct SessionService {
    cookie_name: String,
    secret: String,
    max_age_days: u32,
    secure: bool,
}

impl SessionService {
    pub fn new(config: &WidgetConfig) -> Self {
        Self {
            cookie_name: config.session.cookie_name.clone(),
            secret: config.session.secret.clone(),
            max_age_days: config.session.max_age_days,
            secure: config.production,
        }
    }

    fn max_age_seconds(&self) -> u64 {
        u64::from(self.max_age_days) * 24 * 60 * 60
    }

    fn sign(&self, value: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(value.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    fn encode_payload(payload: &SessionPayload) -> String {
        let json = serde_json::to_string(payload).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    fn decode_payload(encoded: &str) -> Option<SessionPayload> {
        let raw = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    fn build_cookie_value(&self, payload: &SessionPayload) -> String {
        let encoded = Self::encode_payload(payload);
        let signature = self.sign(&encoded);
        format!("{}.{}", encoded, signature)
    }

    // Forgery, malformed base64 and broken JSON are all treated as absence.
    fn parse_cookie_value(&self, value: &str) -> Option<SessionPayload> {
        let (encoded, signature) = value.split_once('.')?;
        if encoded.is_empty() || signature.is_empty() {
            return None;
        }
        if !constant_time_str_eq(&self.sign(encoded), signature) {
            return None;
        }
        Self::decode_payload(encoded)
    }

    fn session_set_cookie(&self, payload: &SessionPayload) -> String {
        format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Lax; HttpOnly{}",
            self.cookie_name,
            self.build_cookie_value(payload),
            self.max_age_seconds(),
            if self.secure { "; Secure" } else { "" }
        )
    }

    /// Returns the verified identity, minting a fresh one (plus the
    /// Set-Cookie header to schedule) when the cookie is absent or invalid.
    /// An existing valid identity is never downgraded.
    pub fn ensure_session(&self, headers: &HeaderMap) -> (SessionPayload, Option<String>) {
        if let Some(existing) = read_cookie(headers, &self.cookie_name)
            .and_then(|value| self.parse_cookie_value(&value))
        {
            if !existing.user_id.is_empty() {
                return (existing, None);
            }
        }

        let fresh = SessionPayload {
            user_id: uuid::Uuid::new_v4().to_string(),
        };
        let set_cookie = self.session_set_cookie(&fresh);
        (fresh, Some(set_cookie))
    }

    /// The display-name cookie is advisory only: readable by client scripts,
    /// unsigned, outside the trust boundary.
    pub fn read_display_name(headers: &HeaderMap) -> Option<String> {
        let value = read_cookie(headers, DISPLAY_NAME_COOKIE)?;
        let raw = URL_SAFE_NO_PAD.decode(value).ok()?;
        String::from_utf8(raw).ok()
    }

    pub fn display_name_set_cookie(&self, display_name: Option<&str>) -> String {
        match display_name {
            Some(name) if !name.is_empty() => format!(
                "{}={}; Path=/; Max-Age={}; SameSite=Lax{}",
                DISPLAY_NAME_COOKIE,
                URL_SAFE_NO_PAD.encode(name),
                self.max_age_seconds(),
                if self.secure { "; Secure" } else { "" }
            ),
            _ => format!("{}=; Path=/; Max-Age=0; SameSite=Lax", DISPLAY_NAME_COOKIE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SessionService {
        SessionService::new(&WidgetConfig::default())
    }

    fn headers_with_cookie(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, value.parse().unwrap());
        headers
    }

    #[test]
    fn mints_identity_when_cookie_absent() {
        let svc = service();
        let (session, set_cookie) = svc.ensure_session(&HeaderMap::new());
        assert!(!session.user_id.is_empty());
        let cookie = set_cookie.expect("fresh session schedules a cookie write");
        assert!(cookie.starts_with("cw_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=2592000"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn secure_attribute_set_in_production() {
        let config = WidgetConfig {
            production: true,
            ..WidgetConfig::default()
        };
        let svc = SessionService::new(&config);
        let (_, set_cookie) = svc.ensure_session(&HeaderMap::new());
        assert!(set_cookie.unwrap().contains("; Secure"));
    }

    #[test]
    fn valid_cookie_round_trips_without_rewrite() {
        let svc = service();
        let payload = SessionPayload {
            user_id: "user-123".to_string(),
        };
        let cookie = format!("cw_session={}", svc.build_cookie_value(&payload));
        let (session, set_cookie) = svc.ensure_session(&headers_with_cookie(&cookie));
        assert_eq!(session, payload);
        assert!(set_cookie.is_none());
    }

    #[test]
    fn tampered_signature_is_treated_as_absent() {
        let svc = service();
        let payload = SessionPayload {
            user_id: "user-123".to_string(),
        };
        let mut value = svc.build_cookie_value(&payload);
        let last = value.pop().unwrap();
        value.push(if last == 'A' { 'B' } else { 'A' });
        let (session, set_cookie) = svc.ensure_session(&headers_with_cookie(&format!(
            "cw_session={}",
            value
        )));
        assert_ne!(session.user_id, "user-123");
        assert!(set_cookie.is_some());
    }

    #[test]
    fn tampered_payload_is_treated_as_absent() {
        let svc = service();
        let payload = SessionPayload {
            user_id: "user-123".to_string(),
        };
        let value = svc.build_cookie_value(&payload);
        let (_, signature) = value.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(r#"{"userId":"someone-else"}"#);
        let forged = format!("cw_session={}.{}", forged_payload, signature);
        let (session, _) = svc.ensure_session(&headers_with_cookie(&forged));
        assert_ne!(session.user_id, "someone-else");
    }

    #[test]
    fn garbage_cookie_is_treated_as_absent() {
        let svc = service();
        for garbage in ["cw_session=nodot", "cw_session=.", "cw_session=%%%.sig"] {
            let (session, set_cookie) = svc.ensure_session(&headers_with_cookie(garbage));
            assert!(!session.user_id.is_empty());
            assert!(set_cookie.is_some());
        }
    }

    #[test]
    fn display_name_cookie_round_trips() {
        let svc = service();
        let cookie = svc.display_name_set_cookie(Some("Ada"));
        let value = cookie
            .strip_prefix("cw_display_name=")
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let headers = headers_with_cookie(&format!("cw_display_name={}", value));
        assert_eq!(SessionService::read_display_name(&headers), Some("Ada".to_string()));
        assert!(!cookie.contains("HttpOnly"));
    }

    #[test]
    fn empty_display_name_deletes_cookie() {
        let svc = service();
        let cookie = svc.display_name_set_cookie(None);
        assert!(cookie.contains("Max-Age=0"));
    }
}

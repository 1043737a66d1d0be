use serde::{Deserialize, Serialize};

const DEFAULT_CHAT_API_URL: &str = "http://127.0.0.1:6060/api/chat";
const DEFAULT_WIDGET_BASE_URL: &str = "http://127.0.0.1:3003";
pub const DEV_SESSION_SECRET: &str = "development-session-secret-change-me";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_session_secret")]
    pub secret: String,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secret: default_session_secret(),
            max_age_days: default_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_rate_max_requests")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_rate_window_secs(),
            max_requests: default_rate_max_requests(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub redis_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    #[serde(default = "default_chat_api_url")]
    pub chat_api_url: String,
    #[serde(default = "default_widget_base_url")]
    pub widget_base_url: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub log_pii: bool,
    #[serde(default)]
    pub production: bool,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub allow_lan_access: bool,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            chat_api_url: default_chat_api_url(),
            widget_base_url: default_widget_base_url(),
            allowed_origins: Vec::new(),
            session: SessionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            memory: MemoryConfig::default(),
            log_pii: false,
            production: false,
            port: default_port(),
            allow_lan_access: false,
        }
    }
}

impl WidgetConfig {
    pub fn get_bind_address(&self) -> &str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}

fn default_chat_api_url() -> String {
    DEFAULT_CHAT_API_URL.to_string()
}

fn default_widget_base_url() -> String {
    DEFAULT_WIDGET_BASE_URL.to_string()
}

fn default_cookie_name() -> String {
    "cw_session".to_string()
}

fn default_session_secret() -> String {
    DEV_SESSION_SECRET.to_string()
}

fn default_max_age_days() -> u32 {
    30
}

fn default_rate_window_secs() -> u64 {
    300
}

fn default_rate_max_requests() -> u32 {
    45
}

fn default_port() -> u16 {
    8787
}

pub fn parse_env_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Runtime variants win over build-time values, matching the widget host's
// environment contract.
fn env_first(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| env_nonempty(name))
}

fn parse_allowed_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

pub fn load_widget_config() -> WidgetConfig {
    let mut config = WidgetConfig {
        production: env_nonempty("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false),
        ..WidgetConfig::default()
    };

    if let Some(url) = env_first(&["CHAT_API_URL_RUNTIME", "CHAT_API_URL"]) {
        config.chat_api_url = url;
    }
    if let Some(url) = env_first(&["WIDGET_BASE_URL_RUNTIME", "WIDGET_BASE_URL"]) {
        config.widget_base_url = url;
    }
    if let Some(raw) = env_first(&["ALLOWED_ORIGINS_RUNTIME", "ALLOWED_ORIGINS"]) {
        config.allowed_origins = parse_allowed_origins(&raw);
    }
    if let Some(name) = env_nonempty("SESSION_COOKIE_NAME") {
        config.session.cookie_name = name;
    }
    if let Some(secret) = env_nonempty("SESSION_COOKIE_SECRET") {
        config.session.secret = secret;
    }
    if let Some(days) = env_nonempty("SESSION_COOKIE_MAX_AGE_DAYS") {
        match days.parse::<u32>() {
            Ok(parsed) if parsed >= 1 => config.session.max_age_days = parsed,
            _ => tracing::warn!("Ignoring invalid SESSION_COOKIE_MAX_AGE_DAYS value: {}", days),
        }
    }
    if let Some(raw) = env_nonempty("SERVER_MEMORY_ENABLED") {
        match parse_env_bool(&raw) {
            Some(parsed) => config.memory.enabled = parsed,
            None => tracing::warn!("Ignoring invalid SERVER_MEMORY_ENABLED value: {}", raw),
        }
    }
    config.memory.redis_url = env_nonempty("MEMORY_REDIS_URL");
    config.memory.redis_token = env_nonempty("MEMORY_REDIS_TOKEN");
    if let Some(raw) = env_nonempty("RATE_LIMIT_WINDOW_SECS") {
        match raw.parse::<u64>() {
            Ok(parsed) if parsed > 0 => config.rate_limit.window_secs = parsed,
            _ => tracing::warn!("Ignoring invalid RATE_LIMIT_WINDOW_SECS value: {}", raw),
        }
    }
    if let Some(raw) = env_nonempty("RATE_LIMIT_MAX_REQUESTS") {
        match raw.parse::<u32>() {
            Ok(parsed) if parsed > 0 => config.rate_limit.max_requests = parsed,
            _ => tracing::warn!("Ignoring invalid RATE_LIMIT_MAX_REQUESTS value: {}", raw),
        }
    }
    if let Some(raw) = env_nonempty("LOG_PII") {
        match parse_env_bool(&raw) {
            Some(parsed) => config.log_pii = parsed,
            None => tracing::warn!("Ignoring invalid LOG_PII value: {}", raw),
        }
    }
    if let Some(raw) = env_nonempty("WIDGET_PORT") {
        match raw.parse::<u16>() {
            Ok(parsed) if parsed > 0 => config.port = parsed,
            _ => tracing::warn!("Ignoring invalid WIDGET_PORT value: {}", raw),
        }
    }
    if let Some(raw) = env_nonempty("ALLOW_LAN_ACCESS") {
        match parse_env_bool(&raw) {
            Some(parsed) => config.allow_lan_access = parsed,
            None => tracing::warn!("Ignoring invalid ALLOW_LAN_ACCESS value: {}", raw),
        }
    }

    config
}

use std::fmt;

use crate::modules::system::config::{WidgetConfig, DEV_SESSION_SECRET};

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
    pub actual_value: Option<String>,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual_value {
            Some(val) => write!(f, "  • {}: {} (got: {})", self.field, self.message, val),
            None => write!(f, "  • {}: {}", self.field, self.message),
        }
    }
}

impl ConfigError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            actual_value: None,
        }
    }

    fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            actual_value: Some(value.to_string()),
        }
    }
}

pub fn validate_widget_config(config: &WidgetConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.chat_api_url.trim().is_empty() {
        errors.push(ConfigError::new("chat_api_url", "must not be empty"));
    } else if url::Url::parse(&config.chat_api_url).is_err() {
        errors.push(ConfigError::with_value(
            "chat_api_url",
            "must be a valid URL",
            &config.chat_api_url,
        ));
    }

    if config.session.secret.len() < 16 {
        errors.push(ConfigError::new(
            "session.secret",
            "session cookie secret must be at least 16 characters",
        ));
    }

    // Secret misconfiguration in production is a startup failure, never a
    // per-request one.
    if config.production && config.session.secret == DEV_SESSION_SECRET {
        errors.push(ConfigError::new(
            "session.secret",
            "SESSION_COOKIE_SECRET must be configured in production",
        ));
    }

    if config.session.max_age_days == 0 {
        errors.push(ConfigError::with_value(
            "session.max_age_days",
            "must be at least 1",
            config.session.max_age_days,
        ));
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ConfigError::new(
            "rate_limit.window_secs",
            "window must be greater than 0",
        ));
    }
    if config.rate_limit.max_requests == 0 {
        errors.push(ConfigError::new(
            "rate_limit.max_requests",
            "ceiling must be greater than 0",
        ));
    }

    for (i, origin) in config.allowed_origins.iter().enumerate() {
        if url::Url::parse(origin).is_err() {
            errors.push(ConfigError::with_value(
                format!("allowed_origins[{}]", i),
                "must be a valid origin URL",
                origin,
            ));
        }
    }

    if config.memory.enabled
        && (config.memory.redis_url.is_none() || config.memory.redis_token.is_none())
    {
        // Not fatal: the gateway degrades to a no-op, matching its contract.
        tracing::warn!("SERVER_MEMORY_ENABLED but MEMORY_REDIS_URL/MEMORY_REDIS_TOKEN missing");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

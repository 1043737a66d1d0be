use dashmap::DashMap;
use std::time::{Duration, SystemTime};

use crate::modules::system::config::WidgetConfig;

#[derive(Debug, Clone)]
pub struct RateBucket {
    pub count: u32,
    pub reset_at: SystemTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub retry_after_ms: Option<u64>,
}

impl RateDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_ms: None,
        }
    }

    fn denied(retry_after_ms: u64) -> Self {
        Self {
            allowed: false,
            retry_after_ms: Some(retry_after_ms),
        }
    }
}

/// Fixed-window admission counter. Process-lifetime storage only; counters
/// reset on restart by design of the contract.
pub struct WidgetRateLimiter {
    window: Duration,
    ceiling: u32,
    buckets: DashMap<String, RateBucket>,
}

impl WidgetRateLimiter {
    pub fn new(window_secs: u64, ceiling: u32) -> Self {
        Self {
            window: Duration::from_secs(window_secs),
            ceiling,
            buckets: DashMap::new(),
        }
    }

    pub fn from_config(config: &WidgetConfig) -> Self {
        Self::new(
            config.rate_limit.window_secs,
            config.rate_limit.max_requests,
        )
    }

    pub fn bucket_key(user_id: &str, client_ip: &str) -> String {
        format!("{}:{}", user_id, client_ip)
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, SystemTime::now())
    }

    fn check_at(&self, key: &str, now: SystemTime) -> RateDecision {
        let mut bucket = self.buckets.entry(key.to_string()).or_insert(RateBucket {
            count: 0,
            reset_at: now + self.window,
        });

        if bucket.reset_at <= now {
            bucket.count = 1;
            bucket.reset_at = now + self.window;
            return RateDecision::allowed();
        }

        if bucket.count >= self.ceiling {
            let retry_after_ms = bucket
                .reset_at
                .duration_since(now)
                .unwrap_or(Duration::from_secs(0))
                .as_millis() as u64;
            return RateDecision::denied(retry_after_ms);
        }

        bucket.count += 1;
        RateDecision::allowed()
    }

    #[allow(dead_code)]
    pub fn cleanup_expired(&self) -> usize {
        let now = SystemTime::now();
        let mut count = 0;

        self.buckets.retain(|_k, v| {
            if v.reset_at <= now {
                count += 1;
                false
            } else {
                true
            }
        });

        if count > 0 {
            tracing::debug!("Cleared {} expired rate limit bucket(s)", count);
        }

        count
    }
}

impl Default for WidgetRateLimiter {
    fn default() -> Self {
        Self::from_config(&WidgetConfig::default())
    }
}

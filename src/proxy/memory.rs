use redis::aio::ConnectionManager;
use redis::{AsyncCommands, IntoConnectionInfo};
use tokio::sync::OnceCell;

use crate::error::AppResult;
use crate::modules::system::config::WidgetConfig;

const MEMORY_TTL_SECS: u64 = 60 * 60 * 24 * 30;

/// Bounded per-user conversation memory in an external key-value store.
/// Everything here is best-effort: disabled, unconfigured or failing storage
/// degrades to a no-op and is never surfaced to the client.
pub struct MemoryGateway {
    enabled: bool,
    redis_url: Option<String>,
    redis_token: Option<String>,
    client: OnceCell<Option<ConnectionManager>>,
}

impl MemoryGateway {
    pub fn new(config: &WidgetConfig) -> Self {
        Self {
            enabled: config.memory.enabled,
            redis_url: config.memory.redis_url.clone(),
            redis_token: config.memory.redis_token.clone(),
            client: OnceCell::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.redis_url.is_some() && self.redis_token.is_some()
    }

    fn memory_key(user_id: &str) -> String {
        format!("cw:memory:{}", user_id)
    }

    // Built lazily once per process and reused; a failed build leaves the
    // gateway permanently no-op instead of propagating.
    async fn connection(&self) -> Option<ConnectionManager> {
        if !self.enabled {
            return None;
        }
        let (Some(url), Some(token)) = (self.redis_url.as_ref(), self.redis_token.as_ref()) else {
            tracing::warn!("SERVER_MEMORY_ENABLED but MEMORY_REDIS_URL/MEMORY_REDIS_TOKEN missing");
            return None;
        };

        self.client
            .get_or_init(|| async {
                match Self::build_connection(url, token).await {
                    Ok(conn) => Some(conn),
                    Err(e) => {
                        tracing::warn!("Failed to initialize memory store client: {}", e);
                        None
                    }
                }
            })
            .await
            .clone()
    }

    async fn build_connection(url: &str, token: &str) -> AppResult<ConnectionManager> {
        let mut info = url.into_connection_info()?;
        info.redis.password = Some(token.to_string());
        let client = redis::Client::open(info)?;
        Ok(ConnectionManager::new(client).await?)
    }

    pub async fn fetch(&self, user_id: &str) -> Option<String> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(Self::memory_key(user_id)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to fetch server memory: {}", e);
                None
            }
        }
    }

    /// Overwrites the prior value wholesale and refreshes the 30-day expiry.
    pub async fn persist(&self, user_id: &str, summary: &str) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        if let Err(e) = conn
            .set_ex::<_, _, ()>(Self::memory_key(user_id), summary, MEMORY_TTL_SECS)
            .await
        {
            tracing::warn!("Failed to persist server memory: {}", e);
        }
    }
}

use std::sync::Arc;

use crate::modules::system::config::WidgetConfig;
use crate::proxy::handlers::feedback::FeedbackStore;
use crate::proxy::memory::MemoryGateway;
use crate::proxy::rate_limit::WidgetRateLimiter;
use crate::proxy::session::SessionService;
use crate::proxy::upstream::UpstreamClient;

/// Process-wide singletons: constructed once, handed to request handlers by
/// reference. The rate limiter and feedback store are the only mutable
/// members and both are concurrent maps.
#[derive(Clone)]
pub struct CoreServices {
    pub upstream: Arc<UpstreamClient>,
    pub memory: Arc<MemoryGateway>,
    pub rate_limiter: Arc<WidgetRateLimiter>,
    pub sessions: Arc<SessionService>,
    pub feedback: Arc<FeedbackStore>,
}

// Axum application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WidgetConfig>,
    pub core: Arc<CoreServices>,
}

impl AppState {
    pub fn new(config: WidgetConfig) -> Self {
        let core = CoreServices {
            upstream: Arc::new(UpstreamClient::new(&config)),
            memory: Arc::new(MemoryGateway::new(&config)),
            rate_limiter: Arc::new(WidgetRateLimiter::from_config(&config)),
            sessions: Arc::new(SessionService::new(&config)),
            feedback: Arc::new(FeedbackStore::default()),
        };

        Self {
            config: Arc::new(config),
            core: Arc::new(core),
        }
    }
}

impl axum::extract::FromRef<AppState> for Arc<WidgetConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl axum::extract::FromRef<AppState> for CoreServices {
    fn from_ref(state: &AppState) -> Self {
        state.core.as_ref().clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<CoreServices> {
    fn from_ref(state: &AppState) -> Self {
        state.core.clone()
    }
}

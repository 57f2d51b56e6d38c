use std::sync::Arc;

use taskwarden_agent::TaskAgent;
use taskwarden_core::config::GatewayConfig;
use taskwarden_core::traits::TaskStore;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub agent: Arc<TaskAgent>,
    pub store: Arc<dyn TaskStore>,
}

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use taskwarden_agent::TaskAgent;
use taskwarden_core::config::GatewayConfig;
use taskwarden_core::traits::TaskStore;

use crate::routes;
use crate::state::AppState;

/// HTTP gateway built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    agent: Arc<TaskAgent>,
    store: Arc<dyn TaskStore>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, agent: Arc<TaskAgent>, store: Arc<dyn TaskStore>) -> Self {
        Self {
            config,
            agent,
            store,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            agent: self.agent.clone(),
            store: self.store.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        // Agent
        .route("/api/agent/ask", post(routes::ask))
        .route("/api/agent/clear", post(routes::clear))
        // Tasks
        .route(
            "/api/tasks",
            get(routes::list_tasks).post(routes::create_task),
        )
        .route("/api/tasks/find", get(routes::find_task))
        .route("/api/tasks/{title}", axum::routing::delete(routes::delete_task))
        .route("/api/tasks/{title}/complete", put(routes::complete_task))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

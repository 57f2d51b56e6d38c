use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use taskwarden_agent::AskResponse;
use taskwarden_core::error::{ErrorKind, TaskwardenError};
use taskwarden_core::task::{NewTask, TaskFilter};

use crate::middleware::Authenticated;
use crate::state::AppState;

// GET /api/health (no auth)
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
pub struct AskRequest {
    #[serde(default, alias = "Question")]
    pub question: String,
}

// POST /api/agent/ask
pub async fn ask(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskRequest>,
) -> (StatusCode, Json<AskResponse>) {
    if body.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(AskResponse::text("Question cannot be empty.")),
        );
    }

    // Spawned so that dropping this handler cancels the turn instead of
    // dropping it.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let agent = state.agent.clone();
    let question = body.question;
    let turn = tokio::spawn(async move { agent.run_turn(&question, cancel).await });

    match turn.await {
        Ok(outcome) => {
            info!(
                turn_id = %outcome.turn_id,
                elapsed_ms = outcome.elapsed_ms,
                failed = outcome.failed(),
                "Question answered"
            );
            (StatusCode::OK, Json(outcome.answer))
        }
        Err(e) => {
            error!(error = %e, "Turn task aborted");
            (
                StatusCode::OK,
                Json(AskResponse::text(format!("Error: {}", e))),
            )
        }
    }
}

// POST /api/agent/clear
pub async fn clear(_auth: Authenticated, State(state): State<Arc<AppState>>) -> Response {
    match state.agent.clear_history().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!(error = %e, "Clearing history failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e)
        }
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub due: u64,
}

// GET /api/tasks?completed=0|1|2&due=0|1|2|3
pub async fn list_tasks(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> Response {
    match state
        .store
        .get_tasks(TaskFilter::from_codes(q.completed, q.due))
        .await
    {
        Ok(tasks) => Json(tasks).into_response(),
        Err(e) => store_error(e),
    }
}

// POST /api/tasks
pub async fn create_task(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(task): Json<NewTask>,
) -> Response {
    debug!(title = %task.title, "Creating task");
    match state.store.create(task).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => store_error(e),
    }
}

// PUT /api/tasks/{title}/complete
pub async fn complete_task(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(title): Path<String>,
) -> Response {
    match state.store.mark_complete(&title).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error(e),
    }
}

// DELETE /api/tasks/{title}
pub async fn delete_task(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Path(title): Path<String>,
) -> Response {
    match state.store.delete(&title).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error(e),
    }
}

#[derive(Deserialize)]
pub struct FindQuery {
    #[serde(alias = "name")]
    pub title: String,
}

// GET /api/tasks/find?title=
pub async fn find_task(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Query(q): Query<FindQuery>,
) -> Response {
    match state.store.find_by_title(&q.title).await {
        Ok(Some(task)) => Json(task).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error(e),
    }
}

fn store_error(e: TaskwardenError) -> Response {
    let status = match &e {
        TaskwardenError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        TaskwardenError::TaskValidation(_) => StatusCode::BAD_REQUEST,
        _ if e.kind() == ErrorKind::Storage => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %e, "Task store request failed");
    }
    error_response(status, &e)
}

fn error_response(status: StatusCode, e: &TaskwardenError) -> Response {
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

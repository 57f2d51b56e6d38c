use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::task::{NewTask, TaskFilter, TaskRecord};
use crate::types::*;

/// Streaming chat completions.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        operations: &[OperationDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// The capability a workflow node calls to produce its result.
pub trait Responder: Send + Sync + 'static {
    /// Open a fresh conversational memory handle.
    fn create_session(&self) -> BoxFuture<'_, Result<Arc<Session>>>;

    /// Run one request to completion. May call the offered operations first.
    fn invoke(
        &self,
        request: ResponderRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<ResponderReply>>;
}

/// A named capability offered to a responder.
pub trait Operation: Send + Sync + 'static {
    /// Operation name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for operation input.
    fn input_schema(&self) -> serde_json::Value;

    fn execute(
        &self,
        input: serde_json::Value,
        ctx: OperationContext,
    ) -> BoxFuture<'_, Result<OperationOutput>>;

    /// Timeout in seconds for this operation.
    fn timeout_secs(&self) -> u64 {
        30
    }

    fn definition(&self) -> OperationDefinition {
        OperationDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Persistence backend for the task list.
pub trait TaskStore: Send + Sync + 'static {
    /// Tasks matching the filter, ordered by due date.
    fn get_tasks(&self, filter: TaskFilter) -> BoxFuture<'_, Result<Vec<TaskRecord>>>;

    /// Validate and insert a task, returning the stored record.
    fn create(&self, task: NewTask) -> BoxFuture<'_, Result<TaskRecord>>;

    /// Mark the first task with this title as completed.
    fn mark_complete(&self, title: &str) -> BoxFuture<'_, Result<TaskRecord>>;

    /// Delete the first task with this title.
    fn delete(&self, title: &str) -> BoxFuture<'_, Result<TaskRecord>>;

    fn find_by_title(&self, title: &str) -> BoxFuture<'_, Result<Option<TaskRecord>>>;
}

/// Similarity search over task descriptions.
pub trait TaskSearch: Send + Sync + 'static {
    fn search(&self, query: &str, filter: TaskFilter) -> BoxFuture<'_, Result<Vec<TaskRecord>>>;
}

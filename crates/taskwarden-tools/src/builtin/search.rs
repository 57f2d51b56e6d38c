use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;

use taskwarden_core::error::Result;
use taskwarden_core::task::TaskFilter;
use taskwarden_core::traits::{Operation, TaskSearch};
use taskwarden_core::types::{OperationContext, OperationOutput};

use super::{filter_schema, parse_input, tasks_output};

#[derive(Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    filter_completed: u64,
    #[serde(default)]
    filter_by_due_date: u64,
}

/// Semantic search over task descriptions. Offered even when no embedding
/// backend is configured, so the responder learns search is unavailable.
pub struct SearchTasksOperation {
    search: Option<Arc<dyn TaskSearch>>,
}

impl SearchTasksOperation {
    pub fn new(search: Option<Arc<dyn TaskSearch>>) -> Self {
        Self { search }
    }
}

impl Operation for SearchTasksOperation {
    fn name(&self) -> &str {
        "search_tasks"
    }

    fn description(&self) -> &str {
        "Search through task descriptions for a specific task or tasks. \
         Do not use it for finding a task by title or for listing all tasks."
    }

    fn input_schema(&self) -> serde_json::Value {
        let (completed, due) = filter_schema();
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What the task is about"
                },
                "filter_completed": completed,
                "filter_by_due_date": due
            },
            "required": ["query"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        60
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: OperationContext,
    ) -> BoxFuture<'_, Result<OperationOutput>> {
        Box::pin(async move {
            let input: SearchInput = parse_input(input)?;
            let Some(search) = &self.search else {
                return Ok(OperationOutput::error(
                    "Semantic search is not configured; use get_all_tasks instead",
                ));
            };
            let filter = TaskFilter::from_codes(input.filter_completed, input.filter_by_due_date);
            match search.search(&input.query, filter).await {
                Ok(tasks) => tasks_output(&tasks),
                Err(e) => Ok(OperationOutput::error(e.to_string())),
            }
        })
    }
}

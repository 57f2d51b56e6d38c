use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use taskwarden_core::error::Result;
use taskwarden_core::task::{NewTask, TaskFilter};
use taskwarden_core::traits::{Operation, TaskStore};
use taskwarden_core::types::{OperationContext, OperationOutput};

use super::{filter_schema, parse_input, task_output, tasks_output};

#[derive(Deserialize, Default)]
struct FilterInput {
    #[serde(default)]
    filter_completed: u64,
    #[serde(default)]
    filter_by_due_date: u64,
}

#[derive(Deserialize)]
struct TitleInput {
    title: String,
}

#[derive(Deserialize)]
struct CreateInput {
    title: String,
    description: String,
    due_date: NaiveDate,
}

fn title_schema(what: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "title": {
                "type": "string",
                "description": what
            }
        },
        "required": ["title"]
    })
}

// ── get_all_tasks ───────────────────────────────────────────────

pub struct GetAllTasksOperation {
    store: Arc<dyn TaskStore>,
}

impl GetAllTasksOperation {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

impl Operation for GetAllTasksOperation {
    fn name(&self) -> &str {
        "get_all_tasks"
    }

    fn description(&self) -> &str {
        "List tasks ordered by due date, optionally filtered by completion status and due date."
    }

    fn input_schema(&self) -> serde_json::Value {
        let (completed, due) = filter_schema();
        json!({
            "type": "object",
            "properties": {
                "filter_completed": completed,
                "filter_by_due_date": due
            }
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: OperationContext,
    ) -> BoxFuture<'_, Result<OperationOutput>> {
        Box::pin(async move {
            let input: FilterInput = parse_input(input)?;
            let filter = TaskFilter::from_codes(input.filter_completed, input.filter_by_due_date);
            match self.store.get_tasks(filter).await {
                Ok(tasks) => tasks_output(&tasks),
                Err(e) => Ok(OperationOutput::error(e.to_string())),
            }
        })
    }
}

// ── create_task ─────────────────────────────────────────────────

pub struct CreateTaskOperation {
    store: Arc<dyn TaskStore>,
}

impl CreateTaskOperation {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

impl Operation for CreateTaskOperation {
    fn name(&self) -> &str {
        "create_task"
    }

    fn description(&self) -> &str {
        "Create a new task. Title and description must not be empty and the due date \
         must not be in the past."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "maxLength": 100 },
                "description": { "type": "string", "maxLength": 500 },
                "due_date": {
                    "type": "string",
                    "format": "date",
                    "description": "Due date as YYYY-MM-DD"
                }
            },
            "required": ["title", "description", "due_date"]
        })
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: OperationContext,
    ) -> BoxFuture<'_, Result<OperationOutput>> {
        Box::pin(async move {
            let input: CreateInput = parse_input(input)?;
            let task = NewTask::new(input.title, input.description, input.due_date);
            match self.store.create(task).await {
                Ok(created) => {
                    debug!(task_id = created.id, "create_task succeeded");
                    task_output(&created)
                }
                Err(e) => Ok(OperationOutput::error(e.to_string())),
            }
        })
    }
}

// ── find_by_title ───────────────────────────────────────────────

pub struct FindByTitleOperation {
    store: Arc<dyn TaskStore>,
}

impl FindByTitleOperation {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

impl Operation for FindByTitleOperation {
    fn name(&self) -> &str {
        "find_by_title"
    }

    fn description(&self) -> &str {
        "Find a task by its exact title (case-insensitive)."
    }

    fn input_schema(&self) -> serde_json::Value {
        title_schema("Title of the task to find")
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: OperationContext,
    ) -> BoxFuture<'_, Result<OperationOutput>> {
        Box::pin(async move {
            let input: TitleInput = parse_input(input)?;
            match self.store.find_by_title(&input.title).await {
                Ok(Some(task)) => task_output(&task),
                Ok(None) => Ok(OperationOutput::success("null")),
                Err(e) => Ok(OperationOutput::error(e.to_string())),
            }
        })
    }
}

// ── mark_complete ───────────────────────────────────────────────

pub struct MarkCompleteOperation {
    store: Arc<dyn TaskStore>,
}

impl MarkCompleteOperation {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

impl Operation for MarkCompleteOperation {
    fn name(&self) -> &str {
        "mark_complete"
    }

    fn description(&self) -> &str {
        "Mark the task with the given title as completed."
    }

    fn input_schema(&self) -> serde_json::Value {
        title_schema("Title of the task to complete")
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: OperationContext,
    ) -> BoxFuture<'_, Result<OperationOutput>> {
        Box::pin(async move {
            let input: TitleInput = parse_input(input)?;
            match self.store.mark_complete(&input.title).await {
                Ok(task) => task_output(&task),
                Err(e) => Ok(OperationOutput::error(e.to_string())),
            }
        })
    }
}

// ── delete_task ─────────────────────────────────────────────────

pub struct DeleteTaskOperation {
    store: Arc<dyn TaskStore>,
}

impl DeleteTaskOperation {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }
}

impl Operation for DeleteTaskOperation {
    fn name(&self) -> &str {
        "delete_task"
    }

    fn description(&self) -> &str {
        "Delete the task with the given title. Ask the user to confirm before calling this."
    }

    fn input_schema(&self) -> serde_json::Value {
        title_schema("Title of the task to delete")
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: OperationContext,
    ) -> BoxFuture<'_, Result<OperationOutput>> {
        Box::pin(async move {
            let input: TitleInput = parse_input(input)?;
            match self.store.delete(&input.title).await {
                Ok(task) => Ok(OperationOutput::success(format!(
                    "Deleted task '{}'",
                    task.title
                ))),
                Err(e) => Ok(OperationOutput::error(e.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwarden_core::task::{today_utc, TaskRecord};
    use taskwarden_core::types::TurnId;
    use taskwarden_test_utils::MemoryTaskStore;

    fn ctx() -> OperationContext {
        OperationContext::new(TurnId::new(), "worker")
    }

    fn store() -> Arc<dyn TaskStore> {
        Arc::new(MemoryTaskStore::with_samples())
    }

    #[tokio::test]
    async fn test_get_all_tasks_lists_samples() {
        let op = GetAllTasksOperation::new(store());
        let out = op.execute(json!({}), ctx()).await.unwrap();
        assert!(!out.is_error);
        let tasks: Vec<TaskRecord> = serde_json::from_str(&out.content).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "Sample Task 1");
    }

    #[tokio::test]
    async fn test_get_all_tasks_accepts_null_input() {
        let op = GetAllTasksOperation::new(store());
        let out = op.execute(serde_json::Value::Null, ctx()).await.unwrap();
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn test_create_task_reports_validation_error_as_result() {
        let op = CreateTaskOperation::new(store());
        let out = op
            .execute(
                json!({"title": "Old", "description": "late", "due_date": "2000-01-01"}),
                ctx(),
            )
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.content.contains("past"));
    }

    #[tokio::test]
    async fn test_create_task_bad_date_is_validation_failure() {
        let op = CreateTaskOperation::new(store());
        let result = op
            .execute(
                json!({"title": "X", "description": "y", "due_date": "tomorrow"}),
                ctx(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_then_find() {
        let store = store();
        let due = (today_utc() + chrono::Days::new(3)).format("%Y-%m-%d").to_string();
        CreateTaskOperation::new(store.clone())
            .execute(
                json!({"title": "Call mom", "description": "Sunday call", "due_date": due}),
                ctx(),
            )
            .await
            .unwrap();
        let out = FindByTitleOperation::new(store)
            .execute(json!({"title": "call mom"}), ctx())
            .await
            .unwrap();
        let task: TaskRecord = serde_json::from_str(&out.content).unwrap();
        assert_eq!(task.description, "Sunday call");
    }

    #[tokio::test]
    async fn test_mark_complete_and_delete() {
        let store = store();
        let out = MarkCompleteOperation::new(store.clone())
            .execute(json!({"title": "Sample Task 1"}), ctx())
            .await
            .unwrap();
        let task: TaskRecord = serde_json::from_str(&out.content).unwrap();
        assert!(task.is_completed);

        let out = DeleteTaskOperation::new(store.clone())
            .execute(json!({"title": "Sample Task 2"}), ctx())
            .await
            .unwrap();
        assert!(out.content.contains("Sample Task 2"));

        let out = DeleteTaskOperation::new(store)
            .execute(json!({"title": "Sample Task 2"}), ctx())
            .await
            .unwrap();
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn test_find_missing_returns_null() {
        let out = FindByTitleOperation::new(store())
            .execute(json!({"title": "nope"}), ctx())
            .await
            .unwrap();
        assert_eq!(out.content, "null");
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::traits::{Operation, TaskSearch, TaskStore};
use taskwarden_core::types::{OperationContext, OperationDefinition, OperationOutput};

use crate::builtin::*;

/// Registry of available operations. Nodes pick their fixed subset from it
/// while the pipeline is built.
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn Operation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Register an operation.
    pub fn register(&mut self, operation: impl Operation) {
        self.register_arc(Arc::new(operation));
    }

    pub fn register_arc(&mut self, operation: Arc<dyn Operation>) {
        let name = operation.name().to_string();
        self.operations.insert(name, operation);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.operations.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    /// Registered operation names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn definitions(&self) -> Vec<OperationDefinition> {
        let mut defs: Vec<OperationDefinition> =
            self.operations.values().map(|op| op.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Resolve a node's operation set. An unknown name is a configuration
    /// error, raised at startup.
    pub fn select(&self, names: &[&str]) -> Result<Vec<Arc<dyn Operation>>> {
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| {
                    TaskwardenError::Config(format!("unknown operation '{}'", name))
                })
            })
            .collect()
    }

    /// Execute an operation by name within its timeout.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: OperationContext,
    ) -> Result<OperationOutput> {
        let operation = self
            .get(name)
            .ok_or_else(|| TaskwardenError::OperationNotFound(name.to_string()))?;
        execute_with_timeout(operation.as_ref(), input, ctx).await
    }

    /// A registry holding every built-in operation.
    pub fn with_task_operations(
        store: Arc<dyn TaskStore>,
        search: Option<Arc<dyn TaskSearch>>,
    ) -> Self {
        let mut registry = Self::new();

        registry.register(TodayOperation);
        registry.register(ClearHistoryOperation);

        registry.register(GetAllTasksOperation::new(store.clone()));
        registry.register(CreateTaskOperation::new(store.clone()));
        registry.register(FindByTitleOperation::new(store.clone()));
        registry.register(MarkCompleteOperation::new(store.clone()));
        registry.register(DeleteTaskOperation::new(store));

        registry.register(SearchTasksOperation::new(search));

        registry
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one operation, converting an elapsed deadline into `OperationTimeout`.
pub async fn execute_with_timeout(
    operation: &dyn Operation,
    input: serde_json::Value,
    ctx: OperationContext,
) -> Result<OperationOutput> {
    let timeout = std::time::Duration::from_secs(operation.timeout_secs());
    match tokio::time::timeout(timeout, operation.execute(input, ctx)).await {
        Ok(result) => result,
        Err(_) => Err(TaskwardenError::OperationTimeout {
            operation: operation.name().to_string(),
            timeout_secs: operation.timeout_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use serde_json::json;

    use super::*;
    use taskwarden_core::types::TurnId;
    use taskwarden_test_utils::MemoryTaskStore;

    struct SlowOperation;

    impl Operation for SlowOperation {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "never finishes in time"
        }

        fn input_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }

        fn timeout_secs(&self) -> u64 {
            1
        }

        fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: OperationContext,
        ) -> BoxFuture<'_, Result<OperationOutput>> {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(OperationOutput::success("late"))
            })
        }
    }

    fn registry() -> OperationRegistry {
        OperationRegistry::with_task_operations(Arc::new(MemoryTaskStore::new()), None)
    }

    #[test]
    fn test_builtin_names() {
        assert_eq!(
            registry().list(),
            vec![
                "clear_history",
                "create_task",
                "delete_task",
                "find_by_title",
                "get_all_tasks",
                "mark_complete",
                "search_tasks",
                "today",
            ]
        );
    }

    #[test]
    fn test_select_unknown_is_config_error() {
        let err = registry().select(&["today", "launch_rockets"]).err().unwrap();
        assert!(matches!(err, TaskwardenError::Config(_)));
        assert_eq!(registry().select(&["today"]).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_unknown() {
        let ctx = OperationContext::new(TurnId::new(), "worker");
        let err = registry().execute("nope", json!({}), ctx).await.unwrap_err();
        assert!(matches!(err, TaskwardenError::OperationNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let mut registry = OperationRegistry::new();
        registry.register(SlowOperation);
        let ctx = OperationContext::new(TurnId::new(), "worker");
        let err = registry.execute("slow", json!({}), ctx).await.unwrap_err();
        assert!(matches!(err, TaskwardenError::OperationTimeout { .. }));
    }
}

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use taskwarden_core::error::Result;
use taskwarden_core::task::{NewTask, TaskFilter, TaskRecord};
use taskwarden_core::traits::TaskStore;

use crate::embeddings::EmbeddingProvider;
use crate::store::SqliteTaskStore;

/// Task store that keeps the embedding index in step with the task table.
///
/// Without an embedder it behaves exactly like the inner store.
pub struct IndexedTaskStore {
    store: Arc<SqliteTaskStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl IndexedTaskStore {
    pub fn new(store: Arc<SqliteTaskStore>, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self { store, embedder }
    }

    pub fn inner(&self) -> &Arc<SqliteTaskStore> {
        &self.store
    }

    /// Embed every task that has a description. Returns the number indexed.
    pub async fn reindex_all(&self) -> Result<usize> {
        let Some(embedder) = &self.embedder else {
            return Ok(0);
        };

        let tasks: Vec<TaskRecord> = self
            .store
            .all_tasks()?
            .into_iter()
            .filter(|t| !t.description.trim().is_empty())
            .collect();
        if tasks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = tasks.iter().map(|t| t.description.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        for (task, vec) in tasks.iter().zip(vectors.iter()) {
            self.store.store_embedding(task.id, vec)?;
        }

        info!(count = tasks.len(), "Task index rebuilt");
        Ok(tasks.len())
    }

    async fn index(&self, task: &TaskRecord) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        if task.description.trim().is_empty() {
            return;
        }
        let result = match embedder.embed_one(&task.description).await {
            Ok(vec) => self.store.store_embedding(task.id, &vec),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            // The task itself is stored; it is just invisible to search.
            warn!(task_id = task.id, error = %e, "Failed to index task");
        }
    }
}

impl TaskStore for IndexedTaskStore {
    fn get_tasks(&self, filter: TaskFilter) -> BoxFuture<'_, Result<Vec<TaskRecord>>> {
        self.store.get_tasks(filter)
    }

    fn create(&self, task: NewTask) -> BoxFuture<'_, Result<TaskRecord>> {
        Box::pin(async move {
            let record = self.store.create(task).await?;
            self.index(&record).await;
            Ok(record)
        })
    }

    fn mark_complete(&self, title: &str) -> BoxFuture<'_, Result<TaskRecord>> {
        self.store.mark_complete(title)
    }

    fn delete(&self, title: &str) -> BoxFuture<'_, Result<TaskRecord>> {
        self.store.delete(title)
    }

    fn find_by_title(&self, title: &str) -> BoxFuture<'_, Result<Option<TaskRecord>>> {
        self.store.find_by_title(title)
    }
}

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use taskwarden_core::config::SearchConfig;
use taskwarden_core::error::Result;
use taskwarden_core::task::{today_utc, TaskFilter, TaskRecord};
use taskwarden_core::traits::TaskSearch;

use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::store::SqliteTaskStore;

/// Cosine-similarity search over embedded task descriptions.
pub struct SemanticTaskSearch {
    store: Arc<SqliteTaskStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: SearchConfig,
}

impl SemanticTaskSearch {
    pub fn new(
        store: Arc<SqliteTaskStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Scored matches above the threshold, best first.
    pub async fn search_scored(
        &self,
        query: &str,
        filter: TaskFilter,
    ) -> Result<Vec<(f32, TaskRecord)>> {
        let query_vec = self.embedder.embed_one(query).await?;
        let today = today_utc();

        let mut scored: Vec<(f32, TaskRecord)> = self
            .store
            .embedded_tasks()?
            .into_iter()
            .filter(|(task, _)| filter.matches(task, today))
            .map(|(task, vec)| (cosine_similarity(&query_vec, &vec), task))
            .filter(|(score, _)| *score > self.config.min_score)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.config.max_results);

        debug!(query = %query, matches = scored.len(), "Semantic task search");
        Ok(scored)
    }
}

impl TaskSearch for SemanticTaskSearch {
    fn search(&self, query: &str, filter: TaskFilter) -> BoxFuture<'_, Result<Vec<TaskRecord>>> {
        let query = query.to_string();
        Box::pin(async move {
            Ok(self
                .search_scored(&query, filter)
                .await?
                .into_iter()
                .map(|(_, task)| task)
                .collect())
        })
    }
}

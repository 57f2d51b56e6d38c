pub mod embeddings;
pub mod indexed;
pub mod search;
pub mod store;

pub use embeddings::{cosine_similarity, EmbeddingProvider, HttpEmbeddingProvider};
pub use indexed::IndexedTaskStore;
pub use search::SemanticTaskSearch;
pub use store::SqliteTaskStore;

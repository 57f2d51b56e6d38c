use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::task::{sample_tasks, today_utc, NewTask, TaskFilter, TaskRecord};
use taskwarden_core::traits::TaskStore;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        due_date TEXT NOT NULL,
        is_completed INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_title ON tasks(title COLLATE NOCASE);
    CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(due_date, id);

    CREATE TABLE IF NOT EXISTS task_embeddings (
        task_id INTEGER PRIMARY KEY REFERENCES tasks(id) ON DELETE CASCADE,
        embedding BLOB NOT NULL
    );";

const TASK_COLUMNS: &str = "id, title, description, due_date, is_completed";

/// SQLite-backed task store with an embedding side table.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

fn db_err(e: impl std::fmt::Display) -> TaskwardenError {
    TaskwardenError::Database(e.to_string())
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let due: String = row.get(3)?;
    let due_date = NaiveDate::parse_from_str(&due, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TaskRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        due_date,
        is_completed: row.get::<_, i64>(4)? != 0,
    })
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl SqliteTaskStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| db_err(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        let store = Self::init(conn)?;

        debug!(path = %path.display(), "SQLite task store opened");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(db_err)?;
        f(&conn).map_err(db_err)
    }

    pub fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get::<_, i64>(0))
        })
        .map(|n| n as usize)
    }

    /// Every task, ordered by due date.
    pub fn all_tasks(&self) -> Result<Vec<TaskRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks ORDER BY due_date ASC, id ASC"
            ))?;
            let rows = stmt.query_map([], row_to_task)?;
            rows.collect()
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<TaskRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )
            .optional()
        })
    }

    fn find(&self, title: &str) -> Result<Option<TaskRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE title = ?1 COLLATE NOCASE ORDER BY id LIMIT 1"
                ),
                params![title],
                row_to_task,
            )
            .optional()
        })
    }

    /// Insert a task after validating it against `today`.
    pub fn insert(&self, task: NewTask, today: NaiveDate) -> Result<TaskRecord> {
        task.validate(today)?;
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (title, description, due_date, is_completed) VALUES (?1, ?2, ?3, 0)",
                params![
                    task.title,
                    task.description,
                    task.due_date.format("%Y-%m-%d").to_string()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        debug!(task_id = id, title = %task.title, "Task created");
        Ok(task.into_record(id))
    }

    /// Insert the sample tasks when the store is empty. Returns how many were added.
    pub fn seed_samples(&self, today: NaiveDate) -> Result<usize> {
        if self.count()? > 0 {
            return Ok(0);
        }
        let samples = sample_tasks(today);
        let n = samples.len();
        for task in samples {
            self.insert(task, today)?;
        }
        info!(count = n, "Seeded sample tasks");
        Ok(n)
    }

    /// Store (or replace) the embedding vector for a task.
    pub fn store_embedding(&self, task_id: i64, embedding: &[f32]) -> Result<()> {
        let blob = encode_embedding(embedding);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO task_embeddings (task_id, embedding) VALUES (?1, ?2)",
                params![task_id, blob],
            )
        })?;
        Ok(())
    }

    pub fn remove_embedding(&self, task_id: i64) -> Result<bool> {
        let n = self.with_conn(|conn| {
            conn.execute("DELETE FROM task_embeddings WHERE task_id = ?1", params![task_id])
        })?;
        Ok(n > 0)
    }

    /// Every indexed task together with its vector.
    pub fn embedded_tasks(&self) -> Result<Vec<(TaskRecord, Vec<f32>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.title, t.description, t.due_date, t.is_completed, e.embedding
                 FROM task_embeddings e
                 JOIN tasks t ON t.id = e.task_id",
            )?;
            let rows = stmt.query_map([], |row| {
                let task = row_to_task(row)?;
                let blob: Vec<u8> = row.get(5)?;
                Ok((task, decode_embedding(&blob)))
            })?;
            rows.collect()
        })
    }

    pub fn embedding_count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM task_embeddings", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|n| n as usize)
    }

    fn complete(&self, title: &str) -> Result<TaskRecord> {
        let mut task = self
            .find(title)?
            .ok_or_else(|| TaskwardenError::TaskNotFound(title.to_string()))?;
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET is_completed = 1 WHERE id = ?1",
                params![task.id],
            )
        })?;
        task.is_completed = true;
        debug!(task_id = task.id, "Task marked complete");
        Ok(task)
    }

    fn remove(&self, title: &str) -> Result<TaskRecord> {
        let task = self
            .find(title)?
            .ok_or_else(|| TaskwardenError::TaskNotFound(title.to_string()))?;
        self.with_conn(|conn| {
            conn.execute("DELETE FROM task_embeddings WHERE task_id = ?1", params![task.id])?;
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![task.id])
        })?;
        debug!(task_id = task.id, "Task deleted");
        Ok(task)
    }
}

impl TaskStore for SqliteTaskStore {
    fn get_tasks(&self, filter: TaskFilter) -> BoxFuture<'_, Result<Vec<TaskRecord>>> {
        Box::pin(async move {
            let today = today_utc();
            Ok(self
                .all_tasks()?
                .into_iter()
                .filter(|t| filter.matches(t, today))
                .collect())
        })
    }

    fn create(&self, task: NewTask) -> BoxFuture<'_, Result<TaskRecord>> {
        Box::pin(async move { self.insert(task, today_utc()) })
    }

    fn mark_complete(&self, title: &str) -> BoxFuture<'_, Result<TaskRecord>> {
        let title = title.to_string();
        Box::pin(async move { self.complete(&title) })
    }

    fn delete(&self, title: &str) -> BoxFuture<'_, Result<TaskRecord>> {
        let title = title.to_string();
        Box::pin(async move { self.remove(&title) })
    }

    fn find_by_title(&self, title: &str) -> BoxFuture<'_, Result<Option<TaskRecord>>> {
        let title = title.to_string();
        Box::pin(async move { self.find(&title) })
    }
}

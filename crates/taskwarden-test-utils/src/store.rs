use std::sync::Mutex;

use futures::future::BoxFuture;

use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::task::{sample_tasks, today_utc, NewTask, TaskFilter, TaskRecord};
use taskwarden_core::traits::{TaskSearch, TaskStore};

/// Vec-backed task store with the same validation rules as the SQLite one.
#[derive(Default)]
pub struct MemoryTaskStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    tasks: Vec<TaskRecord>,
    next_id: i64,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding "Sample Task 1" (due tomorrow) and "Sample Task 2" (due in two days).
    pub fn with_samples() -> Self {
        let store = Self::new();
        let today = today_utc();
        for task in sample_tasks(today) {
            // Sample tasks are always valid.
            let _ = store.insert(task, today);
        }
        store
    }

    pub fn insert(&self, task: NewTask, today: chrono::NaiveDate) -> Result<TaskRecord> {
        task.validate(today)?;
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let record = task.into_record(inner.next_id);
        inner.tasks.push(record.clone());
        Ok(record)
    }

    pub fn snapshot(&self) -> Vec<TaskRecord> {
        self.lock().map(|i| i.tasks.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| TaskwardenError::Database(e.to_string()))
    }

    fn position(inner: &Inner, title: &str) -> Option<usize> {
        inner
            .tasks
            .iter()
            .position(|t| t.title.eq_ignore_ascii_case(title))
    }
}

impl TaskStore for MemoryTaskStore {
    fn get_tasks(&self, filter: TaskFilter) -> BoxFuture<'_, Result<Vec<TaskRecord>>> {
        Box::pin(async move {
            let today = today_utc();
            let mut tasks: Vec<TaskRecord> = self
                .lock()?
                .tasks
                .iter()
                .filter(|t| filter.matches(t, today))
                .cloned()
                .collect();
            tasks.sort_by_key(|t| (t.due_date, t.id));
            Ok(tasks)
        })
    }

    fn create(&self, task: NewTask) -> BoxFuture<'_, Result<TaskRecord>> {
        Box::pin(async move { self.insert(task, today_utc()) })
    }

    fn mark_complete(&self, title: &str) -> BoxFuture<'_, Result<TaskRecord>> {
        let title = title.to_string();
        Box::pin(async move {
            let mut inner = self.lock()?;
            let idx = Self::position(&inner, &title)
                .ok_or_else(|| TaskwardenError::TaskNotFound(title.clone()))?;
            inner.tasks[idx].is_completed = true;
            Ok(inner.tasks[idx].clone())
        })
    }

    fn delete(&self, title: &str) -> BoxFuture<'_, Result<TaskRecord>> {
        let title = title.to_string();
        Box::pin(async move {
            let mut inner = self.lock()?;
            let idx = Self::position(&inner, &title)
                .ok_or_else(|| TaskwardenError::TaskNotFound(title.clone()))?;
            Ok(inner.tasks.remove(idx))
        })
    }

    fn find_by_title(&self, title: &str) -> BoxFuture<'_, Result<Option<TaskRecord>>> {
        let title = title.to_string();
        Box::pin(async move {
            let inner = self.lock()?;
            Ok(Self::position(&inner, &title).map(|i| inner.tasks[i].clone()))
        })
    }
}

/// Search double that ignores the query and applies only the filter.
pub struct FixedSearch {
    tasks: Vec<TaskRecord>,
}

impl FixedSearch {
    pub fn new(tasks: Vec<TaskRecord>) -> Self {
        Self { tasks }
    }
}

impl TaskSearch for FixedSearch {
    fn search(&self, _query: &str, filter: TaskFilter) -> BoxFuture<'_, Result<Vec<TaskRecord>>> {
        Box::pin(async move {
            let today = today_utc();
            Ok(self
                .tasks
                .iter()
                .filter(|t| filter.matches(t, today))
                .cloned()
                .collect())
        })
    }
}

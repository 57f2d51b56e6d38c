use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskwardenError};

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// A task as stored by the task store. Read-only outside the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub is_completed: bool,
}

/// A task about to be created. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: NaiveDate,
}

impl NewTask {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            due_date,
        }
    }

    /// Reject empty fields, over-long fields and due dates before `today`.
    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(TaskwardenError::TaskValidation(
                "Title cannot be empty".into(),
            ));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(TaskwardenError::TaskValidation(format!(
                "Title exceeds {} characters",
                MAX_TITLE_LEN
            )));
        }
        if self.description.trim().is_empty() {
            return Err(TaskwardenError::TaskValidation(
                "Description cannot be empty".into(),
            ));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(TaskwardenError::TaskValidation(format!(
                "Description exceeds {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        if self.due_date < today {
            return Err(TaskwardenError::TaskValidation(
                "Due date cannot be in the past".into(),
            ));
        }
        Ok(())
    }

    pub fn into_record(self, id: i64) -> TaskRecord {
        TaskRecord {
            id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            is_completed: false,
        }
    }
}

/// Completion-state filter. Codes match what responders are told: 0, 1, 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionFilter {
    #[default]
    Any,
    Open,
    Completed,
}

impl CompletionFilter {
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::Open,
            2 => Self::Completed,
            _ => Self::Any,
        }
    }

    pub fn matches(&self, task: &TaskRecord) -> bool {
        match self {
            Self::Any => true,
            Self::Open => !task.is_completed,
            Self::Completed => task.is_completed,
        }
    }
}

/// Due-date bucket filter. Codes: 0 any, 1 past due, 2 due today, 3 future.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueFilter {
    #[default]
    Any,
    PastDue,
    DueToday,
    Future,
}

impl DueFilter {
    pub fn from_code(code: u64) -> Self {
        match code {
            1 => Self::PastDue,
            2 => Self::DueToday,
            3 => Self::Future,
            _ => Self::Any,
        }
    }

    pub fn matches(&self, task: &TaskRecord, today: NaiveDate) -> bool {
        match self {
            Self::Any => true,
            Self::PastDue => task.due_date < today,
            Self::DueToday => task.due_date == today,
            Self::Future => task.due_date > today,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub completed: CompletionFilter,
    #[serde(default)]
    pub due: DueFilter,
}

impl TaskFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(completed: CompletionFilter, due: DueFilter) -> Self {
        Self { completed, due }
    }

    /// Build from the numeric codes used in operation inputs.
    pub fn from_codes(completed: u64, due: u64) -> Self {
        Self {
            completed: CompletionFilter::from_code(completed),
            due: DueFilter::from_code(due),
        }
    }

    pub fn matches(&self, task: &TaskRecord, today: NaiveDate) -> bool {
        self.completed.matches(task) && self.due.matches(task, today)
    }
}

/// The answer handed back to the caller for every turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinalAnswer {
    pub answer: String,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

impl FinalAnswer {
    pub fn new(answer: impl Into<String>, tasks: Vec<TaskRecord>) -> Self {
        Self {
            answer: answer.into(),
            tasks,
        }
    }

    pub fn text(answer: impl Into<String>) -> Self {
        Self::new(answer, Vec::new())
    }
}

/// Today's date in UTC, the reference point for due-date buckets.
pub fn today_utc() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// The two tasks seeded into an empty store.
pub fn sample_tasks(today: NaiveDate) -> Vec<NewTask> {
    vec![
        NewTask::new(
            "Sample Task 1",
            "This is a sample task",
            today + chrono::Days::new(1),
        ),
        NewTask::new(
            "Sample Task 2",
            "Another sample task",
            today + chrono::Days::new(2),
        ),
    ]
}

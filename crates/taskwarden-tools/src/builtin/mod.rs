pub mod search;
pub mod system;
pub mod tasks;

use serde::de::DeserializeOwned;

use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::task::TaskRecord;
use taskwarden_core::types::OperationOutput;

pub use search::SearchTasksOperation;
pub use system::{ClearHistoryOperation, TodayOperation, CLEAR_GREETING};
pub use tasks::{
    CreateTaskOperation, DeleteTaskOperation, FindByTitleOperation, GetAllTasksOperation,
    MarkCompleteOperation,
};

/// Deserialize operation input, reporting shape errors as validation failures.
pub(crate) fn parse_input<T: DeserializeOwned>(input: serde_json::Value) -> Result<T> {
    // Some models send `null` for operations without parameters.
    let input = if input.is_null() {
        serde_json::json!({})
    } else {
        input
    };
    serde_json::from_value(input).map_err(|e| TaskwardenError::OperationValidation(e.to_string()))
}

pub(crate) fn tasks_output(tasks: &[TaskRecord]) -> Result<OperationOutput> {
    Ok(OperationOutput::success(serde_json::to_string(tasks)?))
}

pub(crate) fn task_output(task: &TaskRecord) -> Result<OperationOutput> {
    Ok(OperationOutput::success(serde_json::to_string(task)?))
}

/// Filter codes shared by listing and search.
pub(crate) fn filter_schema() -> (serde_json::Value, serde_json::Value) {
    (
        serde_json::json!({
            "type": "integer",
            "enum": [0, 1, 2],
            "description": "0 - no filter, 1 - only not completed, 2 - only completed"
        }),
        serde_json::json!({
            "type": "integer",
            "enum": [0, 1, 2, 3],
            "description": "0 - no filter, 1 - only past due, 2 - only due today, 3 - only due in future"
        }),
    )
}

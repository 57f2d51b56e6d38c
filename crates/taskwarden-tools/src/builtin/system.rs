use futures::future::BoxFuture;
use serde_json::json;
use tracing::info;

use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::task::today_utc;
use taskwarden_core::traits::Operation;
use taskwarden_core::types::{OperationContext, OperationOutput};

/// Reply handed back to the responder after a reset.
pub const CLEAR_GREETING: &str = "Hello! How can I help you?";

pub struct TodayOperation;

impl Operation for TodayOperation {
    fn name(&self) -> &str {
        "today"
    }

    fn description(&self) -> &str {
        "Returns today's date (UTC) as YYYY-MM-DD."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }

    fn timeout_secs(&self) -> u64 {
        5
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: OperationContext,
    ) -> BoxFuture<'_, Result<OperationOutput>> {
        Box::pin(async move {
            Ok(OperationOutput::success(
                today_utc().format("%Y-%m-%d").to_string(),
            ))
        })
    }
}

pub struct ClearHistoryOperation;

impl Operation for ClearHistoryOperation {
    fn name(&self) -> &str {
        "clear_history"
    }

    fn description(&self) -> &str {
        "Clears the chat history and the context of every assistant."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({ "type": "object", "properties": {} })
    }

    fn execute(
        &self,
        _input: serde_json::Value,
        ctx: OperationContext,
    ) -> BoxFuture<'_, Result<OperationOutput>> {
        Box::pin(async move {
            let history = ctx
                .history
                .as_ref()
                .ok_or_else(|| TaskwardenError::OperationExecution {
                    operation: "clear_history".into(),
                    message: "History reset not available".into(),
                })?;

            match history.clear_history().await {
                Ok(()) => {
                    info!(turn_id = %ctx.turn_id, node_id = %ctx.node_id, "History cleared by operation");
                    Ok(OperationOutput::success(CLEAR_GREETING))
                }
                Err(e) => Ok(OperationOutput::error(format!("Clear failed: {}", e))),
            }
        })
    }
}

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use taskwarden_core::config::{AppConfig, ModelConfig};
use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::event::EventBus;
use taskwarden_core::traits::{LlmClient, Operation, Responder};
use taskwarden_core::types::*;
use taskwarden_tools::registry::execute_with_timeout;

use crate::output::parse_typed_reply;

/// Accumulator for streaming tool call deltas.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    input_json: String,
}

/// Responder backed by a streaming chat model, with a bounded tool-use loop.
///
/// Offered operations are exposed as tools. The session, when given, receives
/// the user message and everything the model and the operations produced, but
/// only once the call succeeds.
pub struct LlmResponder {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    max_turns: usize,
    max_duration: Duration,
    event_bus: Arc<EventBus>,
}

impl LlmResponder {
    pub fn new(llm: Arc<dyn LlmClient>, config: &AppConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            llm,
            model: config.model.clone(),
            max_turns: config.agent.max_turns,
            max_duration: Duration::from_secs(config.agent.max_duration_secs),
            event_bus,
        }
    }

    async fn run(
        &self,
        request: ResponderRequest,
        cancel: CancellationToken,
    ) -> Result<ResponderReply> {
        let mut messages = vec![ChatMessage::system(system_prompt(&request))];
        if let Conversation::Session(session) = &request.conversation {
            messages.extend(session.history().await);
        }
        let user_msg = ChatMessage::user(request.input.clone());
        messages.push(user_msg.clone());
        let mut produced = vec![user_msg];

        let defs: Vec<OperationDefinition> =
            request.operations.iter().map(|op| op.definition()).collect();
        let mut items = Vec::new();

        for turn in 0..self.max_turns {
            if cancel.is_cancelled() {
                return Err(TaskwardenError::Cancelled);
            }
            debug!(node_id = %request.node_id, turn, "Responder turn");

            let mut stream = tokio::select! {
                result = self.llm.chat_stream(&self.model, messages.clone(), &defs) => result.map_err(unavailable)?,
                _ = cancel.cancelled() => return Err(TaskwardenError::Cancelled),
            };

            let mut text_content = String::new();
            let mut tool_calls: Vec<ToolCallAccumulator> = Vec::new();

            loop {
                let delta = tokio::select! {
                    next = stream.next() => next,
                    _ = cancel.cancelled() => return Err(TaskwardenError::Cancelled),
                };
                let Some(delta) = delta else { break };
                match delta.map_err(unavailable)? {
                    StreamDelta::TextDelta(text) => text_content.push_str(&text),
                    StreamDelta::ToolUseStart { index, id, name } => {
                        while tool_calls.len() <= index {
                            tool_calls.push(ToolCallAccumulator::default());
                        }
                        tool_calls[index].id = id;
                        tool_calls[index].name = name;
                    }
                    StreamDelta::ToolInputDelta { index, delta } => {
                        if let Some(tc) = tool_calls.get_mut(index) {
                            tc.input_json.push_str(&delta);
                        }
                    }
                    StreamDelta::Stop(StopReason::MaxTokens) => {
                        warn!(node_id = %request.node_id, "LLM hit max tokens");
                    }
                    StreamDelta::Stop(_) => {}
                    StreamDelta::Usage {
                        input_tokens,
                        output_tokens,
                    } => {
                        debug!(input_tokens, output_tokens, "Token usage");
                    }
                }
            }
            drop(stream);

            let parsed_inputs: Vec<serde_json::Value> = tool_calls
                .iter()
                .map(|tc| serde_json::from_str(&tc.input_json).unwrap_or(serde_json::Value::Null))
                .collect();

            let mut content_blocks = Vec::new();
            if !text_content.is_empty() {
                content_blocks.push(ContentBlock::Text {
                    text: text_content.clone(),
                });
                items.push(ResponseItem::Text {
                    text: text_content.clone(),
                });
            }
            for (tc, input) in tool_calls.iter().zip(&parsed_inputs) {
                content_blocks.push(ContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: input.clone(),
                });
            }
            let assistant_msg = ChatMessage {
                role: Role::Assistant,
                content: content_blocks,
                timestamp: Some(chrono::Utc::now()),
            };
            messages.push(assistant_msg.clone());
            produced.push(assistant_msg);

            if tool_calls.is_empty() {
                let value = match &request.shape {
                    ExpectedShape::Typed { schema, .. } => {
                        Some(parse_typed_reply(&text_content, schema)?)
                    }
                    ExpectedShape::Unstructured => None,
                };
                if let Conversation::Session(session) = &request.conversation {
                    session.append(produced).await;
                }
                info!(node_id = %request.node_id, turns = turn + 1, "Responder finished");
                return Ok(ResponderReply {
                    text: text_content,
                    value,
                    items,
                });
            }

            let mut result_blocks = Vec::with_capacity(tool_calls.len());
            for (tc, input) in tool_calls.iter().zip(parsed_inputs) {
                items.push(ResponseItem::OperationCall {
                    name: tc.name.clone(),
                });
                let output = self.call_operation(&request, &tc.name, input).await;
                items.push(ResponseItem::OperationResult {
                    name: tc.name.clone(),
                    content: output.content.clone(),
                });
                result_blocks.push(ContentBlock::ToolResult {
                    tool_use_id: tc.id.clone(),
                    content: output.content,
                    is_error: output.is_error,
                });
            }
            let results_msg = ChatMessage {
                role: Role::User,
                content: result_blocks,
                timestamp: Some(chrono::Utc::now()),
            };
            messages.push(results_msg.clone());
            produced.push(results_msg);
        }

        Err(TaskwardenError::MaxTurnsExceeded(self.max_turns))
    }

    async fn call_operation(
        &self,
        request: &ResponderRequest,
        name: &str,
        input: serde_json::Value,
    ) -> OperationOutput {
        self.event_bus.publish(WorkflowEvent::OperationStarted {
            turn_id: request.turn_id,
            node_id: request.node_id.clone(),
            name: name.to_string(),
        });

        let output = match find_operation(&request.operations, name) {
            Some(op) => {
                let mut ctx = OperationContext::new(request.turn_id, request.node_id.clone());
                if let Some(history) = &request.history_control {
                    ctx = ctx.with_history(history.clone());
                }
                match execute_with_timeout(op.as_ref(), input, ctx).await {
                    Ok(output) => output,
                    Err(e) => {
                        error!(operation = %name, error = %e, "Operation failed");
                        OperationOutput::error(e.to_string())
                    }
                }
            }
            None => {
                warn!(operation = %name, node_id = %request.node_id, "Model called an operation it was not offered");
                OperationOutput::error(format!("Unknown operation: {}", name))
            }
        };

        self.event_bus.publish(WorkflowEvent::OperationFinished {
            turn_id: request.turn_id,
            node_id: request.node_id.clone(),
            name: name.to_string(),
            is_error: output.is_error,
        });
        output
    }
}

impl Responder for LlmResponder {
    fn create_session(&self) -> BoxFuture<'_, Result<Arc<Session>>> {
        Box::pin(async move { Ok(Arc::new(Session::new())) })
    }

    fn invoke(
        &self,
        request: ResponderRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<ResponderReply>> {
        Box::pin(async move {
            match tokio::time::timeout(self.max_duration, self.run(request, cancel)).await {
                Ok(result) => result,
                Err(_) => Err(TaskwardenError::ResponderTimeout {
                    timeout_secs: self.max_duration.as_secs(),
                }),
            }
        })
    }
}

fn find_operation<'a>(operations: &'a [Arc<dyn Operation>], name: &str) -> Option<&'a Arc<dyn Operation>> {
    operations.iter().find(|op| op.name() == name)
}

fn system_prompt(request: &ResponderRequest) -> String {
    match &request.shape {
        ExpectedShape::Unstructured => request.instructions.clone(),
        ExpectedShape::Typed { name, schema } => format!(
            "{}\n\nALWAYS respond with a single JSON object ({}) matching this JSON schema, \
             and nothing else:\n{}",
            request.instructions,
            name,
            serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
        ),
    }
}

/// Transport failures mean the responder cannot be reached.
fn unavailable(e: TaskwardenError) -> TaskwardenError {
    match e {
        TaskwardenError::LlmRequest(msg) | TaskwardenError::LlmStream(msg) => {
            TaskwardenError::ResponderUnavailable(msg)
        }
        other => other,
    }
}

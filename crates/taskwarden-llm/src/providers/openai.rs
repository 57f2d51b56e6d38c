use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use taskwarden_core::config::ModelConfig;
use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::traits::LlmClient;
use taskwarden_core::types::*;

use crate::streaming::{SseEvent, SseStream};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible client. Works with OpenAI, Ollama, vLLM, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
pub(crate) struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
}

impl ChatRequest {
    /// Azure carries the model in the deployment URL, so `model` is optional.
    pub(crate) fn new(
        config: &ModelConfig,
        model: Option<String>,
        messages: Vec<ChatMessage>,
        operations: &[OperationDefinition],
    ) -> Self {
        Self {
            model,
            messages: convert_messages(messages),
            max_tokens: config.max_tokens,
            temperature: (config.temperature > 0.0).then_some(config.temperature),
            stream: true,
            tools: convert_operations(operations),
        }
    }
}

#[derive(Serialize, Debug)]
pub(crate) struct OaiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OaiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OaiMessage {
    fn plain(role: &str, text: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(serde_json::Value::String(text)),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct OaiToolCall {
    #[serde(default)]
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<OaiFunction>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub(crate) struct OaiFunction {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct OaiTool {
    r#type: String,
    function: OaiToolDef,
}

#[derive(Serialize)]
pub(crate) struct OaiToolDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Response types
#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OaiToolCall>>,
}

#[derive(Deserialize, Debug)]
struct StreamUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub(crate) fn convert_operations(operations: &[OperationDefinition]) -> Vec<OaiTool> {
    operations
        .iter()
        .map(|op| OaiTool {
            r#type: "function".to_string(),
            function: OaiToolDef {
                name: op.name.clone(),
                description: op.description.clone(),
                parameters: op.input_schema.clone(),
            },
        })
        .collect()
}

pub(crate) fn convert_messages(messages: Vec<ChatMessage>) -> Vec<OaiMessage> {
    let mut oai_msgs = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => oai_msgs.push(OaiMessage::plain("system", msg.text())),
            Role::User => {
                let tool_results: Vec<_> = msg
                    .content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => Some((tool_use_id.clone(), content.clone())),
                        _ => None,
                    })
                    .collect();

                if tool_results.is_empty() {
                    oai_msgs.push(OaiMessage::plain("user", msg.text()));
                } else {
                    for (id, content) in tool_results {
                        oai_msgs.push(OaiMessage {
                            role: "tool".to_string(),
                            content: Some(serde_json::Value::String(content)),
                            tool_calls: None,
                            tool_call_id: Some(id),
                        });
                    }
                }
            }
            Role::Assistant => {
                let tool_uses = msg.tool_uses();
                if tool_uses.is_empty() {
                    oai_msgs.push(OaiMessage::plain("assistant", msg.text()));
                    continue;
                }
                let text = msg.text();
                let calls: Vec<OaiToolCall> = tool_uses
                    .iter()
                    .enumerate()
                    .map(|(i, (id, name, input))| OaiToolCall {
                        index: i,
                        id: Some(id.to_string()),
                        r#type: Some("function".to_string()),
                        function: Some(OaiFunction {
                            name: Some(name.to_string()),
                            arguments: Some(input.to_string()),
                        }),
                    })
                    .collect();

                oai_msgs.push(OaiMessage {
                    role: "assistant".to_string(),
                    content: (!text.is_empty()).then(|| serde_json::Value::String(text)),
                    tool_calls: Some(calls),
                    tool_call_id: None,
                });
            }
            Role::Tool => {
                // Carried as User messages with ToolResult blocks
            }
        }
    }

    oai_msgs
}

pub(crate) fn parse_chunk(event: SseEvent) -> Vec<Result<StreamDelta>> {
    if event.is_done() {
        return vec![];
    }

    let chunk: StreamChunk = match serde_json::from_str(&event.data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %event.data, error = %e, "Failed to parse chat completion chunk");
            return vec![];
        }
    };

    let mut deltas = Vec::new();

    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    // Azure sends a leading chunk with empty choices (content filter results).
    let Some(choice) = chunk.choices.into_iter().next() else {
        return deltas;
    };

    if let Some(delta) = choice.delta {
        if let Some(text) = delta.content {
            if !text.is_empty() {
                deltas.push(Ok(StreamDelta::TextDelta(text)));
            }
        }

        // Some providers send name and arguments in the same chunk.
        for tc in delta.tool_calls.unwrap_or_default() {
            if let Some(func) = tc.function {
                if let Some(name) = func.name {
                    deltas.push(Ok(StreamDelta::ToolUseStart {
                        index: tc.index,
                        id: tc.id.unwrap_or_default(),
                        name,
                    }));
                }
                if let Some(args) = func.arguments {
                    deltas.push(Ok(StreamDelta::ToolInputDelta {
                        index: tc.index,
                        delta: args,
                    }));
                }
            }
        }
    }

    if let Some(reason) = choice.finish_reason {
        let stop = match reason.as_str() {
            "tool_calls" | "function_call" => StopReason::ToolUse,
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        };
        deltas.push(Ok(StreamDelta::Stop(stop)));
    }

    deltas
}

/// Turn a successful streaming response into a delta stream; map HTTP failures
/// to `LlmRequest` so the retry layer can classify them.
pub(crate) async fn into_delta_stream(
    response: reqwest::Response,
) -> Result<BoxStream<'static, Result<StreamDelta>>> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        return Err(TaskwardenError::LlmRequest(format!("HTTP {}: {}", status, body)));
    }

    let sse_stream = SseStream::new(response.bytes_stream());
    let delta_stream = sse_stream
        .map(|event| match event {
            Ok(event) => futures::stream::iter(parse_chunk(event)),
            Err(e) => futures::stream::iter(vec![Err(e)]),
        })
        .flatten();

    Ok(Box::pin(delta_stream))
}

fn chat_url(base_url: Option<&str>) -> String {
    let base = base_url.unwrap_or(OPENAI_API_URL).trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        operations: &[OperationDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let operations = operations.to_vec();

        Box::pin(async move {
            let url = chat_url(config.base_url.as_deref());
            let body = ChatRequest::new(
                &config,
                Some(config.model_id.clone()),
                messages,
                &operations,
            );
            debug!(url = %url, model = %config.model_id, "Sending chat completion request");

            let mut req = self.http.post(&url).json(&body);
            if let Some(api_key) = &config.api_key {
                req = req.bearer_auth(api_key);
            }

            let response = req
                .send()
                .await
                .map_err(|e| TaskwardenError::LlmRequest(e.to_string()))?;

            let stream: BoxStream<'_, Result<StreamDelta>> = into_delta_stream(response).await?;
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> SseEvent {
        SseEvent {
            event_type: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_parse_text_delta() {
        let deltas = parse_chunk(event(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#));
        assert_eq!(deltas.len(), 1);
        assert!(matches!(&deltas[0], Ok(StreamDelta::TextDelta(t)) if t == "Hi"));
    }

    #[test]
    fn test_parse_tool_call_start_and_args() {
        let deltas = parse_chunk(event(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"today","arguments":"{}"}}]}}]}"#,
        ));
        assert_eq!(deltas.len(), 2);
        assert!(matches!(&deltas[0], Ok(StreamDelta::ToolUseStart { name, .. }) if name == "today"));
        assert!(matches!(&deltas[1], Ok(StreamDelta::ToolInputDelta { delta, .. }) if delta == "{}"));
    }

    #[test]
    fn test_parse_finish_reason() {
        let deltas = parse_chunk(event(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#));
        assert!(matches!(deltas.last(), Some(Ok(StreamDelta::Stop(StopReason::ToolUse)))));
    }

    #[test]
    fn test_parse_azure_prompt_filter_chunk() {
        let deltas = parse_chunk(event(r#"{"choices":[],"prompt_filter_results":[]}"#));
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_parse_done_and_garbage() {
        assert!(parse_chunk(event("[DONE]")).is_empty());
        assert!(parse_chunk(event("not json")).is_empty());
    }

    #[test]
    fn test_convert_messages_tool_round_trip() {
        let mut assistant = ChatMessage::assistant_text("");
        assistant.content = vec![ContentBlock::ToolUse {
            id: "call_1".into(),
            name: "get_all_tasks".into(),
            input: serde_json::json!({"filter_completed": 0}),
        }];
        let msgs = convert_messages(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("list"),
            assistant,
            ChatMessage::tool_result("call_1", "[]", false),
        ]);
        let roles: Vec<_> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert!(msgs[2].content.is_none());
        assert_eq!(msgs[3].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_chat_url() {
        assert_eq!(chat_url(None), "https://api.openai.com/v1/chat/completions");
        assert_eq!(
            chat_url(Some("http://localhost:11434/v1/")),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(
            chat_url(Some("http://proxy/chat/completions")),
            "http://proxy/chat/completions"
        );
    }
}

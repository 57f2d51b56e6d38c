use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::traits::Operation;

/// Unique session identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one question travelling through the workflow.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TurnId(pub Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user question and when it arrived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,
    pub user_text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            user_text: user_text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A chat message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                content: content.into(),
                is_error,
            }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool use blocks from this message.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// Start of a tool use block.
    ToolUseStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A chunk of tool use input JSON.
    ToolInputDelta { index: usize, delta: String },

    /// The response is complete.
    Stop(StopReason),

    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Result of an operation execution.
#[derive(Debug, Clone)]
pub struct OperationOutput {
    pub content: String,
    pub is_error: bool,
}

impl OperationOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Operation definition for sending to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to operations during execution.
#[derive(Clone)]
pub struct OperationContext {
    pub turn_id: TurnId,
    pub node_id: String,
    pub history: Option<Arc<dyn HistoryControl>>,
}

impl OperationContext {
    pub fn new(turn_id: TurnId, node_id: impl Into<String>) -> Self {
        Self {
            turn_id,
            node_id: node_id.into(),
            history: None,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryControl>) -> Self {
        self.history = Some(history);
        self
    }
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("turn_id", &self.turn_id)
            .field("node_id", &self.node_id)
            .field("history", &self.history.is_some())
            .finish()
    }
}

/// Lets an operation reset conversational memory without a dependency on the agent crate.
pub trait HistoryControl: Send + Sync + 'static {
    fn clear_history(&self) -> BoxFuture<'_, crate::error::Result<()>>;
}

/// Per-node conversational memory. The handle is shared; the history is not
/// copied between turns.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    history: tokio::sync::Mutex<Vec<ChatMessage>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            created_at: Utc::now(),
            history: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.history.lock().await.clone()
    }

    pub async fn append(&self, msgs: Vec<ChatMessage>) {
        self.history.lock().await.extend(msgs);
    }

    pub async fn len(&self) -> usize {
        self.history.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.history.lock().await.is_empty()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a responder call reads and writes its history.
#[derive(Debug, Clone)]
pub enum Conversation {
    Session(Arc<Session>),
    /// A one-off message with no memory.
    Transient,
}

/// Output shape a node expects from its responder.
#[derive(Debug, Clone)]
pub enum ExpectedShape {
    Unstructured,
    Typed {
        name: String,
        schema: serde_json::Value,
    },
}

impl ExpectedShape {
    pub fn typed<T: schemars::JsonSchema>(name: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(T);
        Self::Typed {
            name: name.into(),
            schema: serde_json::to_value(schema).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn is_typed(&self) -> bool {
        matches!(self, Self::Typed { .. })
    }
}

/// Everything a responder needs for one invocation.
#[derive(Clone)]
pub struct ResponderRequest {
    pub node_id: String,
    pub turn_id: TurnId,
    pub instructions: String,
    pub operations: Vec<Arc<dyn Operation>>,
    pub conversation: Conversation,
    pub input: String,
    pub shape: ExpectedShape,
    pub history_control: Option<Arc<dyn HistoryControl>>,
}

impl std::fmt::Debug for ResponderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderRequest")
            .field("node_id", &self.node_id)
            .field("turn_id", &self.turn_id)
            .field(
                "operations",
                &self.operations.iter().map(|o| o.name()).collect::<Vec<_>>(),
            )
            .field("conversation", &self.conversation)
            .field("input", &self.input)
            .field("shape", &self.shape)
            .finish()
    }
}

/// Something the responder produced on its way to the final reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseItem {
    Text { text: String },
    OperationCall { name: String },
    OperationResult { name: String, content: String },
}

#[derive(Debug, Clone, Default)]
pub struct ResponderReply {
    pub text: String,
    /// Parsed JSON when the request asked for a typed shape.
    pub value: Option<serde_json::Value>,
    pub items: Vec<ResponseItem>,
}

impl ResponderReply {
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            items: vec![ResponseItem::Text { text: text.clone() }],
            text,
            value: None,
        }
    }

    pub fn typed(value: serde_json::Value) -> Self {
        let text = value.to_string();
        Self {
            items: vec![ResponseItem::Text { text: text.clone() }],
            text,
            value: Some(value),
        }
    }
}

/// Workflow event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    TurnStarted {
        turn_id: TurnId,
        question: String,
    },
    NodeCompleted {
        turn_id: TurnId,
        node_id: String,
        summary: String,
        elapsed_ms: u64,
    },
    TurnCompleted {
        turn_id: TurnId,
        node_id: String,
        elapsed_ms: u64,
    },
    TurnFailed {
        turn_id: TurnId,
        node_id: Option<String>,
        error: String,
    },
    SessionCleared {
        node_id: String,
    },
    OperationStarted {
        turn_id: TurnId,
        node_id: String,
        name: String,
    },
    OperationFinished {
        turn_id: TurnId,
        node_id: String,
        name: String,
        is_error: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_history_appends() {
        let session = Session::new();
        assert!(session.is_empty().await);
        session
            .append(vec![ChatMessage::user("hi"), ChatMessage::assistant_text("hello")])
            .await;
        assert_eq!(session.len().await, 2);
        assert_eq!(session.history().await[1].text(), "hello");
    }

    #[test]
    fn test_typed_shape_has_schema() {
        let shape = ExpectedShape::typed::<crate::task::FinalAnswer>("FinalAnswer");
        match shape {
            ExpectedShape::Typed { name, schema } => {
                assert_eq!(name, "FinalAnswer");
                assert!(schema["properties"]["answer"].is_object());
            }
            ExpectedShape::Unstructured => panic!("expected typed shape"),
        }
    }

    #[test]
    fn test_reply_text_records_item() {
        let reply = ResponderReply::text("done");
        assert_eq!(reply.items, vec![ResponseItem::Text { text: "done".into() }]);
        assert!(reply.value.is_none());
    }
}

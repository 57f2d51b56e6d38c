pub mod first_line;
pub mod guardian;
pub mod guardrail;
pub mod qna;
pub mod worker;

pub use first_line::FirstLineNode;
pub use guardian::GuardianNode;
pub use guardrail::{PassThroughNode, ThreatRejectedNode};
pub use qna::QnaNode;
pub use worker::WorkerNode;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::traits::{Operation, Responder};
use taskwarden_core::types::{Conversation, ExpectedShape, ResponderReply, ResponderRequest};

use crate::graph::executor::TurnContext;
use crate::graph::node::NodeOutput;

/// Conversational memory used by a responder node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Memory {
    /// The node's session from the registry.
    Session,
    /// A fresh message each time.
    Transient,
}

/// The fixed part of a responder call: who answers, with which
/// instructions and operations, and whether history is kept.
#[derive(Clone)]
pub struct ResponderBinding {
    pub node_id: String,
    pub instructions: String,
    pub operations: Vec<Arc<dyn Operation>>,
    pub memory: Memory,
    responder: Arc<dyn Responder>,
}

impl ResponderBinding {
    pub fn new(
        node_id: impl Into<String>,
        responder: Arc<dyn Responder>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            instructions: instructions.into(),
            operations: Vec::new(),
            memory: Memory::Session,
            responder,
        }
    }

    pub fn with_operations(mut self, operations: Vec<Arc<dyn Operation>>) -> Self {
        self.operations = operations;
        self
    }

    pub fn transient(mut self) -> Self {
        self.memory = Memory::Transient;
        self
    }

    pub(crate) async fn invoke(
        &self,
        ctx: &mut TurnContext,
        input: String,
        shape: ExpectedShape,
    ) -> Result<ResponderReply> {
        let conversation = match self.memory {
            Memory::Session => Conversation::Session(ctx.session(&self.node_id).await?),
            Memory::Transient => Conversation::Transient,
        };
        let request = ResponderRequest {
            node_id: self.node_id.clone(),
            turn_id: ctx.turn_id(),
            instructions: self.instructions.clone(),
            operations: self.operations.clone(),
            conversation,
            input,
            shape,
            history_control: ctx.history_control(),
        };
        self.responder.invoke(request, ctx.cancel.clone()).await
    }
}

impl std::fmt::Debug for ResponderBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderBinding")
            .field("node_id", &self.node_id)
            .field(
                "operations",
                &self.operations.iter().map(|o| o.name()).collect::<Vec<_>>(),
            )
            .field("memory", &self.memory)
            .finish()
    }
}

/// Decode a typed reply into `T`. A missing or mismatched value is a
/// `SchemaViolation` for `node_id`.
pub(crate) fn decode<T: DeserializeOwned>(node_id: &str, reply: ResponderReply) -> Result<T> {
    let value = match reply.value {
        Some(v) => v,
        None => serde_json::from_str(reply.text.trim()).map_err(|e| schema_violation(node_id, e))?,
    };
    serde_json::from_value(value).map_err(|e| schema_violation(node_id, e))
}

pub(crate) fn schema_violation(node_id: &str, message: impl std::fmt::Display) -> TaskwardenError {
    TaskwardenError::SchemaViolation {
        node: node_id.to_string(),
        message: message.to_string(),
    }
}

/// Error for a node handed a payload its edges should never deliver.
pub(crate) fn unexpected_input(node_id: &str, input: &NodeOutput) -> TaskwardenError {
    schema_violation(node_id, format!("unexpected {} input", input.kind()))
}

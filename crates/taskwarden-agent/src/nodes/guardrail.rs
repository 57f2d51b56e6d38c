use futures::future::BoxFuture;

use taskwarden_core::error::Result;
use taskwarden_core::task::FinalAnswer;

use super::{schema_violation, unexpected_input};
use crate::graph::executor::TurnContext;
use crate::graph::node::{Executor, NodeOutput, PayloadKind};
use crate::graph::state::ORIGINAL_QUESTION;

/// Terminal leaf for a threat verdict. Never calls a responder.
pub struct ThreatRejectedNode {
    id: String,
}

impl ThreatRejectedNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl Executor for ThreatRejectedNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_kind(&self) -> PayloadKind {
        PayloadKind::Guardian
    }

    fn output_kind(&self) -> PayloadKind {
        PayloadKind::Final
    }

    fn execute<'a>(
        &'a self,
        input: NodeOutput,
        _ctx: &'a mut TurnContext,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            match input {
                NodeOutput::Guardian(decision) => Ok(NodeOutput::Final(FinalAnswer::new(
                    format!("WARNING: {}", decision.answer),
                    vec![],
                ))),
                other => Err(unexpected_input(&self.id, &other)),
            }
        })
    }
}

/// Forwards the stored question after a safe verdict.
pub struct PassThroughNode {
    id: String,
    scope: String,
}

impl PassThroughNode {
    pub fn new(id: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scope: scope.into(),
        }
    }
}

impl Executor for PassThroughNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_kind(&self) -> PayloadKind {
        PayloadKind::Guardian
    }

    fn output_kind(&self) -> PayloadKind {
        PayloadKind::Question
    }

    fn execute<'a>(
        &'a self,
        input: NodeOutput,
        ctx: &'a mut TurnContext,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            match input {
                NodeOutput::Guardian(decision) if decision.is_threat => Err(schema_violation(
                    &self.id,
                    "invoked with a threat verdict",
                )),
                NodeOutput::Guardian(_) => {
                    let question = ctx.state.require_str(&self.scope, ORIGINAL_QUESTION)?;
                    Ok(NodeOutput::Question(question.to_string()))
                }
                other => Err(unexpected_input(&self.id, &other)),
            }
        })
    }
}

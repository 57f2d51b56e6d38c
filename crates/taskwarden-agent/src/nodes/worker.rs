use futures::future::BoxFuture;
use tracing::debug;

use taskwarden_core::error::Result;
use taskwarden_core::task::FinalAnswer;
use taskwarden_core::types::ExpectedShape;

use super::{decode, schema_violation, unexpected_input, ResponderBinding};
use crate::format::format_trace;
use crate::graph::executor::TurnContext;
use crate::graph::node::{Executor, NodeOutput, PayloadKind, Redirect};
use crate::graph::state::ORIGINAL_QUESTION;

/// Works on the task list through the task operations.
pub struct WorkerNode {
    binding: ResponderBinding,
    scope: String,
    show_thinking: bool,
}

impl WorkerNode {
    pub fn new(binding: ResponderBinding, scope: impl Into<String>) -> Self {
        Self {
            binding,
            scope: scope.into(),
            show_thinking: false,
        }
    }

    /// Prefix answers with a trace of the responder's intermediate items.
    pub fn show_thinking(mut self, show: bool) -> Self {
        self.show_thinking = show;
        self
    }
}

impl Executor for WorkerNode {
    fn id(&self) -> &str {
        &self.binding.node_id
    }

    fn input_kind(&self) -> PayloadKind {
        PayloadKind::Route
    }

    fn output_kind(&self) -> PayloadKind {
        PayloadKind::Final
    }

    fn accepts(&self, kind: PayloadKind) -> bool {
        matches!(kind, PayloadKind::Route | PayloadKind::Question)
    }

    fn execute<'a>(
        &'a self,
        input: NodeOutput,
        ctx: &'a mut TurnContext,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            match &input {
                NodeOutput::Route(d) if d.redirect == Redirect::QnA => {
                    return Err(schema_violation(self.id(), "routed with redirect QnA"))
                }
                NodeOutput::Route(_) | NodeOutput::Question(_) => {}
                other => return Err(unexpected_input(self.id(), other)),
            }

            let question = ctx
                .state
                .require_str(&self.scope, ORIGINAL_QUESTION)?
                .to_string();
            let reply = self
                .binding
                .invoke(
                    ctx,
                    question,
                    ExpectedShape::typed::<FinalAnswer>("AskResponse"),
                )
                .await?;
            let items = reply.items.clone();
            let mut answer: FinalAnswer = decode(self.id(), reply)?;
            debug!(turn_id = %ctx.turn_id(), tasks = answer.tasks.len(), "Worker answered");

            if self.show_thinking {
                answer.answer = format!("{}{}", format_trace(&items), answer.answer);
            }
            Ok(NodeOutput::Final(answer))
        })
    }
}

use futures::future::BoxFuture;
use tracing::debug;

use taskwarden_core::error::Result;
use taskwarden_core::types::ExpectedShape;

use super::{decode, unexpected_input, ResponderBinding};
use crate::graph::executor::TurnContext;
use crate::graph::node::{Executor, NodeOutput, PayloadKind, RouteDecision};

/// Intent classifier: decides which assistant answers the question.
pub struct FirstLineNode {
    binding: ResponderBinding,
}

impl FirstLineNode {
    pub fn new(binding: ResponderBinding) -> Self {
        Self { binding }
    }
}

impl Executor for FirstLineNode {
    fn id(&self) -> &str {
        &self.binding.node_id
    }

    fn input_kind(&self) -> PayloadKind {
        PayloadKind::Question
    }

    fn output_kind(&self) -> PayloadKind {
        PayloadKind::Route
    }

    fn execute<'a>(
        &'a self,
        input: NodeOutput,
        ctx: &'a mut TurnContext,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let question = match input {
                NodeOutput::Question(q) => q,
                other => return Err(unexpected_input(self.id(), &other)),
            };
            let reply = self
                .binding
                .invoke(
                    ctx,
                    question,
                    ExpectedShape::typed::<RouteDecision>("FirstLineResponse"),
                )
                .await?;
            let decision: RouteDecision = decode(self.id(), reply)?;
            debug!(turn_id = %ctx.turn_id(), redirect = ?decision.redirect, "Question classified");
            Ok(NodeOutput::Route(decision))
        })
    }
}

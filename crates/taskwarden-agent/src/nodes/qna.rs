use futures::future::BoxFuture;

use taskwarden_core::error::Result;
use taskwarden_core::task::FinalAnswer;
use taskwarden_core::types::ExpectedShape;

use super::{schema_violation, unexpected_input, ResponderBinding};
use crate::graph::executor::TurnContext;
use crate::graph::node::{Executor, NodeOutput, PayloadKind, Redirect};
use crate::graph::state::ORIGINAL_QUESTION;

/// Answers how-to questions from the reference manual.
pub struct QnaNode {
    binding: ResponderBinding,
    scope: String,
}

impl QnaNode {
    pub fn new(binding: ResponderBinding, scope: impl Into<String>) -> Self {
        Self {
            binding,
            scope: scope.into(),
        }
    }
}

impl Executor for QnaNode {
    fn id(&self) -> &str {
        &self.binding.node_id
    }

    fn input_kind(&self) -> PayloadKind {
        PayloadKind::Route
    }

    fn output_kind(&self) -> PayloadKind {
        PayloadKind::Final
    }

    fn execute<'a>(
        &'a self,
        input: NodeOutput,
        ctx: &'a mut TurnContext,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            match &input {
                NodeOutput::Route(d) if d.redirect == Redirect::QnA => {}
                NodeOutput::Route(d) => {
                    return Err(schema_violation(
                        self.id(),
                        format!("routed with redirect {:?}", d.redirect),
                    ))
                }
                other => return Err(unexpected_input(self.id(), other)),
            }

            // The classifier's own text is never forwarded.
            let question = ctx
                .state
                .require_str(&self.scope, ORIGINAL_QUESTION)?
                .to_string();
            let reply = self
                .binding
                .invoke(ctx, question, ExpectedShape::Unstructured)
                .await?;
            Ok(NodeOutput::Final(FinalAnswer::new(
                format!("QnA: {}", reply.text),
                vec![],
            )))
        })
    }
}

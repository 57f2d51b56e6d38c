use futures::future::BoxFuture;
use tracing::{info, warn};

use taskwarden_core::error::Result;
use taskwarden_core::types::ExpectedShape;

use super::{decode, unexpected_input, ResponderBinding};
use crate::graph::executor::TurnContext;
use crate::graph::node::{Executor, GuardianDecision, NodeOutput, PayloadKind};
use crate::graph::state::ORIGINAL_QUESTION;

/// Entry node: screens the question for injection and rule-change attempts.
///
/// A safe question is stored in the turn state so later nodes can read the
/// user's own words.
pub struct GuardianNode {
    binding: ResponderBinding,
    scope: String,
}

impl GuardianNode {
    pub fn new(binding: ResponderBinding, scope: impl Into<String>) -> Self {
        Self {
            binding,
            scope: scope.into(),
        }
    }
}

impl Executor for GuardianNode {
    fn id(&self) -> &str {
        &self.binding.node_id
    }

    fn input_kind(&self) -> PayloadKind {
        PayloadKind::Question
    }

    fn output_kind(&self) -> PayloadKind {
        PayloadKind::Guardian
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
                    question.clone(),
                    ExpectedShape::typed::<GuardianDecision>("GuardianResponse"),
                )
                .await?;
            let decision: GuardianDecision = decode(self.id(), reply)?;

            if decision.is_threat {
                warn!(turn_id = %ctx.turn_id(), reason = %decision.answer, "Threat detected");
            } else {
                ctx.state.set(&self.scope, ORIGINAL_QUESTION, question);
                info!(turn_id = %ctx.turn_id(), "Question passed screening");
            }
            Ok(NodeOutput::Guardian(decision))
        })
    }
}

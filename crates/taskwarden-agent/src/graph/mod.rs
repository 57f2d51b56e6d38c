//! Workflow graph: typed nodes joined by branch-guarded edges.
//!
//! A graph is validated once by [`GraphBuilder::build`]: every branch a node
//! can produce has exactly one outgoing edge, edge payload kinds line up, and
//! there are no cycles. The [`WorkflowEngine`] then walks it one node at a
//! time per question, passing each node's output along the matching edge and
//! sharing cross-hop data through the turn's [`TurnState`].

pub mod builder;
pub mod edge;
pub mod executor;
pub mod node;
pub mod state;

pub use builder::{GraphBuilder, WorkflowGraph};
pub use edge::{Edge, EdgeCondition};
pub use executor::{TurnContext, TurnOutcome, WorkflowEngine};
pub use node::{
    Branch, Executor, GuardianDecision, NodeOutput, PayloadKind, Redirect, RouteDecision,
};
pub use state::{SharedStateEntry, TurnPhase, TurnState, ORIGINAL_QUESTION};

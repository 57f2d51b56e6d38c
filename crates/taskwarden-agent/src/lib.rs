pub mod format;
pub mod graph;
pub mod nodes;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod responder;
pub mod service;
pub mod session;

pub use graph::{
    Branch, Edge, EdgeCondition, Executor, GraphBuilder, NodeOutput, PayloadKind, TurnContext,
    TurnOutcome, TurnPhase, TurnState, WorkflowEngine, WorkflowGraph,
};
pub use pipeline::build_task_pipeline;
pub use responder::LlmResponder;
pub use service::{AskResponse, TaskAgent};
pub use session::{SessionPolicy, SessionRegistry, SessionState};

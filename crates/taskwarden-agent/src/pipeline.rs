use std::sync::Arc;

use tracing::info;

use taskwarden_core::config::AppConfig;
use taskwarden_core::error::Result;
use taskwarden_core::event::EventBus;
use taskwarden_core::traits::Responder;
use taskwarden_tools::OperationRegistry;

use crate::graph::{Branch, Edge, GraphBuilder, WorkflowGraph};
use crate::nodes::{
    FirstLineNode, GuardianNode, PassThroughNode, QnaNode, ResponderBinding, ThreatRejectedNode,
    WorkerNode,
};
use crate::prompts;
use crate::session::{SessionPolicy, SessionRegistry};

pub const GUARDIAN: &str = "guardian";
pub const REJECTED: &str = "rejected";
pub const PASS_THROUGH: &str = "pass_through";
pub const FIRST_LINE: &str = "first_line";
pub const QNA: &str = "qna";
pub const WORKER: &str = "worker";

/// Nodes that keep conversational memory.
pub const SESSION_NODES: [&str; 4] = [GUARDIAN, FIRST_LINE, QNA, WORKER];

/// Operations offered to the worker.
pub const WORKER_OPERATIONS: [&str; 8] = [
    "today",
    "clear_history",
    "get_all_tasks",
    "create_task",
    "find_by_title",
    "mark_complete",
    "delete_task",
    "search_tasks",
];

/// The task assistant's graph:
///
/// ```text
/// guardian --threat--> rejected
///          --safe----> pass_through --> first_line --qna------------> qna
///                                                  --worker|unrouted-> worker
/// ```
///
/// Returns the graph and a session registry holding a slot for every
/// responder node. Eager slots are those listed in `workflow.eager_sessions`.
pub fn build_task_pipeline(
    config: &AppConfig,
    responder: Arc<dyn Responder>,
    registry: &OperationRegistry,
    manual: &str,
    event_bus: Arc<EventBus>,
) -> Result<(WorkflowGraph, SessionRegistry)> {
    let scope = config.workflow.state_scope.as_str();

    let mut sessions = SessionRegistry::new(responder.clone(), event_bus);
    for node_id in SESSION_NODES {
        let policy = if config.workflow.eager_sessions.iter().any(|n| n == node_id) {
            SessionPolicy::Eager
        } else {
            SessionPolicy::Lazy
        };
        sessions.register(node_id, policy);
    }

    let worker_ops = registry.select(&WORKER_OPERATIONS)?;

    let graph = GraphBuilder::new(GUARDIAN)
        .add_node(GuardianNode::new(
            ResponderBinding::new(GUARDIAN, responder.clone(), prompts::GUARDIAN),
            scope,
        ))
        .add_node(ThreatRejectedNode::new(REJECTED))
        .add_node(PassThroughNode::new(PASS_THROUGH, scope))
        .add_node(FirstLineNode::new(ResponderBinding::new(
            FIRST_LINE,
            responder.clone(),
            prompts::FIRST_LINE,
        )))
        .add_node(QnaNode::new(
            ResponderBinding::new(QNA, responder.clone(), prompts::qna(manual)),
            scope,
        ))
        .add_node(
            WorkerNode::new(
                ResponderBinding::new(WORKER, responder, prompts::WORKER)
                    .with_operations(worker_ops),
                scope,
            )
            .show_thinking(config.workflow.show_agent_thinking),
        )
        .add_edge(Edge::when(GUARDIAN, REJECTED, Branch::Threat))
        .add_edge(Edge::when(GUARDIAN, PASS_THROUGH, Branch::Safe))
        .add_edge(Edge::always(PASS_THROUGH, FIRST_LINE))
        .add_edge(Edge::when(FIRST_LINE, QNA, Branch::QnA))
        .add_edge(Edge::on(FIRST_LINE, WORKER, [Branch::Worker, Branch::Unrouted]))
        .with_outputs([REJECTED, QNA, WORKER])
        .build()?;

    info!(
        nodes = graph.node_ids().len(),
        manual_chars = manual.len(),
        thinking = config.workflow.show_agent_thinking,
        "Task pipeline built"
    );
    Ok((graph, sessions))
}

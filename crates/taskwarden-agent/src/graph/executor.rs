use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::event::EventBus;
use taskwarden_core::task::FinalAnswer;
use taskwarden_core::types::{ConversationTurn, HistoryControl, Session, TurnId, WorkflowEvent};

use super::builder::WorkflowGraph;
use super::node::NodeOutput;
use super::state::{TurnPhase, TurnState};
use crate::session::SessionRegistry;

/// Everything a node may touch while a turn is in flight.
pub struct TurnContext {
    pub turn: ConversationTurn,
    pub state: TurnState,
    pub cancel: CancellationToken,
    sessions: Arc<SessionRegistry>,
    acquired: HashMap<String, Arc<Session>>,
    history: Option<Arc<dyn HistoryControl>>,
    phase: TurnPhase,
}

impl TurnContext {
    pub fn new(
        turn: ConversationTurn,
        sessions: Arc<SessionRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state: TurnState::new(turn.id),
            turn,
            cancel,
            sessions,
            acquired: HashMap::new(),
            history: None,
            phase: TurnPhase::Start,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryControl>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn turn_id(&self) -> TurnId {
        self.turn.id
    }

    /// The node's session for this turn.
    ///
    /// The first call acquires it from the registry; later calls in the same
    /// turn return that handle even if the registry was cleared meanwhile.
    pub async fn session(&mut self, node_id: &str) -> Result<Arc<Session>> {
        if let Some(session) = self.acquired.get(node_id) {
            return Ok(session.clone());
        }
        let session = self.sessions.acquire(node_id).await?;
        self.acquired.insert(node_id.to_string(), session.clone());
        Ok(session)
    }

    pub fn history_control(&self) -> Option<Arc<dyn HistoryControl>> {
        self.history.clone()
    }

    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    fn enter(&mut self, phase: TurnPhase) {
        debug!(turn_id = %self.turn.id, from = ?self.phase, to = ?phase, "Turn phase");
        self.phase = phase;
    }

    fn current_node(&self) -> Option<String> {
        match &self.phase {
            TurnPhase::Running { node_id } => Some(node_id.clone()),
            _ => None,
        }
    }
}

/// Result of one turn. `answer` is always well-formed.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub turn_id: TurnId,
    pub answer: FinalAnswer,
    /// Node ids in execution order.
    pub path: Vec<String>,
    pub phase: TurnPhase,
    pub elapsed_ms: u64,
}

impl TurnOutcome {
    pub fn failed(&self) -> bool {
        matches!(self.phase, TurnPhase::Failed { .. })
    }
}

/// Drives questions through a [`WorkflowGraph`].
pub struct WorkflowEngine {
    graph: Arc<WorkflowGraph>,
    sessions: Arc<SessionRegistry>,
    event_bus: Arc<EventBus>,
}

impl WorkflowEngine {
    pub fn new(
        graph: Arc<WorkflowGraph>,
        sessions: Arc<SessionRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            graph,
            sessions,
            event_bus,
        }
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Run one question to completion.
    ///
    /// Node errors, missing state, unmatched edges and cancellation all end
    /// the turn with an `"Error: ..."` answer and no tasks.
    pub async fn run_turn(
        &self,
        question: &str,
        cancel: CancellationToken,
        history: Option<Arc<dyn HistoryControl>>,
    ) -> TurnOutcome {
        let start = Instant::now();
        let turn = ConversationTurn::new(question);
        let turn_id = turn.id;
        let mut ctx = TurnContext::new(turn, self.sessions.clone(), cancel);
        if let Some(history) = history {
            ctx = ctx.with_history(history);
        }

        info!(turn_id = %turn_id, "Turn started");
        self.event_bus.publish(WorkflowEvent::TurnStarted {
            turn_id,
            question: question.to_string(),
        });

        let mut path = Vec::new();
        let result = self.drive(&mut ctx, &mut path).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let answer = match result {
            Ok((node_id, answer)) => {
                ctx.enter(TurnPhase::Completed {
                    node_id: node_id.clone(),
                });
                info!(turn_id = %turn_id, node_id = %node_id, elapsed_ms, "Turn completed");
                self.event_bus.publish(WorkflowEvent::TurnCompleted {
                    turn_id,
                    node_id,
                    elapsed_ms,
                });
                answer
            }
            Err(e) => {
                let node_id = ctx.current_node();
                error!(
                    turn_id = %turn_id,
                    node_id = node_id.as_deref().unwrap_or("-"),
                    error = %e,
                    elapsed_ms,
                    "Turn failed"
                );
                self.event_bus.publish(WorkflowEvent::TurnFailed {
                    turn_id,
                    node_id: node_id.clone(),
                    error: e.to_string(),
                });
                ctx.enter(TurnPhase::Failed {
                    node_id,
                    error: e.to_string(),
                });
                FinalAnswer::text(format!("Error: {}", e))
            }
        };

        ctx.state.clear();
        TurnOutcome {
            turn_id,
            answer,
            path,
            phase: ctx.phase().clone(),
            elapsed_ms,
        }
    }

    async fn drive(
        &self,
        ctx: &mut TurnContext,
        path: &mut Vec<String>,
    ) -> Result<(String, FinalAnswer)> {
        let mut current = self.graph.entry().to_string();
        let mut input = NodeOutput::Question(ctx.turn.user_text.clone());
        let cancel = ctx.cancel.clone();

        loop {
            if cancel.is_cancelled() {
                return Err(TaskwardenError::Cancelled);
            }
            let node = self
                .graph
                .node(&current)
                .cloned()
                .ok_or_else(|| TaskwardenError::UnknownNode(current.clone()))?;

            ctx.enter(TurnPhase::Running {
                node_id: current.clone(),
            });
            path.push(current.clone());

            let node_start = Instant::now();
            let result = tokio::select! {
                r = node.execute(input, ctx) => r?,
                _ = cancel.cancelled() => return Err(TaskwardenError::Cancelled),
            };
            let elapsed_ms = node_start.elapsed().as_millis() as u64;

            debug!(
                turn_id = %ctx.turn.id,
                node_id = %current,
                kind = %result.kind(),
                elapsed_ms,
                "Node completed"
            );
            self.event_bus.publish(WorkflowEvent::NodeCompleted {
                turn_id: ctx.turn.id,
                node_id: current.clone(),
                summary: result.summary(),
                elapsed_ms,
            });

            if self.graph.is_output(&current) {
                return match result {
                    NodeOutput::Final(answer) => Ok((current, answer)),
                    other => Err(TaskwardenError::SchemaViolation {
                        node: current,
                        message: format!("output node produced {}", other.kind()),
                    }),
                };
            }

            let branch = result.branch();
            let edge = self.graph.route(&current, branch)?;
            debug!(from = %current, to = %edge.to, branch = %branch, "Edge taken");
            current = edge.to.clone();
            input = result;
        }
    }
}

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::info;

use taskwarden_core::config::AppConfig;
use taskwarden_core::error::Result;
use taskwarden_core::event::EventBus;
use taskwarden_core::task::FinalAnswer;
use taskwarden_core::traits::Responder;
use taskwarden_core::types::HistoryControl;
use taskwarden_tools::OperationRegistry;

use crate::graph::{TurnOutcome, WorkflowEngine, WorkflowGraph};
use crate::pipeline::build_task_pipeline;
use crate::session::SessionRegistry;

/// What a caller gets back for every question.
pub type AskResponse = FinalAnswer;

/// The task assistant: answers questions and resets conversational memory.
pub struct TaskAgent {
    engine: WorkflowEngine,
    sessions: Arc<SessionRegistry>,
    event_bus: Arc<EventBus>,
}

impl TaskAgent {
    pub fn new(graph: WorkflowGraph, sessions: SessionRegistry, event_bus: Arc<EventBus>) -> Self {
        let sessions = Arc::new(sessions);
        Self {
            engine: WorkflowEngine::new(Arc::new(graph), sessions.clone(), event_bus.clone()),
            sessions,
            event_bus,
        }
    }

    /// Build the task pipeline and open the eager sessions.
    pub async fn start(
        config: &AppConfig,
        responder: Arc<dyn Responder>,
        registry: &OperationRegistry,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let manual = config.load_manual()?;
        let (graph, sessions) =
            build_task_pipeline(config, responder, registry, &manual, event_bus.clone())?;
        sessions.initialize().await?;
        info!("Task agent ready");
        Ok(Self::new(graph, sessions, event_bus))
    }

    pub async fn ask_question(&self, question: &str) -> AskResponse {
        self.ask_question_with_cancel(question, CancellationToken::new())
            .await
    }

    pub async fn ask_question_with_cancel(
        &self,
        question: &str,
        cancel: CancellationToken,
    ) -> AskResponse {
        self.run_turn(question, cancel).await.answer
    }

    /// Like [`ask_question_with_cancel`](Self::ask_question_with_cancel), with
    /// the visited path and final phase.
    pub async fn run_turn(&self, question: &str, cancel: CancellationToken) -> TurnOutcome {
        let history: Arc<dyn HistoryControl> = self.sessions.clone();
        self.engine.run_turn(question, cancel, Some(history)).await
    }

    /// Reset every node's session. Turns already running keep their handles.
    pub async fn clear_history(&self) -> Result<()> {
        self.sessions.clear_all().await
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn graph(&self) -> &WorkflowGraph {
        self.engine.graph()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl HistoryControl for TaskAgent {
    fn clear_history(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(TaskAgent::clear_history(self))
    }
}

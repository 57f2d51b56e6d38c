use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::traits::Responder;
use taskwarden_core::types::*;

/// One scripted response for one invocation.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(ResponderReply),
    /// Run an offered operation first, then reply.
    CallThen {
        operation: String,
        input: serde_json::Value,
        reply: ResponderReply,
    },
    Unavailable(String),
    Malformed(String),
    /// Wait until the turn is cancelled.
    Hang,
}

/// What a node sent to the responder.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub node_id: String,
    pub input: String,
    pub instructions: String,
    pub session_id: Option<SessionId>,
    /// Messages already in the session when the call arrived.
    pub history_len: usize,
    pub operations: Vec<String>,
    pub typed: bool,
}

/// Responder double driven by per-node queues of [`Step`]s.
///
/// Calls with a session append the input and reply text to it, the way a
/// real backend would.
#[derive(Default)]
pub struct ScriptedResponder {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<RecordedCall>>,
    sessions_created: AtomicUsize,
    fail_sessions: AtomicBool,
    hold_sessions: AtomicBool,
    sessions_released: tokio::sync::Notify,
}

impl ScriptedResponder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, node_id: &str, step: Step) -> &Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.entry(node_id.to_string()).or_default().push_back(step);
        }
        self
    }

    pub fn reply_text(&self, node_id: &str, text: &str) -> &Self {
        self.push(node_id, Step::Reply(ResponderReply::text(text)))
    }

    pub fn reply_json(&self, node_id: &str, value: serde_json::Value) -> &Self {
        self.push(node_id, Step::Reply(ResponderReply::typed(value)))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, node_id: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.node_id == node_id)
            .collect()
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    /// Make `create_session` fail as if the backend were unreachable.
    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    /// Park every `create_session` until `release_sessions` is called.
    pub fn hold_sessions(&self) {
        self.hold_sessions.store(true, Ordering::SeqCst);
    }

    pub fn release_sessions(&self) {
        self.hold_sessions.store(false, Ordering::SeqCst);
        self.sessions_released.notify_waiters();
    }

    fn next_step(&self, node_id: &str) -> Option<Step> {
        self.scripts
            .lock()
            .ok()
            .and_then(|mut s| s.get_mut(node_id).and_then(|q| q.pop_front()))
    }

    fn record(&self, call: RecordedCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

async fn finish(request: &ResponderRequest, reply: ResponderReply) -> Result<ResponderReply> {
    if let Conversation::Session(session) = &request.conversation {
        session
            .append(vec![
                ChatMessage::user(request.input.clone()),
                ChatMessage::assistant_text(reply.text.clone()),
            ])
            .await;
    }
    Ok(reply)
}

impl Responder for ScriptedResponder {
    fn create_session(&self) -> BoxFuture<'_, Result<Arc<Session>>> {
        Box::pin(async move {
            loop {
                let released = self.sessions_released.notified();
                if !self.hold_sessions.load(Ordering::SeqCst) {
                    break;
                }
                released.await;
            }
            if self.fail_sessions.load(Ordering::SeqCst) {
                return Err(TaskwardenError::ResponderUnavailable(
                    "scripted session failure".into(),
                ));
            }
            self.sessions_created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Session::new()))
        })
    }

    fn invoke(
        &self,
        request: ResponderRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<ResponderReply>> {
        Box::pin(async move {
            let (session_id, history_len) = match &request.conversation {
                Conversation::Session(s) => (Some(s.id.clone()), s.len().await),
                Conversation::Transient => (None, 0),
            };
            self.record(RecordedCall {
                node_id: request.node_id.clone(),
                input: request.input.clone(),
                instructions: request.instructions.clone(),
                session_id,
                history_len,
                operations: request.operations.iter().map(|o| o.name().to_string()).collect(),
                typed: request.shape.is_typed(),
            });

            let step = self.next_step(&request.node_id).ok_or_else(|| {
                TaskwardenError::ResponderUnavailable(format!(
                    "no scripted reply for node '{}'",
                    request.node_id
                ))
            })?;

            match step {
                Step::Reply(reply) => finish(&request, reply).await,
                Step::CallThen {
                    operation,
                    input,
                    reply,
                } => {
                    let op = request
                        .operations
                        .iter()
                        .find(|o| o.name() == operation)
                        .cloned()
                        .ok_or_else(|| TaskwardenError::OperationNotFound(operation.clone()))?;
                    let mut ctx = OperationContext::new(request.turn_id, request.node_id.clone());
                    if let Some(history) = &request.history_control {
                        ctx = ctx.with_history(history.clone());
                    }
                    let output = op.execute(input, ctx).await?;

                    let mut items = vec![
                        ResponseItem::OperationCall {
                            name: operation.clone(),
                        },
                        ResponseItem::OperationResult {
                            name: operation,
                            content: output.content,
                        },
                    ];
                    items.extend(reply.items);
                    let reply = ResponderReply { items, ..reply };
                    finish(&request, reply).await
                }
                Step::Unavailable(msg) => Err(TaskwardenError::ResponderUnavailable(msg)),
                Step::Malformed(msg) => Err(TaskwardenError::MalformedOutput(msg)),
                Step::Hang => {
                    cancel.cancelled().await;
                    Err(TaskwardenError::Cancelled)
                }
            }
        })
    }
}

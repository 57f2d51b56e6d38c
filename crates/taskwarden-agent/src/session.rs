use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::event::EventBus;
use taskwarden_core::traits::Responder;
use taskwarden_core::types::{HistoryControl, Session, SessionId, WorkflowEvent};

/// When a cleared slot gets its replacement session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Recreated inside the clear itself.
    Eager,
    /// Recreated on the next `acquire`.
    Lazy,
}

/// Observable state of one node's slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active(SessionId),
    Cleared,
}

enum Slot {
    Uninitialized,
    Active(Arc<Session>),
    Cleared,
}

struct Entry {
    policy: SessionPolicy,
    slot: Slot,
    /// Bumped by every clear.
    epoch: u64,
}

/// Owns each responder node's conversational memory.
///
/// `acquire` is the only way to get a handle and never hands out a cleared
/// one. Clearing only affects later acquisitions: a turn that already holds a
/// handle keeps talking to the old session until it finishes. The registry
/// lock is never held across a call to the responder.
pub struct SessionRegistry {
    responder: Arc<dyn Responder>,
    entries: Mutex<HashMap<String, Entry>>,
    event_bus: Arc<EventBus>,
}

impl SessionRegistry {
    pub fn new(responder: Arc<dyn Responder>, event_bus: Arc<EventBus>) -> Self {
        Self {
            responder,
            entries: Mutex::new(HashMap::new()),
            event_bus,
        }
    }

    /// Register a node's slot. Called while the pipeline is assembled.
    pub fn register(&mut self, node_id: impl Into<String>, policy: SessionPolicy) {
        self.entries.get_mut().insert(
            node_id.into(),
            Entry {
                policy,
                slot: Slot::Uninitialized,
                epoch: 0,
            },
        );
    }

    /// Create the sessions of every eager slot.
    pub async fn initialize(&self) -> Result<()> {
        let pending: Vec<(String, u64)> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .filter(|(_, e)| {
                    e.policy == SessionPolicy::Eager && matches!(e.slot, Slot::Uninitialized)
                })
                .map(|(id, e)| (id.clone(), e.epoch))
                .collect()
        };
        for (node_id, epoch) in pending {
            let session = self.responder.create_session().await?;
            if self.install(&node_id, epoch, session.clone()).await {
                debug!(node_id = %node_id, session_id = %session.id, "Eager session created");
            }
        }
        Ok(())
    }

    /// Replace the node's session with a fresh one.
    pub async fn create_session(&self, node_id: &str) -> Result<Arc<Session>> {
        self.epoch_of(node_id).await?;
        let session = self.responder.create_session().await?;
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(node_id)
            .ok_or_else(|| TaskwardenError::UnknownNode(node_id.to_string()))?;
        entry.slot = Slot::Active(session.clone());
        Ok(session)
    }

    /// The node's current session, created if the slot is empty or cleared.
    ///
    /// The registry lock is not held while the responder creates a session.
    /// If two callers race to fill the same slot, the first one installed wins
    /// and both get it.
    pub async fn acquire(&self, node_id: &str) -> Result<Arc<Session>> {
        {
            let entries = self.entries.lock().await;
            let entry = entries
                .get(node_id)
                .ok_or_else(|| TaskwardenError::UnknownNode(node_id.to_string()))?;
            if let Slot::Active(session) = &entry.slot {
                return Ok(session.clone());
            }
        }

        let created = self.responder.create_session().await?;

        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(node_id)
            .ok_or_else(|| TaskwardenError::UnknownNode(node_id.to_string()))?;
        match &entry.slot {
            Slot::Active(session) => Ok(session.clone()),
            _ => {
                debug!(node_id = %node_id, session_id = %created.id, "Session activated");
                entry.slot = Slot::Active(created.clone());
                Ok(created)
            }
        }
    }

    /// Invalidate the node's session.
    ///
    /// If an eager slot cannot get its replacement, it is left cleared and
    /// the next `acquire` retries.
    pub async fn clear_session(&self, node_id: &str) -> Result<()> {
        let eager = {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .get_mut(node_id)
                .ok_or_else(|| TaskwardenError::UnknownNode(node_id.to_string()))?;
            self.clear_entry(node_id, entry)
        };
        match eager {
            Some(epoch) => self.recreate(node_id, epoch).await,
            None => Ok(()),
        }
    }

    /// Clear every registered slot. All slots are visited even if one fails;
    /// the first failure is returned.
    pub async fn clear_all(&self) -> Result<()> {
        let eager: Vec<(String, u64)> = {
            let mut entries = self.entries.lock().await;
            let cleared: Vec<(String, u64)> = entries
                .iter_mut()
                .filter_map(|(id, entry)| {
                    self.clear_entry(id, entry).map(|epoch| (id.clone(), epoch))
                })
                .collect();
            info!(slots = entries.len(), "All sessions cleared");
            cleared
        };

        let mut first_err = None;
        for (node_id, epoch) in eager {
            if let Err(e) = self.recreate(&node_id, epoch).await {
                warn!(node_id = %node_id, error = %e, "Session recreation failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn state(&self, node_id: &str) -> Option<SessionState> {
        let entries = self.entries.lock().await;
        entries.get(node_id).map(|entry| match &entry.slot {
            Slot::Uninitialized => SessionState::Uninitialized,
            Slot::Active(session) => SessionState::Active(session.id.clone()),
            Slot::Cleared => SessionState::Cleared,
        })
    }

    pub async fn policy(&self, node_id: &str) -> Option<SessionPolicy> {
        self.entries.lock().await.get(node_id).map(|e| e.policy)
    }

    pub async fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Mark the slot cleared. Returns the new epoch if the slot is eager and
    /// needs its replacement.
    fn clear_entry(&self, node_id: &str, entry: &mut Entry) -> Option<u64> {
        entry.slot = Slot::Cleared;
        entry.epoch += 1;
        self.event_bus.publish(WorkflowEvent::SessionCleared {
            node_id: node_id.to_string(),
        });
        (entry.policy == SessionPolicy::Eager).then_some(entry.epoch)
    }

    async fn recreate(&self, node_id: &str, epoch: u64) -> Result<()> {
        let session = self.responder.create_session().await?;
        if self.install(node_id, epoch, session.clone()).await {
            debug!(node_id = %node_id, session_id = %session.id, "Session recreated eagerly");
        }
        Ok(())
    }

    /// Put `session` in the slot unless it was filled or cleared again since
    /// `epoch` was read.
    async fn install(&self, node_id: &str, epoch: u64, session: Arc<Session>) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(node_id) {
            Some(entry) if entry.epoch == epoch && !matches!(entry.slot, Slot::Active(_)) => {
                entry.slot = Slot::Active(session);
                true
            }
            _ => false,
        }
    }

    async fn epoch_of(&self, node_id: &str) -> Result<u64> {
        self.entries
            .lock()
            .await
            .get(node_id)
            .map(|e| e.epoch)
            .ok_or_else(|| TaskwardenError::UnknownNode(node_id.to_string()))
    }
}

impl HistoryControl for SessionRegistry {
    fn clear_history(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.clear_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwarden_test_utils::ScriptedResponder;

    fn registry(responder: Arc<ScriptedResponder>) -> SessionRegistry {
        let mut registry = SessionRegistry::new(responder, Arc::new(EventBus::default()));
        registry.register("guardian", SessionPolicy::Eager);
        registry.register("worker", SessionPolicy::Lazy);
        registry
    }

    #[tokio::test]
    async fn test_lazy_slot_lifecycle() {
        let responder = ScriptedResponder::new();
        let registry = registry(responder.clone());

        assert_eq!(
            registry.state("worker").await,
            Some(SessionState::Uninitialized)
        );
        let first = registry.acquire("worker").await.unwrap();
        let again = registry.acquire("worker").await.unwrap();
        assert_eq!(first.id, again.id);

        registry.clear_session("worker").await.unwrap();
        assert_eq!(registry.state("worker").await, Some(SessionState::Cleared));

        let fresh = registry.acquire("worker").await.unwrap();
        assert_ne!(fresh.id, first.id);
        assert_eq!(
            registry.state("worker").await,
            Some(SessionState::Active(fresh.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_eager_slot_recreated_inside_clear() {
        let responder = ScriptedResponder::new();
        let registry = registry(responder.clone());
        registry.initialize().await.unwrap();
        assert_eq!(responder.sessions_created(), 1);

        let before = registry.acquire("guardian").await.unwrap();
        registry.clear_session("guardian").await.unwrap();
        assert_eq!(responder.sessions_created(), 2);

        match registry.state("guardian").await {
            Some(SessionState::Active(id)) => assert_ne!(id, before.id),
            other => panic!("expected active slot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_held_handle_survives_clear() {
        let responder = ScriptedResponder::new();
        let registry = registry(responder);
        let held = registry.acquire("worker").await.unwrap();
        held.append(vec![taskwarden_core::types::ChatMessage::user("hi")])
            .await;

        registry.clear_all().await.unwrap();
        assert_eq!(held.len().await, 1);

        let fresh = registry.acquire("worker").await.unwrap();
        assert!(fresh.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_eager_recreation_falls_back_to_lazy() {
        let responder = ScriptedResponder::new();
        let registry = registry(responder.clone());
        registry.initialize().await.unwrap();

        responder.fail_sessions(true);
        let err = registry.clear_all().await.unwrap_err();
        assert!(matches!(err, TaskwardenError::ResponderUnavailable(_)));
        assert_eq!(registry.state("guardian").await, Some(SessionState::Cleared));
        assert!(registry.acquire("guardian").await.is_err());

        responder.fail_sessions(false);
        assert!(registry.acquire("guardian").await.is_ok());
    }

    #[tokio::test]
    async fn test_slow_session_creation_does_not_block_other_slots() {
        let responder = ScriptedResponder::new();
        let registry = Arc::new(registry(responder.clone()));
        let worker = registry.acquire("worker").await.unwrap();

        responder.hold_sessions();
        let pending = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire("guardian").await })
        };
        tokio::task::yield_now().await;

        let again = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            registry.acquire("worker"),
        )
        .await
        .expect("acquire of an active slot should not wait")
        .unwrap();
        assert_eq!(again.id, worker.id);
        assert!(!pending.is_finished());

        responder.release_sessions();
        let guardian = pending.await.unwrap().unwrap();
        assert_eq!(
            registry.state("guardian").await,
            Some(SessionState::Active(guardian.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_unknown_node() {
        let registry = registry(ScriptedResponder::new());
        let err = registry.acquire("nobody").await.unwrap_err();
        assert!(matches!(err, TaskwardenError::UnknownNode(_)));
    }

    #[tokio::test]
    async fn test_clear_publishes_events() {
        let responder = ScriptedResponder::new();
        let bus = Arc::new(EventBus::default());
        let mut registry = SessionRegistry::new(responder, bus.clone());
        registry.register("worker", SessionPolicy::Lazy);
        let mut rx = bus.subscribe();

        registry.clear_session("worker").await.unwrap();
        match rx.recv().await.unwrap() {
            WorkflowEvent::SessionCleared { node_id } => assert_eq!(node_id, "worker"),
            other => panic!("unexpected event {:?}", other),
        }
    }
}

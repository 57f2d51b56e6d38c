use std::collections::HashMap;

use serde_json::Value;

use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::types::TurnId;

/// Key under which the screening node stores the user's question.
pub const ORIGINAL_QUESTION: &str = "original_question";

#[derive(Debug, Clone, PartialEq)]
pub struct SharedStateEntry {
    pub scope: String,
    pub key: String,
    pub value: Value,
    pub turn_id: TurnId,
}

/// Key/value data shared by the nodes of one turn. Dropped with the turn.
#[derive(Debug)]
pub struct TurnState {
    turn_id: TurnId,
    entries: HashMap<(String, String), SharedStateEntry>,
}

impl TurnState {
    pub fn new(turn_id: TurnId) -> Self {
        Self {
            turn_id,
            entries: HashMap::new(),
        }
    }

    pub fn turn_id(&self) -> TurnId {
        self.turn_id
    }

    /// Write a value, replacing any earlier one under the same scope and key.
    pub fn set(&mut self, scope: &str, key: &str, value: impl Into<Value>) {
        self.entries.insert(
            (scope.to_string(), key.to_string()),
            SharedStateEntry {
                scope: scope.to_string(),
                key: key.to_string(),
                value: value.into(),
                turn_id: self.turn_id,
            },
        );
    }

    pub fn get(&self, scope: &str, key: &str) -> Option<&Value> {
        self.entries
            .get(&(scope.to_string(), key.to_string()))
            .map(|e| &e.value)
    }

    /// Like [`get`](Self::get), but absence is a `MissingWorkflowState` error.
    pub fn require(&self, scope: &str, key: &str) -> Result<&Value> {
        self.get(scope, key)
            .ok_or_else(|| TaskwardenError::MissingWorkflowState {
                scope: scope.to_string(),
                key: key.to_string(),
            })
    }

    pub fn require_str(&self, scope: &str, key: &str) -> Result<&str> {
        self.require(scope, key)?
            .as_str()
            .ok_or_else(|| TaskwardenError::MissingWorkflowState {
                scope: scope.to_string(),
                key: format!("{} (not a string)", key),
            })
    }

    pub fn entries(&self) -> impl Iterator<Item = &SharedStateEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Where a turn is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    Start,
    Running { node_id: String },
    Completed { node_id: String },
    Failed { node_id: Option<String>, error: String },
}

impl TurnPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

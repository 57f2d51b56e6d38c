use serde::{Deserialize, Serialize};

use super::node::{Branch, PayloadKind};

/// An edge connecting two nodes in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Branches that take this edge.
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "branches", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Taken by every value.
    #[default]
    Always,
    /// Taken by values whose branch is listed.
    On(Vec<Branch>),
}

impl EdgeCondition {
    pub fn matches(&self, branch: Branch) -> bool {
        match self {
            Self::Always => true,
            Self::On(branches) => branches.contains(&branch),
        }
    }

    /// The branches of `kind` this condition takes.
    pub fn covered(&self, kind: PayloadKind) -> Vec<Branch> {
        kind.branches()
            .iter()
            .copied()
            .filter(|b| self.matches(*b))
            .collect()
    }
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::Always,
        }
    }

    /// Create an edge taken by any of `branches`.
    pub fn on(
        from: impl Into<String>,
        to: impl Into<String>,
        branches: impl IntoIterator<Item = Branch>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: EdgeCondition::On(branches.into_iter().collect()),
        }
    }

    /// Create an edge taken by a single branch.
    pub fn when(from: impl Into<String>, to: impl Into<String>, branch: Branch) -> Self {
        Self::on(from, to, [branch])
    }
}

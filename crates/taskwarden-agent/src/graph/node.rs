use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use taskwarden_core::error::Result;
use taskwarden_core::task::FinalAnswer;

use super::executor::TurnContext;

/// Verdict of the threat-screening node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GuardianDecision {
    /// Explanation shown to the user when a threat is detected.
    #[serde(rename = "Answer", alias = "answer", default)]
    pub answer: String,
    #[serde(rename = "IsThreatDetected", alias = "isThreat", alias = "is_threat")]
    pub is_threat: bool,
}

impl GuardianDecision {
    pub fn safe() -> Self {
        Self {
            answer: String::new(),
            is_threat: false,
        }
    }

    pub fn threat(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            is_threat: true,
        }
    }
}

/// Which assistant should handle the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Redirect {
    None,
    #[serde(rename = "QnAAgent", alias = "QnA", alias = "qna")]
    QnA,
    #[serde(rename = "WorkerAgent", alias = "Worker", alias = "worker")]
    Worker,
}

/// Verdict of the intent classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouteDecision {
    #[serde(rename = "Answer", alias = "answer", default)]
    pub answer: String,
    #[serde(rename = "Redirect", alias = "redirect")]
    pub redirect: Redirect,
}

impl RouteDecision {
    pub fn new(redirect: Redirect) -> Self {
        Self {
            answer: String::new(),
            redirect,
        }
    }
}

/// Value passed along an edge.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    Question(String),
    Guardian(GuardianDecision),
    Route(RouteDecision),
    Final(FinalAnswer),
}

/// Type tag of a [`NodeOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Question,
    Guardian,
    Route,
    Final,
}

/// Routing key of a value. Edges are selected by branch, never by inspecting
/// payload fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Always,
    Threat,
    Safe,
    QnA,
    Worker,
    /// A route decision that named no assistant.
    Unrouted,
}

impl PayloadKind {
    /// Every branch a value of this kind can take.
    pub fn branches(self) -> &'static [Branch] {
        match self {
            Self::Question | Self::Final => &[Branch::Always],
            Self::Guardian => &[Branch::Threat, Branch::Safe],
            Self::Route => &[Branch::QnA, Branch::Worker, Branch::Unrouted],
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Question => "question",
            Self::Guardian => "guardian",
            Self::Route => "route",
            Self::Final => "final",
        };
        f.write_str(name)
    }
}

impl std::fmt::Display for Branch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Always => "always",
            Self::Threat => "threat",
            Self::Safe => "safe",
            Self::QnA => "qna",
            Self::Worker => "worker",
            Self::Unrouted => "unrouted",
        };
        f.write_str(name)
    }
}

impl NodeOutput {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Question(_) => PayloadKind::Question,
            Self::Guardian(_) => PayloadKind::Guardian,
            Self::Route(_) => PayloadKind::Route,
            Self::Final(_) => PayloadKind::Final,
        }
    }

    pub fn branch(&self) -> Branch {
        match self {
            Self::Question(_) | Self::Final(_) => Branch::Always,
            Self::Guardian(d) if d.is_threat => Branch::Threat,
            Self::Guardian(_) => Branch::Safe,
            Self::Route(d) => match d.redirect {
                Redirect::QnA => Branch::QnA,
                Redirect::Worker => Branch::Worker,
                Redirect::None => Branch::Unrouted,
            },
        }
    }

    /// The text printed for a completed node.
    pub fn summary(&self) -> String {
        match self {
            Self::Question(q) => q.clone(),
            Self::Guardian(d) => d.answer.clone(),
            Self::Route(d) => d.answer.clone(),
            Self::Final(a) => a.answer.clone(),
        }
    }
}

/// A unit of work in the workflow graph.
///
/// Nodes read and write shared data only through the [`TurnContext`]. The
/// kinds they declare are checked against their edges when the graph is built.
pub trait Executor: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn input_kind(&self) -> PayloadKind;

    fn output_kind(&self) -> PayloadKind;

    /// Whether an edge carrying `kind` may end at this node.
    fn accepts(&self, kind: PayloadKind) -> bool {
        kind == self.input_kind()
    }

    fn execute<'a>(
        &'a self,
        input: NodeOutput,
        ctx: &'a mut TurnContext,
    ) -> BoxFuture<'a, Result<NodeOutput>>;
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskwardenError {
    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    #[error("Invalid workflow graph: {0}")]
    InvalidGraph(String),

    // Responder errors
    #[error("Responder unavailable: {0}")]
    ResponderUnavailable(String),

    #[error("Responder timed out after {timeout_secs}s")]
    ResponderTimeout { timeout_secs: u64 },

    #[error("Responder returned malformed output: {0}")]
    MalformedOutput(String),

    #[error("Responder exceeded max turns ({0})")]
    MaxTurnsExceeded(usize),

    // LLM transport errors (surface as ResponderUnavailable)
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    // Workflow errors
    #[error("Node {node} produced output that does not match its schema: {message}")]
    SchemaViolation { node: String, message: String },

    #[error("Workflow state missing: {scope}/{key}")]
    MissingWorkflowState { scope: String, key: String },

    #[error("No edge from node {node} matches branch {branch}")]
    NoMatchingEdge { node: String, branch: String },

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Turn cancelled")]
    Cancelled,

    // Operation errors
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Operation failed: {operation}: {message}")]
    OperationExecution { operation: String, message: String },

    #[error("Operation timeout after {timeout_secs}s: {operation}")]
    OperationTimeout { operation: String, timeout_secs: u64 },

    #[error("Operation input validation failed: {0}")]
    OperationValidation(String),

    // Storage errors
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid task: {0}")]
    TaskValidation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of errors, as seen by the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal at startup. Never produced while a turn is running.
    Configuration,
    /// Recoverable per turn.
    ResponderUnavailable,
    /// Recoverable per turn.
    SchemaViolation,
    /// Fatal per turn: a node read state nobody wrote.
    MissingWorkflowState,
    /// Fatal per turn: the routing table has a hole.
    NoMatchingEdge,
    Cancelled,
    Storage,
    Operation,
    Internal,
}

impl TaskwardenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::ConfigNotFound(_) | Self::InvalidGraph(_) => {
                ErrorKind::Configuration
            }
            Self::ResponderUnavailable(_)
            | Self::ResponderTimeout { .. }
            | Self::MaxTurnsExceeded(_)
            | Self::LlmRequest(_)
            | Self::LlmStream(_) => ErrorKind::ResponderUnavailable,
            Self::SchemaViolation { .. } | Self::MalformedOutput(_) => ErrorKind::SchemaViolation,
            Self::MissingWorkflowState { .. } => ErrorKind::MissingWorkflowState,
            Self::NoMatchingEdge { .. } | Self::UnknownNode(_) => ErrorKind::NoMatchingEdge,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::OperationNotFound(_)
            | Self::OperationExecution { .. }
            | Self::OperationTimeout { .. }
            | Self::OperationValidation(_) => ErrorKind::Operation,
            Self::TaskNotFound(_)
            | Self::TaskValidation(_)
            | Self::Database(_)
            | Self::Embedding(_) => ErrorKind::Storage,
            Self::Gateway(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// Whether a turn that hit this error may succeed if simply retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ResponderUnavailable | ErrorKind::SchemaViolation | ErrorKind::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, TaskwardenError>;

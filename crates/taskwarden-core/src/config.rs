use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskwardenError};

/// Top-level Taskwarden configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub qna: QnaConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Tool-use rounds allowed in a single responder invocation.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
    #[serde(default = "default_workspace")]
    pub workspace: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_duration_secs: default_max_duration(),
            workspace: default_workspace(),
        }
    }
}

fn default_max_turns() -> usize { 10 }
fn default_max_duration() -> u64 { 120 }
fn default_workspace() -> String { "~/.taskwarden".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Azure resource name, e.g. `contoso` for `contoso.openai.azure.com`.
    #[serde(default)]
    pub azure_resource: Option<String>,
    #[serde(default)]
    pub azure_deployment: Option<String>,
    #[serde(default)]
    pub azure_api_version: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ModelConfig {
    pub fn openai(model_id: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            provider: default_provider(),
            model_id: model_id.into(),
            api_key,
            base_url: None,
            azure_resource: None,
            azure_deployment: None,
            azure_api_version: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Workflow behaviour knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Prepend a trace of the worker's intermediate items to its answer.
    #[serde(default)]
    pub show_agent_thinking: bool,
    /// Scope under which the original question is stored for a turn.
    #[serde(default = "default_state_scope")]
    pub state_scope: String,
    /// Nodes whose session is recreated inside `clear_history` rather than on next use.
    #[serde(default = "default_eager_sessions")]
    pub eager_sessions: Vec<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            show_agent_thinking: false,
            state_scope: default_state_scope(),
            eager_sessions: default_eager_sessions(),
        }
    }
}

fn default_state_scope() -> String { "workflow".to_string() }
fn default_eager_sessions() -> Vec<String> { vec!["guardian".to_string()] }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file. Default: <workspace>/tasks.db
    #[serde(default)]
    pub path: Option<String>,
    /// Insert two sample tasks when the store is empty.
    #[serde(default)]
    pub seed_samples: bool,
}

/// Embedding model configuration for semantic task search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "openai", "ollama", or any OpenAI-compatible API.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model name (e.g., "text-embedding-3-small", "nomic-embed-text").
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_dims")]
    pub dimensions: usize,
}

impl EmbeddingConfig {
    pub fn resolved_base_url(&self) -> String {
        match (&self.base_url, self.provider.as_str()) {
            (Some(url), _) => url.clone(),
            (None, "ollama") => "http://localhost:11434/v1".to_string(),
            (None, _) => "https://api.openai.com/v1".to_string(),
        }
    }
}

fn default_embedding_dims() -> usize { 1536 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Matches must score strictly above this cosine similarity.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_results: default_max_results(),
        }
    }
}

fn default_min_score() -> f32 { 0.3 }
fn default_max_results() -> usize { 100 }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QnaConfig {
    /// Reference material the QnA node answers from.
    #[serde(default)]
    pub manual_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            token: None,
        }
    }
}

fn default_bind() -> String { "127.0.0.1:5199".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TaskwardenError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| TaskwardenError::Config(e.to_string()))
    }

    /// Build a config from environment variables alone.
    ///
    /// Azure is selected when `AZURE_OPENAI_RESOURCE` is set; otherwise an
    /// OpenAI-compatible endpoint is used with `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let model = if let Some(resource) = env("AZURE_OPENAI_RESOURCE") {
            let deployment = env("AZURE_OPENAI_DEPLOYMENT").ok_or_else(|| {
                TaskwardenError::Config("AZURE_OPENAI_DEPLOYMENT is required".into())
            })?;
            ModelConfig {
                provider: "azure".to_string(),
                model_id: env("TASKWARDEN_MODEL").unwrap_or_else(|| deployment.clone()),
                api_key: env("AZURE_OPENAI_API_KEY"),
                azure_resource: Some(resource),
                azure_deployment: Some(deployment),
                azure_api_version: env("AZURE_OPENAI_API_VERSION"),
                ..ModelConfig::openai("", None)
            }
        } else {
            let api_key = env("OPENAI_API_KEY").ok_or_else(|| {
                TaskwardenError::Config(
                    "no config file found and neither OPENAI_API_KEY nor AZURE_OPENAI_RESOURCE is set"
                        .into(),
                )
            })?;
            let mut model = ModelConfig::openai(
                env("TASKWARDEN_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                Some(api_key),
            );
            model.base_url = env("OPENAI_BASE_URL");
            model
        };

        let mut config = Self::with_model(model);
        if let Some(ws) = env("TASKWARDEN_WORKSPACE") {
            config.agent.workspace = ws;
        }
        config.qna.manual_path = env("TASKWARDEN_MANUAL");
        if let Some(bind) = env("TASKWARDEN_BIND") {
            config.gateway.bind = bind;
        }
        Ok(config)
    }

    /// A config with every section at its default.
    pub fn with_model(model: ModelConfig) -> Self {
        Self {
            agent: AgentConfig::default(),
            model,
            fallback_models: Vec::new(),
            workflow: WorkflowConfig::default(),
            store: StoreConfig::default(),
            embedding: None,
            search: SearchConfig::default(),
            qna: QnaConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.agent.workspace)
    }

    pub fn store_path(&self) -> PathBuf {
        match &self.store.path {
            Some(p) => expand_home(p),
            None => self.workspace_dir().join("tasks.db"),
        }
    }

    pub fn manual_path(&self) -> Option<PathBuf> {
        self.qna.manual_path.as_deref().map(expand_home)
    }

    /// Read the QnA reference material. A configured but unreadable file is a
    /// startup error; no configured file yields an empty manual.
    pub fn load_manual(&self) -> Result<String> {
        match self.manual_path() {
            Some(path) => std::fs::read_to_string(&path).map_err(|e| {
                TaskwardenError::Config(format!(
                    "cannot read QnA manual {}: {}",
                    path.display(),
                    e
                ))
            }),
            None => Ok(String::new()),
        }
    }

    /// Startup checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.model.model_id.trim().is_empty() {
            return Err(TaskwardenError::Config("model.model_id is empty".into()));
        }
        if self.model.provider == "azure"
            && (self.model.azure_resource.is_none() || self.model.azure_deployment.is_none())
        {
            return Err(TaskwardenError::Config(
                "azure provider needs azure_resource and azure_deployment".into(),
            ));
        }
        if self.agent.max_turns == 0 {
            return Err(TaskwardenError::Config("agent.max_turns must be > 0".into()));
        }
        if self.workflow.state_scope.trim().is_empty() {
            return Err(TaskwardenError::Config("workflow.state_scope is empty".into()));
        }
        if !(0.0..=1.0).contains(&self.search.min_score) {
            return Err(TaskwardenError::Config(
                "search.min_score must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TASKWARDEN_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_TASKWARDEN_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_TASKWARDEN_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_TASKWARDEN_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_TASKWARDEN_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let toml_str = r#"
[model]
model_id = "gpt-4o-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.agent.max_turns, 10);
        assert_eq!(config.workflow.state_scope, "workflow");
        assert_eq!(config.workflow.eager_sessions, vec!["guardian".to_string()]);
        assert!(!config.workflow.show_agent_thinking);
        assert!((config.search.min_score - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.search.max_results, 100);
        assert_eq!(config.gateway.bind, "127.0.0.1:5199");
        assert!(config.embedding.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_azure_section() {
        let toml_str = r#"
[model]
provider = "azure"
model_id = "gpt-4o"
api_key = "key"
azure_resource = "contoso"
azure_deployment = "gpt-4o"
azure_api_version = "2024-06-01"

[workflow]
show_agent_thinking = true
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.azure_resource.as_deref(), Some("contoso"));
        assert!(config.workflow.show_agent_thinking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_azure_without_deployment_is_invalid() {
        let toml_str = r#"
[model]
provider = "azure"
model_id = "gpt-4o"
azure_resource = "contoso"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_path_defaults_to_workspace() {
        let mut config = AppConfig::with_model(ModelConfig::openai("m", None));
        config.agent.workspace = "/tmp/tw".into();
        assert_eq!(config.store_path(), PathBuf::from("/tmp/tw/tasks.db"));
        config.store.path = Some("/data/t.db".into());
        assert_eq!(config.store_path(), PathBuf::from("/data/t.db"));
    }

    #[test]
    fn test_missing_manual_is_config_error() {
        let mut config = AppConfig::with_model(ModelConfig::openai("m", None));
        config.qna.manual_path = Some("/nonexistent/taskwarden/manual.md".into());
        let err = config.load_manual().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_embedding_base_url() {
        let toml_str = r#"
[model]
model_id = "m"

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dimensions = 768
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let emb = config.embedding.unwrap();
        assert_eq!(emb.resolved_base_url(), "http://localhost:11434/v1");
        assert_eq!(emb.dimensions, 768);
    }
}

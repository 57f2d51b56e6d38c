use std::io::Write;

use taskwarden_core::config::AppConfig;
use taskwarden_core::error::{ErrorKind, TaskwardenError};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[agent]
max_turns = 6
max_duration_secs = 45
workspace = "/tmp/taskwarden-test"

[model]
provider = "azure"
model_id = "gpt-4o"
api_key = "az-test-key"
azure_resource = "contoso"
azure_deployment = "tasks-gpt4o"
azure_api_version = "2024-10-21"
max_tokens = 2048
temperature = 0.2

[model.retry]
max_retries = 5
initial_backoff_ms = 250
max_backoff_ms = 4000

[[fallback_models]]
provider = "openai"
model_id = "gpt-4o-mini"
api_key = "sk-fallback"

[workflow]
show_agent_thinking = true
state_scope = "turn"
eager_sessions = ["guardian", "first_line"]

[store]
path = "/tmp/taskwarden-test/custom.db"
seed_samples = true

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dimensions = 512

[search]
min_score = 0.45
max_results = 20

[qna]
manual_path = "/tmp/taskwarden-test/manual.md"

[gateway]
bind = "0.0.0.0:8080"
token = "gw-token"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    config.validate().expect("valid config");

    assert_eq!(config.agent.max_turns, 6);
    assert_eq!(config.agent.max_duration_secs, 45);
    assert_eq!(config.model.provider, "azure");
    assert_eq!(config.model.azure_deployment.as_deref(), Some("tasks-gpt4o"));
    assert_eq!(config.model.max_tokens, 2048);
    let retry = config.model.retry.as_ref().expect("retry section");
    assert_eq!(retry.max_retries, 5);
    assert_eq!(config.fallback_models.len(), 1);
    assert_eq!(config.fallback_models[0].model_id, "gpt-4o-mini");

    assert!(config.workflow.show_agent_thinking);
    assert_eq!(config.workflow.state_scope, "turn");
    assert_eq!(config.workflow.eager_sessions, vec!["guardian", "first_line"]);

    assert_eq!(
        config.store_path().display().to_string(),
        "/tmp/taskwarden-test/custom.db"
    );
    assert!(config.store.seed_samples);
    let embedding = config.embedding.as_ref().expect("embedding section");
    assert_eq!(embedding.dimensions, 512);
    assert_eq!(embedding.resolved_base_url(), "https://api.openai.com/v1");
    assert_eq!(config.search.max_results, 20);

    assert_eq!(config.gateway.bind, "0.0.0.0:8080");
    assert_eq!(config.gateway.token.as_deref(), Some("gw-token"));
}

#[test]
fn test_minimal_config_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(
        br#"
[model]
model_id = "gpt-4o-mini"
"#,
    )
    .expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    config.validate().expect("valid config");

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.agent.max_turns, 10);
    assert_eq!(config.agent.max_duration_secs, 120);
    assert!(!config.workflow.show_agent_thinking);
    assert_eq!(config.workflow.eager_sessions, vec!["guardian"]);
    assert!(config.embedding.is_none());
    assert!((config.search.min_score - 0.3).abs() < f32::EPSILON);
    assert_eq!(config.search.max_results, 100);
    assert_eq!(config.gateway.bind, "127.0.0.1:5199");
    assert!(config.gateway.token.is_none());
    assert!(config.store_path().ends_with("tasks.db"));
    assert_eq!(config.load_manual().expect("no manual"), "");
}

#[test]
fn test_env_var_expansion() {
    std::env::set_var("TASKWARDEN_TEST_CONFIG_KEY", "sk-from-env");
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(
        br#"
[model]
model_id = "gpt-4o-mini"
api_key = "${TASKWARDEN_TEST_CONFIG_KEY}"
base_url = "${TASKWARDEN_TEST_UNSET_VAR}"
"#,
    )
    .expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key.as_deref(), Some("sk-from-env"));
    assert_eq!(
        config.model.base_url.as_deref(),
        Some("${TASKWARDEN_TEST_UNSET_VAR}")
    );
}

#[test]
fn test_missing_file_is_config_not_found() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/taskwarden.toml")).unwrap_err();
    assert!(matches!(err, TaskwardenError::ConfigNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_missing_manual_is_startup_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    let content = format!(
        "[model]\nmodel_id = \"gpt-4o-mini\"\n\n[qna]\nmanual_path = \"{}\"\n",
        dir.path().join("missing.md").display()
    );
    tmp.write_all(content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    let err = config.load_manual().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    std::fs::write(dir.path().join("missing.md"), "Press Add to create a task.").unwrap();
    assert_eq!(config.load_manual().unwrap(), "Press Add to create a task.");
}

#[test]
fn test_invalid_values_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(
        br#"
[model]
provider = "azure"
model_id = "gpt-4o"
"#,
    )
    .expect("write toml");
    let config = AppConfig::load(tmp.path()).expect("load config");
    assert!(config.validate().is_err());

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(
        br#"
[model]
model_id = "gpt-4o"

[search]
min_score = 1.5
"#,
    )
    .expect("write toml");
    let config = AppConfig::load(tmp.path()).expect("load config");
    assert!(config.validate().is_err());
}

#[test]
fn test_example_config_parses() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("taskwarden.toml.example");
    let config = AppConfig::load(&path).expect("example config loads");
    config.validate().expect("example config is valid");
}

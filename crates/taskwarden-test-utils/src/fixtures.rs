use std::path::Path;

use taskwarden_core::config::{AppConfig, ModelConfig};
use taskwarden_core::task::{sample_tasks, today_utc, TaskRecord};

/// The seeded sample tasks as stored records (ids 1 and 2).
pub fn sample_records() -> Vec<TaskRecord> {
    sample_tasks(today_utc())
        .into_iter()
        .enumerate()
        .map(|(i, t)| t.into_record(i as i64 + 1))
        .collect()
}

/// A config that never reaches a real endpoint.
pub fn test_config() -> AppConfig {
    let mut model = ModelConfig::openai("test-model", Some("test-key".into()));
    model.base_url = Some("http://127.0.0.1:9/v1".into());
    AppConfig::with_model(model)
}

/// Like [`test_config`], with the workspace and store inside `dir`.
pub fn test_config_in(dir: &Path) -> AppConfig {
    let mut config = test_config();
    config.agent.workspace = dir.display().to_string();
    config.store.path = Some(dir.join("tasks.db").display().to_string());
    config
}

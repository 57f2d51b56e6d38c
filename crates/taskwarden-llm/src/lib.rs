pub mod providers;
pub mod retry;
pub mod streaming;

use taskwarden_core::config::{AppConfig, ModelConfig};
use taskwarden_core::traits::LlmClient;

pub use providers::azure::AzureClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    match config.provider.as_str() {
        "azure" | "azure-openai" => Box::new(AzureClient::new()),
        // Everything else uses the OpenAI-compatible client
        _ => Box::new(OpenAiClient::new()),
    }
}

/// Primary client wrapped with retries and the configured fallback models.
pub fn create_retrying_client(config: &AppConfig) -> RetryingClient {
    let fallbacks = config
        .fallback_models
        .iter()
        .map(|fb| (fb.clone(), create_client(fb)))
        .collect();
    RetryingClient::new(
        create_client(&config.model),
        fallbacks,
        config.model.retry.clone().unwrap_or_default(),
    )
}

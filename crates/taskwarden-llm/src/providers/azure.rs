use futures::future::BoxFuture;
use futures::stream::BoxStream;
use reqwest::Client;
use tracing::debug;

use taskwarden_core::config::ModelConfig;
use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::traits::LlmClient;
use taskwarden_core::types::*;

use super::openai::{into_delta_stream, ChatRequest};

const DEFAULT_API_VERSION: &str = "2024-06-01";

/// Azure OpenAI client. Uses the same wire format as OpenAI but different
/// endpoint structure and `api-key` header instead of Bearer token.
pub struct AzureClient {
    http: Client,
}

impl AzureClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for AzureClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Chat completions URL for a deployment. `base_url` overrides the
/// `<resource>.openai.azure.com` host, e.g. for a private endpoint.
pub fn deployment_url(config: &ModelConfig) -> Result<String> {
    let deployment = config
        .azure_deployment
        .as_deref()
        .ok_or_else(|| TaskwardenError::Config("Azure: azure_deployment is required".into()))?;
    let api_version = config
        .azure_api_version
        .as_deref()
        .unwrap_or(DEFAULT_API_VERSION);

    let host = match (&config.base_url, &config.azure_resource) {
        (Some(base), _) => base.trim_end_matches('/').to_string(),
        (None, Some(resource)) => format!("https://{resource}.openai.azure.com"),
        (None, None) => {
            return Err(TaskwardenError::Config(
                "Azure: azure_resource is required".into(),
            ))
        }
    };

    Ok(format!(
        "{host}/openai/deployments/{deployment}/chat/completions?api-version={api_version}"
    ))
}

impl LlmClient for AzureClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        operations: &[OperationDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let operations = operations.to_vec();

        Box::pin(async move {
            let url = deployment_url(&config)?;
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| TaskwardenError::Config("Azure: api_key is required".into()))?;

            let body = ChatRequest::new(&config, None, messages, &operations);
            debug!(url = %url, "Sending Azure chat completion request");

            let response = self
                .http
                .post(&url)
                .header("api-key", api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| TaskwardenError::LlmRequest(e.to_string()))?;

            let stream: BoxStream<'_, Result<StreamDelta>> = into_delta_stream(response).await?;
            Ok(stream)
        })
    }
}

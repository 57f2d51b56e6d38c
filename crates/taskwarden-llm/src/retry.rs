use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tracing::{info, warn};

use taskwarden_core::config::{ModelConfig, RetryConfig};
use taskwarden_core::error::{Result, TaskwardenError};
use taskwarden_core::traits::LlmClient;
use taskwarden_core::types::*;

/// An LLM client that retries failed requests and falls back to alternative models.
pub struct RetryingClient {
    primary: Box<dyn LlmClient>,
    fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn LlmClient>,
        fallbacks: Vec<(ModelConfig, Box<dyn LlmClient>)>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &TaskwardenError) -> bool {
    match e {
        TaskwardenError::LlmRequest(msg) => {
            let msg = msg.to_lowercase();
            ["429", "500", "502", "503", "504", "timeout", "timed out", "connection"]
                .iter()
                .any(|needle| msg.contains(needle))
        }
        TaskwardenError::LlmStream(_) => true,
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl LlmClient for RetryingClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        operations: &[OperationDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let operations = operations.to_vec();

        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self
                    .primary
                    .chat_stream(&config, messages.clone(), &operations)
                    .await
                {
                    Ok(stream) => return Ok(stream),
                    Err(e) if is_retryable(&e) && attempt < max_retries => {
                        let backoff = calculate_backoff(attempt, &self.retry_config);
                        warn!(
                            attempt = attempt + 1,
                            max_retries,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %e,
                            "Retrying LLM request"
                        );
                        tokio::time::sleep(backoff).await;
                        last_err = Some(e);
                    }
                    Err(e) => {
                        last_err = Some(e);
                        break;
                    }
                }
            }

            if !self.fallbacks.is_empty() {
                info!("Primary model exhausted, trying fallback models");
            }
            for (fb_config, fb_client) in &self.fallbacks {
                match fb_client
                    .chat_stream(fb_config, messages.clone(), &operations)
                    .await
                {
                    Ok(stream) => {
                        info!(
                            model = %fb_config.model_id,
                            provider = %fb_config.provider,
                            "Fell back to alternative model"
                        );
                        return Ok(stream);
                    }
                    Err(e) => {
                        warn!(model = %fb_config.model_id, error = %e, "Fallback model also failed");
                    }
                }
            }

            Err(last_err
                .unwrap_or_else(|| TaskwardenError::LlmRequest("All providers failed".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct FailingClient {
        calls: Arc<AtomicUsize>,
        error: &'static str,
    }

    impl LlmClient for FailingClient {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
            _operations: &[OperationDefinition],
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let error = self.error;
            Box::pin(async move { Err(TaskwardenError::LlmRequest(error.to_string())) })
        }
    }

    struct OkClient;

    impl LlmClient for OkClient {
        fn chat_stream(
            &self,
            _config: &ModelConfig,
            _messages: Vec<ChatMessage>,
            _operations: &[OperationDefinition],
        ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
            Box::pin(async move {
                let stream: BoxStream<'_, Result<StreamDelta>> = Box::pin(futures::stream::iter(
                    vec![Ok(StreamDelta::Stop(StopReason::EndTurn))],
                ));
                Ok(stream)
            })
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&TaskwardenError::LlmRequest("HTTP 429 Too Many Requests".into())));
        assert!(is_retryable(&TaskwardenError::LlmStream("reset".into())));
        assert!(!is_retryable(&TaskwardenError::LlmRequest("HTTP 401: bad key".into())));
        assert!(!is_retryable(&TaskwardenError::Config("x".into())));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff_ms: 1000,
            max_backoff_ms: 5000,
        };
        let d = calculate_backoff(8, &config);
        assert!(d <= Duration::from_millis(6000));
        assert!(d >= Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_retries_then_falls_back() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(FailingClient {
                calls: calls.clone(),
                error: "HTTP 503",
            }),
            vec![(ModelConfig::openai("backup", None), Box::new(OkClient))],
            fast_retry(),
        );
        let config = ModelConfig::openai("primary", None);
        assert!(client.chat_stream(&config, vec![], &[]).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = RetryingClient::new(
            Box::new(FailingClient {
                calls: calls.clone(),
                error: "HTTP 400",
            }),
            vec![],
            fast_retry(),
        );
        let config = ModelConfig::openai("primary", None);
        let result = client.chat_stream(&config, vec![], &[]).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

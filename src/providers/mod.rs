/*!
 * Provider implementations for different LLM services.
 *
 * - `openai`: any OpenAI-compatible chat completions API (DeepSeek, OpenAI, LM Studio)
 * - `anthropic`: Anthropic messages API
 * - `mock`: scripted translator used by tests and benchmarks
 */

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

pub mod anthropic;
pub mod mock;
pub mod openai;

/// A single system + user exchange
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text of the reply plus whatever token accounting the service returned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionResponse {
    pub text: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

/// Common trait for all LLM providers
///
/// Providers make exactly one HTTP call per `complete`. Retrying, pacing and
/// concurrency limits belong to the dispatcher.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Send a tiny request to check credentials and reachability
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Build the client for the configured provider
pub fn create_provider(config: &TranslationConfig) -> Arc<dyn Provider> {
    let timeout = Duration::from_secs(config.get_timeout_secs());
    match config.provider {
        TranslationProvider::Anthropic => Arc::new(anthropic::Anthropic::new(
            config.get_api_key(),
            config.get_endpoint(),
            config.get_model(),
            timeout,
        )),
        TranslationProvider::DeepSeek | TranslationProvider::OpenAI | TranslationProvider::LMStudio => {
            Arc::new(openai::OpenAICompatible::new(
                config.provider.display_name(),
                config.get_api_key(),
                config.get_endpoint(),
                config.get_model(),
                timeout,
            ))
        }
    }
}

/// Map a reqwest failure onto the provider error kinds
pub(crate) fn request_error(provider: &str, error: reqwest::Error) -> ProviderError {
    if error.is_timeout() || error.is_connect() {
        ProviderError::ConnectionError(format!("{}: {}", provider, error))
    } else {
        ProviderError::RequestFailed(format!("{}: {}", provider, error))
    }
}

/// Map a non-success HTTP status onto the provider error kinds
pub(crate) fn status_error(provider: &str, status: u16, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthenticationError(format!("{} ({}): {}", provider, status, body)),
        429 => ProviderError::RateLimitExceeded(format!("{}: {}", provider, body)),
        _ => ProviderError::ApiError { status_code: status, message: body },
    }
}

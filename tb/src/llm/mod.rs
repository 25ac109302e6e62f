//! LLM Client module for TaskBreaker
//!
//! Provides the completion client abstraction every pipeline stage calls through.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod offline;
mod openai;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::{FailureKind, LlmError};
pub use offline::OfflineClient;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, StopReason, StreamChunk, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// Supports "anthropic" and "openai" providers.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => {
            debug!("create_client: creating Anthropic client");
            Ok(Arc::new(AnthropicClient::from_config(config)?))
        }
        "openai" => {
            debug!("create_client: creating OpenAI client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(unknown_provider(other))
        }
    }
}

fn unknown_provider(name: &str) -> LlmError {
    LlmError::InvalidResponse(format!(
        "Unknown LLM provider: '{}'. Supported: {}",
        name,
        PROVIDERS.join(", ")
    ))
}

/// Providers `create_client` knows how to build
pub const PROVIDERS: [&str; 2] = ["anthropic", "openai"];

/// Create the configured client, or an offline stand-in when no API key is set
///
/// Only a missing or empty key falls back; every stage then takes its fallback
/// path. An unknown provider or a client that fails to build is an error.
pub fn create_client_or_offline(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, "create_client_or_offline: called");
    if !PROVIDERS.contains(&config.provider.as_str()) {
        return Err(unknown_provider(&config.provider));
    }
    if let Err(e) = config.get_api_key() {
        tracing::warn!(error = %e, "create_client_or_offline: no API key, falling back to offline client");
        return Ok(Arc::new(OfflineClient::new(e.to_string())));
    }
    create_client(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LlmConfig {
            provider: "bard".to_string(),
            ..LlmConfig::default()
        };
        let err = create_client(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown LLM provider"));
    }

    #[tokio::test]
    async fn test_missing_key_falls_back_offline() {
        let config = LlmConfig {
            api_key_env: "TASKBREAKER_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_client(&config).is_err());

        let client = create_client_or_offline(&config).unwrap();
        let err = client
            .complete(CompletionRequest::new("s", "u", 10))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), FailureKind::Unavailable);
    }

    #[test]
    fn test_unknown_provider_not_offline() {
        let config = LlmConfig {
            provider: "anthropik".to_string(),
            api_key_env: "TASKBREAKER_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        let err = create_client_or_offline(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown LLM provider: 'anthropik'"));
    }
}

//! Model provider implementations

pub mod ollama;
pub mod openai;
pub mod traits;

pub use ollama::OllamaClient;
pub use openai::OpenAIClient;
pub use traits::{
    CompletionRequest, CompletionResponse, LLMProvider, Message, ProviderError, ProviderResult,
    Role,
};

use std::sync::Arc;

use crate::config::{ChatBackend, ChatConfig, JudgeConfig};

/// Build the OpenAI client, preferring an explicit key over the env var
fn openai_client(api_key: Option<&str>, api_key_env: &str) -> ProviderResult<OpenAIClient> {
    match api_key {
        Some(key) if !key.trim().is_empty() => Ok(OpenAIClient::new(key.to_string())),
        _ => OpenAIClient::from_env_var(api_key_env),
    }
}

/// Create the provider whose answers are being evaluated
pub fn create_chat_provider(
    config: &ChatConfig,
    api_key: Option<&str>,
) -> ProviderResult<Arc<dyn LLMProvider + Send + Sync>> {
    match config.provider {
        ChatBackend::Ollama => {
            let mut client = OllamaClient::new(&config.model)
                .with_temperature(config.temperature)
                .with_timeout_ms(config.timeout_ms);
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url);
            }
            if let Some(system) = &config.system_prompt {
                client = client.with_system_prompt(system);
            }
            Ok(Arc::new(client))
        }
        ChatBackend::OpenAI => {
            let mut client = openai_client(api_key, &config.api_key_env)?
                .with_model(&config.model)
                .with_timeout_ms(config.timeout_ms);
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url);
            }
            Ok(Arc::new(client))
        }
    }
}

/// Create the judge model backend for the generative grader
pub fn create_judge_provider(
    config: &JudgeConfig,
    api_key: Option<&str>,
) -> ProviderResult<Arc<dyn LLMProvider + Send + Sync>> {
    let client = openai_client(api_key, &config.api_key_env)?
        .with_base_url(&config.base_url)
        .with_model(&config.model)
        .with_timeout_ms(config.timeout_ms);
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_needs_no_key() {
        let provider = create_chat_provider(&ChatConfig::default(), None).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.default_model(), "medical-assistant");
    }

    #[test]
    fn test_explicit_key_wins_over_env() {
        let config = JudgeConfig {
            api_key_env: "HEALTHBENCH_TEST_NEVER_SET".to_string(),
            ..Default::default()
        };
        let judge = create_judge_provider(&config, Some("sk-inline")).unwrap();
        assert_eq!(judge.name(), "openai");
        assert_eq!(judge.default_model(), "gpt-4");

        assert!(matches!(
            create_judge_provider(&config, None),
            Err(ProviderError::Config(_))
        ));
    }
}

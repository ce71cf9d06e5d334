// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provider construction from the generation section of the manifest

use std::sync::Arc;
use tracing::info;

use crate::domain::config::{resolve_secret, GenerationConfig, GenerationProviderKind};
use crate::domain::llm::{GenerationOptions, LLMProvider};

use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

pub fn build_provider(config: &GenerationConfig) -> anyhow::Result<Arc<dyn LLMProvider>> {
    info!(provider = ?config.provider, model = %config.model, "Initializing generation provider");

    let provider: Arc<dyn LLMProvider> = match config.provider {
        GenerationProviderKind::Ollama => Arc::new(OllamaAdapter::new(
            config.endpoint.clone(),
            config.model.clone(),
            config.timeout,
        )),
        GenerationProviderKind::Openai => {
            let api_key = match &config.api_key {
                Some(key) => resolve_secret(key)?,
                None => anyhow::bail!("spec.generation.api_key is required for the openai provider"),
            };
            Arc::new(OpenAIAdapter::new(
                config.endpoint.clone(),
                api_key,
                config.model.clone(),
                config.timeout,
            ))
        }
    };

    Ok(provider)
}

/// Per-call options derived from the manifest
pub fn generation_options(config: &GenerationConfig) -> GenerationOptions {
    GenerationOptions {
        max_tokens: Some(config.max_tokens),
        temperature: Some(config.temperature),
        stop_sequences: None,
        timeout: config.timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_requires_api_key() {
        let config = GenerationConfig {
            provider: GenerationProviderKind::Openai,
            ..Default::default()
        };
        assert!(build_provider(&config).is_err());

        let config = GenerationConfig {
            provider: GenerationProviderKind::Openai,
            api_key: Some("sk-inline".into()),
            ..Default::default()
        };
        assert!(build_provider(&config).is_ok());
    }

    #[test]
    fn test_options_follow_config() {
        let config = GenerationConfig::default();
        let options = generation_options(&config);
        assert_eq!(options.timeout, config.timeout);
        assert_eq!(options.max_tokens, Some(config.max_tokens));
    }
}

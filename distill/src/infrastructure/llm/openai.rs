// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OpenAI LLM Provider Adapter
//
// Anti-Corruption Layer for OpenAI API
// Also works with OpenAI-compatible APIs (LM Studio, vLLM, etc.)

use crate::domain::llm::{
    FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAIAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    health_timeout: Duration,
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAIAdapter {
    pub fn new(endpoint: String, api_key: String, model: String, health_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            health_timeout,
        }
    }

    async fn send(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
        // Translate our domain types to OpenAI's types
        let request = OpenAIRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: options.stop_sequences.clone(),
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(if status == 401 || status == 403 {
                LLMError::Authentication(error_text)
            } else if status == 429 {
                LLMError::RateLimit
            } else if status == 404 {
                LLMError::ModelNotFound(self.model.clone())
            } else {
                LLMError::Provider(format!("HTTP {}: {}", status, error_text))
            });
        }

        let openai_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Failed to parse response: {}", e)))?;

        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::Provider("No response from model".into()))?;

        let usage = openai_response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(GenerationResponse {
            text: choice.message.content,
            usage,
            provider: "openai".to_string(),
            model: self.model.clone(),
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                Some("content_filter") => FinishReason::ContentFilter,
                _ => FinishReason::Stop,
            },
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAIAdapter {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        tokio::time::timeout(options.timeout, self.send(prompt, options))
            .await
            .map_err(|_| LLMError::Timeout(options.timeout))?
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let url = format!("{}/models", self.endpoint.trim_end_matches('/'));

        let request = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send();
        let response = tokio::time::timeout(self.health_timeout, request)
            .await
            .map_err(|_| LLMError::Timeout(self.health_timeout))?
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else if response.status() == 401 || response.status() == 403 {
            Err(LLMError::Authentication("Invalid API key".into()))
        } else {
            Err(LLMError::Network(format!("HTTP {}", response.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(url: String) -> OpenAIAdapter {
        OpenAIAdapter::new(url, "sk-test".into(), "gpt-4o-mini".into(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_chat_completion_is_translated() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"- Run tests first"},"finish_reason":"stop"}],
                    "usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
            )
            .create_async()
            .await;

        let response = adapter(server.url())
            .generate("mine rules", &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(response.text, "- Run tests first");
        assert_eq!(response.usage.total_tokens, 15);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_failures_are_classified() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/chat/completions").with_status(401).create_async().await;
        let err = adapter(server.url()).generate("x", &GenerationOptions::default()).await.unwrap_err();
        assert!(matches!(err, LLMError::Authentication(_)));
        assert!(err.is_unavailable());

        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/chat/completions").with_status(429).create_async().await;
        let err = adapter(server.url()).generate("x", &GenerationOptions::default()).await.unwrap_err();
        assert!(matches!(err, LLMError::RateLimit));

        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/chat/completions").with_status(500).with_body("boom").create_async().await;
        let err = adapter(server.url()).generate("x", &GenerationOptions::default()).await.unwrap_err();
        assert!(matches!(err, LLMError::Provider(_)));
        assert!(!err.is_unavailable());
    }
}

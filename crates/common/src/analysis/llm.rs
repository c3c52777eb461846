//! Chat-completion clients behind a single trait
//!
//! - `OpenAiChatClient`: any OpenAI-compatible `/chat/completions` endpoint
//! - `DisabledLlm`: used when no provider is configured
//! - `MockLlm`: scripted responses for tests

use super::AnalysisProviderError;
use crate::config::AnalysisConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Trait for chat completion
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a system + user prompt pair and return the raw reply text
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisProviderError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat client
pub struct OpenAiChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout_secs: u64,
        temperature: f32,
    ) -> Result<Self, AnalysisProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AnalysisProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            temperature,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AnalysisProviderError::QuotaExceeded);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisProviderError::Upstream {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisProviderError::Malformed(format!("response body: {}", e)))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(AnalysisProviderError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Client used when analysis is switched off; every call falls back
pub struct DisabledLlm;

#[async_trait]
impl LlmClient for DisabledLlm {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, AnalysisProviderError> {
        Err(AnalysisProviderError::NotConfigured)
    }

    fn model_name(&self) -> &str {
        "disabled"
    }
}

/// Scripted client for tests. Replies are consumed in order; once
/// exhausted, the last reply repeats.
pub struct MockLlm {
    replies: Mutex<VecDeque<Result<String, AnalysisProviderError>>>,
    last: Mutex<Option<Result<String, AnalysisProviderError>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new(replies: Vec<Result<String, AnalysisProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: impl Into<String>) -> Self {
        Self::new(vec![Ok(reply.into())])
    }

    pub fn failing(error: AnalysisProviderError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, AnalysisProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(user.to_string());
        }

        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| AnalysisProviderError::Transport("mock poisoned".into()))?;
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last.clone().unwrap_or(Err(AnalysisProviderError::EmptyResponse)),
        }
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

/// Create an LLM client based on configuration
pub fn create_llm_client(config: &AnalysisConfig) -> Arc<dyn LlmClient> {
    match (config.provider.as_str(), config.api_key.as_deref()) {
        ("openai", Some(key)) if !key.is_empty() => {
            match OpenAiChatClient::new(
                key.to_string(),
                config.model.clone(),
                config.api_base.clone(),
                config.timeout_secs,
                config.temperature,
            ) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to build LLM client, analysis disabled");
                    Arc::new(DisabledLlm)
                }
            }
        }
        ("disabled", _) => Arc::new(DisabledLlm),
        (provider, _) => {
            tracing::warn!(provider = provider, "LLM provider not configured, analysis will use fallbacks");
            Arc::new(DisabledLlm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_repeats_last_reply() {
        let llm = MockLlm::new(vec![Ok("a".into()), Ok("b".into())]);
        assert_eq!(llm.complete("s", "1").await.unwrap(), "a");
        assert_eq!(llm.complete("s", "2").await.unwrap(), "b");
        assert_eq!(llm.complete("s", "3").await.unwrap(), "b");
        assert_eq!(llm.calls(), 3);
        assert_eq!(llm.prompts(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_missing_key_disables_analysis() {
        let client = create_llm_client(&AnalysisConfig::default());
        assert_eq!(client.model_name(), "disabled");
        assert!(matches!(
            client.complete("s", "u").await,
            Err(AnalysisProviderError::NotConfigured)
        ));
    }
}

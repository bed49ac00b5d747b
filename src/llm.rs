//! Chat-completion providers.
//!
//! Concrete backends for [`ragchat_core::generation::GenerationProvider`]:
//!
//! | Config Value | Provider | Endpoint |
//! |-------------|----------|----------|
//! | `"ollama"` | [`OllamaChat`] | `POST {url}/api/chat` |
//! | `"openai"` | [`OpenAIChat`] | `POST {url}/v1/chat/completions` |
//! | `"disabled"` | [`DisabledChat`] | none; every call fails |
//!
//! `temperature` and `max_tokens` from `[llm]` are sent with every request
//! (`options.num_predict` for Ollama). Requests are non-streaming.
//! `generate` retries transient failures; `generate_once` (used for query
//! expansion) makes a single attempt.

use anyhow::{bail, Result};
use async_trait::async_trait;
use ragchat_core::generation::GenerationProvider;
use ragchat_core::ChatMessage;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::embedding::base_url;
use crate::http::JsonClient;

pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Fails every call. Query expansion then falls back to the original
/// question, and answers surface a generation error.
pub struct DisabledChat;

#[async_trait]
impl GenerationProvider for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String> {
        bail!("LLM provider is disabled. Set [llm] provider in config.")
    }
}

pub struct OllamaChat {
    model: String,
    url: String,
    temperature: f32,
    max_tokens: u32,
    client: JsonClient,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: base_url(config.url.as_deref(), "http://localhost:11434"),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: JsonClient::new("Ollama", config.timeout_secs, config.max_retries)?,
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let endpoint = format!("{}/api/chat", self.url);
        let payload = self
            .client
            .post(&endpoint, None, &self.request_body(messages))
            .await?;
        ollama_content(&payload)
    }

    async fn generate_once(&self, messages: &[ChatMessage]) -> Result<String> {
        let endpoint = format!("{}/api/chat", self.url);
        let payload = self
            .client
            .post_once(&endpoint, None, &self.request_body(messages))
            .await?;
        ollama_content(&payload)
    }
}

fn ollama_content(payload: &Value) -> Result<String> {
    payload["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))
}

pub struct OpenAIChat {
    model: String,
    url: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    client: JsonClient,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            url: base_url(config.url.as_deref(), "https://api.openai.com"),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: JsonClient::new("OpenAI", config.timeout_secs, config.max_retries)?,
        })
    }

    fn request_body(&self, messages: &[ChatMessage]) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

#[async_trait]
impl GenerationProvider for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let endpoint = format!("{}/v1/chat/completions", self.url);
        let payload = self
            .client
            .post(&endpoint, Some(&self.api_key), &self.request_body(messages))
            .await?;
        openai_content(&payload)
    }

    async fn generate_once(&self, messages: &[ChatMessage]) -> Result<String> {
        let endpoint = format!("{}/v1/chat/completions", self.url);
        let payload = self
            .client
            .post_once(&endpoint, Some(&self.api_key), &self.request_body(messages))
            .await?;
        openai_content(&payload)
    }
}

fn openai_content(payload: &Value) -> Result<String> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ollama() -> OllamaChat {
        OllamaChat::new(&LlmConfig {
            url: Some("http://127.0.0.1:9/".to_string()),
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_ollama_body_carries_options() {
        let body = ollama().request_body(&[
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
        ]);
        assert_eq!(body["model"], "llama3.2:3b");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 300);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(ollama().url, "http://127.0.0.1:9");
    }

    /// Accepts connections and never answers.
    async fn silent_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_generate_once_gives_up_after_one_timeout() {
        let (url, server) = silent_server().await;
        let chat = OllamaChat::new(&LlmConfig {
            url: Some(url),
            timeout_secs: 1,
            max_retries: 3,
            ..LlmConfig::default()
        })
        .unwrap();

        let started = std::time::Instant::now();
        let result = chat.generate_once(&[ChatMessage::user("refund")]).await;
        let elapsed = started.elapsed();
        server.abort();

        assert!(result.is_err());
        assert!(
            elapsed < std::time::Duration::from_secs(3),
            "single attempt took {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_disabled_always_fails() {
        let err = DisabledChat
            .generate(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn test_unknown_provider() {
        let config = LlmConfig {
            provider: "bard".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}

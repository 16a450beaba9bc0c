//! Language model client abstraction and implementations.
//!
//! Defines the [`Generator`] trait and two remote providers:
//! - **[`OpenAiGenerator`]**: `POST /v1/chat/completions`, non-streaming,
//!   temperature 0.
//! - **[`OllamaGenerator`]**: `POST /api/generate` with `stream: false`.
//!
//! Same retry discipline as the other remote clients: 429/5xx/network errors
//! retry with exponential backoff, other 4xx fail immediately.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::PipelineError;

/// Produces one text completion for one prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier (e.g. `"gpt-4o-mini"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for the prompt, non-streaming.
    async fn generate(&self, prompt: &str) -> Result<String, PipelineError>;
}

/// Instantiate the configured generation provider.
pub fn create_generator(
    config: &GenerationConfig,
) -> Result<std::sync::Arc<dyn Generator>, PipelineError> {
    match config.provider.as_str() {
        "openai" => Ok(std::sync::Arc::new(OpenAiGenerator::new(config)?)),
        "ollama" => Ok(std::sync::Arc::new(OllamaGenerator::new(config)?)),
        other => Err(PipelineError::Config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

fn require_model(config: &GenerationConfig) -> Result<String, PipelineError> {
    config
        .model
        .clone()
        .ok_or_else(|| PipelineError::Config("generation.model is required".to_string()))
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, PipelineError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::RemoteCall(e.to_string()))
}

async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, String)],
    body: &serde_json::Value,
    max_retries: u32,
    what: &str,
) -> Result<serde_json::Value, PipelineError> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| PipelineError::RemoteCall(e.to_string()));
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(PipelineError::RemoteCall(format!(
                        "{} error {}: {}",
                        what, status, body_text
                    )));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                return Err(PipelineError::RemoteCall(format!(
                    "{} error {}: {}",
                    what, status, body_text
                )));
            }
            Err(e) => {
                last_err = Some(PipelineError::RemoteCall(format!("{}: {}", what, e)));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| PipelineError::RemoteCall(format!("{} failed after retries", what))))
}

// ============ OpenAI Provider ============

/// Chat-completions client for the OpenAI API.
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiGenerator {
    model: String,
    base_url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, PipelineError> {
        let model = require_model(config)?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(PipelineError::Config(
                "OPENAI_API_KEY environment variable not set".to_string(),
            ));
        }
        Ok(Self {
            model,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| PipelineError::Config("OPENAI_API_KEY not set".to_string()))?;
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0,
        });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            &[("Authorization", format!("Bearer {}", api_key))],
            &body,
            self.max_retries,
            "OpenAI chat API",
        )
        .await?;
        parse_openai_completion(&json)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_openai_completion(json: &serde_json::Value) -> Result<String, PipelineError> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            PipelineError::RemoteCall("invalid OpenAI response: missing completion text".to_string())
        })
}

// ============ Ollama Provider ============

/// Generation client for a local Ollama instance.
pub struct OllamaGenerator {
    model: String,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            model: require_model(config)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/generate", self.url.trim_end_matches('/')),
            &[],
            &body,
            self.max_retries,
            "Ollama generate API",
        )
        .await?;
        parse_ollama_completion(&json)
    }
}

fn parse_ollama_completion(json: &serde_json::Value) -> Result<String, PipelineError> {
    json.get("response")
        .and_then(|t| t.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            PipelineError::RemoteCall("invalid Ollama response: missing response text".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_openai_completion_extracts_message_content() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "  The answer is 42.  " } }
            ]
        });
        assert_eq!(parse_openai_completion(&json).unwrap(), "The answer is 42.");
    }

    #[test]
    fn parse_openai_completion_rejects_empty_choices() {
        let json = serde_json::json!({ "choices": [] });
        assert!(parse_openai_completion(&json).is_err());
    }

    #[test]
    fn parse_ollama_completion_extracts_response() {
        let json = serde_json::json!({ "model": "llama3", "response": "Paris.", "done": true });
        assert_eq!(parse_ollama_completion(&json).unwrap(), "Paris.");
    }

    #[test]
    fn parse_ollama_completion_rejects_missing_response() {
        let json = serde_json::json!({ "done": true });
        assert!(parse_ollama_completion(&json).is_err());
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        let config = GenerationConfig {
            provider: "anthropic-bedrock".to_string(),
            ..GenerationConfig::default()
        };
        assert!(matches!(
            create_generator(&config).err().unwrap(),
            PipelineError::Config(_)
        ));
    }
}

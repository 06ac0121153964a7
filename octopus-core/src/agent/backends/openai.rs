//! OpenAI-compatible chat completions backend

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;

use super::{AgentOutput, AgentRequest, Backend, TokenUsage};
use crate::config::LlmConfig;
use crate::{Error, Result};

/// Backend speaking the `/chat/completions` protocol
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

impl From<Usage> for TokenUsage {
    fn from(usage: Usage) -> Self {
        TokenUsage {
            total_tokens: usage.total_tokens,
            prompt_tokens: usage.prompt_tokens,
            cached_prompt_tokens: usage
                .prompt_tokens_details
                .map(|d| d.cached_tokens)
                .unwrap_or(0),
            completion_tokens: usage.completion_tokens,
            successful_requests: 1,
        }
    }
}

impl OpenAiBackend {
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Agent(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    /// Request body; sampling parameters are omitted when unset
    fn request_body(request: &AgentRequest) -> serde_json::Value {
        let mut body = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }

        body
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn run(&self, request: &AgentRequest) -> Result<AgentOutput> {
        let started = Instant::now();
        tracing::debug!(role = %request.role, model = %request.model, "Sending chat completion");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| Error::Agent(format!("Failed to call OpenAI-compatible API: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            return Err(Error::Agent(format!(
                "OpenAI-compatible API request failed: HTTP {} {}",
                status, body
            )));
        }

        let parsed: ChatCompletionsResponse = response
            .json()
            .await
            .map_err(|e| Error::Agent(format!("Failed to decode chat completions response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let usage = parsed.usage.map(TokenUsage::from).unwrap_or(TokenUsage {
            successful_requests: 1,
            ..TokenUsage::default()
        });

        Ok(AgentOutput {
            text,
            usage,
            elapsed: started.elapsed(),
        })
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRole;
    use std::path::PathBuf;

    fn request(temperature: Option<f32>) -> AgentRequest {
        AgentRequest {
            role: AgentRole::Reviewer,
            system: "You are Senior Code Reviewer.".to_string(),
            prompt: "Review this".to_string(),
            workdir: PathBuf::from("/tmp"),
            model: "gpt-4o".to_string(),
            temperature,
            top_p: None,
        }
    }

    #[test]
    fn test_request_body_includes_set_sampling_only() {
        let body = OpenAiBackend::request_body(&request(Some(0.1)));
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Review this");
        assert!(body.get("temperature").is_some());
        assert!(body.get("top_p").is_none());

        let body = OpenAiBackend::request_body(&request(None));
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_usage_conversion() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{}"}}],
            "usage": {
                "prompt_tokens": 120,
                "completion_tokens": 30,
                "total_tokens": 150,
                "prompt_tokens_details": {"cached_tokens": 64}
            }
        }"#;
        let parsed: ChatCompletionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{}"));

        let usage = TokenUsage::from(parsed.usage.unwrap());
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(usage.prompt_tokens, 120);
        assert_eq!(usage.cached_prompt_tokens, 64);
        assert_eq!(usage.completion_tokens, 30);
        assert_eq!(usage.successful_requests, 1);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = LlmConfig {
            api_base: "http://localhost:8080/v1/".to_string(),
            ..LlmConfig::default()
        };
        let backend = OpenAiBackend::new(&config, "sk").unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert!(backend.is_available());
    }
}

//! LLM client capability and the OpenAI-compatible provider.
//!
//! The OpenAI-compatible client works with any `/chat/completions`
//! endpoint, including the clod.io router, which additionally needs the
//! upstream vendor in the request body.

use crate::error::{BenchError, Result};
use crate::registry::{ModelConfig, Provider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Anything that can turn a prompt into generated text.
///
/// One outbound call per invocation, no retries.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String>;
}

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// clod.io routing fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    vendor: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ensure_success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Map a non-2xx response to the error taxonomy.
pub(crate) fn status_error(status: StatusCode, message: String) -> BenchError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        BenchError::Auth(format!("API rejected credentials ({}): {}", status, message))
    } else {
        BenchError::Provider(format!("API error ({}): {}", status, message))
    }
}

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    timeout: Duration,
}

impl OpenAiCompatibleClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BenchError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    /// Get the API endpoint URL.
    fn endpoint(config: &ModelConfig) -> String {
        let base = config.endpoint.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    /// Send a chat completion request.
    pub async fn chat(&self, messages: Vec<Message>, config: &ModelConfig) -> Result<String> {
        let api_key = config.resolve_api_key()?;
        let is_clod = config.provider == Provider::Clod;

        let request = ChatCompletionRequest {
            model: &config.provider_model,
            messages,
            max_tokens: Some(config.max_tokens),
            temperature: config.temperature,
            vendor: config.vendor.as_deref(),
            ensure_success: is_clod.then_some(true),
            stream: is_clod.then_some(false),
        };

        let response = self
            .client
            .post(Self::endpoint(config))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| BenchError::from_request(e, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BenchError::from_request(e, self.timeout))?;

        if !status.is_success() {
            // Try to parse as API error
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|api_error| api_error.error.message)
                .unwrap_or(body);
            return Err(status_error(status, message));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| BenchError::Provider(format!("Malformed completion payload: {}", e)))?;

        if let Some(usage) = &completion.usage {
            debug!(
                model_id = %config.model_id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion usage"
            );
        }

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BenchError::Provider("No choices in response".to_string()))?;

        if let Some(reason) = &choice.finish_reason {
            if reason == "length" {
                debug!(model_id = %config.model_id, "completion hit the token limit");
            }
        }

        choice
            .message
            .content
            .ok_or_else(|| BenchError::Provider("Choice has no message content".to_string()))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String> {
        self.chat(vec![Message::user(prompt)], config).await
    }
}

/// Test connectivity to a model.
pub async fn ping(client: &dyn LlmClient, config: &ModelConfig) -> Result<()> {
    let response = client
        .generate("Say 'hello' and nothing else.", config)
        .await?;

    if response.to_lowercase().contains("hello") {
        Ok(())
    } else {
        Err(BenchError::Provider(format!(
            "Unexpected response: {}",
            response
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let user = Message::user("Hello!");
        assert!(matches!(user.role, Role::User));

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json, serde_json::json!({ "role": "user", "content": "Hello!" }));
    }

    #[test]
    fn test_endpoint_construction() {
        let config = ModelConfig::new("gpt-4", Provider::OpenAi)
            .with_endpoint("https://api.example.com/v1/");
        assert_eq!(
            OpenAiCompatibleClient::endpoint(&config),
            "https://api.example.com/v1/chat/completions"
        );

        // Without trailing slash
        let config = ModelConfig::new("gpt-4", Provider::Clod);
        assert_eq!(
            OpenAiCompatibleClient::endpoint(&config),
            "https://api.clod.io/v1/chat/completions"
        );
    }

    #[test]
    fn test_clod_request_carries_routing_fields() {
        let request = ChatCompletionRequest {
            model: "mistral-large-latest",
            messages: vec![Message::user("hi")],
            max_tokens: Some(10),
            temperature: None,
            vendor: Some("mistral"),
            ensure_success: Some(true),
            stream: Some(false),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["vendor"], "mistral");
        assert_eq!(json["ensure_success"], true);
        assert!(json.get("temperature").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_status_error_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "bad key".into()),
            BenchError::Auth(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "oops".into()),
            BenchError::Provider(_)
        ));
    }
}

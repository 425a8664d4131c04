//! Anthropic messages API client.

use super::client::{LlmClient, status_error};
use crate::error::{BenchError, Result};
use crate::registry::ModelConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<RequestMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Client for the Anthropic messages endpoint.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BenchError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    fn endpoint(config: &ModelConfig) -> String {
        format!("{}/messages", config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String> {
        let api_key = config.resolve_api_key()?;

        let request = MessagesRequest {
            model: &config.provider_model,
            max_tokens: config.max_tokens,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
            temperature: config.temperature,
        };

        let response = self
            .client
            .post(Self::endpoint(config))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
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
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(status_error(status, message));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| BenchError::Provider(format!("Malformed messages payload: {}", e)))?;

        let text: Vec<String> = parsed
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect();

        if text.is_empty() {
            return Err(BenchError::Provider(
                "Response has no text content".to_string(),
            ));
        }

        Ok(text.join(""))
    }
}

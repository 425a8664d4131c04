//! Dispatch to the provider variant named by a model's config.

use super::anthropic::AnthropicClient;
use super::client::{LlmClient, OpenAiCompatibleClient};
use crate::error::Result;
use crate::registry::{ModelConfig, Provider};
use async_trait::async_trait;
use std::time::Duration;

/// Routes each call to the client for `config.provider`.
#[derive(Clone)]
pub struct ProviderRouter {
    openai: OpenAiCompatibleClient,
    anthropic: AnthropicClient,
}

impl ProviderRouter {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            openai: OpenAiCompatibleClient::new(timeout)?,
            anthropic: AnthropicClient::new(timeout)?,
        })
    }
}

#[async_trait]
impl LlmClient for ProviderRouter {
    async fn generate(&self, prompt: &str, config: &ModelConfig) -> Result<String> {
        match config.provider {
            Provider::OpenAi | Provider::Clod => self.openai.generate(prompt, config).await,
            Provider::Anthropic => self.anthropic.generate(prompt, config).await,
        }
    }
}

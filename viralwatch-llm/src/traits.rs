use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use viralwatch_common::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

/// Per-client fallbacks applied when a call leaves a knob unset.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationDefaults {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerationDefaults {
    pub fn resolve(&self, max_tokens: Option<u32>, temperature: Option<f32>) -> Self {
        Self {
            max_tokens: max_tokens.or(self.max_tokens),
            temperature: temperature.or(self.temperature),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for `prompt` with an optional system prompt.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse>;

    /// Check if the provider is reachable with the configured credentials.
    async fn health_check(&self) -> Result<bool>;

    fn model_name(&self) -> &str;
}

//! OpenAI Responses API client.

use crate::http_to_llm;
use crate::traits::{GenerationDefaults, LlmClient, LlmResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use viralwatch_common::{Result, ViralwatchError};
use viralwatch_http::{Auth, HttpClient, RequestOpts};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    client: HttpClient,
    api_key: String,
    model: String,
    defaults: GenerationDefaults,
}

#[derive(Serialize)]
struct CreateResponse<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    model: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputPart>,
}

#[derive(Debug, Deserialize)]
struct OutputPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u32>,
}

impl CreatedResponse {
    /// Every `output_text` part, in order.
    fn text(&self) -> String {
        self.output
            .iter()
            .flat_map(|item| &item.content)
            .filter(|part| part.kind == "output_text")
            .map(|part| part.text.as_str())
            .collect()
    }
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(OPENAI_API_BASE, api_key, model)
    }

    /// Any Responses-compatible endpoint (gateway, proxy, Azure).
    pub fn with_base_url(base_url: &str, api_key: String, model: String) -> Result<Self> {
        let client = HttpClient::new(base_url)
            .map_err(|e| ViralwatchError::Llm(format!("openai client: {e}")))?
            .with_timeout(Duration::from_secs(120));
        Ok(Self {
            client,
            api_key,
            model,
            defaults: GenerationDefaults::default(),
        })
    }

    pub fn with_defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let knobs = self.defaults.resolve(max_tokens, temperature);
        let body = CreateResponse {
            model: &self.model,
            input: prompt,
            instructions: system_prompt,
            max_output_tokens: knobs.max_tokens,
            temperature: knobs.temperature,
        };
        let opts = RequestOpts {
            auth: Some(Auth::Bearer(&self.api_key)),
            ..Default::default()
        };

        let resp: CreatedResponse = self
            .client
            .post_json("responses", &body, opts)
            .await
            .map_err(http_to_llm)?;

        let text = resp.text();
        if text.trim().is_empty() {
            return Err(ViralwatchError::Llm("openai returned no output text".into()));
        }
        Ok(LlmResponse {
            text,
            model: resp.model.or_else(|| Some(self.model.clone())),
            tokens_used: resp.usage.and_then(|u| u.total_tokens),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.generate("Reply with OK.", None, Some(16), Some(0.0)).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(model = %self.model, error = %e, "llm.openai.health_check_failed");
                Ok(false)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

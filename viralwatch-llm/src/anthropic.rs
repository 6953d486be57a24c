use crate::traits::{GenerationDefaults, LlmClient, LlmResponse};
use crate::http_to_llm;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use viralwatch_common::{Result, ViralwatchError};
use viralwatch_http::{Auth, HttpClient, RequestOpts};

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const FALLBACK_MAX_TOKENS: u32 = 1024;

/// Anthropic Messages API client.
pub struct AnthropicClient {
    client: HttpClient,
    api_key: String,
    model: String,
    defaults: GenerationDefaults,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(ANTHROPIC_API_BASE, api_key, model)
    }

    /// Point the client at a proxy or a mock server.
    pub fn with_base_url(base_url: &str, api_key: String, model: String) -> Result<Self> {
        let client = HttpClient::new(base_url)
            .map_err(|e| ViralwatchError::Llm(format!("HttpClient init failed: {e}")))?
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

    fn auth(&self) -> Result<Auth<'static>> {
        let value = HeaderValue::from_str(self.api_key.trim())
            .map_err(|e| ViralwatchError::Config(format!("invalid Anthropic API key: {e}")))?;
        Ok(Auth::Header {
            name: HeaderName::from_static("x-api-key"),
            value,
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let knobs = self.defaults.resolve(max_tokens, temperature);
        let req = MessagesRequest {
            model: &self.model,
            max_tokens: knobs.max_tokens.unwrap_or(FALLBACK_MAX_TOKENS),
            system: system_prompt,
            temperature: knobs.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));

        let resp: MessagesResponse = self
            .client
            .post_json(
                "messages",
                &req,
                RequestOpts {
                    auth: Some(self.auth()?),
                    headers: Some(headers),
                    ..Default::default()
                },
            )
            .await
            .map_err(http_to_llm)?;

        let text = resp
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(ViralwatchError::Llm(format!(
                "Anthropic returned no text content (stop_reason={:?})",
                resp.stop_reason
            )));
        }

        let tokens_used = resp.usage.map(|u| u.input_tokens + u.output_tokens);
        tracing::debug!(model = %resp.model, ?tokens_used, stop_reason = ?resp.stop_reason, "llm.anthropic.generate");

        Ok(LlmResponse {
            text,
            model: Some(resp.model),
            tokens_used,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self
            .generate("Respond with just 'OK'", None, Some(5), Some(0.0))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(error = %e, "llm.anthropic.health_check_failed");
                Ok(false)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

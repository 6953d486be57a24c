//! Google Gemini `generateContent` client. The key travels as the `key`
//! query parameter, which the HTTP layer redacts from logs.

use crate::http_to_llm;
use crate::traits::{GenerationDefaults, LlmClient, LlmResponse};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use viralwatch_common::{Result, ViralwatchError};
use viralwatch_http::{Auth, HttpClient, RequestOpts};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the candidate was withheld.
const BLOCKED: &[&str] = &["SAFETY", "RECITATION", "BLOCKLIST", "PROHIBITED_CONTENT"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Usage {
    total_token_count: Option<u32>,
}

pub struct GeminiClient {
    client: HttpClient,
    api_key: String,
    model: String,
    defaults: GenerationDefaults,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_base_url(GEMINI_BASE_URL, api_key, model)
    }

    pub fn with_base_url(base_url: &str, api_key: String, model: String) -> Result<Self> {
        let client = HttpClient::new(base_url)
            .map_err(|e| ViralwatchError::Llm(format!("gemini client: {e}")))?
            .with_timeout(Duration::from_secs(90));
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

    fn request_body(&self, prompt: &str, system_prompt: Option<&str>, knobs: GenerationDefaults) -> Value {
        let mut body = Map::new();
        body.insert(
            "contents".into(),
            json!([{ "role": "user", "parts": [{ "text": prompt }] }]),
        );
        if let Some(sys) = system_prompt {
            body.insert("systemInstruction".into(), json!({ "parts": [{ "text": sys }] }));
        }
        let mut generation = Map::new();
        if let Some(t) = knobs.temperature {
            generation.insert("temperature".into(), json!(t));
        }
        if let Some(n) = knobs.max_tokens {
            generation.insert("maxOutputTokens".into(), json!(n));
        }
        if !generation.is_empty() {
            body.insert("generationConfig".into(), Value::Object(generation));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let body = self.request_body(
            prompt,
            system_prompt,
            self.defaults.resolve(max_tokens, temperature),
        );
        let opts = RequestOpts {
            auth: Some(Auth::Query {
                name: "key",
                value: self.api_key.as_str().into(),
            }),
            ..Default::default()
        };
        let resp: GenerateResponse = self
            .client
            .post_json(&format!("models/{}:generateContent", self.model), &body, opts)
            .await
            .map_err(http_to_llm)?;

        if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ViralwatchError::Llm(format!("gemini blocked the prompt: {reason}")));
        }
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ViralwatchError::Llm("gemini returned no candidates".into()))?;
        if let Some(reason) = candidate.finish_reason.as_deref().filter(|r| BLOCKED.contains(r)) {
            return Err(ViralwatchError::Llm(format!("gemini withheld the answer: {reason}")));
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ViralwatchError::Llm("gemini returned no text".into()));
        }

        Ok(LlmResponse {
            text,
            model: Some(self.model.clone()),
            tokens_used: resp.usage_metadata.and_then(|u| u.total_token_count),
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.generate("Reply with OK.", None, Some(5), Some(0.0)).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(model = %self.model, error = %e, "llm.gemini.health_check_failed");
                Ok(false)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

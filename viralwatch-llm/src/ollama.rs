//! Local inference through an Ollama server.

use crate::http_to_llm;
use crate::traits::{GenerationDefaults, LlmClient, LlmResponse};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use viralwatch_common::{Result, ViralwatchError};
use viralwatch_http::{HttpClient, RequestOpts};

const UNREACHABLE: &str = "ollama server unreachable; start it with `ollama serve`";

pub struct OllamaClient {
    client: HttpClient,
    model: String,
    defaults: GenerationDefaults,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    eval_count: Option<u32>,
}

impl OllamaClient {
    /// Create a client and verify server and model availability, pulling the
    /// model when it is not present locally.
    pub async fn connect(base_url: &str, model: String) -> Result<Self> {
        let client = Self::unchecked(base_url, model)?;
        client.ping_server().await?;
        client.ensure_model_available().await?;
        Ok(client)
    }

    /// Create a client without touching the server.
    pub fn unchecked(base_url: &str, model: String) -> Result<Self> {
        let client = HttpClient::new(base_url)
            .map_err(|e| ViralwatchError::Llm(format!("ollama client: {e}")))?
            .with_timeout(Duration::from_secs(300));
        Ok(Self {
            client,
            model,
            defaults: GenerationDefaults::default(),
        })
    }

    pub fn with_defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    async fn ping_server(&self) -> Result<()> {
        self.local_models()
            .await
            .map(|_| ())
            .map_err(|_| ViralwatchError::Llm(UNREACHABLE.to_string()))
    }

    async fn local_models(&self) -> Result<Vec<String>> {
        let tags: TagsResponse = self
            .client
            .get_json(
                "api/tags",
                RequestOpts {
                    timeout: Some(Duration::from_secs(10)),
                    retries: Some(0),
                    ..Default::default()
                },
            )
            .await
            .map_err(http_to_llm)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn ensure_model_available(&self) -> Result<()> {
        // `llama3` and `llama3:latest` name the same local model.
        let wanted = self.model.trim_end_matches(":latest");
        let models = self.local_models().await?;
        if models.iter().any(|m| m.trim_end_matches(":latest") == wanted) {
            return Ok(());
        }

        tracing::info!(model = %self.model, "llm.ollama.pulling_model");
        let _: JsonValue = self
            .client
            .post_json(
                "api/pull",
                &json!({ "model": self.model, "stream": false }),
                RequestOpts {
                    timeout: Some(Duration::from_secs(1800)),
                    retries: Some(0),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ViralwatchError::Llm(format!("ollama pull {}: {e}", self.model)))?;
        tracing::info!(model = %self.model, "llm.ollama.model_pulled");
        Ok(())
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let knobs = self.defaults.resolve(max_tokens, temperature);
        let mut options = serde_json::Map::new();
        if let Some(temp) = knobs.temperature {
            options.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tok) = knobs.max_tokens {
            options.insert("num_predict".to_string(), json!(max_tok));
        }

        let mut payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": options,
        });
        if let Some(system) = system_prompt {
            payload["system"] = json!(system);
        }

        let resp: GenerateResponse = self
            .client
            .post_json("api/generate", &payload, RequestOpts::default())
            .await
            .map_err(http_to_llm)?;

        if resp.response.trim().is_empty() {
            return Err(ViralwatchError::Llm("ollama returned an empty response".into()));
        }
        Ok(LlmResponse {
            text: resp.response,
            model: Some(self.model.clone()),
            tokens_used: resp.eval_count,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.local_models().await {
            Ok(models) => Ok(models.iter().any(|m| m.starts_with(self.model.as_str()))),
            Err(e) => {
                tracing::warn!(model = %self.model, error = %e, "llm.ollama.health_check_failed");
                Ok(false)
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

//! Provider-agnostic generative-text integration.
//!
//! This crate exposes a common [`traits::LlmClient`] interface and concrete
//! clients for Anthropic, OpenAI, Ollama and Gemini, plus
//! [`build_llm_client`] to build one from the configured provider.
//!
//! # Examples
//! ```no_run
//! use viralwatch_common::Result;
//! use viralwatch_config::LlmConfig;
//! use viralwatch_llm::build_llm_client;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let cfg = LlmConfig::Anthropic {
//!     model: "claude-sonnet-4-20250514".into(),
//!     auth_token: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
//!     endpoint: viralwatch_llm::anthropic::ANTHROPIC_API_BASE.into(),
//!     temperature: None,
//!     max_tokens: None,
//! };
//! let client = build_llm_client(&cfg).await?;
//! assert!(!client.model_name().is_empty());
//! # Ok(())
//! # }
//! ```
pub mod anthropic;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod traits;

use anthropic::AnthropicClient;
use gemini::GeminiClient;
use ollama::OllamaClient;
use openai::OpenAiClient;
use std::sync::Arc;
use traits::{GenerationDefaults, LlmClient};
use viralwatch_common::ViralwatchError;
use viralwatch_config::LlmConfig;
use viralwatch_http::HttpError;

/// Build the configured client; Ollama additionally pings the server and
/// pulls the model when missing.
pub async fn build_llm_client(
    config: &LlmConfig,
) -> viralwatch_common::Result<Arc<dyn LlmClient + Send + Sync + 'static>> {
    match config {
        LlmConfig::Anthropic {
            model,
            auth_token,
            endpoint,
            temperature,
            max_tokens,
        } => {
            require_token("anthropic", auth_token)?;
            let client = AnthropicClient::with_base_url(endpoint, auth_token.clone(), model.clone())?
                .with_defaults(GenerationDefaults {
                    max_tokens: *max_tokens,
                    temperature: *temperature,
                });
            Ok(Arc::new(client))
        }
        LlmConfig::Openai {
            model,
            auth_token,
            endpoint,
            temperature,
            max_tokens,
        } => {
            require_token("openai", auth_token)?;
            let client = OpenAiClient::with_base_url(endpoint, auth_token.clone(), model.clone())?
                .with_defaults(GenerationDefaults {
                    max_tokens: *max_tokens,
                    temperature: *temperature,
                });
            Ok(Arc::new(client))
        }
        LlmConfig::Ollama {
            model,
            endpoint,
            temperature,
            max_tokens,
        } => {
            let client = OllamaClient::connect(endpoint, model.clone())
                .await?
                .with_defaults(GenerationDefaults {
                    max_tokens: *max_tokens,
                    temperature: *temperature,
                });
            Ok(Arc::new(client))
        }
        LlmConfig::Gemini {
            model,
            auth_token,
            endpoint,
            temperature,
            max_tokens,
        } => {
            require_token("gemini", auth_token)?;
            let client = GeminiClient::with_base_url(endpoint, auth_token.clone(), model.clone())?
                .with_defaults(GenerationDefaults {
                    max_tokens: *max_tokens,
                    temperature: *temperature,
                });
            Ok(Arc::new(client))
        }
    }
}

fn require_token(provider: &str, token: &str) -> viralwatch_common::Result<()> {
    // Unexpanded `${VAR}` means the variable was not set.
    if token.trim().is_empty() || token.contains("${") {
        return Err(ViralwatchError::Config(format!(
            "llm.auth_token is required for provider {provider}"
        )));
    }
    Ok(())
}

pub(crate) fn http_to_llm(e: HttpError) -> ViralwatchError {
    ViralwatchError::Llm(e.to_string())
}

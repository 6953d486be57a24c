//! Typed application configuration: YAML file, `VIRALWATCH__*` environment
//! overrides, then `${VAR}` expansion.
//!
//! The loaded [`AppConfig`] is built once at startup and handed by reference
//! to each component constructor. Every section has defaults, so an empty
//! document is a valid (if LLM-less) configuration.
//!
//! ```
//! use viralwatch_config::ViralwatchConfigLoader;
//!
//! let cfg = ViralwatchConfigLoader::new()
//!     .with_yaml_str("monitoring:\n  max_video_age_days: 3\n")
//!     .load()
//!     .expect("valid config");
//!
//! assert_eq!(cfg.monitoring.max_video_age_days, 3);
//! assert_eq!(cfg.monitoring.virality_thresholds.small.max_subs, Some(5_000));
//! ```
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub channels: Vec<ChannelConfig>,
    pub monitoring: MonitoringConfig,
    pub llm: Option<LlmConfig>,
    pub factcheck: FactcheckConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub virality_thresholds: ViralityThresholds,
    pub max_video_age_days: u32,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            virality_thresholds: ViralityThresholds::default(),
            max_video_age_days: 7,
        }
    }
}

/// Views-per-subscriber ratio needed for one channel size bucket.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ViralityThreshold {
    /// Inclusive upper subscriber bound; `None` for the open-ended top bucket.
    #[serde(default)]
    pub max_subs: Option<u64>,
    pub ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViralityThresholds {
    pub small: ViralityThreshold,
    pub medium: ViralityThreshold,
    pub large: ViralityThreshold,
}

impl Default for ViralityThresholds {
    fn default() -> Self {
        Self {
            small: ViralityThreshold {
                max_subs: Some(5_000),
                ratio: 1.5,
            },
            medium: ViralityThreshold {
                max_subs: Some(50_000),
                ratio: 1.0,
            },
            large: ViralityThreshold {
                max_subs: None,
                ratio: 0.3,
            },
        }
    }
}

/// Generative-text provider, tagged by `provider`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum LlmConfig {
    Anthropic {
        model: String,
        auth_token: String,
        #[serde(default = "default_anthropic_endpoint")]
        endpoint: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Openai {
        model: String,
        auth_token: String,
        #[serde(default = "default_openai_endpoint")]
        endpoint: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Ollama {
        model: String,
        #[serde(default = "default_ollama_endpoint")]
        endpoint: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Gemini {
        model: String,
        auth_token: String,
        #[serde(default = "default_gemini_endpoint")]
        endpoint: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        match self {
            LlmConfig::Anthropic { model, .. }
            | LlmConfig::Openai { model, .. }
            | LlmConfig::Ollama { model, .. }
            | LlmConfig::Gemini { model, .. } => model,
        }
    }

    pub fn temperature(&self) -> Option<f32> {
        match self {
            LlmConfig::Anthropic { temperature, .. }
            | LlmConfig::Openai { temperature, .. }
            | LlmConfig::Ollama { temperature, .. }
            | LlmConfig::Gemini { temperature, .. } => *temperature,
        }
    }
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com/v1".into()
}
fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_ollama_endpoint() -> String {
    "http://localhost:11434".into()
}
fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FactcheckConfig {
    pub sources: SourcesConfig,
    pub tolerances: Tolerances,
    /// Comparable claims off by more than this factor are classified false.
    pub contradiction_factor: f64,
    pub extraction: ExtractionConfig,
}

impl Default for FactcheckConfig {
    fn default() -> Self {
        Self {
            sources: SourcesConfig::default(),
            tolerances: Tolerances::default(),
            contradiction_factor: 10.0,
            extraction: ExtractionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub defillama: DefiLlamaConfig,
    pub coingecko: CoinGeckoConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefiLlamaConfig {
    pub enabled: bool,
    pub base_url: String,
    pub yields_base_url: String,
    pub timeout_secs: u64,
    pub yields_timeout_secs: u64,
}

impl Default for DefiLlamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.llama.fi".into(),
            yields_base_url: "https://yields.llama.fi".into(),
            timeout_secs: 10,
            yields_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoinGeckoConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Optional demo/pro key, sent as the `x-cg-demo-api-key` header.
    pub api_key: Option<String>,
}

impl Default for CoinGeckoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.coingecko.com/api/v3".into(),
            timeout_secs: 10,
            api_key: None,
        }
    }
}

/// Accepted `observed / claimed` ratio range.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ToleranceBand {
    pub min: f64,
    pub max: f64,
}

impl ToleranceBand {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, ratio: f64) -> bool {
        self.min <= ratio && ratio <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    pub tvl: ToleranceBand,
    pub price: ToleranceBand,
    #[serde(rename = "yield")]
    pub yields: ToleranceBand,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            tvl: ToleranceBand::new(0.8, 1.2),
            price: ToleranceBand::new(0.9, 1.1),
            yields: ToleranceBand::new(0.7, 1.3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub min_chars: usize,
    pub max_chars: usize,
    pub max_claims: usize,
    pub min_confidence: f64,
    pub max_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_chars: 50,
            max_chars: 15_000,
            max_claims: 20,
            min_confidence: 0.5,
            max_tokens: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/viralwatch.db".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<PathBuf>,
    pub format: String,
    pub emit_stderr: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            format: "text".into(),
            emit_stderr: true,
            filter: "info".into(),
        }
    }
}

impl AppConfig {
    /// Reject configurations the classifier and verifier cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.monitoring.virality_thresholds;
        let (Some(small_max), Some(medium_max)) = (t.small.max_subs, t.medium.max_subs) else {
            return Err(invalid(
                "virality_thresholds: small and medium need max_subs",
            ));
        };
        if small_max >= medium_max {
            return Err(invalid(format!(
                "virality_thresholds: small.max_subs ({small_max}) must be below medium.max_subs ({medium_max})"
            )));
        }
        for (name, th) in [("small", t.small), ("medium", t.medium), ("large", t.large)] {
            if !(th.ratio.is_finite() && th.ratio > 0.0) {
                return Err(invalid(format!(
                    "virality_thresholds.{name}.ratio must be positive"
                )));
            }
        }

        let tol = &self.factcheck.tolerances;
        for (name, band) in [("tvl", tol.tvl), ("price", tol.price), ("yield", tol.yields)] {
            if !(band.min < band.max && band.min <= 1.0 && band.max >= 1.0) {
                return Err(invalid(format!(
                    "tolerances.{name}: band {}..{} must straddle 1.0",
                    band.min, band.max
                )));
            }
        }
        if self.factcheck.contradiction_factor <= 1.0 {
            return Err(invalid("contradiction_factor must be greater than 1"));
        }

        let ex = &self.factcheck.extraction;
        if ex.min_chars >= ex.max_chars {
            return Err(invalid("extraction.min_chars must be below max_chars"));
        }
        if ex.max_claims == 0 {
            return Err(invalid("extraction.max_claims must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Message(msg.into())
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder over the `config` crate: YAML sources plus `VIRALWATCH__` env overrides.
pub struct ViralwatchConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env_prefix: &'static str,
}

impl Default for ViralwatchConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ViralwatchConfigLoader {
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: "VIRALWATCH",
        }
    }

    /// Attach a required file; the format is inferred from the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that may be absent, for environment-only deployments.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet (tests, CLI overrides).
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge the sources, apply env overrides, expand `${VAR}` and validate.
    ///
    /// ```
    /// use viralwatch_config::{LlmConfig, ViralwatchConfigLoader};
    ///
    /// temp_env::with_var("ANTHROPIC_API_KEY", Some("injected"), || {
    ///     let cfg = ViralwatchConfigLoader::new()
    ///         .with_yaml_str(
    ///             r#"
    /// llm:
    ///   provider: anthropic
    ///   model: claude-sonnet-4-20250514
    ///   auth_token: "${ANTHROPIC_API_KEY}"
    /// "#,
    ///         )
    ///         .load()
    ///         .expect("valid configuration");
    ///
    ///     match cfg.llm {
    ///         Some(LlmConfig::Anthropic { auth_token, endpoint, .. }) => {
    ///             assert_eq!(auth_token, "injected");
    ///             assert_eq!(endpoint, "https://api.anthropic.com/v1");
    ///         }
    ///         other => panic!("expected anthropic config, got {other:?}"),
    ///     }
    /// });
    /// ```
    pub fn load(self) -> Result<AppConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: AppConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        typed.validate()?;
        Ok(typed)
    }
}

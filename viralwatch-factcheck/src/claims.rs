//! Claim extraction: one generative-text call, then tolerant parsing and
//! deterministic filtering of whatever comes back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use viralwatch_config::ExtractionConfig;
use viralwatch_llm::traits::LlmClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimCategory {
    Price,
    Tvl,
    Percentage,
    Date,
    ProtocolInfo,
    Other,
}

impl ClaimCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimCategory::Price => "price",
            ClaimCategory::Tvl => "tvl",
            ClaimCategory::Percentage => "percentage",
            ClaimCategory::Date => "date",
            ClaimCategory::ProtocolInfo => "protocol_info",
            ClaimCategory::Other => "other",
        }
    }
}

impl fmt::Display for ClaimCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price" => Ok(Self::Price),
            "tvl" => Ok(Self::Tvl),
            "percentage" => Ok(Self::Percentage),
            "date" => Ok(Self::Date),
            "protocol_info" => Ok(Self::ProtocolInfo),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown claim category: {other}")),
        }
    }
}

/// Keyword sets checked in priority order; the first hit decides.
const CATEGORY_KEYWORDS: &[(ClaimCategory, &[&str])] = &[
    (ClaimCategory::Price, &["цена", "price", "$", "usd", "стоит"]),
    (ClaimCategory::Tvl, &["tvl", "ликвидност", "liquidity", "locked"]),
    (
        ClaimCategory::Percentage,
        &["%", "процент", "apy", "apr", "доходност"],
    ),
    (ClaimCategory::Date, &["запуск", "launch", "дата", "год", "месяц"]),
    (
        ClaimCategory::ProtocolInfo,
        &["протокол", "protocol", "сеть", "chain"],
    ),
];

/// Keyword-based category, independent of the generative step.
///
/// ```
/// use viralwatch_factcheck::claims::{categorize, ClaimCategory};
///
/// assert_eq!(categorize("Aave TVL is 10 billion"), ClaimCategory::Tvl);
/// assert_eq!(categorize("ETH costs $3000 and TVL grew"), ClaimCategory::Price);
/// assert_eq!(categorize("The team is based in Lisbon"), ClaimCategory::Other);
/// ```
pub fn categorize(text: &str) -> ClaimCategory {
    let lowered = text.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lowered.contains(w)))
        .map(|(category, _)| *category)
        .unwrap_or(ClaimCategory::Other)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedClaim {
    pub claim: String,
    pub category: ClaimCategory,
    /// Protocols, tokens and chains in the order the model listed them.
    pub entities: Vec<String>,
    pub original_text: String,
    pub confidence: f64,
}

const SYSTEM_PROMPT: &str = "You are a DeFi and cryptocurrency fact-checking analyst. \
You extract verifiable factual statements from video transcripts and answer with JSON only.";

fn build_prompt(text: &str) -> String {
    format!(
        r#"Analyse the following video transcript and extract every factual statement that can be checked against public data.

For each statement return an object with exactly these fields:
1. "claim": the statement itself, in the language of the transcript
2. "category": one of "price", "tvl", "percentage", "date", "protocol_info", "other"
3. "entities": list of protocols, tokens and blockchains mentioned, most specific first
4. "original_text": the transcript fragment the statement comes from
5. "confidence": number from 0 to 1, how sure you are that the statement is verifiable

Focus on:
- numbers (TVL, prices, APY/APR and other percentages)
- protocol names and their characteristics
- launch and upgrade dates
- statistics (user counts, volumes)

Ignore:
- subjective opinions
- forecasts and speculation
- promotional phrases without concrete facts

Return a JSON array of objects. If there are no verifiable statements, return [].

Transcript:
---
{text}
---

JSON answer:"#
    )
}

/// Cut `text` to at most `max_bytes` bytes on a char boundary and mark the
/// cut with `...`.
fn truncate_for_prompt(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}

/// Isolate the JSON array in a free-form reply: prefer a ```json fence, then
/// any fence, then the span from the first `[` to the last `]`.
fn isolate_json_array(reply: &str) -> &str {
    let mut text = reply.trim();
    let fenced = text
        .find("```json")
        .map(|i| i + "```json".len())
        .or_else(|| text.find("```").map(|i| i + 3));
    if let Some(start) = fenced {
        let rest = &text[start..];
        let end = rest.find("```").unwrap_or(rest.len());
        text = rest[..end].trim();
    }
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if start < end {
            text = &text[start..=end];
        }
    }
    text
}

/// Confidence as a number, a numeric string, or absent (0.5).
fn coerce_confidence(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => Some(0.5),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}

fn coerce_entities(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn claim_from_item(item: &Value, min_confidence: f64) -> Option<ExtractedClaim> {
    let Some(obj) = item.as_object() else {
        tracing::warn!(item = %item, "factcheck.claim_parse_error.not_an_object");
        return None;
    };

    let claim = obj
        .get("claim")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if claim.is_empty() {
        return None;
    }

    let Some(confidence) = coerce_confidence(obj.get("confidence")) else {
        tracing::warn!(claim, confidence = ?obj.get("confidence"), "factcheck.claim_parse_error.confidence");
        return None;
    };
    if !(confidence >= min_confidence) {
        return None;
    }

    let category = obj
        .get("category")
        .and_then(Value::as_str)
        .and_then(|c| c.parse().ok())
        .unwrap_or_else(|| categorize(claim));

    Some(ExtractedClaim {
        claim: claim.to_string(),
        category,
        entities: coerce_entities(obj.get("entities")),
        original_text: obj
            .get("original_text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        confidence,
    })
}

/// Turn a model reply into claims, keeping the model's order. Never fails:
/// unparseable replies yield an empty list.
pub fn parse_claims(reply: &str, min_confidence: f64, max_claims: usize) -> Vec<ExtractedClaim> {
    let json = isolate_json_array(reply);
    let items = match serde_json::from_str::<Value>(json) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            tracing::warn!(kind = json_kind(&other), "factcheck.json_parse_error.not_an_array");
            return Vec::new();
        }
        Err(e) => {
            let snippet: String = json.chars().take(200).collect();
            tracing::warn!(error = %e, text = %snippet, "factcheck.json_parse_error");
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| claim_from_item(item, min_confidence))
        .take(max_claims)
        .collect()
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extracts verifiable claims from transcript text via the generative-text
/// collaborator.
#[derive(Clone)]
pub struct ClaimExtractor {
    llm: Arc<dyn LlmClient + Send + Sync>,
    config: ExtractionConfig,
}

impl ClaimExtractor {
    pub fn new(llm: Arc<dyn LlmClient + Send + Sync>, config: ExtractionConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract at most `max_claims` claims. Short input returns an empty list
    /// without calling the model; collaborator failures are logged and also
    /// yield an empty list.
    pub async fn extract(&self, text: &str, max_claims: usize) -> Vec<ExtractedClaim> {
        let chars = text.chars().count();
        if chars < self.config.min_chars {
            tracing::debug!(chars, min_chars = self.config.min_chars, "factcheck.text_too_short");
            return Vec::new();
        }

        let text = truncate_for_prompt(text, self.config.max_chars);
        let prompt = build_prompt(&text);

        let reply = match self
            .llm
            .generate(&prompt, Some(SYSTEM_PROMPT), Some(self.config.max_tokens), None)
            .await
        {
            Ok(resp) => resp.text,
            Err(e) => {
                tracing::error!(model = self.llm.model_name(), error = %e, "factcheck.claim_extraction_error");
                return Vec::new();
            }
        };

        let claims = parse_claims(&reply, self.config.min_confidence, max_claims);
        let categories: Vec<&str> = claims.iter().map(|c| c.category.as_str()).collect();
        tracing::info!(total = claims.len(), ?categories, "factcheck.claims_extracted");
        claims
    }
}

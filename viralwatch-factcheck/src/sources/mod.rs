//! Read-only lookups against external DeFi data providers.
//!
//! Every lookup is soft-fail: transport errors, non-success statuses and
//! missing fields are logged and come back as `None` (or an empty list).
//! Calls are made with a zero retry budget; a later monitoring cycle is the
//! only retry.

mod coingecko;
mod defillama;

pub use coingecko::CoinGeckoSource;
pub use defillama::DefiLlamaSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use viralwatch_http::HttpError;

/// One normalized lookup result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactData {
    pub source: String,
    pub query: String,
    pub value: f64,
    pub unit: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub raw: Value,
}

impl FactData {
    pub fn usd(source: &str, query: &str, value: f64, raw: Value) -> Self {
        Self {
            source: source.to_string(),
            query: query.to_string(),
            value,
            unit: Some("USD".to_string()),
            timestamp: Utc::now(),
            raw,
        }
    }
}

/// A yield pool as listed by the yields endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldPool {
    #[serde(default)]
    pub pool: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub apy: Option<f64>,
    #[serde(default, rename = "tvlUsd")]
    pub tvl_usd: Option<f64>,
}

/// Uniform lookup capability shared by all providers.
#[async_trait]
pub trait FactSource: Send + Sync {
    fn name(&self) -> &str;

    async fn query(&self, query: &str) -> Option<FactData>;
}

/// Providers that can also list yield pools.
#[async_trait]
pub trait YieldSource: FactSource {
    /// Pools, optionally filtered by project, capped at [`MAX_POOLS`].
    async fn yields(&self, protocol: Option<&str>) -> Vec<YieldPool>;
}

pub const MAX_POOLS: usize = 100;

/// Lowercased identifier safe to splice into a URL path.
pub(crate) fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_'))
        .collect()
}

/// Client-side misses (unknown id, bad slug) are routine; everything else is
/// worth a warning.
pub(crate) fn log_miss(source: &str, op: &str, query: &str, err: &HttpError) {
    if err.status().is_some_and(|s| s.is_client_error()) {
        tracing::debug!(source, op, query, error = %err, "source.miss");
    } else {
        tracing::warn!(source, op, query, error = %err, "source.error");
    }
}

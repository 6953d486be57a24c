use super::{log_miss, slugify, FactData, FactSource, YieldPool, YieldSource, MAX_POOLS};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use viralwatch_common::{Result, ViralwatchError};
use viralwatch_config::DefiLlamaConfig;
use viralwatch_http::{HttpClient, RequestOpts};

const NAME: &str = "defillama";

/// DefiLlama: protocol and chain TVL, plus the yields listing.
pub struct DefiLlamaSource {
    api: HttpClient,
    yields_api: HttpClient,
    enabled: bool,
    timeout: Duration,
    yields_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct PoolsResponse {
    #[serde(default)]
    data: Vec<YieldPool>,
}

impl DefiLlamaSource {
    pub fn new(config: &DefiLlamaConfig) -> Result<Self> {
        let api = HttpClient::new(&config.base_url)
            .map_err(|e| ViralwatchError::Source(format!("defillama base_url: {e}")))?;
        let yields_api = HttpClient::new(&config.yields_base_url)
            .map_err(|e| ViralwatchError::Source(format!("defillama yields_base_url: {e}")))?;
        Ok(Self {
            api,
            yields_api,
            enabled: config.enabled,
            timeout: Duration::from_secs(config.timeout_secs),
            yields_timeout: Duration::from_secs(config.yields_timeout_secs),
        })
    }

    fn opts(&self, timeout: Duration) -> RequestOpts<'static> {
        RequestOpts {
            timeout: Some(timeout),
            retries: Some(0),
            ..Default::default()
        }
    }

    /// Current TVL of one protocol, looked up by slug.
    pub async fn protocol_tvl(&self, protocol: &str) -> Option<FactData> {
        let slug = slugify(protocol);
        if !self.enabled || slug.is_empty() {
            return None;
        }

        let data: Value = match self
            .api
            .get_json(&format!("protocol/{slug}"), self.opts(self.timeout))
            .await
        {
            Ok(data) => data,
            Err(e) => {
                log_miss(NAME, "protocol_tvl", protocol, &e);
                return None;
            }
        };

        // Either a time series (latest point last) or a plain number.
        let tvl = match data.get("tvl") {
            Some(Value::Array(series)) => series
                .last()
                .and_then(|p| p.get("totalLiquidityUSD"))
                .and_then(Value::as_f64),
            Some(v) => v.as_f64(),
            None => None,
        };
        let Some(tvl) = tvl else {
            tracing::warn!(protocol, "source.defillama.missing_tvl");
            return None;
        };

        tracing::info!(protocol, tvl, "source.defillama.tvl_fetched");
        Some(FactData::usd(
            NAME,
            protocol,
            tvl,
            json!({
                "name": data.get("name"),
                "symbol": data.get("symbol"),
                "chain": data.get("chain"),
                "tvl": tvl,
            }),
        ))
    }

    /// Chain-wide TVL, matching the chain name case-insensitively.
    pub async fn chain_tvl(&self, chain: &str) -> Option<FactData> {
        if !self.enabled || chain.trim().is_empty() {
            return None;
        }

        let chains: Vec<Value> = match self.api.get_json("v2/chains", self.opts(self.timeout)).await {
            Ok(chains) => chains,
            Err(e) => {
                log_miss(NAME, "chain_tvl", chain, &e);
                return None;
            }
        };

        let wanted = chain.trim().to_lowercase();
        let entry = chains.into_iter().find(|c| {
            c.get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.to_lowercase() == wanted)
        });
        let Some(entry) = entry else {
            tracing::debug!(chain, "source.defillama.unknown_chain");
            return None;
        };
        let Some(tvl) = entry.get("tvl").and_then(Value::as_f64) else {
            tracing::warn!(chain, "source.defillama.missing_chain_tvl");
            return None;
        };

        tracing::info!(chain, tvl, "source.defillama.chain_tvl_fetched");
        Some(FactData::usd(NAME, chain, tvl, entry))
    }
}

#[async_trait]
impl FactSource for DefiLlamaSource {
    fn name(&self) -> &str {
        NAME
    }

    /// Protocol first, then the same name as a chain.
    async fn query(&self, query: &str) -> Option<FactData> {
        match self.protocol_tvl(query).await {
            Some(data) => Some(data),
            None => self.chain_tvl(query).await,
        }
    }
}

#[async_trait]
impl YieldSource for DefiLlamaSource {
    async fn yields(&self, protocol: Option<&str>) -> Vec<YieldPool> {
        if !self.enabled {
            return Vec::new();
        }

        let resp: PoolsResponse = match self
            .yields_api
            .get_json("pools", self.opts(self.yields_timeout))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                log_miss(NAME, "yields", protocol.unwrap_or("*"), &e);
                return Vec::new();
            }
        };

        let pools: Vec<YieldPool> = match protocol {
            Some(p) => {
                let lowered = p.trim().to_lowercase();
                let slug = slugify(p);
                resp.data
                    .into_iter()
                    .filter(|pool| {
                        let project = pool.project.to_lowercase();
                        project == lowered || project == slug
                    })
                    .take(MAX_POOLS)
                    .collect()
            }
            None => resp.data.into_iter().take(MAX_POOLS).collect(),
        };

        tracing::debug!(protocol, pools = pools.len(), "source.defillama.yields_fetched");
        pools
    }
}

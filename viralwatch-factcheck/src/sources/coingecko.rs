use super::{log_miss, slugify, FactData, FactSource};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use viralwatch_common::{Result, ViralwatchError};
use viralwatch_config::CoinGeckoConfig;
use viralwatch_http::{Auth, HttpClient, RequestOpts};

const NAME: &str = "coingecko";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// CoinGecko: spot prices, name/symbol search and token metadata.
pub struct CoinGeckoSource {
    api: HttpClient,
    enabled: bool,
    timeout: Duration,
    api_key: Option<HeaderValue>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<SearchCoin>,
}

#[derive(Debug, Deserialize)]
struct SearchCoin {
    id: String,
}

enum PriceLookup {
    Found(FactData),
    /// The request worked but the id is unknown.
    Missing,
    Failed,
}

impl CoinGeckoSource {
    pub fn new(config: &CoinGeckoConfig) -> Result<Self> {
        let api = HttpClient::new(&config.base_url)
            .map_err(|e| ViralwatchError::Source(format!("coingecko base_url: {e}")))?;
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|e| ViralwatchError::Config(format!("coingecko api_key: {e}")))?;
        Ok(Self {
            api,
            enabled: config.enabled,
            timeout: Duration::from_secs(config.timeout_secs),
            api_key,
        })
    }

    fn opts<'a>(&self, query: Vec<(&'a str, std::borrow::Cow<'a, str>)>) -> RequestOpts<'a> {
        RequestOpts {
            timeout: Some(self.timeout),
            retries: Some(0),
            auth: self.api_key.clone().map(|value| Auth::Header {
                name: HeaderName::from_static(API_KEY_HEADER),
                value,
            }),
            query: (!query.is_empty()).then_some(query),
            ..Default::default()
        }
    }

    /// Spot USD price for a token id. On an unknown id, one name/symbol
    /// search is made and the top hit's id is tried once.
    pub async fn token_price(&self, token: &str) -> Option<FactData> {
        let id = token.trim().to_lowercase();
        if !self.enabled || id.is_empty() {
            return None;
        }

        match self.price_by_id(&id, token).await {
            PriceLookup::Found(data) => return Some(data),
            PriceLookup::Failed => return None,
            PriceLookup::Missing => {}
        }

        let top = self.search_top_id(token).await?;
        if top == id {
            return None;
        }
        tracing::debug!(token, resolved = %top, "source.coingecko.search_resolved");
        match self.price_by_id(&top, token).await {
            PriceLookup::Found(data) => Some(data),
            PriceLookup::Missing | PriceLookup::Failed => None,
        }
    }

    async fn price_by_id(&self, id: &str, original: &str) -> PriceLookup {
        let query = vec![
            ("ids", id.into()),
            ("vs_currencies", "usd".into()),
            ("include_market_cap", "true".into()),
            ("include_24hr_change", "true".into()),
        ];
        let prices: HashMap<String, Value> =
            match self.api.get_json("simple/price", self.opts(query)).await {
                Ok(prices) => prices,
                Err(e) => {
                    log_miss(NAME, "token_price", original, &e);
                    return PriceLookup::Failed;
                }
            };

        let Some(entry) = prices.get(id) else {
            return PriceLookup::Missing;
        };
        let Some(price) = entry.get("usd").and_then(Value::as_f64) else {
            tracing::warn!(token = original, id, "source.coingecko.missing_price");
            return PriceLookup::Failed;
        };

        tracing::info!(token = original, id, price, "source.coingecko.price_fetched");
        PriceLookup::Found(FactData::usd(
            NAME,
            original,
            price,
            json!({
                "id": id,
                "price_usd": price,
                "market_cap": entry.get("usd_market_cap"),
                "change_24h": entry.get("usd_24h_change"),
            }),
        ))
    }

    async fn search_top_id(&self, query: &str) -> Option<String> {
        let resp: SearchResponse = match self
            .api
            .get_json("search", self.opts(vec![("query", query.trim().into())]))
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                log_miss(NAME, "search", query, &e);
                return None;
            }
        };
        resp.coins.into_iter().next().map(|c| c.id)
    }

    /// Full token metadata (market data included, tickers and social data
    /// excluded).
    pub async fn token_info(&self, token: &str) -> Option<Value> {
        let id = slugify(token);
        if !self.enabled || id.is_empty() {
            return None;
        }
        let query = vec![
            ("localization", "false".into()),
            ("tickers", "false".into()),
            ("community_data", "false".into()),
            ("developer_data", "false".into()),
        ];
        match self.api.get_json(&format!("coins/{id}"), self.opts(query)).await {
            Ok(info) => Some(info),
            Err(e) => {
                log_miss(NAME, "token_info", token, &e);
                None
            }
        }
    }
}

#[async_trait]
impl FactSource for CoinGeckoSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn query(&self, query: &str) -> Option<FactData> {
        self.token_price(query).await
    }
}

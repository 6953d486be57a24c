mod common;

use serde_json::{json, Value};
use std::time::Duration;
use viralwatch_config::{CoinGeckoConfig, DefiLlamaConfig};
use viralwatch_factcheck::{CoinGeckoSource, DefiLlamaSource, FactSource, YieldSource};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn llama(server: &MockServer) -> DefiLlamaSource {
    DefiLlamaSource::new(&DefiLlamaConfig {
        base_url: server.uri(),
        yields_base_url: format!("{}/yields", server.uri()),
        timeout_secs: 1,
        yields_timeout_secs: 1,
        ..Default::default()
    })
    .unwrap()
}

fn gecko(server: &MockServer, api_key: Option<&str>) -> CoinGeckoSource {
    CoinGeckoSource::new(&CoinGeckoConfig {
        base_url: server.uri(),
        timeout_secs: 1,
        api_key: api_key.map(str::to_string),
        ..Default::default()
    })
    .unwrap()
}

fn pool(id: &str, project: &str, apy: f64) -> Value {
    json!({ "pool": id, "project": project, "chain": "Ethereum", "symbol": "USDC", "apy": apy, "tvlUsd": 1.0e6 })
}

#[tokio::test]
async fn protocol_tvl_takes_the_latest_series_point() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protocol/aave-v3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Aave V3",
            "symbol": "AAVE",
            "tvl": [
                { "date": 1700000000, "totalLiquidityUSD": 9.0e9 },
                { "date": 1700086400, "totalLiquidityUSD": 1.1e10 }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let data = llama(&server).protocol_tvl("Aave V3").await.unwrap();

    assert_eq!(data.source, "defillama");
    assert_eq!(data.query, "Aave V3");
    assert_eq!(data.value, 1.1e10);
    assert_eq!(data.unit.as_deref(), Some("USD"));
    assert_eq!(data.raw["symbol"], "AAVE");
}

#[tokio::test]
async fn protocol_tvl_accepts_a_plain_number() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protocol/lido"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Lido", "tvl": 3.5e10 })))
        .mount(&server)
        .await;

    assert_eq!(llama(&server).protocol_tvl("Lido").await.unwrap().value, 3.5e10);
}

#[tokio::test]
async fn protocol_without_tvl_is_a_miss() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protocol/lido"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "Lido" })))
        .mount(&server)
        .await;

    assert!(llama(&server).protocol_tvl("Lido").await.is_none());
}

#[tokio::test]
async fn query_falls_back_to_chain_tvl() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protocol/ethereum"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Protocol not found"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/chains"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "Arbitrum", "tvl": 2.5e9 },
            { "name": "Ethereum", "tvl": 5.0e10, "tokenSymbol": "ETH" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let data = llama(&server).query("Ethereum").await.unwrap();

    assert_eq!(data.value, 5.0e10);
    assert_eq!(data.raw["tokenSymbol"], "ETH");
}

#[tokio::test]
async fn unknown_protocol_and_chain_is_none() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protocol/nonexistent"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/chains"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "Ethereum", "tvl": 5.0e10 }])))
        .mount(&server)
        .await;

    assert!(llama(&server).query("Nonexistent").await.is_none());
}

#[tokio::test]
async fn chain_without_tvl_field_is_none() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/chains"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "Ethereum", "tokenSymbol": "ETH" },
            { "name": "Arbitrum", "tvl": 2.5e9 }
        ])))
        .expect(2)
        .mount(&server)
        .await;

    let source = llama(&server);
    assert!(source.chain_tvl("ethereum").await.is_none());
    assert!(source.chain_tvl("Solana").await.is_none());
}

#[tokio::test]
async fn yields_filter_by_project_name_or_slug() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/yields/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": [
                pool("p1", "aave-v3", 4.2),
                pool("p2", "lido", 3.1),
                pool("p3", "AAVE-V3", 5.0),
                { "pool": "p4", "project": "aave-v3", "apy": null }
            ]
        })))
        .mount(&server)
        .await;

    let source = llama(&server);
    let pools = source.yields(Some("Aave V3")).await;
    let ids: Vec<_> = pools.iter().map(|p| p.pool.as_str()).collect();
    assert_eq!(ids, ["p1", "p3", "p4"]);
    assert_eq!(pools[0].tvl_usd, Some(1.0e6));
    assert_eq!(pools[2].apy, None);

    assert_eq!(source.yields(None).await.len(), 4);
}

#[tokio::test]
async fn yields_are_capped() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    let data: Vec<Value> = (0..150).map(|i| pool(&format!("p{i}"), "curve", 1.0)).collect();
    Mock::given(method("GET"))
        .and(path("/yields/pools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
        .mount(&server)
        .await;

    let pools = llama(&server).yields(Some("curve")).await;
    assert_eq!(pools.len(), viralwatch_factcheck::sources::MAX_POOLS);
    assert_eq!(pools[0].pool, "p0");
}

#[tokio::test]
async fn yields_server_error_is_empty() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/yields/pools"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    assert!(llama(&server).yields(Some("aave")).await.is_empty());
}

#[tokio::test]
async fn disabled_sources_make_no_requests() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let llama = DefiLlamaSource::new(&DefiLlamaConfig {
        enabled: false,
        base_url: server.uri(),
        yields_base_url: server.uri(),
        ..Default::default()
    })
    .unwrap();
    let gecko = CoinGeckoSource::new(&CoinGeckoConfig {
        enabled: false,
        base_url: server.uri(),
        ..Default::default()
    })
    .unwrap();

    assert!(llama.query("aave").await.is_none());
    assert!(llama.yields(Some("aave")).await.is_empty());
    assert!(gecko.query("ethereum").await.is_none());
    assert!(gecko.token_info("ethereum").await.is_none());
}

#[tokio::test]
async fn slow_source_times_out_to_none() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/protocol/aave"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "tvl": 1.0e10 }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    assert!(llama(&server).protocol_tvl("aave").await.is_none());
}

#[tokio::test]
async fn coingecko_price_by_id() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("ids", "ethereum"))
        .and(query_param("vs_currencies", "usd"))
        .and(header("x-cg-demo-api-key", "demo-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ethereum": { "usd": 3100.5, "usd_market_cap": 3.7e11, "usd_24h_change": -1.2 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let data = gecko(&server, Some("demo-key")).query("Ethereum").await.unwrap();

    assert_eq!(data.source, "coingecko");
    assert_eq!(data.query, "Ethereum");
    assert_eq!(data.value, 3100.5);
    assert_eq!(data.raw["id"], "ethereum");
    assert_eq!(data.raw["market_cap"], 3.7e11);
}

#[tokio::test]
async fn coingecko_unknown_id_retries_once_via_search() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("ids", "eth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("query", "ETH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "coins": [{ "id": "ethereum", "symbol": "ETH" }, { "id": "ethereum-wormhole" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .and(query_param("ids", "ethereum"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ethereum": { "usd": 3000.0 } })))
        .expect(1)
        .mount(&server)
        .await;

    let data = gecko(&server, None).token_price("ETH").await.unwrap();
    assert_eq!(data.value, 3000.0);
    assert_eq!(data.query, "ETH");
}

#[tokio::test]
async fn coingecko_search_without_hits_is_none() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "coins": [] })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(gecko(&server, None).token_price("notatoken").await.is_none());
}

#[tokio::test]
async fn coingecko_rate_limit_is_none_without_search() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/simple/price"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    assert!(gecko(&server, None).token_price("bitcoin").await.is_none());
}

#[tokio::test]
async fn coingecko_token_info_skips_heavy_sections() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/uniswap"))
        .and(query_param("tickers", "false"))
        .and(query_param("community_data", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "uniswap",
            "symbol": "uni",
            "market_data": { "current_price": { "usd": 7.5 } }
        })))
        .mount(&server)
        .await;

    let info = gecko(&server, None).token_info("Uniswap").await.unwrap();
    assert_eq!(info["symbol"], "uni");
    assert_eq!(info["market_data"]["current_price"]["usd"], 7.5);
}

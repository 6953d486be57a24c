//! Per-claim verification against the source adapters.
//!
//! Each claim is routed by category, entities are tried in order, and the
//! first entity that yields data decides the verdict. Calls run sequentially;
//! the verifier keeps no state between passes.

use crate::claims::{ClaimCategory, ClaimExtractor, ExtractedClaim};
use crate::facts::{status_counts, FactStatus, VerificationResult, VerifiedFact};
use crate::numeric::{extract_magnitude, extract_percentage};
use crate::sources::{CoinGeckoSource, DefiLlamaSource, FactSource, YieldPool, YieldSource};
use std::sync::Arc;
use viralwatch_common::display::format_usd;
use viralwatch_common::Result;
use viralwatch_config::{FactcheckConfig, ToleranceBand, Tolerances};
use viralwatch_llm::traits::LlmClient;

/// Pools considered when matching a claimed APY.
const MATCH_POOLS: usize = 10;
/// Pools averaged when reporting a stale APY.
const AVERAGE_POOLS: usize = 5;

pub struct FactVerifier {
    extractor: ClaimExtractor,
    tvl: Arc<dyn FactSource>,
    price: Arc<dyn FactSource>,
    yields: Arc<dyn YieldSource>,
    tolerances: Tolerances,
    contradiction_factor: f64,
}

impl FactVerifier {
    pub fn new(
        extractor: ClaimExtractor,
        tvl: Arc<dyn FactSource>,
        price: Arc<dyn FactSource>,
        yields: Arc<dyn YieldSource>,
        config: &FactcheckConfig,
    ) -> Self {
        Self {
            extractor,
            tvl,
            price,
            yields,
            tolerances: config.tolerances,
            contradiction_factor: config.contradiction_factor,
        }
    }

    /// Wire DefiLlama (TVL and yields) and CoinGecko (prices) from config.
    pub fn from_config(
        llm: Arc<dyn LlmClient + Send + Sync>,
        config: &FactcheckConfig,
    ) -> Result<Self> {
        let defillama = Arc::new(DefiLlamaSource::new(&config.sources.defillama)?);
        let coingecko = Arc::new(CoinGeckoSource::new(&config.sources.coingecko)?);
        Ok(Self::new(
            ClaimExtractor::new(llm, config.extraction),
            defillama.clone(),
            coingecko,
            defillama,
            config,
        ))
    }

    /// Extract claims from a transcript and verify each of them. Always
    /// returns one fact per extracted claim.
    pub async fn verify(&self, transcript: &str, video_id: &str) -> Vec<VerifiedFact> {
        let claims = self
            .extractor
            .extract(transcript, self.extractor.config().max_claims)
            .await;
        if claims.is_empty() {
            tracing::info!(video_id, "factcheck.no_claims_to_verify");
            return Vec::new();
        }

        let mut facts = Vec::with_capacity(claims.len());
        for claim in &claims {
            let result = self.verify_claim(claim).await;
            tracing::info!(
                video_id,
                claim = %claim.claim.chars().take(50).collect::<String>(),
                category = %claim.category,
                status = %result.status,
                source = ?result.source,
                notes = ?result.notes,
                "factcheck.claim_verified"
            );
            facts.push(VerifiedFact::from_result(video_id, &result));
        }

        let counts = status_counts(&facts);
        tracing::info!(video_id, total_claims = facts.len(), ?counts, "factcheck.verification_complete");
        facts
    }

    pub async fn verify_claim(&self, claim: &ExtractedClaim) -> VerificationResult {
        match claim.category {
            ClaimCategory::Tvl => self.verify_tvl(claim).await,
            ClaimCategory::Price => self.verify_price(claim).await,
            ClaimCategory::Percentage => self.verify_yield(claim).await,
            _ => self.verify_general(claim).await,
        }
    }

    fn judge(&self, ratio: f64, band: ToleranceBand) -> FactStatus {
        if band.contains(ratio) {
            FactStatus::Verified
        } else if ratio < 1.0 / self.contradiction_factor || ratio > self.contradiction_factor {
            FactStatus::False
        } else {
            FactStatus::Outdated
        }
    }

    fn contradiction_note(&self) -> String {
        format!("Contradicts source by more than {}x", self.contradiction_factor)
    }

    async fn verify_tvl(&self, claim: &ExtractedClaim) -> VerificationResult {
        for entity in &claim.entities {
            let Some(data) = self.tvl.query(entity).await else {
                continue;
            };
            let observed = data.value;
            let source = Some(self.tvl.name().to_string());

            let Some(claimed) = extract_magnitude(&claim.claim).filter(|c| *c > 0.0) else {
                return VerificationResult {
                    claim: claim.clone(),
                    status: FactStatus::Verified,
                    source,
                    verified_value: Some(format_usd(observed, 0)),
                    original_value: None,
                    notes: Some("Protocol exists, TVL confirmed".into()),
                };
            };

            let ratio = observed / claimed;
            let status = self.judge(ratio, self.tolerances.tvl);
            let notes = match status {
                FactStatus::Verified => None,
                FactStatus::False => Some(self.contradiction_note()),
                _ => Some(format!("Actual TVL differs: {:.1}%", ratio * 100.0)),
            };
            return VerificationResult {
                claim: claim.clone(),
                status,
                source,
                verified_value: Some(format_usd(observed, 0)),
                original_value: Some(format_usd(claimed, 0)),
                notes,
            };
        }
        VerificationResult::unverified(claim, "Could not find protocol data")
    }

    async fn verify_price(&self, claim: &ExtractedClaim) -> VerificationResult {
        for entity in &claim.entities {
            let Some(data) = self.price.query(entity).await else {
                continue;
            };
            let observed = data.value;
            let source = Some(self.price.name().to_string());

            let Some(claimed) = extract_magnitude(&claim.claim).filter(|c| *c > 0.0) else {
                return VerificationResult {
                    claim: claim.clone(),
                    status: FactStatus::Verified,
                    source,
                    verified_value: Some(format_usd(observed, 2)),
                    original_value: None,
                    notes: Some("Token exists, price confirmed".into()),
                };
            };

            let ratio = observed / claimed;
            let status = self.judge(ratio, self.tolerances.price);
            let notes = match status {
                FactStatus::Verified => None,
                FactStatus::False => Some(self.contradiction_note()),
                _ => Some(format!("Price changed: {:.1}%", ratio * 100.0)),
            };
            return VerificationResult {
                claim: claim.clone(),
                status,
                source,
                verified_value: Some(format_usd(observed, 2)),
                original_value: Some(format_usd(claimed, 2)),
                notes,
            };
        }
        VerificationResult::unverified(claim, "Could not find token price")
    }

    async fn verify_yield(&self, claim: &ExtractedClaim) -> VerificationResult {
        for entity in &claim.entities {
            let pools = self.yields.yields(Some(entity)).await;
            if pools.is_empty() {
                continue;
            }
            let source = Some(self.yields.name().to_string());

            let Some(claimed) = extract_percentage(&claim.claim).filter(|c| *c > 0.0) else {
                return VerificationResult {
                    claim: claim.clone(),
                    status: FactStatus::Verified,
                    source,
                    verified_value: pools
                        .iter()
                        .find_map(|p| p.apy.filter(|a| *a > 0.0))
                        .map(|apy| format!("{apy:.1}%")),
                    original_value: None,
                    notes: Some(format!("Pools found for '{entity}'")),
                };
            };

            let best = closest_pool(&pools, claimed);
            if let Some((pool, apy, ratio)) = best {
                if self.tolerances.yields.contains(ratio) {
                    let id = if pool.pool.is_empty() { "unknown" } else { pool.pool.as_str() };
                    return VerificationResult {
                        claim: claim.clone(),
                        status: FactStatus::Verified,
                        source,
                        verified_value: Some(format!("{apy:.1}%")),
                        original_value: Some(format!("{claimed:.1}%")),
                        notes: Some(format!("Pool: {id}")),
                    };
                }
            }

            let status = best
                .map(|(_, _, ratio)| self.judge(ratio, self.tolerances.yields))
                .unwrap_or(FactStatus::Outdated);
            let notes = if status == FactStatus::False {
                self.contradiction_note()
            } else {
                "APY may have changed".to_string()
            };
            return VerificationResult {
                claim: claim.clone(),
                status,
                source,
                verified_value: Some(format!("~{:.1}%", average_apy(&pools))),
                original_value: Some(format!("{claimed:.1}%")),
                notes: Some(notes),
            };
        }
        VerificationResult::unverified(claim, "Could not verify yield data")
    }

    /// TVL source first, then the price source, per entity.
    async fn verify_general(&self, claim: &ExtractedClaim) -> VerificationResult {
        for entity in &claim.entities {
            if let Some(data) = self.tvl.query(entity).await {
                return VerificationResult {
                    claim: claim.clone(),
                    status: FactStatus::Verified,
                    source: Some(self.tvl.name().to_string()),
                    verified_value: Some(format_usd(data.value, 0)),
                    original_value: None,
                    notes: Some(format!("Entity '{entity}' found")),
                };
            }
            if let Some(data) = self.price.query(entity).await {
                return VerificationResult {
                    claim: claim.clone(),
                    status: FactStatus::Verified,
                    source: Some(self.price.name().to_string()),
                    verified_value: Some(format_usd(data.value, 2)),
                    original_value: None,
                    notes: Some(format!("Token '{entity}' found")),
                };
            }
        }
        VerificationResult::unverified(claim, "No matching data found")
    }
}

/// Among the first pools with a positive APY, the one whose ratio to the
/// claim is closest to 1.
fn closest_pool(pools: &[YieldPool], claimed: f64) -> Option<(&YieldPool, f64, f64)> {
    pools
        .iter()
        .take(MATCH_POOLS)
        .filter_map(|p| p.apy.filter(|a| *a > 0.0).map(|apy| (p, apy, apy / claimed)))
        .min_by(|a, b| (a.2 - 1.0).abs().total_cmp(&(b.2 - 1.0).abs()))
}

fn average_apy(pools: &[YieldPool]) -> f64 {
    let head = &pools[..pools.len().min(AVERAGE_POOLS)];
    if head.is_empty() {
        return 0.0;
    }
    head.iter().map(|p| p.apy.unwrap_or(0.0)).sum::<f64>() / head.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(id: &str, apy: Option<f64>) -> YieldPool {
        YieldPool {
            pool: id.into(),
            project: "aave-v3".into(),
            chain: "Ethereum".into(),
            symbol: "USDC".into(),
            apy,
            tvl_usd: None,
        }
    }

    #[test]
    fn closest_pool_prefers_ratio_nearest_one() {
        let pools = vec![pool("a", Some(3.0)), pool("b", None), pool("c", Some(9.0)), pool("d", Some(11.0))];
        let (best, apy, _) = closest_pool(&pools, 10.0).unwrap();
        assert_eq!(best.pool, "c");
        assert_eq!(apy, 9.0);
    }

    #[test]
    fn closest_pool_only_looks_at_the_first_ten() {
        let mut pools: Vec<_> = (0..10).map(|i| pool(&i.to_string(), Some(1.0))).collect();
        pools.push(pool("exact", Some(10.0)));
        let (best, _, _) = closest_pool(&pools, 10.0).unwrap();
        assert_ne!(best.pool, "exact");
    }

    #[test]
    fn average_uses_first_five() {
        let pools: Vec<_> = [2.0, 4.0, 6.0, 8.0, 10.0, 100.0]
            .iter()
            .map(|a| pool("p", Some(*a)))
            .collect();
        assert_eq!(average_apy(&pools), 6.0);
        assert_eq!(average_apy(&[pool("x", Some(5.0)), pool("y", None)]), 2.5);
    }
}

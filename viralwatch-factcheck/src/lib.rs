//! Claim extraction and cross-source fact verification.
//!
//! - [`numeric`]: magnitude and percentage extraction from free text
//! - [`claims`]: the generative-text claim extractor and keyword categorizer
//! - [`sources`]: DefiLlama and CoinGecko lookups behind [`sources::FactSource`]
//! - [`verifier`]: routes each claim to a source and assigns a [`facts::FactStatus`]
//! - [`facts`]: the persisted record plus filtering and formatting helpers
//!
//! Nothing here returns an error for an expected miss. Unusable model
//! output, unreachable sources and unknown entities all end up as an empty
//! list or an `unverified` fact, with a log line explaining why.

pub mod claims;
pub mod facts;
pub mod numeric;
pub mod sources;
pub mod verifier;

pub use claims::{categorize, ClaimCategory, ClaimExtractor, ExtractedClaim};
pub use facts::{
    format_fact_report, only_verified, status_counts, FactStatus, VerificationResult, VerifiedFact,
};
pub use sources::{CoinGeckoSource, DefiLlamaSource, FactData, FactSource, YieldPool, YieldSource};
pub use verifier::FactVerifier;

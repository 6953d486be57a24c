use crate::claims::ExtractedClaim;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Terminal verdict for one claim. A re-run produces a new record rather
/// than changing an old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactStatus {
    Verified,
    Outdated,
    False,
    Unverified,
}

impl FactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactStatus::Verified => "verified",
            FactStatus::Outdated => "outdated",
            FactStatus::False => "false",
            FactStatus::Unverified => "unverified",
        }
    }

    fn marker(&self) -> &'static str {
        match self {
            FactStatus::Verified => "✅",
            FactStatus::Outdated => "⚠️",
            FactStatus::False => "❌",
            FactStatus::Unverified => "❓",
        }
    }
}

impl fmt::Display for FactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verified" => Ok(Self::Verified),
            "outdated" => Ok(Self::Outdated),
            "false" => Ok(Self::False),
            "unverified" => Ok(Self::Unverified),
            other => Err(format!("unknown fact status: {other}")),
        }
    }
}

/// Outcome of checking one claim, before it is attached to a video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub claim: ExtractedClaim,
    pub status: FactStatus,
    pub source: Option<String>,
    pub verified_value: Option<String>,
    pub original_value: Option<String>,
    pub notes: Option<String>,
}

impl VerificationResult {
    pub(crate) fn unverified(claim: &ExtractedClaim, notes: &str) -> Self {
        Self {
            claim: claim.clone(),
            status: FactStatus::Unverified,
            source: None,
            verified_value: None,
            original_value: None,
            notes: Some(notes.to_string()),
        }
    }
}

/// The persisted form of a verification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedFact {
    pub video_id: String,
    pub claim: String,
    pub status: FactStatus,
    pub source: Option<String>,
    pub verified_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VerifiedFact {
    pub fn from_result(video_id: &str, result: &VerificationResult) -> Self {
        Self {
            video_id: video_id.to_string(),
            claim: result.claim.claim.clone(),
            status: result.status,
            source: result.source.clone(),
            verified_value: result.verified_value.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Facts safe to reuse when drafting new content.
pub fn only_verified(facts: &[VerifiedFact]) -> Vec<VerifiedFact> {
    facts
        .iter()
        .filter(|f| f.status == FactStatus::Verified)
        .cloned()
        .collect()
}

pub fn status_counts(facts: &[VerifiedFact]) -> BTreeMap<FactStatus, usize> {
    let mut counts = BTreeMap::new();
    for fact in facts {
        *counts.entry(fact.status).or_insert(0) += 1;
    }
    counts
}

/// One-line rendering: marker, claim, `→ value`, `[source]`.
///
/// ```
/// use chrono::Utc;
/// use viralwatch_factcheck::facts::{format_fact_report, FactStatus, VerifiedFact};
///
/// let fact = VerifiedFact {
///     video_id: "vid".into(),
///     claim: "Aave TVL is $10 billion".into(),
///     status: FactStatus::Verified,
///     source: Some("defillama".into()),
///     verified_value: Some("$11,000,000,000".into()),
///     created_at: Utc::now(),
/// };
/// assert_eq!(
///     format_fact_report(&fact),
///     "✅ Aave TVL is $10 billion → $11,000,000,000 [defillama]"
/// );
/// ```
pub fn format_fact_report(fact: &VerifiedFact) -> String {
    let value = fact
        .verified_value
        .as_deref()
        .map(|v| format!(" → {v}"))
        .unwrap_or_default();
    let source = fact
        .source
        .as_deref()
        .map(|s| format!(" [{s}]"))
        .unwrap_or_default();
    format!("{} {}{value}{source}", fact.status.marker(), fact.claim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(claim: &str, status: FactStatus) -> VerifiedFact {
        VerifiedFact {
            video_id: "v1".into(),
            claim: claim.into(),
            status,
            source: None,
            verified_value: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            FactStatus::Verified,
            FactStatus::Outdated,
            FactStatus::False,
            FactStatus::Unverified,
        ] {
            assert_eq!(status.as_str().parse::<FactStatus>(), Ok(status));
        }
        assert!("maybe".parse::<FactStatus>().is_err());
    }

    #[test]
    fn filters_and_counts() {
        let facts = vec![
            fact("a", FactStatus::Verified),
            fact("b", FactStatus::Unverified),
            fact("c", FactStatus::Verified),
            fact("d", FactStatus::Outdated),
        ];
        let verified = only_verified(&facts);
        assert_eq!(verified.len(), 2);
        assert!(verified.iter().all(|f| f.status == FactStatus::Verified));

        let counts = status_counts(&facts);
        assert_eq!(counts[&FactStatus::Verified], 2);
        assert_eq!(counts[&FactStatus::Outdated], 1);
        assert_eq!(counts.get(&FactStatus::False), None);
    }

    #[test]
    fn report_omits_missing_parts() {
        assert_eq!(format_fact_report(&fact("Nothing found", FactStatus::Unverified)), "❓ Nothing found");
    }
}

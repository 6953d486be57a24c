//! Adaptive virality scoring.
//!
//! A video is viral when `views / subscribers` reaches the ratio configured
//! for its channel's size bucket. Small channels need a bigger relative spike
//! than large ones.
//!
//! ```
//! use viralwatch_config::ViralityThresholds;
//! use viralwatch_virality::{ChannelCategory, ViralityClassifier};
//!
//! let classifier = ViralityClassifier::new(ViralityThresholds::default());
//! let result = classifier.classify(20_000, 60_000);
//!
//! assert_eq!(result.category, ChannelCategory::Large);
//! assert!(result.is_viral);
//! assert_eq!(result.score, 0.333);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use viralwatch_common::display::group_thousands;
use viralwatch_config::ViralityThresholds;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelCategory {
    Small,
    Medium,
    Large,
    /// Subscriber count was zero.
    Unknown,
}

impl ChannelCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelCategory::Small => "small",
            ChannelCategory::Medium => "medium",
            ChannelCategory::Large => "large",
            ChannelCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChannelCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViralityResult {
    pub is_viral: bool,
    /// `views / subscribers`, rounded to three decimals.
    pub score: f64,
    pub threshold_used: f64,
    pub category: ChannelCategory,
    pub views: u64,
    pub subscribers: u64,
}

/// Channel metadata as reported by the video platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub subscribers: u64,
}

/// One recent upload as reported by the video platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub id: String,
    pub title: String,
    pub views: u64,
    pub published_at: DateTime<Utc>,
}

/// A candidate that passed the threshold, tagged with its channel and score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViralVideo {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub views: u64,
    pub published_at: DateTime<Utc>,
    pub virality_score: f64,
}

#[derive(Debug, Clone)]
pub struct ViralityClassifier {
    thresholds: ViralityThresholds,
}

impl ViralityClassifier {
    pub fn new(thresholds: ViralityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ViralityThresholds {
        &self.thresholds
    }

    /// Size bucket for a subscriber count. Bounds are inclusive, so exactly
    /// `small.max_subs` is still small.
    pub fn category(&self, subscribers: u64) -> ChannelCategory {
        let t = &self.thresholds;
        if subscribers == 0 {
            ChannelCategory::Unknown
        } else if t.small.max_subs.is_some_and(|max| subscribers <= max) {
            ChannelCategory::Small
        } else if t.medium.max_subs.is_some_and(|max| subscribers <= max) {
            ChannelCategory::Medium
        } else {
            ChannelCategory::Large
        }
    }

    pub fn threshold_ratio(&self, category: ChannelCategory) -> f64 {
        match category {
            ChannelCategory::Small => self.thresholds.small.ratio,
            ChannelCategory::Medium => self.thresholds.medium.ratio,
            ChannelCategory::Large => self.thresholds.large.ratio,
            ChannelCategory::Unknown => 0.0,
        }
    }

    pub fn classify(&self, views: u64, subscribers: u64) -> ViralityResult {
        if subscribers == 0 {
            return ViralityResult {
                is_viral: false,
                score: 0.0,
                threshold_used: 0.0,
                category: ChannelCategory::Unknown,
                views,
                subscribers,
            };
        }

        let category = self.category(subscribers);
        let threshold = self.threshold_ratio(category);
        let score = views as f64 / subscribers as f64;

        ViralityResult {
            // Decided on the exact ratio; rounding is for display only.
            is_viral: score >= threshold,
            score: round3(score),
            threshold_used: threshold,
            category,
            views,
            subscribers,
        }
    }

    /// Keep the viral candidates for one channel, in input order.
    pub fn filter_viral(
        &self,
        videos: &[VideoCandidate],
        channel: &ChannelSnapshot,
    ) -> Vec<ViralVideo> {
        videos
            .iter()
            .filter_map(|video| {
                let result = self.classify(video.views, channel.subscribers);
                if !result.is_viral {
                    return None;
                }
                tracing::info!(
                    video_id = %video.id,
                    title = %video.title.chars().take(50).collect::<String>(),
                    views = result.views,
                    subscribers = result.subscribers,
                    score = result.score,
                    threshold = result.threshold_used,
                    category = %result.category,
                    "virality.viral_video_found"
                );
                Some(ViralVideo {
                    id: video.id.clone(),
                    channel_id: channel.id.clone(),
                    title: video.title.clone(),
                    views: video.views,
                    published_at: video.published_at,
                    virality_score: result.score,
                })
            })
            .collect()
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Multi-line summary for operator notifications.
pub fn format_virality_report(result: &ViralityResult) -> String {
    let status = if result.is_viral { "VIRAL" } else { "Normal" };
    format!(
        "{status} | Score: {:.2}x (threshold: {}x)\nChannel: {} ({} subs)\nViews: {}",
        result.score,
        result.threshold_used,
        result.category,
        group_thousands(result.subscribers),
        group_thousands(result.views),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use viralwatch_config::ViralityThreshold;

    fn classifier() -> ViralityClassifier {
        ViralityClassifier::new(ViralityThresholds::default())
    }

    fn video(id: &str, views: u64) -> VideoCandidate {
        VideoCandidate {
            id: id.into(),
            title: format!("video {id}"),
            views,
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn zero_subscribers_is_never_viral() {
        for views in [0, 1, 10_000_000] {
            let r = classifier().classify(views, 0);
            assert!(!r.is_viral);
            assert_eq!(r.score, 0.0);
            assert_eq!(r.category, ChannelCategory::Unknown);
        }
    }

    #[test]
    fn category_bounds_are_inclusive() {
        let c = classifier();
        assert_eq!(c.category(1), ChannelCategory::Small);
        assert_eq!(c.category(5_000), ChannelCategory::Small);
        assert_eq!(c.category(5_001), ChannelCategory::Medium);
        assert_eq!(c.category(50_000), ChannelCategory::Medium);
        assert_eq!(c.category(50_001), ChannelCategory::Large);
    }

    #[test]
    fn thresholds_follow_category() {
        let c = classifier();
        // small needs 1.5x
        assert!(!c.classify(7_499, 5_000).is_viral);
        assert!(c.classify(7_500, 5_000).is_viral);
        // medium needs 1.0x
        assert!(c.classify(10_000, 10_000).is_viral);
        assert!(!c.classify(9_999, 10_000).is_viral);
        // large needs 0.3x
        assert!(c.classify(30_000, 100_000).is_viral);
        assert!(!c.classify(29_999, 100_000).is_viral);
    }

    #[test]
    fn score_is_ratio_rounded_to_three_places() {
        let r = classifier().classify(1, 3);
        assert_eq!(r.score, 0.333);
        let r = classifier().classify(12_346, 10_000);
        assert_eq!(r.score, 1.235);
        assert_eq!(r.threshold_used, 1.0);
    }

    #[test]
    fn verdict_uses_unrounded_score() {
        // 0.29996 rounds to 0.3 but is still below the large threshold.
        let r = classifier().classify(29_996, 100_000);
        assert_eq!(r.score, 0.3);
        assert!(!r.is_viral);
    }

    #[test]
    fn custom_thresholds_are_honoured() {
        let c = ViralityClassifier::new(ViralityThresholds {
            small: ViralityThreshold {
                max_subs: Some(100),
                ratio: 3.0,
            },
            medium: ViralityThreshold {
                max_subs: Some(1_000),
                ratio: 2.0,
            },
            large: ViralityThreshold {
                max_subs: None,
                ratio: 1.0,
            },
        });
        assert_eq!(c.category(500), ChannelCategory::Medium);
        assert!(!c.classify(999, 500).is_viral);
        assert!(c.classify(1_000, 500).is_viral);
    }

    #[test]
    fn filter_viral_keeps_order_and_tags_channel() {
        let channel = ChannelSnapshot {
            id: "UC123".into(),
            name: "DeFi Daily".into(),
            subscribers: 10_000,
        };
        let videos = vec![video("a", 15_000), video("b", 500), video("c", 10_000)];

        let viral = classifier().filter_viral(&videos, &channel);

        let ids: Vec<_> = viral.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert!(viral.iter().all(|v| v.channel_id == "UC123"));
        assert_eq!(viral[0].virality_score, 1.5);
    }

    #[test]
    fn filter_viral_does_not_dedupe() {
        let channel = ChannelSnapshot {
            id: "UC1".into(),
            name: String::new(),
            subscribers: 100,
        };
        let videos = vec![video("x", 1_000), video("x", 1_000)];
        assert_eq!(classifier().filter_viral(&videos, &channel).len(), 2);
    }

    #[test]
    fn candidates_deserialize_from_platform_json() {
        let v: VideoCandidate = serde_json::from_str(
            r#"{"id":"vid1","title":"Aave","views":1200,"published_at":"2024-05-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(v.published_at, video("vid1", 0).published_at);
    }

    #[test]
    fn report_mentions_status_and_grouped_counts() {
        let r = classifier().classify(45_000, 30_000);
        let report = format_virality_report(&r);
        assert!(report.starts_with("VIRAL | Score: 1.50x (threshold: 1x)"));
        assert!(report.contains("Channel: medium (30,000 subs)"));
        assert!(report.ends_with("Views: 45,000"));

        let normal = format_virality_report(&classifier().classify(10, 30_000));
        assert!(normal.starts_with("Normal"));
    }
}

//! One monitoring pass over channel feeds produced by the video-platform
//! collaborator: classify, dedupe against the store, then fact-check any new
//! viral video whose transcript is on disk.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use viralwatch_factcheck::{FactStatus, FactVerifier};
use viralwatch_store::Store;
use viralwatch_virality::{ChannelSnapshot, VideoCandidate, ViralVideo, ViralityClassifier};

/// A channel record plus its recent uploads.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelFeed {
    pub channel: ChannelSnapshot,
    #[serde(default)]
    pub videos: Vec<VideoCandidate>,
}

pub async fn load_feeds(path: &Path) -> Result<Vec<ChannelFeed>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading channel feed {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing channel feed {}", path.display()))
}

/// Uploads published within `max_age` of `now`.
pub fn recent(videos: &[VideoCandidate], now: DateTime<Utc>, max_age: Duration) -> Vec<VideoCandidate> {
    let cutoff = now - max_age;
    videos
        .iter()
        .filter(|v| v.published_at >= cutoff)
        .cloned()
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub channels: usize,
    pub new_viral: usize,
    pub already_seen: usize,
    pub checked_videos: usize,
    pub facts: usize,
    pub verified_facts: usize,
}

pub struct Monitor<'a> {
    pub store: &'a Store,
    pub classifier: &'a ViralityClassifier,
    /// `None` when no generative-text provider is configured.
    pub verifier: Option<&'a FactVerifier>,
    pub transcripts_dir: PathBuf,
    pub max_age: Duration,
}

impl Monitor<'_> {
    pub async fn run(&self, feeds: &[ChannelFeed], now: DateTime<Utc>) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let mut fresh_viral: Vec<ViralVideo> = Vec::new();

        for feed in feeds {
            self.store.upsert_channel(&feed.channel).await?;
            report.channels += 1;

            let candidates = recent(&feed.videos, now, self.max_age);
            let viral = self.classifier.filter_viral(&candidates, &feed.channel);
            tracing::info!(
                channel_id = %feed.channel.id,
                uploads = feed.videos.len(),
                recent = candidates.len(),
                viral = viral.len(),
                "cycle.channel_scanned"
            );

            for video in viral {
                if self.store.video_exists(&video.id).await? {
                    tracing::debug!(video_id = %video.id, "cycle.video_already_seen");
                    report.already_seen += 1;
                    continue;
                }
                self.store.insert_video(&video).await?;
                fresh_viral.push(video);
            }
        }
        report.new_viral = fresh_viral.len();

        let Some(verifier) = self.verifier else {
            if !fresh_viral.is_empty() {
                tracing::warn!(videos = fresh_viral.len(), "cycle.factcheck_disabled");
            }
            return Ok(report);
        };

        for video in &fresh_viral {
            let Some(transcript) = self.transcript_for(&video.id).await else {
                continue;
            };
            self.store.update_video_transcript(&video.id, &transcript).await?;

            let facts = verifier.verify(&transcript, &video.id).await;
            for fact in &facts {
                self.store.insert_fact(fact).await?;
            }
            let verified = facts.iter().filter(|f| f.status == FactStatus::Verified).count();
            tracing::info!(video_id = %video.id, verified, total = facts.len(), "cycle.video_checked");

            report.checked_videos += 1;
            report.facts += facts.len();
            report.verified_facts += verified;
        }

        tracing::info!(?report, "cycle.complete");
        Ok(report)
    }

    async fn transcript_for(&self, video_id: &str) -> Option<String> {
        let path = self.transcripts_dir.join(format!("{video_id}.txt"));
        match tokio::fs::read_to_string(&path).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                tracing::info!(video_id, path = %path.display(), "cycle.transcript_empty");
                None
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(video_id, path = %path.display(), "cycle.transcript_missing");
                None
            }
            Err(e) => {
                tracing::warn!(video_id, path = %path.display(), error = %e, "cycle.transcript_unreadable");
                None
            }
        }
    }
}

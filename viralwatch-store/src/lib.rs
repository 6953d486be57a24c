//! SQLite persistence for monitored channels, viral videos and verified facts.
//!
//! The schema is created idempotently on connect. Videos are upserted (views
//! and score refresh, transcript survives); facts are append-only, so a re-run
//! of the verifier adds rows instead of rewriting old ones.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use viralwatch_factcheck::{FactStatus, VerifiedFact};
use viralwatch_virality::{ChannelSnapshot, ViralVideo};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS channels (
         id          TEXT PRIMARY KEY,
         name        TEXT NOT NULL,
         subscribers INTEGER NOT NULL DEFAULT 0,
         updated_at  TEXT NOT NULL
       )"#,
    r#"CREATE TABLE IF NOT EXISTS videos (
         id             TEXT PRIMARY KEY,
         channel_id     TEXT NOT NULL REFERENCES channels(id),
         title          TEXT NOT NULL,
         views          INTEGER NOT NULL DEFAULT 0,
         published_at   TEXT NOT NULL,
         virality_score REAL NOT NULL DEFAULT 0,
         transcript     TEXT,
         created_at     TEXT NOT NULL
       )"#,
    r#"CREATE TABLE IF NOT EXISTS verified_facts (
         id             INTEGER PRIMARY KEY AUTOINCREMENT,
         video_id       TEXT NOT NULL,
         claim          TEXT NOT NULL,
         status         TEXT NOT NULL
                        CHECK (status IN ('verified', 'outdated', 'false', 'unverified')),
         source         TEXT,
         verified_value TEXT,
         created_at     TEXT NOT NULL
       )"#,
    "CREATE INDEX IF NOT EXISTS idx_videos_score ON videos(virality_score DESC)",
    "CREATE INDEX IF NOT EXISTS idx_facts_video ON verified_facts(video_id)",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRecord {
    pub id: String,
    pub name: String,
    pub subscribers: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub views: u64,
    pub published_at: DateTime<Utc>,
    pub virality_score: f64,
    pub transcript: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid database url {url}"))?
            .create_if_missing(true);
        if !in_memory {
            if let Some(dir) = options.get_filename().parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("creating database dir {}", dir.display()))?;
                }
            }
        }

        // One connection keeps an in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to {url}"))?;
        info!(url, "store.connected");
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and ensure the schema.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .context("creating schema")?;
        }
        debug!(statements = SCHEMA.len(), "store.schema_ready");
        Ok(())
    }

    pub async fn upsert_channel(&self, channel: &ChannelSnapshot) -> Result<()> {
        let res = sqlx::query(
            r#"INSERT INTO channels (id, name, subscribers, updated_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(id) DO UPDATE SET
                 name=excluded.name,
                 subscribers=excluded.subscribers,
                 updated_at=excluded.updated_at"#,
        )
        .bind(&channel.id)
        .bind(&channel.name)
        .bind(to_sql_int(channel.subscribers))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        info!(
            channel_id = %channel.id,
            subscribers = channel.subscribers,
            rows = res.rows_affected(),
            "store.upsert_channel"
        );
        Ok(())
    }

    pub async fn get_channel(&self, id: &str) -> Result<Option<ChannelRecord>> {
        let row = sqlx::query("SELECT id, name, subscribers, updated_at FROM channels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(channel_from_row).transpose()
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelRecord>> {
        let rows = sqlx::query("SELECT id, name, subscribers, updated_at FROM channels ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(channel_from_row).collect()
    }

    /// Insert a viral video, or refresh views and score of a known one. A
    /// stored transcript is never overwritten here.
    pub async fn insert_video(&self, video: &ViralVideo) -> Result<()> {
        let res = sqlx::query(
            r#"INSERT INTO videos
                 (id, channel_id, title, views, published_at, virality_score, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               ON CONFLICT(id) DO UPDATE SET
                 title=excluded.title,
                 views=excluded.views,
                 virality_score=excluded.virality_score"#,
        )
        .bind(&video.id)
        .bind(&video.channel_id)
        .bind(&video.title)
        .bind(to_sql_int(video.views))
        .bind(video.published_at)
        .bind(video.virality_score)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting video {}", video.id))?;
        info!(
            video_id = %video.id,
            channel_id = %video.channel_id,
            score = video.virality_score,
            rows = res.rows_affected(),
            "store.insert_video"
        );
        Ok(())
    }

    pub async fn video_exists(&self, id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM videos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn get_video(&self, id: &str) -> Result<Option<VideoRecord>> {
        let row = sqlx::query(
            r#"SELECT id, channel_id, title, views, published_at, virality_score, transcript, created_at
               FROM videos WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(video_from_row).transpose()
    }

    /// Highest-scoring videos first.
    pub async fn top_viral_videos(&self, limit: u32) -> Result<Vec<VideoRecord>> {
        let rows = sqlx::query(
            r#"SELECT id, channel_id, title, views, published_at, virality_score, transcript, created_at
               FROM videos
               ORDER BY virality_score DESC, published_at DESC
               LIMIT ?"#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(video_from_row).collect()
    }

    /// Returns false when the video is unknown.
    pub async fn update_video_transcript(&self, id: &str, transcript: &str) -> Result<bool> {
        let res = sqlx::query("UPDATE videos SET transcript = ?1 WHERE id = ?2")
            .bind(transcript)
            .bind(id)
            .execute(&self.pool)
            .await?;
        let updated = res.rows_affected() > 0;
        info!(video_id = %id, chars = transcript.chars().count(), updated, "store.update_video_transcript");
        Ok(updated)
    }

    /// Append one fact and return its row id.
    pub async fn insert_fact(&self, fact: &VerifiedFact) -> Result<i64> {
        let res = sqlx::query(
            r#"INSERT INTO verified_facts
                 (video_id, claim, status, source, verified_value, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        )
        .bind(&fact.video_id)
        .bind(&fact.claim)
        .bind(fact.status.as_str())
        .bind(fact.source.as_deref())
        .bind(fact.verified_value.as_deref())
        .bind(fact.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("inserting fact for video {}", fact.video_id))?;
        let id = res.last_insert_rowid();
        info!(fact_id = id, video_id = %fact.video_id, status = %fact.status, "store.insert_fact");
        Ok(id)
    }

    /// Every fact recorded for a video, oldest first.
    pub async fn facts_for_video(&self, video_id: &str) -> Result<Vec<VerifiedFact>> {
        let rows = sqlx::query(
            r#"SELECT video_id, claim, status, source, verified_value, created_at
               FROM verified_facts WHERE video_id = ? ORDER BY id ASC"#,
        )
        .bind(video_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(fact_from_row).collect()
    }

    pub async fn verified_facts_for_video(&self, video_id: &str) -> Result<Vec<VerifiedFact>> {
        let rows = sqlx::query(
            r#"SELECT video_id, claim, status, source, verified_value, created_at
               FROM verified_facts WHERE video_id = ?1 AND status = ?2 ORDER BY id ASC"#,
        )
        .bind(video_id)
        .bind(FactStatus::Verified.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(fact_from_row).collect()
    }
}

/// SQLite integers are signed; counts beyond `i64::MAX` saturate.
fn to_sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_sql_int(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn channel_from_row(r: &SqliteRow) -> Result<ChannelRecord> {
    Ok(ChannelRecord {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        subscribers: from_sql_int(r.try_get("subscribers")?),
        updated_at: r.try_get("updated_at")?,
    })
}

fn video_from_row(r: &SqliteRow) -> Result<VideoRecord> {
    Ok(VideoRecord {
        id: r.try_get("id")?,
        channel_id: r.try_get("channel_id")?,
        title: r.try_get("title")?,
        views: from_sql_int(r.try_get("views")?),
        published_at: r.try_get("published_at")?,
        virality_score: r.try_get("virality_score")?,
        transcript: r.try_get("transcript")?,
        created_at: r.try_get("created_at")?,
    })
}

fn fact_from_row(r: &SqliteRow) -> Result<VerifiedFact> {
    let status: String = r.try_get("status")?;
    Ok(VerifiedFact {
        video_id: r.try_get("video_id")?,
        claim: r.try_get("claim")?,
        status: status.parse().map_err(|e: String| anyhow!(e))?,
        source: r.try_get("source")?,
        verified_value: r.try_get("verified_value")?,
        created_at: r.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_conversion_saturates() {
        assert_eq!(to_sql_int(42), 42);
        assert_eq!(to_sql_int(u64::MAX), i64::MAX);
        assert_eq!(from_sql_int(-1), 0);
        assert_eq!(from_sql_int(7), 7);
    }
}

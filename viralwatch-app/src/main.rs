use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use viralwatch_common::display::group_thousands;
use viralwatch_common::observability::{init_logging, LogConfig, LogFormat};
use viralwatch_config::{AppConfig, ViralwatchConfigLoader};
use viralwatch_factcheck::{format_fact_report, status_counts, FactVerifier};
use viralwatch_llm::build_llm_client;
use viralwatch_store::Store;
use viralwatch_virality::{format_virality_report, ViralityClassifier};

mod cycle;

const DEFAULT_CONFIG: &str = "viralwatch.yaml";

#[derive(Parser)]
#[command(name = "viralwatch")]
#[command(about = "Spot viral DeFi videos and fact-check what they claim")]
struct Cli {
    /// YAML configuration file (defaults to ./viralwatch.yaml when present)
    #[arg(long, global = true, env = "VIRALWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single view/subscriber pair
    Classify {
        #[arg(long)]
        views: u64,
        #[arg(long)]
        subscribers: u64,
    },
    /// List viral uploads in a channel feed without touching the database
    Scan {
        /// JSON feed: [{channel: {id, name, subscribers}, videos: [...]}]
        #[arg(long)]
        input: PathBuf,
    },
    /// Extract and verify the claims in one transcript
    Verify {
        #[arg(long)]
        video_id: String,
        /// Plain-text transcript file
        #[arg(long)]
        transcript: PathBuf,
        /// Print results only
        #[arg(long)]
        no_store: bool,
    },
    /// Show stored facts for a video
    Facts {
        #[arg(long)]
        video_id: String,
        #[arg(long)]
        verified_only: bool,
    },
    /// Highest-scoring stored videos
    Top {
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
        limit: u32,
    },
    /// Run one monitoring pass: classify, store, fact-check
    Cycle {
        #[arg(long)]
        input: PathBuf,
        /// Directory holding <video_id>.txt transcripts
        #[arg(long)]
        transcripts: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let loader = match path {
        Some(p) => ViralwatchConfigLoader::new().with_file(p),
        None => ViralwatchConfigLoader::new().with_optional_file(DEFAULT_CONFIG),
    };
    loader.load().context("loading configuration")
}

fn log_config(cfg: &AppConfig) -> Result<LogConfig> {
    let format: LogFormat = cfg.logging.format.parse().map_err(|e: String| anyhow!(e))?;
    Ok(LogConfig {
        app_name: "viralwatch",
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cfg.logging.emit_stderr,
        format,
        default_filter: cfg.logging.filter.clone(),
    })
}

async fn build_verifier(cfg: &AppConfig) -> Result<Option<FactVerifier>> {
    let Some(llm_cfg) = &cfg.llm else {
        return Ok(None);
    };
    let llm = build_llm_client(llm_cfg).await?;
    match llm.health_check().await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(model = llm.model_name(), "app.llm_unhealthy"),
        Err(e) => tracing::warn!(model = llm.model_name(), error = %e, "app.llm_health_check_failed"),
    }
    Ok(Some(FactVerifier::from_config(llm, &cfg.factcheck)?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;
    let log_path = init_logging(log_config(&cfg)?)?;
    tracing::info!(log = %log_path.display(), channels = cfg.channels.len(), "app.started");

    let classifier = ViralityClassifier::new(cfg.monitoring.virality_thresholds);

    match cli.command {
        Commands::Classify { views, subscribers } => {
            println!("{}", format_virality_report(&classifier.classify(views, subscribers)));
        }

        Commands::Scan { input } => {
            let now = chrono::Utc::now();
            let max_age = chrono::Duration::days(i64::from(cfg.monitoring.max_video_age_days));
            for feed in cycle::load_feeds(&input).await? {
                let recent = cycle::recent(&feed.videos, now, max_age);
                let viral = classifier.filter_viral(&recent, &feed.channel);
                println!(
                    "{} ({} subs): {} recent, {} viral",
                    feed.channel.id,
                    group_thousands(feed.channel.subscribers),
                    recent.len(),
                    viral.len()
                );
                for v in viral {
                    println!("  {:.2}x  {}  {}", v.virality_score, v.id, v.title);
                }
            }
        }

        Commands::Verify { video_id, transcript, no_store } => {
            let verifier = build_verifier(&cfg)
                .await?
                .ok_or_else(|| anyhow!("no llm provider configured; fact-checking needs one"))?;
            let text = tokio::fs::read_to_string(&transcript)
                .await
                .with_context(|| format!("reading transcript {}", transcript.display()))?;

            let facts = verifier.verify(&text, &video_id).await;
            for fact in &facts {
                println!("{}", format_fact_report(fact));
            }
            println!("{:?}", status_counts(&facts));

            if !no_store {
                let store = Store::connect(&cfg.database.url).await?;
                for fact in &facts {
                    store.insert_fact(fact).await?;
                }
            }
        }

        Commands::Facts { video_id, verified_only } => {
            let store = Store::connect(&cfg.database.url).await?;
            let facts = if verified_only {
                store.verified_facts_for_video(&video_id).await?
            } else {
                store.facts_for_video(&video_id).await?
            };
            if facts.is_empty() {
                println!("no facts stored for {video_id}");
            }
            for fact in &facts {
                println!("{}", format_fact_report(fact));
            }
        }

        Commands::Top { limit } => {
            let store = Store::connect(&cfg.database.url).await?;
            let channels = store.list_channels().await?;
            for v in store.top_viral_videos(limit).await? {
                let channel = channels
                    .iter()
                    .find(|c| c.id == v.channel_id)
                    .map(|c| c.name.as_str())
                    .unwrap_or(v.channel_id.as_str());
                println!(
                    "{:.2}x  {:>12} views  {}  [{}]  {}",
                    v.virality_score,
                    group_thousands(v.views),
                    v.id,
                    channel,
                    v.title
                );
            }
        }

        Commands::Cycle { input, transcripts } => {
            let store = Store::connect(&cfg.database.url).await?;
            let verifier = build_verifier(&cfg).await?;
            let feeds = cycle::load_feeds(&input).await?;
            for feed in &feeds {
                if !cfg.channels.iter().any(|c| c.id == feed.channel.id) {
                    tracing::debug!(channel_id = %feed.channel.id, "app.unconfigured_channel_in_feed");
                }
            }

            let monitor = cycle::Monitor {
                store: &store,
                classifier: &classifier,
                verifier: verifier.as_ref(),
                transcripts_dir: transcripts,
                max_age: chrono::Duration::days(i64::from(cfg.monitoring.max_video_age_days)),
            };
            let report = monitor.run(&feeds, chrono::Utc::now()).await?;
            println!(
                "channels: {}, new viral: {}, already seen: {}, checked: {}, facts: {} ({} verified)",
                report.channels,
                report.new_viral,
                report.already_seen,
                report.checked_videos,
                report.facts,
                report.verified_facts
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "viralwatch",
            "--config",
            "alt.yaml",
            "verify",
            "--video-id",
            "abc",
            "--transcript",
            "t.txt",
            "--no-store",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.yaml")));
        match cli.command {
            Commands::Verify { video_id, no_store, .. } => {
                assert_eq!(video_id, "abc");
                assert!(no_store);
            }
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn top_limit_must_be_positive() {
        for bad in ["0", "-1"] {
            assert!(Cli::try_parse_from(["viralwatch", "top", "--limit", bad]).is_err());
        }
        let cli = Cli::try_parse_from(["viralwatch", "top"]).unwrap();
        assert!(matches!(cli.command, Commands::Top { limit: 10 }));
    }

    #[test]
    fn log_format_comes_from_config() {
        let mut cfg = AppConfig::default();
        cfg.logging.format = "json".into();
        assert_eq!(log_config(&cfg).unwrap().format, LogFormat::Json);
        cfg.logging.format = "xml".into();
        assert!(log_config(&cfg).is_err());
    }
}

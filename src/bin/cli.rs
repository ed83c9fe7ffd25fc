//! Climb stats CLI
//!
//! Local execution entry point. For AWS Lambda, use `climb-stats-lambda`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use climb_stats::{
    aggregator::StatAggregator,
    config,
    error::{AppError, Result},
    feed::{ChangeEvent, ChangeFeed, PollingWatcher},
    models::{Climb, ClimbLog, Comment, StoreBackend, VideoData},
    services::{ClimbService, GradeService, LeaderboardService, LogService, VideoService},
    storage::{CollectionPath, DocPath, DocumentStore, paths},
};

/// climb-stats - Climb statistics aggregator
#[derive(Parser, Debug)]
#[command(
    name = "climb-stats",
    version,
    about = "Keeps climb ascent counts and ratings in sync with their logs"
)]
struct Cli {
    /// Path to the local document store
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Path to config file (default: {storage_dir}/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute the stats of one climb
    Recompute {
        climb_id: String,
    },

    /// Recompute the stats of every climb
    Backfill,

    /// Apply log write events from a JSON file (one event or an array)
    Apply {
        event_file: PathBuf,
    },

    /// Poll the store and recompute climbs as their logs change
    Watch {
        /// Treat every existing log as newly created on startup
        #[arg(long)]
        initial: bool,
    },

    /// Log an ascent and update the climb's stats
    Log {
        climb_id: String,
        user_id: String,
        /// Rating from 1 to 5
        rating: i64,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Add a climb to the map
    AddClimb {
        name: String,
        grade: String,
        #[arg(long, default_value = "")]
        color: String,
        #[arg(long, default_value_t = 0.0)]
        x: f64,
        #[arg(long, default_value_t = 0.0)]
        y: f64,
        #[arg(long, default_value = "")]
        gym: String,
        #[arg(long)]
        section: Option<String>,
        /// Name recorded as the last editor
        #[arg(long, default_value = "")]
        editor: String,
    },

    /// Delete a climb (its logs are kept)
    DeleteClimb {
        climb_id: String,
    },

    /// Like or unlike a beta video
    Like {
        climb_id: String,
        video_id: String,
        user_id: String,
    },

    /// Show grade votes and consensus for a climb
    Grades {
        climb_id: String,
    },

    /// Cast a grade vote
    Vote {
        climb_id: String,
        user_id: String,
        vote: String,
    },

    /// Rank users by logged climbs
    Leaderboard {
        /// Number of users to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show a climb with its logs and videos
    Info {
        climb_id: String,
    },

    /// Validate configuration
    Validate,
}

/// Initialize logging. `RUST_LOG` wins over the configured filter.
fn init_logging(filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configurations
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.storage_dir.join("config.toml"));
    let (mut config, load_error) = match config::load_config(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (config::env_config(), Some(e)),
    };
    if config.store.backend == StoreBackend::Local {
        config.store.root = cli.storage_dir.to_string_lossy().into_owned();
    }

    init_logging(config.logging.filter(cli.verbose));
    match load_error {
        None => log::info!("Loaded configuration from {}", config_path.display()),
        Some(e) => log::warn!(
            "Config load failed from {}: {}. Using defaults.",
            config_path.display(),
            e
        ),
    }

    if let Command::Validate = cli.command {
        log::info!("Validating configuration...");
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!("✓ Store: {:?}", config.store.backend);
        log::info!(
            "✓ Aggregator: orphan policy {}, serialize per climb {}",
            config.aggregator.orphan_policy,
            config.aggregator.serialize_per_climb
        );
        log::info!(
            "✓ Feed: poll every {}ms, {} in flight, {} retries",
            config.feed.poll_interval_ms,
            config.feed.max_in_flight,
            config.feed.retry_attempts
        );
        log::info!("All validations passed!");
        return Ok(());
    }

    config.validate()?;
    let store = config::open_store(&config.store).await?;
    let aggregator = Arc::new(StatAggregator::new(
        Arc::clone(&store),
        config.aggregator.clone(),
    ));

    match cli.command {
        Command::Recompute { climb_id } => {
            let stats = aggregator.recompute(&climb_id).await?;
            log::info!(
                "Climb {}: {} ascents, average rating {:.2}",
                climb_id,
                stats.ascent_count,
                stats.avg_rating
            );
        }

        Command::Backfill => {
            let summary = aggregator.backfill(config.feed.max_in_flight).await?;
            if summary.failed > 0 {
                log::error!(
                    "{} of {} climbs failed to recompute; run backfill again",
                    summary.failed,
                    summary.climbs
                );
            }
        }

        Command::Apply { event_file } => {
            let content = tokio::fs::read_to_string(&event_file).await?;
            let events: Vec<ChangeEvent> = match serde_json::from_str::<serde_json::Value>(&content)? {
                serde_json::Value::Array(items) => items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<std::result::Result<_, _>>()?,
                single => vec![serde_json::from_value(single)?],
            };

            log::info!("Applying {} events from {}", events.len(), event_file.display());
            for event in &events {
                let outcome = aggregator.handle(event).await?;
                println!("{}", serde_json::to_string(&outcome)?);
            }
        }

        Command::Watch { initial } => {
            let mut feed = ChangeFeed::new(config.feed.clone());
            feed.subscribe(aggregator.clone());
            let (tx, rx) = feed.channel();

            let watcher = PollingWatcher::new(Arc::clone(&store), &config.feed).emit_initial(initial);
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };

            log::info!("Watching {} (Ctrl-C to stop)", cli.storage_dir.display());
            let (watched, summary) = tokio::join!(watcher.run(tx, shutdown), feed.run(rx));
            watched?;
            log::info!(
                "Handled {} events ({} failed)",
                summary.events,
                summary.failures
            );
        }

        Command::Log {
            climb_id,
            user_id,
            rating,
            email,
            comment,
        } => {
            let event = LogService::new(Arc::clone(&store))
                .log_ascent(&climb_id, &user_id, &email, rating, &comment)
                .await?;
            let outcome = aggregator.handle(&event).await?;
            if let Some(stats) = outcome.stats() {
                log::info!(
                    "Climb {}: {} ascents, average rating {:.2}",
                    climb_id,
                    stats.ascent_count,
                    stats.avg_rating
                );
            }
        }

        Command::AddClimb {
            name,
            grade,
            color,
            x,
            y,
            gym,
            section,
            editor,
        } => {
            let climb = Climb {
                id: String::new(),
                name,
                grade,
                color,
                x,
                y,
                gym_id: gym,
                updated_by: None,
                ascent_count: 0,
                avg_rating: 0.0,
                section,
            };
            let created = ClimbService::new(Arc::clone(&store))
                .create(climb, &editor)
                .await?;
            println!("{}", created.id);
        }

        Command::DeleteClimb { climb_id } => {
            ClimbService::new(Arc::clone(&store))
                .delete(&climb_id)
                .await?;
        }

        Command::Like {
            climb_id,
            video_id,
            user_id,
        } => {
            VideoService::new(Arc::clone(&store))
                .toggle_like(&climb_id, &video_id, &user_id)
                .await?;
        }

        Command::Grades { climb_id } => {
            let service = GradeService::new(Arc::clone(&store));
            let climb = service.climb(&climb_id).await?;
            let tally = service.tally(&climb_id).await?;

            log::info!("{} [{}]: {} votes", climb.name, climb.grade, tally.total);
            for (option, count) in &tally.counts {
                log::info!("  {:<8} {}", option, count);
            }
            match tally.consensus() {
                Some((option, count)) => log::info!("Consensus: {} ({} votes)", option, count),
                None => log::info!("No votes yet."),
            }
        }

        Command::Vote {
            climb_id,
            user_id,
            vote,
        } => {
            let service = GradeService::new(Arc::clone(&store));
            service.submit(&climb_id, &user_id, &vote).await?;
        }

        Command::Leaderboard { limit } => {
            let entries = LeaderboardService::new(Arc::clone(&store))
                .build(limit)
                .await?;
            if entries.is_empty() {
                log::info!("No logs found yet.");
            }
            for entry in entries {
                log::info!(
                    "#{:<3} {:<24} {}",
                    entry.rank,
                    entry.user_id,
                    entry.total_climbs
                );
            }
        }

        Command::Info { climb_id } => {
            show_climb(store.as_ref(), &climb_id).await?;
        }

        Command::Validate => {}
    }

    log::info!("Done!");

    Ok(())
}

/// Print a climb, its logs and its videos.
async fn show_climb(store: &dyn DocumentStore, climb_id: &str) -> Result<()> {
    let climb_path = DocPath::climb(climb_id)?;
    let doc = store
        .get(&climb_path)
        .await?
        .ok_or_else(|| AppError::ClimbNotFound {
            climb_id: climb_id.to_string(),
        })?;
    let climb = Climb::from_document(&doc)?;
    let stats = climb.stats();

    log::info!("Climb {}: {} [{}]", climb.id, climb.name, climb.grade);
    log::info!(
        "Stored stats: {} ascents, average rating {:.2}",
        stats.ascent_count,
        stats.avg_rating
    );

    let logs = store.list(&CollectionPath::climb_logs(climb_id)?).await?;
    log::info!("Logs: {}", logs.len());
    for doc in &logs {
        match doc.decode::<ClimbLog>() {
            Ok(entry) => log::info!(
                "  {} rated {} on {}: {}",
                entry.user_id,
                entry.rating,
                entry.timestamp.format("%Y-%m-%d"),
                entry.comment
            ),
            Err(e) => log::warn!("  {} (unreadable: {})", doc.id, e),
        }
    }

    let videos_path = climb_path.collection(paths::VIDEOS)?;
    let videos = store.list(&videos_path).await?;
    log::info!("Videos: {}", videos.len());
    for doc in &videos {
        let video = match doc.decode::<VideoData>() {
            Ok(video) => video,
            Err(e) => {
                log::warn!("  {} (unreadable: {})", doc.id, e);
                continue;
            }
        };

        let comments = store
            .list(&videos_path.doc(&doc.id)?.collection(paths::COMMENTS)?)
            .await?;
        let readable = comments
            .iter()
            .filter(|c| c.decode::<Comment>().is_ok())
            .count();
        log::info!(
            "  {} by {}: {} likes, {} comments",
            video.url,
            video.uploader_id,
            video.likes.len(),
            readable
        );
    }

    Ok(())
}

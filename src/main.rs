use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use rssagg::config::Config;
use rssagg::feed::HttpFetcher;
use rssagg::scheduler::Scheduler;
use rssagg::storage::Database;
use rssagg::util::validate_feed_url;

#[derive(Parser, Debug)]
#[command(name = "rssagg", about = "RSS aggregator: scheduled feed fetching and post storage")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, short, value_name = "FILE", default_value = "rssagg.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the feed worker until interrupted
    Run,
    /// Run a single tick and print its report
    Tick,
    /// Create a user
    AddUser { name: String },
    /// Register a feed for a user (the user follows it automatically)
    AddFeed {
        #[arg(long)]
        user: i64,
        name: String,
        url: String,
    },
    /// List all feeds
    Feeds,
    /// Follow an existing feed
    Follow {
        #[arg(long)]
        user: i64,
        feed_id: i64,
    },
    /// Remove one of the user's follows
    Unfollow {
        #[arg(long)]
        user: i64,
        follow_id: i64,
    },
    /// List a user's follows
    Follows {
        #[arg(long)]
        user: i64,
    },
    /// Show the latest posts from feeds a user follows
    Posts {
        #[arg(long)]
        user: i64,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log_level in config")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    config.log_loaded(&args.config);

    let db_path = config
        .database_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = Database::open(db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    match args.command {
        Command::Run => {
            let scheduler = build_scheduler(&config, db)?;
            scheduler
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                    tracing::info!("Shutdown requested, finishing current tick");
                })
                .await;
        }
        Command::Tick => {
            let scheduler = build_scheduler(&config, db)?;
            let report = scheduler.run_tick().await.context("Tick failed")?;
            println!(
                "{} feeds: {} refreshed, {} failed, {} new posts, {} duplicates",
                report.feeds_selected,
                report.ingested.len(),
                report.failures.len(),
                report.posts_inserted(),
                report.duplicates()
            );
            for failure in &report.failures {
                println!("  feed {} ({}): {}", failure.feed_id, failure.url, failure.error);
            }
        }
        Command::AddUser { name } => {
            let user = db.create_user(&name).await.context("Failed to create user")?;
            println!("Created user {} ({})", user.id, user.name);
        }
        Command::AddFeed { user, name, url } => {
            let url = validate_feed_url(&url, config.allow_private_hosts)
                .with_context(|| format!("Refusing feed URL {}", url))?;
            let feed = db
                .create_feed(user, &name, url.as_str())
                .await
                .context("Failed to create feed")?;
            println!("Created feed {} ({}) -> {}", feed.id, feed.name, feed.url);
        }
        Command::Feeds => {
            for feed in db.list_feeds().await.context("Failed to list feeds")? {
                let fetched = feed
                    .last_fetched_at
                    .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("{}\t{}\t{}\tlast fetched: {}", feed.id, feed.name, feed.url, fetched);
            }
        }
        Command::Follow { user, feed_id } => {
            let follow = db
                .follow_feed(user, feed_id)
                .await
                .context("Failed to follow feed")?;
            println!("Follow {} created", follow.id);
        }
        Command::Unfollow { user, follow_id } => {
            db.unfollow_feed(user, follow_id)
                .await
                .context("Failed to unfollow feed")?;
            println!("Follow {} removed", follow_id);
        }
        Command::Follows { user } => {
            for follow in db.list_follows(user).await.context("Failed to list follows")? {
                println!("{}\tfeed {}", follow.id, follow.feed_id);
            }
        }
        Command::Posts { user, limit } => {
            for post in db
                .posts_for_user(user, limit)
                .await
                .context("Failed to list posts")?
            {
                let published = post
                    .published_at
                    .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| "unknown date".to_string());
                println!(
                    "[{}] {}\n    {}",
                    published,
                    post.title,
                    post.url.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}

fn build_scheduler(config: &Config, db: Database) -> Result<Scheduler<Database, HttpFetcher>> {
    let fetcher = HttpFetcher::new(config.fetch_timeout(), config.max_feed_bytes, &config.user_agent)
        .context("Failed to build HTTP client")?;
    Ok(Scheduler::new(
        Arc::new(db),
        Arc::new(fetcher),
        config.scheduler_config(),
    ))
}

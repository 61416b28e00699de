use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use newsreel::config::Config;
use newsreel::pipeline::Pipeline;
use newsreel::scheduler::{JobEvent, RunScheduler, Trigger};
use newsreel::storage::{Database, DatabaseError, Locale, StoredArticle};
use newsreel::util::{strip_control_chars, truncate_chars};

/// Get the config directory path (~/.config/newsreel/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsreel"))
}

#[derive(Parser, Debug)]
#[command(name = "newsreel", about = "Keyword news ingestion with full-text extraction")]
struct Args {
    /// Config file (default: ~/.config/newsreel/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database (default: ~/.config/newsreel/news.db)
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest a keyword now or on a schedule
    Run {
        keyword: String,
        #[arg(long, default_value = "ko", value_parser = ["ko", "en", "default"])]
        locale: String,
        #[arg(long, value_enum, default_value_t = Mode::Once)]
        mode: Mode,
    },
    /// List subscribed keywords
    Keywords,
    /// Forget a keyword's subscription (its articles are kept)
    Unsubscribe { keyword: String },
    /// Delete a keyword's collection and every article in it
    Drop {
        keyword: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Show stored articles for a keyword, newest first
    List {
        keyword: String,
        /// Only articles with extracted content
        #[arg(long)]
        with_content: bool,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Search titles and content within a keyword's collection
    Search { keyword: String, term: String },
    /// Content resolution counts for a keyword
    Stats { keyword: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Run immediately, once
    Once,
    /// Every `interval_secs`
    Interval,
    /// On the configured cron expression
    Cron,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        restrict_permissions(&config_dir);
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = args.db.clone().unwrap_or_else(|| config_dir.join("news.db"));
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: the database is locked by another process. Try again later.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let result = match args.command {
        Command::Run {
            keyword,
            locale,
            mode,
        } => run(db.clone(), &config, &keyword, Locale::from(locale.as_str()), mode).await,
        Command::Keywords => keywords(&db).await,
        Command::Unsubscribe { keyword } => {
            if db.delete_subscription(&keyword).await? {
                println!("Unsubscribed {}", clean(&keyword));
            } else {
                println!("No subscription for {}", clean(&keyword));
            }
            Ok(())
        }
        Command::Drop { keyword, yes } => {
            if !yes {
                anyhow::bail!("Refusing to drop {:?} without --yes", keyword);
            }
            let removed = db
                .drop_collection(&keyword)
                .await
                .context("Failed to drop collection")?;
            println!("Dropped {} ({} articles)", clean(&keyword), removed);
            Ok(())
        }
        Command::List {
            keyword,
            with_content,
            limit,
        } => {
            let articles = if with_content {
                db.list_articles_with_content(&keyword, limit).await?
            } else {
                let mut all = db.list_articles(&keyword).await?;
                all.truncate(limit as usize);
                all
            };
            print_articles(&articles);
            Ok(())
        }
        Command::Search { keyword, term } => {
            let articles = db.search_articles(&keyword, &term).await?;
            print_articles(&articles);
            Ok(())
        }
        Command::Stats { keyword } => {
            let stats = db.collection_stats(&keyword).await?;
            println!("collection   {}", clean(&keyword));
            println!("total        {}", stats.total);
            println!("with content {}", stats.with_content);
            println!("fetch failed {}", stats.fetch_failed);
            println!("no content   {}", stats.no_content);
            println!("success rate {:.1}%", stats.success_rate());
            Ok(())
        }
    };

    db.close().await;
    result
}

async fn run(db: Database, config: &Config, keyword: &str, locale: Locale, mode: Mode) -> Result<()> {
    let pipeline = Pipeline::from_config(db, config)?;
    let (tx, mut rx) = mpsc::channel::<JobEvent>(32);
    let mut scheduler = RunScheduler::new(
        RunScheduler::pipeline_runner(Arc::new(pipeline)),
        config.max_concurrent_runs,
    )
    .await
    .context("Failed to create scheduler")?
    .with_events(tx);

    let trigger = match mode {
        Mode::Once => Trigger::Once,
        Mode::Interval => Trigger::Interval(Duration::from_secs(config.interval_secs)),
        Mode::Cron => Trigger::Cron(config.cron.clone()),
    };
    scheduler
        .schedule(keyword, locale, trigger)
        .await
        .context("Failed to schedule run")?;
    scheduler.start().await.context("Failed to start scheduler")?;

    if mode == Mode::Once {
        if let Some(event) = rx.recv().await {
            print_event(&event);
        }
    } else {
        println!("Scheduled {} ({}), Ctrl-C to stop", clean(keyword), locale);
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => print_event(&event),
                    None => break,
                },
                signal = tokio::signal::ctrl_c() => {
                    signal.context("Failed to listen for Ctrl-C")?;
                    break;
                }
            }
        }
    }

    scheduler.shutdown().await.context("Failed to stop scheduler")?;
    Ok(())
}

fn print_event(event: &JobEvent) {
    match event {
        JobEvent::Completed(report) => println!("{}", report),
        JobEvent::Skipped { keyword, locale } => {
            println!("Skipped {} ({}): run cap reached", clean(keyword), locale)
        }
        JobEvent::Panicked {
            keyword,
            locale,
            message,
        } => eprintln!("Run for {} ({}) panicked: {}", clean(keyword), locale, clean(message)),
    }
}

async fn keywords(db: &Database) -> Result<()> {
    let subscriptions = db
        .list_subscriptions()
        .await
        .context("Failed to list subscriptions")?;
    if subscriptions.is_empty() {
        println!("No keywords yet. Start with: newsreel run <keyword>");
    }
    for sub in subscriptions {
        println!(
            "{:<24} {:<8} since {}",
            clean(&sub.keyword),
            sub.locale,
            sub.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn print_articles(articles: &[StoredArticle]) {
    if articles.is_empty() {
        println!("No articles.");
        return;
    }
    for article in articles {
        println!(
            "{}  [{}] {}",
            article.published.format("%Y-%m-%d %H:%M"),
            clean(&article.source),
            clean(&article.title)
        );
        println!("    {}", clean(&article.link));
        match article.content.text() {
            Some(text) => println!("    {}", clean(truncate_chars(text, 160))),
            None => println!("    {}", article.content),
        }
    }
}

fn clean(s: &str) -> String {
    strip_control_chars(s).into_owned()
}

/// Restrict the config directory to the current user.
fn restrict_permissions(dir: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use cinder::algos::{discourse::DiscourseManager, ratiod::RatiodManager, AlgoManager, AlgoRegistry};
use cinder::bluesky::BskyClient;
use cinder::config::Config;
use cinder::db::{Database, SqliteDatabase};
use cinder::firehose::ingest::CURSOR_KEY;
use cinder::firehose::source::HttpEventSource;
use cinder::firehose::IngestionPipeline;
use cinder::scheduler::spawn_periodic_tasks;

/// Cinder: feed-generation ingestion and ranking pipeline for Bluesky.
///
/// Consumes the firehose, tags English posts against the registered ranking
/// algorithms, and periodically re-scores candidates with live engagement
/// metrics. The resulting store feeds the feed-skeleton serving layer.
#[derive(Parser)]
#[command(name = "cinder", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and configuration
    Init,

    /// Consume the firehose and run the periodic scoring jobs
    Run,

    /// Show system status (cursor position, tagged posts, candidates)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cinder=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing Cinder database...");
            let config = Config::load()?;
            let conn = cinder::db::initialize(&config.db_path)?;
            let table_count = cinder::db::schema::table_count(&conn)?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nCinder is ready. Next step: set up your .env file");
            println!("  (see .env.example for required variables)");
            println!("\nThen run: cargo run -- run");
        }

        Commands::Run => {
            let config = Config::load()?;
            // Startup failures are fatal — nothing is consumed and no task
            // is scheduled until credentials, relay, and login all check out.
            config.require_credentials()?;
            config.require_relay()?;

            let conn = cinder::db::initialize(&config.db_path)?;
            let db: Arc<dyn Database> = Arc::new(SqliteDatabase::new(conn));

            let client = Arc::new(BskyClient::new(&config.service_url)?);
            client
                .login(&config.bluesky_handle, &config.bluesky_app_password)
                .await?;
            info!(handle = config.bluesky_handle, "Logged in to metrics service");

            let registry = Arc::new(AlgoRegistry::new(build_managers(&config, &db, &client)));
            registry.start_all().await?;

            let handles = spawn_periodic_tasks(&registry);

            let mut source = HttpEventSource::new(&config.relay_url)?;
            let pipeline = IngestionPipeline::new(db, registry);
            let result = pipeline.run(&mut source).await;

            for handle in handles {
                handle.abort();
            }
            result?;
        }

        Commands::Status => {
            let config = Config::load()?;
            let conn = cinder::db::open(&config.db_path)?;
            let db = SqliteDatabase::new(conn);

            println!("{}", "Cinder status".bold());

            match db.get_scan_state(CURSOR_KEY).await? {
                Some(cursor) => println!("  Firehose cursor: {cursor}"),
                None => println!("  Firehose cursor: {}", "none (fresh start)".dimmed()),
            }

            for name in [
                cinder::algos::ratiod::SHORTNAME,
                cinder::algos::discourse::SHORTNAME,
            ] {
                let tagged = db.count_posts_for_tag(name).await?;
                println!("  {}: {} tagged posts", name.cyan(), tagged);
            }

            let candidates = db
                .get_collection(cinder::algos::ratiod::AGGREGATE_COLLECTION)
                .await?;
            let scored = candidates.iter().filter(|c| c.sort_weight > 0.0).count();
            println!(
                "  ratiod candidates: {} ({} with non-zero weight)",
                candidates.len(),
                scored
            );
        }
    }

    Ok(())
}

/// Build the process-wide manager list. New algorithms get registered here
/// and nowhere else.
fn build_managers(
    config: &Config,
    db: &Arc<dyn Database>,
    client: &Arc<BskyClient>,
) -> Vec<Arc<dyn AlgoManager>> {
    let retention: Duration = config.retention;
    vec![
        Arc::new(RatiodManager::new(
            db.clone(),
            client.clone(),
            config.ratiod_interval,
            retention,
            config.ratiod_threshold,
        )),
        Arc::new(DiscourseManager::new(
            db.clone(),
            config.discourse_interval,
            retention,
        )),
    ]
}

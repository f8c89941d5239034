use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use qbank::cancel::{CancellationGateway, HttpControlPlane, NullControlPlane};
use qbank::config::{Config, GeneratorBackend};
use qbank::feed::FeedCrawler;
use qbank::generate::{GenerationService, OllamaGenerator, OpenAiGenerator};
use qbank::pipeline::PipelineOrchestrator;
use qbank::storage::{Database, DatabaseError, PersistenceCoordinator};

/// How long the persistence layer may serve category ids from cache.
const CATEGORY_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(name = "qbank", about = "News-to-question-bank pipeline for exam preparation")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "qbank.toml")]
    config: PathBuf,

    /// Override the run date (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    date: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl configured feeds and store today's articles as pending work
    Crawl,
    /// Generate questions from pending articles
    Generate,
    /// Crawl, then generate, in one run
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let run_date = args
        .date
        .unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string());

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(e @ DatabaseError::InstanceLocked) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {e}")),
    };

    let client = reqwest::Client::new();
    let gateway = build_gateway(&config, &client);

    let mut failed = false;
    match args.command {
        Command::Crawl => {
            failed = crawl(&db, &client, &config, &run_date, &gateway).await;
        }
        Command::Generate => {
            failed = generate(&db, &client, &config, &run_date, &gateway).await?;
        }
        Command::Run => {
            failed |= crawl(&db, &client, &config, &run_date, &gateway).await;
            failed |= generate(&db, &client, &config, &run_date, &gateway).await?;
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn build_gateway(config: &Config, client: &reqwest::Client) -> CancellationGateway {
    let poll = Duration::from_secs(config.control_plane_poll_secs);
    match &config.control_plane_url {
        Some(url) => CancellationGateway::new(
            Box::new(HttpControlPlane::new(client.clone(), url.clone())),
            poll,
        ),
        None => CancellationGateway::new(Box::new(NullControlPlane), poll),
    }
}

fn build_generator(config: &Config, client: &reqwest::Client) -> Result<Arc<dyn GenerationService>> {
    let retry_delay = Duration::from_secs(config.retry_delay_secs);
    match config.generator {
        GeneratorBackend::Openai => {
            let api_key = config
                .resolve_openai_key()
                .context("OpenAI API key not configured")?;
            Ok(Arc::new(OpenAiGenerator::new(
                client.clone(),
                config.openai_base_url.clone(),
                api_key,
                config.openai_model.clone(),
                config.openai_temperature,
                config.openai_max_tokens,
                config.retry_attempts,
                retry_delay,
            )))
        }
        GeneratorBackend::Ollama => Ok(Arc::new(OllamaGenerator::new(
            client.clone(),
            config.ollama_base_url.clone(),
            config.ollama_model.clone(),
            config.ollama_temperature,
            config.retry_attempts,
            retry_delay,
        ))),
    }
}

/// Returns true when the crawl should fail the process exit code.
async fn crawl(
    db: &Database,
    client: &reqwest::Client,
    config: &Config,
    run_date: &str,
    gateway: &CancellationGateway,
) -> bool {
    let crawler = FeedCrawler::new(db.clone(), client.clone(), config);
    let stats = crawler.crawl(&config.feeds, run_date, gateway).await;

    println!(
        "Crawl: {} feeds, {} articles stored, {} skipped, {} failed{}",
        stats.feeds_processed,
        stats.articles_stored,
        stats.articles_skipped,
        stats.articles_failed,
        if stats.cancelled { " (cancelled)" } else { "" }
    );
    for error in &stats.errors {
        eprintln!("  crawl error: {error}");
    }

    // A crawl that produced nothing and only errors is a failure
    stats.feeds_processed == 0 && !stats.errors.is_empty()
}

/// Returns true when generation should fail the process exit code.
async fn generate(
    db: &Database,
    client: &reqwest::Client,
    config: &Config,
    run_date: &str,
    gateway: &CancellationGateway,
) -> Result<bool> {
    let generator = build_generator(config, client)?;
    let persistence = PersistenceCoordinator::new(db.clone(), CATEGORY_CACHE_TTL);
    let orchestrator =
        PipelineOrchestrator::new(db.clone(), generator, persistence, config.clone());

    let stats = orchestrator.run(run_date, gateway).await?;

    println!(
        "Generate: {} articles processed, {} skipped, {} failed, {} questions{}",
        stats.articles_processed,
        stats.articles_skipped,
        stats.articles_failed,
        stats.questions_generated,
        if stats.cancelled { " (cancelled)" } else { "" }
    );
    for error in &stats.errors {
        eprintln!("  generation error: {error}");
    }

    Ok(stats.articles_processed == 0 && stats.articles_failed > 0)
}

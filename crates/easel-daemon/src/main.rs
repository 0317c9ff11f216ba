//! Scheduled generative-art daemon.
//!
//! Every interval, picks or synthesizes a prompt, renders it with the image
//! model, and files the result into a dated archive plus a rolling
//! snapshot. Reads the API key from `OPENAI_API_KEY` (or `API_KEY`), either
//! set in the environment or listed in a `.env` file.
//!
//! # Examples
//!
//! ```sh
//! # Run forever, every five minutes
//! easel --corpus-dir corpora
//!
//! # One run with a fixed selection seed
//! easel --once --seed 42 --verbose
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use easel::prelude::*;
use easel_daemon::{API_KEY_VARS, DaemonConfig, api_key_from_env, load_dotenv};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Scheduled generative-art daemon.
#[derive(Parser)]
#[command(name = "easel", version)]
struct Cli {
    /// JSON config file. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// `.env` file to load. Default: `.env` in the working directory or a
    /// parent, if present.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Seconds between runs.
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Directory that holds the per-day archive folders.
    #[arg(long)]
    archive_root: Option<PathBuf>,

    /// File overwritten with the latest image.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// File that gains one execution-time line per run.
    #[arg(long)]
    execution_log: Option<PathBuf>,

    /// Directory containing role_system.txt, role_user.txt and prompts.txt.
    #[arg(long)]
    corpus_dir: Option<PathBuf>,

    /// Calendar that decides the archive day: utc or local.
    #[arg(long)]
    day_boundary: Option<DayBoundary>,

    /// What a tick does while a run is still in flight: skip or queue.
    #[arg(long)]
    overlap: Option<OverlapPolicy>,

    /// Image size: 1024x1024, 1792x1024 or 1024x1792.
    #[arg(long)]
    size: Option<ImageSize>,

    /// Model used to synthesize prompts.
    #[arg(long)]
    text_model: Option<String>,

    /// Model used to render images.
    #[arg(long)]
    image_model: Option<String>,

    /// Start the first run immediately.
    #[arg(long)]
    run_immediately: bool,

    /// Perform a single run and exit.
    #[arg(long)]
    once: bool,

    /// Seed for prompt selection.
    #[arg(long)]
    seed: Option<u64>,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, mut config: DaemonConfig) -> DaemonConfig {
        if let Some(dir) = self.corpus_dir {
            config = config.with_corpus_dir(dir);
        }
        if let Some(secs) = self.interval_secs {
            config.interval_secs = secs;
        }
        if let Some(root) = self.archive_root {
            config.archive_root = root;
        }
        if let Some(snapshot) = self.snapshot {
            config.snapshot_path = snapshot;
        }
        if let Some(log) = self.execution_log {
            config.execution_log = log;
        }
        if let Some(boundary) = self.day_boundary {
            config.day_boundary = boundary;
        }
        if let Some(overlap) = self.overlap {
            config.overlap = overlap;
        }
        if let Some(size) = self.size {
            config.image_size = size;
        }
        if let Some(model) = self.text_model {
            config.text_model = model;
        }
        if let Some(model) = self.image_model {
            config.image_model = model;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.run_immediately |= self.run_immediately;
        config
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let dotenv = match load_dotenv(cli.env_file.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: failed to load .env file: {e}");
            std::process::exit(1);
        }
    };

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    if let Some(path) = &dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let base = match &cli.config {
        Some(path) => match DaemonConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: failed to read config {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => DaemonConfig::default(),
    };
    let once = cli.once;
    let config = cli.apply(base);
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let Some(api_key) = api_key_from_env() else {
        eprintln!(
            "Error: {} is not set in the environment or a .env file",
            API_KEY_VARS.join(" or ")
        );
        std::process::exit(1);
    };

    let client = match OpenAiClient::with_base_url(api_key, &config.base_url) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Error: failed to create API client: {e}");
            std::process::exit(1);
        }
    };

    let corpus = Arc::new(PromptCorpus::load(&config.corpus_sources()));
    if corpus.is_empty() {
        warn!("No usable corpora: every run will fail until corpus files are provided");
    }
    info!(
        "Loaded corpora: {} system roles, {} user roles, {} prompts",
        corpus.system_roles().len(),
        corpus.user_roles().len(),
        corpus.prompts().len()
    );

    let pipeline = Arc::new(config.build_pipeline(client, corpus));
    let scheduler = Scheduler::new(pipeline, config.scheduler_config())
        .with_observer(Arc::new(LoggingObserver));

    if once {
        if scheduler.run_once().await.is_err() {
            std::process::exit(1);
        }
        return;
    }

    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;
}

//! Long-running daemon around the `easel` pipeline.
//!
//! `easel-daemon` turns configuration into a wired
//! [`Pipeline`](easel::pipeline::Pipeline) and
//! [`Scheduler`](easel::scheduler::Scheduler):
//!
//! ```ignore
//! use std::sync::Arc;
//! use easel::prelude::*;
//! use easel_daemon::DaemonConfig;
//!
//! let config = DaemonConfig::default().with_corpus_dir("corpora");
//! let client = Arc::new(OpenAiClient::with_base_url(key, &config.base_url)?);
//! let corpus = Arc::new(PromptCorpus::load(&config.corpus_sources()));
//! let pipeline = Arc::new(config.build_pipeline(client, corpus));
//! let scheduler = Scheduler::new(pipeline, config.scheduler_config());
//! ```
//!
//! # Binary
//!
//! ```sh
//! # Every five minutes, reading corpora from ./corpora
//! OPENAI_API_KEY=... easel --corpus-dir corpora
//!
//! # A single run, then exit
//! OPENAI_API_KEY=... easel --once
//!
//! # Key read from a .env file in the working directory (or a parent)
//! easel --once
//! ```

pub mod config;

use std::path::{Path, PathBuf};

pub use config::DaemonConfig;

/// Environment variables consulted for the API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["OPENAI_API_KEY", "API_KEY"];

/// First non-blank value among `candidates`.
pub fn first_api_key<I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

/// The API key from the environment, if any of [`API_KEY_VARS`] is set.
pub fn api_key_from_env() -> Option<String> {
    first_api_key(API_KEY_VARS.iter().map(|var| std::env::var(var).ok()))
}

/// Load `KEY=value` lines from a `.env` file into the process environment.
///
/// Variables that are already set keep their values. Without `path`, a
/// `.env` is searched for in the working directory and its ancestors, and
/// finding none is not an error. An explicit `path` must exist.
///
/// Returns the file that was loaded, if any.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>, dotenvy::Error> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(file) => Ok(Some(file)),
        Err(e) if path.is_none() && e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

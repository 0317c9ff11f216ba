//! Daemon configuration with sensible defaults.
//!
//! [`DaemonConfig`] is read from an optional JSON file (every field may be
//! omitted) and then overridden by command-line flags. It converts into
//! `easel` types via [`build_pipeline`](DaemonConfig::build_pipeline) and
//! [`scheduler_config`](DaemonConfig::scheduler_config).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use easel::archive::{Archive, DEFAULT_SNAPSHOT_FILE, DayBoundary};
use easel::image::ImageProducer;
use easel::pipeline::Pipeline;
use easel::prompt::corpus::{READY_PROMPTS_FILE, SYSTEM_ROLE_FILE, USER_ROLE_FILE};
use easel::prompt::{CorpusSources, PromptCorpus, PromptSelector, PromptSynthesizer};
use easel::scheduler::{DEFAULT_EXECUTION_LOG, OverlapPolicy, SchedulerConfig};
use easel::{
    DEFAULT_IMAGE_MODEL, DEFAULT_TEXT_MODEL, ImageSize, OPENAI_BASE_URL, OpenAiClient,
    PROMPT_TEMPERATURE,
};
use serde::{Deserialize, Serialize};

/// Configuration for a daemon process.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Seconds between runs. Default: `300`.
    pub interval_secs: u64,
    /// Start the first run immediately instead of one interval in.
    pub run_immediately: bool,
    /// Parent of the per-day directories. Default: `"archive"`.
    pub archive_root: PathBuf,
    /// Always holds the most recent image. Default: `"daily_art.png"`.
    pub snapshot_path: PathBuf,
    pub execution_log: PathBuf,
    pub system_roles_file: PathBuf,
    pub user_roles_file: PathBuf,
    pub prompts_file: PathBuf,
    pub text_model: String,
    pub image_model: String,
    pub temperature: f32,
    pub image_size: ImageSize,
    pub day_boundary: DayBoundary,
    pub overlap: OverlapPolicy,
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    /// Fixed seed for prompt selection. OS entropy when unset.
    pub seed: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            run_immediately: false,
            archive_root: PathBuf::from("archive"),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_FILE),
            execution_log: PathBuf::from(DEFAULT_EXECUTION_LOG),
            system_roles_file: PathBuf::from(SYSTEM_ROLE_FILE),
            user_roles_file: PathBuf::from(USER_ROLE_FILE),
            prompts_file: PathBuf::from(READY_PROMPTS_FILE),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            temperature: PROMPT_TEMPERATURE,
            image_size: ImageSize::default(),
            day_boundary: DayBoundary::default(),
            overlap: OverlapPolicy::default(),
            base_url: OPENAI_BASE_URL.to_string(),
            seed: None,
        }
    }
}

impl DaemonConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Point all three corpus files into `dir`.
    pub fn with_corpus_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let sources = CorpusSources::in_dir(dir);
        self.system_roles_file = sources.system_roles;
        self.user_roles_file = sources.user_roles;
        self.prompts_file = sources.prompts;
        self
    }

    /// Reject settings the scheduler or backends cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_secs == 0 {
            return Err("interval must be at least one second".into());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "temperature {} is outside the accepted range 0.0..=2.0",
                self.temperature
            ));
        }
        if self.text_model.trim().is_empty() || self.image_model.trim().is_empty() {
            return Err("model names must not be empty".into());
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn corpus_sources(&self) -> CorpusSources {
        CorpusSources {
            system_roles: self.system_roles_file.clone(),
            user_roles: self.user_roles_file.clone(),
            prompts: self.prompts_file.clone(),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.interval(),
            execution_log: self.execution_log.clone(),
            overlap: self.overlap,
            run_immediately: self.run_immediately,
        }
    }

    pub fn archive(&self) -> Archive {
        Archive::new(&self.archive_root, &self.snapshot_path, self.day_boundary)
    }

    /// Wire a [`Pipeline`] around one client that serves all three backend
    /// roles.
    pub fn build_pipeline(&self, client: Arc<OpenAiClient>, corpus: Arc<PromptCorpus>) -> Pipeline {
        let selector = match self.seed {
            Some(seed) => PromptSelector::seeded(corpus, seed),
            None => PromptSelector::from_os_rng(corpus),
        };
        let synthesizer = PromptSynthesizer::new(client.clone())
            .with_model(&self.text_model)
            .with_temperature(self.temperature);
        let producer = ImageProducer::new(client.clone())
            .with_model(&self.image_model)
            .with_size(self.image_size);
        Pipeline::new(selector, synthesizer, producer, client, self.archive())
    }
}

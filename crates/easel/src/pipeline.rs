//! One complete run: prompt → image → archive.
//!
//! Stages execute strictly in sequence, each consuming the previous stage's
//! output:
//!
//! ```text
//! Idle → Selecting → [Synthesizing] → Generating → Fetching → Persisting → Recording → Idle
//! ```
//!
//! Any stage may abort the run; the error is reported through
//! [`RunEvent::Failed`] and returned to the caller. The archive directory is
//! only touched once the image bytes are in hand, so a run that fails earlier
//! leaves the filesystem untouched.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{Instrument, info, info_span};

use crate::Result;
use crate::archive::Archive;
use crate::backend::ImageFetcher;
use crate::events::{RunEvent, RunObserver, RunStage};
use crate::image::{ImageProducer, ImageReference};
use crate::prompt::{Prompt, PromptSelector, PromptSynthesizer};

/// Unique id for one run, used to correlate log lines.
pub fn generate_run_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("run-{ts:x}-{count:04x}")
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub prompt: Prompt,
    pub image: ImageReference,
    /// Name of the numbered file inside the day's directory.
    pub file_name: String,
    pub archive_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub bytes: usize,
    pub elapsed: Duration,
}

pub struct Pipeline {
    selector: PromptSelector,
    synthesizer: PromptSynthesizer,
    producer: ImageProducer,
    fetcher: Arc<dyn ImageFetcher>,
    archive: Archive,
    clock: Clock,
}

impl Pipeline {
    pub fn new(
        selector: PromptSelector,
        synthesizer: PromptSynthesizer,
        producer: ImageProducer,
        fetcher: Arc<dyn ImageFetcher>,
        archive: Archive,
    ) -> Self {
        Self {
            selector,
            synthesizer,
            producer,
            fetcher,
            archive,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock used to pick the archive day.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn selector(&self) -> &PromptSelector {
        &self.selector
    }

    /// Execute one run, reporting progress to `observer`.
    pub async fn run(&self, observer: &dyn RunObserver) -> Result<RunReport> {
        let run_id = generate_run_id();
        let span = info_span!("run", id = %run_id);
        async {
            let start = Instant::now();
            observer.on_event(&RunEvent::Started { run_id: &run_id });

            let mut stage = RunStage::Idle;
            let outcome = self.execute(&run_id, observer, &mut stage, start).await;
            match &outcome {
                Ok(report) => observer.on_event(&RunEvent::Finished {
                    run_id: &run_id,
                    elapsed: report.elapsed,
                }),
                Err(error) => observer.on_event(&RunEvent::Failed {
                    run_id: &run_id,
                    stage,
                    error,
                }),
            }
            observer.on_event(&RunEvent::Stage {
                run_id: &run_id,
                stage: RunStage::Idle,
            });
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        run_id: &str,
        observer: &dyn RunObserver,
        stage: &mut RunStage,
        start: Instant,
    ) -> Result<RunReport> {
        let mut enter = |next: RunStage| {
            *stage = next;
            observer.on_event(&RunEvent::Stage { run_id, stage: next });
        };

        enter(RunStage::Selecting);
        let choice = self.selector.choose()?;
        if choice.is_synthesis() {
            enter(RunStage::Synthesizing);
        }
        let prompt = choice.resolve(&self.synthesizer).await?;
        observer.on_event(&RunEvent::PromptReady {
            run_id,
            prompt: prompt.text(),
            source: prompt.source(),
        });

        enter(RunStage::Generating);
        let image = self.producer.produce(&prompt).await?;
        observer.on_event(&RunEvent::ImageReady {
            run_id,
            url: image.url(),
        });

        enter(RunStage::Fetching);
        let bytes = self.fetcher.fetch(image.url()).await?;

        enter(RunStage::Persisting);
        let day = self.archive.resolve_day((self.clock)()).await?;
        let (file_name, archive_path) = self.archive.next_sequence_path(&day).await?;
        info!("imgFilePath: {}", archive_path.display());
        let destinations = self.archive.destinations(&archive_path);
        let written = match self.archive.persist(&bytes, &destinations).await {
            Ok(written) => written,
            Err(e) => {
                self.archive.release_claim(&archive_path).await;
                return Err(e);
            }
        };
        observer.on_event(&RunEvent::Persisted {
            run_id,
            paths: &written,
            bytes: bytes.len(),
        });

        enter(RunStage::Recording);
        self.archive
            .append_prompt_record(&day, &file_name, prompt.text())
            .await?;
        observer.on_event(&RunEvent::PromptRecorded {
            run_id,
            log_path: &day.prompt_log_path(),
            file_name: &file_name,
        });

        Ok(RunReport {
            run_id: run_id.to_string(),
            prompt,
            image,
            file_name,
            archive_path,
            snapshot_path: self.archive.snapshot_path().to_path_buf(),
            bytes: bytes.len(),
            elapsed: start.elapsed(),
        })
    }
}

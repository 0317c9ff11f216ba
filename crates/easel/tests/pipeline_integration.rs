//! End-to-end runs against in-memory backends and a temp archive.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use easel::backend::BackendFuture;
use easel::prelude::*;
use easel::scheduler::MIN_INTERVAL;
use easel::{ChatRequest, ImageGeneration, ImageRequest};

// ── Test doubles ─────────────────────────────────────────────────────

struct FixedText {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl FixedText {
    fn replying(reply: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.map(str::to_string),
            calls: AtomicUsize::new(0),
        })
    }
}

impl TextBackend for FixedText {
    fn complete<'a>(&'a self, _request: &'a ChatRequest) -> BackendFuture<'a, Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.reply.clone();
        Box::pin(async move { Ok(reply) })
    }
}

/// Fails the first `failures` calls, then returns `url`.
struct FlakyImage {
    url: Option<String>,
    failures: usize,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FlakyImage {
    fn new(url: Option<&str>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            url: url.map(str::to_string),
            failures,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

impl ImageBackend for FlakyImage {
    fn generate<'a>(
        &'a self,
        request: &'a ImageRequest,
    ) -> BackendFuture<'a, Option<ImageGeneration>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let url = self.url.clone();
        let fail = call < self.failures;
        Box::pin(async move {
            if fail {
                return Err(ArtError::Backend("503 Service Unavailable".into()));
            }
            Ok(Some(ImageGeneration {
                url,
                revised_prompt: None,
            }))
        })
    }
}

struct StaticBytes {
    bytes: Vec<u8>,
    delay: Duration,
}

impl StaticBytes {
    fn new(bytes: Vec<u8>) -> Arc<Self> {
        Self::slow(bytes, Duration::ZERO)
    }

    fn slow(bytes: Vec<u8>, delay: Duration) -> Arc<Self> {
        Arc::new(Self { bytes, delay })
    }
}

impl ImageFetcher for StaticBytes {
    fn fetch<'a>(&'a self, _url: &'a str) -> BackendFuture<'a, Vec<u8>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.bytes.clone())
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

const EMPTY: &[&str] = &[];

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
}

fn synthesis_only() -> PromptCorpus {
    PromptCorpus::from_lines(&["You are a painter."], &["Invent a landscape."], EMPTY)
}

fn ready_only() -> PromptCorpus {
    PromptCorpus::from_lines(EMPTY, EMPTY, &["A lighthouse in fog"])
}

fn pipeline(
    dir: &Path,
    corpus: PromptCorpus,
    text: Arc<FixedText>,
    image: Arc<FlakyImage>,
    fetcher: Arc<StaticBytes>,
) -> Pipeline {
    Pipeline::new(
        PromptSelector::seeded(Arc::new(corpus), 7),
        PromptSynthesizer::new(text),
        ImageProducer::new(image),
        fetcher,
        Archive::new(dir.join("archive"), dir.join("daily_art.png"), DayBoundary::Utc),
    )
    .with_clock(noon)
}

fn working_pipeline(dir: &Path) -> Pipeline {
    pipeline(
        dir,
        synthesis_only(),
        FixedText::replying(Some("Prompt: Sunset over mountains")),
        FlakyImage::new(Some("https://img.test/a.png"), 0),
        StaticBytes::new(vec![0xFF; 10]),
    )
}

// ── Pipeline ─────────────────────────────────────────────────────────

#[tokio::test]
async fn synthesized_run_archives_image_and_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let text = FixedText::replying(Some("Prompt: Sunset over mountains"));
    let image = FlakyImage::new(Some("https://img.test/a.png"), 0);
    let pipeline = pipeline(
        dir.path(),
        synthesis_only(),
        text.clone(),
        image.clone(),
        StaticBytes::new(vec![0xFF; 10]),
    );

    let report = pipeline.run(&NoopObserver).await.unwrap();

    let day_dir = dir.path().join("archive/20240305_digital-art");
    assert_eq!(report.file_name, "20240305_image_1.png");
    assert_eq!(report.archive_path, day_dir.join("20240305_image_1.png"));
    assert_eq!(report.prompt.text(), "Sunset over mountains");
    assert_eq!(report.prompt.source(), PromptSource::Synthesized);
    assert_eq!(report.bytes, 10);

    assert_eq!(std::fs::read(&report.archive_path).unwrap(), vec![0xFF; 10]);
    assert_eq!(std::fs::read(dir.path().join("daily_art.png")).unwrap(), vec![0xFF; 10]);
    assert_eq!(
        std::fs::read_to_string(day_dir.join("prompts.txt")).unwrap(),
        "20240305_image_1.png: Sunset over mountains\n"
    );

    assert_eq!(text.calls.load(Ordering::SeqCst), 1);
    let prompts = image.prompts.lock().unwrap();
    assert!(prompts[0].starts_with("Sunset over mountains\n"));
}

#[tokio::test]
async fn ready_prompt_skips_the_text_backend() {
    let dir = tempfile::tempdir().unwrap();
    let text = FixedText::replying(Some("unused"));
    let pipeline = pipeline(
        dir.path(),
        ready_only(),
        text.clone(),
        FlakyImage::new(Some("https://img.test/b.png"), 0),
        StaticBytes::new(vec![1, 2, 3]),
    );

    let report = pipeline.run(&NoopObserver).await.unwrap();
    assert_eq!(report.prompt.text(), "A lighthouse in fog");
    assert_eq!(report.prompt.source(), PromptSource::Corpus);
    assert_eq!(text.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn consecutive_runs_number_sequentially_and_overwrite_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = working_pipeline(dir.path());

    let first = pipeline.run(&NoopObserver).await.unwrap();
    let second = pipeline.run(&NoopObserver).await.unwrap();
    assert_eq!(first.file_name, "20240305_image_1.png");
    assert_eq!(second.file_name, "20240305_image_2.png");

    let log = std::fs::read_to_string(
        dir.path().join("archive/20240305_digital-art/prompts.txt"),
    )
    .unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(log.lines().nth(1).unwrap().starts_with("20240305_image_2.png: "));
}

#[tokio::test]
async fn missing_image_url_leaves_no_trace() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        dir.path(),
        synthesis_only(),
        FixedText::replying(Some("Prompt: Sunset over mountains")),
        FlakyImage::new(None, 0),
        StaticBytes::new(vec![0xFF; 10]),
    );

    let err = pipeline.run(&NoopObserver).await.unwrap_err();
    assert!(matches!(err, ArtError::EmptyImageResult));
    assert!(!dir.path().join("archive").exists());
    assert!(!dir.path().join("daily_art.png").exists());
}

#[tokio::test]
async fn empty_synthesis_aborts_before_image_generation() {
    let dir = tempfile::tempdir().unwrap();
    let image = FlakyImage::new(Some("https://img.test/a.png"), 0);
    let pipeline = pipeline(
        dir.path(),
        synthesis_only(),
        FixedText::replying(Some("   ")),
        image.clone(),
        StaticBytes::new(vec![0xFF]),
    );

    let err = pipeline.run(&NoopObserver).await.unwrap_err();
    assert!(matches!(err, ArtError::EmptyGeneration));
    assert_eq!(image.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_corpus_is_insufficient_data() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        dir.path(),
        PromptCorpus::from_lines(EMPTY, EMPTY, EMPTY),
        FixedText::replying(Some("x")),
        FlakyImage::new(Some("https://img.test/a.png"), 0),
        StaticBytes::new(vec![0xFF]),
    );
    let err = pipeline.run(&NoopObserver).await.unwrap_err();
    assert!(matches!(err, ArtError::InsufficientData(_)));
}

#[tokio::test]
async fn stages_are_reported_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let stages = Arc::new(Mutex::new(Vec::new()));
    let sink = stages.clone();
    let observer = FnObserver::new(move |event| {
        if let RunEvent::Stage { stage, .. } = event {
            sink.lock().unwrap().push(*stage);
        }
    });

    working_pipeline(dir.path()).run(&observer).await.unwrap();

    assert_eq!(
        *stages.lock().unwrap(),
        vec![
            RunStage::Selecting,
            RunStage::Synthesizing,
            RunStage::Generating,
            RunStage::Fetching,
            RunStage::Persisting,
            RunStage::Recording,
            RunStage::Idle,
        ]
    );
}

#[tokio::test]
async fn failure_event_names_the_failing_stage() {
    let dir = tempfile::tempdir().unwrap();
    let failed_at = Arc::new(Mutex::new(None));
    let sink = failed_at.clone();
    let observer = FnObserver::new(move |event| {
        if let RunEvent::Failed { stage, .. } = event {
            *sink.lock().unwrap() = Some(*stage);
        }
    });

    let pipeline = pipeline(
        dir.path(),
        ready_only(),
        FixedText::replying(None),
        FlakyImage::new(Some("https://img.test/a.png"), 1),
        StaticBytes::new(vec![0xFF]),
    );
    let err = pipeline.run(&observer).await.unwrap_err();
    assert!(matches!(err, ArtError::Backend(_)));
    assert_eq!(*failed_at.lock().unwrap(), Some(RunStage::Generating));
}

#[tokio::test]
async fn pipelines_sharing_an_archive_never_overwrite_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = pipeline(
        dir.path(),
        ready_only(),
        FixedText::replying(None),
        FlakyImage::new(Some("https://img.test/a.png"), 0),
        StaticBytes::new(vec![1; 4]),
    );
    let one_shot = pipeline(
        dir.path(),
        ready_only(),
        FixedText::replying(None),
        FlakyImage::new(Some("https://img.test/b.png"), 0),
        StaticBytes::new(vec![2; 4]),
    );

    let first = daemon.run(&NoopObserver).await.unwrap();
    let other = one_shot.run(&NoopObserver).await.unwrap();
    let second = daemon.run(&NoopObserver).await.unwrap();

    assert_eq!(first.file_name, "20240305_image_1.png");
    assert_eq!(other.file_name, "20240305_image_2.png");
    assert_eq!(second.file_name, "20240305_image_3.png");

    let day_dir = dir.path().join("archive/20240305_digital-art");
    assert_eq!(std::fs::read(day_dir.join(&other.file_name)).unwrap(), vec![2; 4]);
    let log = std::fs::read_to_string(day_dir.join("prompts.txt")).unwrap();
    assert_eq!(log.lines().count(), 3);
}

// ── Scheduler ────────────────────────────────────────────────────────

fn fast_config(dir: &Path, overlap: OverlapPolicy) -> SchedulerConfig {
    SchedulerConfig {
        interval: Duration::from_millis(20),
        execution_log: dir.join("execution_time.log"),
        overlap,
        run_immediately: true,
    }
}

async fn wait_for(scheduler: &Scheduler, done: impl Fn(&SchedulerStats) -> bool) {
    loop {
        if done(&scheduler.stats()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn run_once_records_execution_time() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = Scheduler::new(
        Arc::new(working_pipeline(dir.path())),
        fast_config(dir.path(), OverlapPolicy::Skip),
    );

    scheduler.run_once().await.unwrap();

    let log = std::fs::read_to_string(dir.path().join("execution_time.log")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.starts_with("Execution Time: "));
    assert!(log.trim_end().ends_with("ms"));
    assert_eq!(scheduler.stats().runs_succeeded, 1);
}

#[tokio::test]
async fn scheduler_keeps_ticking_after_a_failed_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        dir.path(),
        synthesis_only(),
        FixedText::replying(Some("Prompt: Sunset over mountains")),
        FlakyImage::new(Some("https://img.test/a.png"), 1),
        StaticBytes::new(vec![0xFF; 10]),
    );
    let scheduler = Scheduler::new(
        Arc::new(pipeline),
        fast_config(dir.path(), OverlapPolicy::Skip),
    );

    let stats = tokio::time::timeout(
        Duration::from_secs(10),
        scheduler.run_until(wait_for(&scheduler, |s| s.runs_succeeded >= 1)),
    )
    .await
    .unwrap();

    assert!(stats.runs_failed >= 1);
    assert!(stats.runs_succeeded >= 1);
    let log = std::fs::read_to_string(dir.path().join("execution_time.log")).unwrap();
    assert!(log.lines().count() >= 2);
    assert!(log.lines().all(|l| l.starts_with("Execution Time: ")));
    assert!(dir.path().join("daily_art.png").exists());
}

#[tokio::test]
async fn busy_slot_skips_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        dir.path(),
        ready_only(),
        FixedText::replying(None),
        FlakyImage::new(Some("https://img.test/a.png"), 0),
        StaticBytes::slow(vec![7; 4], Duration::from_millis(150)),
    );
    let skipped = Arc::new(AtomicUsize::new(0));
    let counter = skipped.clone();
    let scheduler = Scheduler::new(
        Arc::new(pipeline),
        fast_config(dir.path(), OverlapPolicy::Skip),
    )
    .with_observer(Arc::new(FnObserver::new(move |event| {
        if matches!(event, RunEvent::TickSkipped { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    })));

    let stats = tokio::time::timeout(
        Duration::from_secs(10),
        scheduler.run_until(wait_for(&scheduler, |s| {
            s.runs_succeeded >= 1 && s.ticks_skipped >= 1
        })),
    )
    .await
    .unwrap();

    assert!(stats.ticks_skipped >= 1);
    assert_eq!(skipped.load(Ordering::SeqCst) as u64, stats.ticks_skipped);
    assert_eq!(stats.runs_started, stats.runs_succeeded + stats.runs_failed);

    // Runs never overlapped, so file numbers are dense.
    let day_dir = dir.path().join("archive/20240305_digital-art");
    let log = std::fs::read_to_string(day_dir.join("prompts.txt")).unwrap();
    for (i, line) in log.lines().enumerate() {
        assert!(line.starts_with(&format!("20240305_image_{}.png: ", i + 1)));
    }
}

#[tokio::test]
async fn queue_policy_runs_a_waiting_tick() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(
        dir.path(),
        ready_only(),
        FixedText::replying(None),
        FlakyImage::new(Some("https://img.test/a.png"), 0),
        StaticBytes::slow(vec![7; 4], Duration::from_millis(80)),
    );
    let scheduler = Scheduler::new(
        Arc::new(pipeline),
        fast_config(dir.path(), OverlapPolicy::Queue),
    );

    let stats = tokio::time::timeout(
        Duration::from_secs(10),
        scheduler.run_until(wait_for(&scheduler, |s| s.runs_succeeded >= 2)),
    )
    .await
    .unwrap();

    assert!(stats.runs_succeeded >= 2);
    assert_eq!(stats.runs_failed, 0);
}

#[tokio::test]
async fn zero_interval_is_raised_to_the_minimum() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = Scheduler::new(
        Arc::new(working_pipeline(dir.path())),
        SchedulerConfig {
            interval: Duration::ZERO,
            run_immediately: false,
            ..fast_config(dir.path(), OverlapPolicy::Skip)
        },
    );
    assert_eq!(scheduler.config().interval, MIN_INTERVAL);

    let stats = tokio::time::timeout(Duration::from_secs(10), scheduler.run_until(async {}))
        .await
        .unwrap();
    assert_eq!(stats.runs_started, 0);
}

#[tokio::test]
async fn run_once_after_shutdown_reports_a_closed_slot() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = Scheduler::new(
        Arc::new(working_pipeline(dir.path())),
        SchedulerConfig {
            run_immediately: false,
            ..fast_config(dir.path(), OverlapPolicy::Skip)
        },
    );

    scheduler.run_until(async {}).await;

    let err = scheduler.run_once().await.unwrap_err();
    assert!(matches!(err, ArtError::SlotClosed), "unexpected error: {err}");
    assert!(!dir.path().join("execution_time.log").exists());
}

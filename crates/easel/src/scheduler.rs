//! Fixed-interval driver for [`Pipeline`] runs.
//!
//! Each tick spawns a run onto a [`JoinSet`] so the tick loop never waits on
//! backend I/O. A one-permit [`Semaphore`] keeps at most one run in flight;
//! what happens to a tick that finds the slot taken is decided by
//! [`OverlapPolicy`]. Every run is timed and the duration appended to the
//! execution log whether the run succeeded or not. Failures are logged and
//! swallowed so the next tick still fires.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::archive::append_line;
use crate::events::{NoopObserver, RunEvent, RunObserver};
use crate::pipeline::{Pipeline, RunReport};
use crate::{ArtError, Result};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_EXECUTION_LOG: &str = "execution_time.log";
/// Shortest interval a scheduler will tick at. Zero is raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// What a tick does when the previous run has not finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Drop the tick.
    #[default]
    Skip,
    /// Wait for the running slot. Only one tick waits; later ones are dropped.
    Queue,
}

impl std::str::FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "queue" => Ok(Self::Queue),
            other => Err(format!("unknown overlap policy '{other}' (expected skip or queue)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    /// File that gains one `Execution Time: ...` line per run.
    pub execution_log: PathBuf,
    pub overlap: OverlapPolicy,
    /// Fire the first run at startup instead of one interval later.
    pub run_immediately: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            execution_log: PathBuf::from(DEFAULT_EXECUTION_LOG),
            overlap: OverlapPolicy::default(),
            run_immediately: false,
        }
    }
}

/// Counters accumulated over the scheduler's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub ticks_skipped: u64,
}

/// The line appended to the execution log for one run.
pub fn execution_time_line(elapsed: Duration) -> String {
    format!("Execution Time: {:.2}ms", elapsed.as_secs_f64() * 1000.0)
}

// ── Shared run state ────────────────────────────────────────────────

struct Shared {
    pipeline: Arc<Pipeline>,
    observer: Arc<dyn RunObserver>,
    execution_log: PathBuf,
    stats: Mutex<SchedulerStats>,
}

impl Shared {
    fn bump(&self, f: impl FnOnce(&mut SchedulerStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut stats);
    }

    /// One run with timing. The permit is held until the run completes.
    async fn timed_run(&self, _permit: OwnedSemaphorePermit) -> Result<RunReport> {
        self.bump(|s| s.runs_started += 1);
        let start = Instant::now();
        let outcome = self.pipeline.run(self.observer.as_ref()).await;
        let line = execution_time_line(start.elapsed());

        info!("{line}");
        if let Err(e) = append_line(&self.execution_log, &line).await {
            warn!("Failed to record execution time: {e}");
        }

        match &outcome {
            Ok(report) => {
                self.bump(|s| s.runs_succeeded += 1);
                debug!("Run {} archived {}", report.run_id, report.file_name);
            }
            Err(e) => {
                self.bump(|s| s.runs_failed += 1);
                error!("Error fetching image: {e}");
            }
        }
        outcome
    }
}

// ── Scheduler ───────────────────────────────────────────────────────

pub struct Scheduler {
    shared: Arc<Shared>,
    config: SchedulerConfig,
    slot: Arc<Semaphore>,
    waiting: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, mut config: SchedulerConfig) -> Self {
        if config.interval.is_zero() {
            warn!("Zero interval raised to {MIN_INTERVAL:?}");
            config.interval = MIN_INTERVAL;
        }
        Self {
            shared: Arc::new(Shared {
                pipeline,
                observer: Arc::new(NoopObserver),
                execution_log: config.execution_log.clone(),
                stats: Mutex::new(SchedulerStats::default()),
            }),
            config,
            slot: Arc::new(Semaphore::new(1)),
            waiting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Must be called before the scheduler starts.
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.observer = observer,
            None => warn!("Observer ignored: scheduler already running"),
        }
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn execution_log(&self) -> &Path {
        &self.shared.execution_log
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.shared.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A single guarded, timed run. Waits for any in-flight run first.
    ///
    /// Fails with [`ArtError::SlotClosed`] once [`run_until`](Self::run_until)
    /// has shut down.
    pub async fn run_once(&self) -> Result<RunReport> {
        let permit = self
            .slot
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ArtError::SlotClosed)?;
        self.shared.bump(|s| s.ticks += 1);
        self.shared.timed_run(permit).await
    }

    /// Tick until `shutdown` resolves, then wait for in-flight runs.
    ///
    /// On shutdown the run slot is closed: a queued tick is dropped and later
    /// calls to [`run_once`](Self::run_once) fail.
    pub async fn run_until<F>(&self, shutdown: F) -> SchedulerStats
    where
        F: Future<Output = ()>,
    {
        let start = if self.config.run_immediately {
            tokio::time::Instant::now()
        } else {
            tokio::time::Instant::now() + self.config.interval
        };
        let mut ticker = interval_at(start, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Scheduler started: every {:?}, overlap={:?}",
            self.config.interval, self.config.overlap
        );

        let mut tasks = JoinSet::new();
        let mut tick: u64 = 0;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, waiting for in-flight runs");
                    break;
                }
                _ = ticker.tick() => {
                    tick += 1;
                    self.on_tick(tick, &mut tasks);
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Run task panicked: {e}");
                    }
                }
            }
        }

        self.slot.close();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Run task panicked: {e}");
            }
        }
        let stats = self.stats();
        info!(
            "Scheduler stopped: {} ticks, {} runs ({} ok, {} failed), {} skipped",
            stats.ticks, stats.runs_started, stats.runs_succeeded, stats.runs_failed, stats.ticks_skipped
        );
        stats
    }

    fn on_tick(&self, tick: u64, tasks: &mut JoinSet<()>) {
        self.shared.bump(|s| s.ticks += 1);

        if let Ok(permit) = self.slot.clone().try_acquire_owned() {
            let shared = self.shared.clone();
            tasks.spawn(async move {
                let _ = shared.timed_run(permit).await;
            });
            return;
        }

        if self.config.overlap == OverlapPolicy::Queue && !self.waiting.swap(true, Ordering::SeqCst)
        {
            debug!("Tick {tick} queued behind the running slot");
            let shared = self.shared.clone();
            let slot = self.slot.clone();
            let waiting = self.waiting.clone();
            tasks.spawn(async move {
                let permit = slot.acquire_owned().await;
                waiting.store(false, Ordering::SeqCst);
                if let Ok(permit) = permit {
                    let _ = shared.timed_run(permit).await;
                }
            });
            return;
        }

        self.shared.bump(|s| s.ticks_skipped += 1);
        self.shared
            .observer
            .on_event(&RunEvent::TickSkipped { tick });
    }
}

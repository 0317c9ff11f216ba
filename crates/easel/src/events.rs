//! Run lifecycle events and observers.
//!
//! The [`Pipeline`](crate::pipeline::Pipeline) and the
//! [`Scheduler`](crate::scheduler::Scheduler) report progress through
//! [`RunEvent`] values. Callers implement [`RunObserver`] to react to them.
//!
//! | Observer | Use case |
//! |----------|----------|
//! | [`NoopObserver`] | Tests or silent runs |
//! | [`LoggingObserver`] | Step narration via `tracing` |
//! | [`FnObserver`] | Quick closures (counters, test assertions) |
//! | [`CompositeObserver`] | Fan out to several observers in order |

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ArtError;
use crate::prompt::PromptSource;

/// Pipeline stage a run is in. Any stage may fall back to `Idle` on error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Idle,
    Selecting,
    Synthesizing,
    Generating,
    Fetching,
    Persisting,
    Recording,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStage::Idle => "idle",
            RunStage::Selecting => "selecting",
            RunStage::Synthesizing => "synthesizing",
            RunStage::Generating => "generating",
            RunStage::Fetching => "fetching",
            RunStage::Persisting => "persisting",
            RunStage::Recording => "recording",
        };
        f.write_str(name)
    }
}

/// Events emitted during a run and by the scheduler around runs.
#[derive(Debug)]
pub enum RunEvent<'a> {
    /// A run has begun.
    Started { run_id: &'a str },
    /// The run moved to a new stage.
    Stage { run_id: &'a str, stage: RunStage },
    /// The prompt for this run is settled.
    PromptReady {
        run_id: &'a str,
        prompt: &'a str,
        source: PromptSource,
    },
    /// The image backend returned a reference.
    ImageReady { run_id: &'a str, url: &'a str },
    /// Bytes were written to every destination.
    Persisted {
        run_id: &'a str,
        paths: &'a [std::path::PathBuf],
        bytes: usize,
    },
    /// The prompt log gained a line.
    PromptRecorded {
        run_id: &'a str,
        log_path: &'a Path,
        file_name: &'a str,
    },
    /// The run completed successfully.
    Finished { run_id: &'a str, elapsed: Duration },
    /// The run aborted. The scheduler keeps going.
    Failed {
        run_id: &'a str,
        stage: RunStage,
        error: &'a ArtError,
    },
    /// A tick arrived while a run was still in flight and was dropped.
    TickSkipped { tick: u64 },
}

pub trait RunObserver: Send + Sync {
    fn on_event(&self, event: &RunEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Closure-backed observer.
pub struct FnObserver<F>(F)
where
    F: Fn(&RunEvent<'_>) + Send + Sync;

impl<F> FnObserver<F>
where
    F: Fn(&RunEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> RunObserver for FnObserver<F>
where
    F: Fn(&RunEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &RunEvent<'_>) {
        (self.0)(event)
    }
}

/// Forwards each event to every child observer in insertion order.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Box<dyn RunObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: impl RunObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn with_if(self, condition: bool, observer: impl RunObserver + 'static) -> Self {
        if condition { self.with(observer) } else { self }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl RunObserver for CompositeObserver {
    fn on_event(&self, event: &RunEvent<'_>) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

/// Narrates runs through `tracing`.
pub struct LoggingObserver;

impl RunObserver for LoggingObserver {
    fn on_event(&self, event: &RunEvent<'_>) {
        match event {
            RunEvent::Started { run_id } => info!("[{run_id}] Fetching a new image..."),
            RunEvent::Stage { run_id, stage } => debug!("[{run_id}] stage: {stage}"),
            RunEvent::PromptReady {
                run_id,
                prompt,
                source,
            } => {
                let preview: String = prompt.chars().take(200).collect();
                info!(
                    "[{run_id}] {source} prompt: {preview}{}",
                    if prompt.chars().count() > 200 { "..." } else { "" }
                );
            }
            RunEvent::ImageReady { run_id, url } => debug!("[{run_id}] image ready at {url}"),
            RunEvent::Persisted {
                run_id,
                paths,
                bytes,
            } => debug!(
                "[{run_id}] wrote {bytes} bytes to {} destination(s)",
                paths.len()
            ),
            RunEvent::PromptRecorded {
                run_id, file_name, ..
            } => debug!("[{run_id}] recorded prompt for {file_name}"),
            RunEvent::Finished { run_id, elapsed } => {
                info!("[{run_id}] finished in {:.1}s", elapsed.as_secs_f64())
            }
            RunEvent::Failed {
                run_id,
                stage,
                error,
            } => warn!("[{run_id}] run aborted while {stage}: {error}"),
            RunEvent::TickSkipped { tick } => {
                warn!("Tick {tick} skipped: previous run still in progress")
            }
        }
    }
}

//! Convenience re-exports for common `easel` types.
//!
//! ```ignore
//! use easel::prelude::*;
//! ```
//!
//! Covers wiring a [`Pipeline`] from an [`OpenAiClient`] and driving it with
//! a [`Scheduler`]. Request/response shapes and archive internals stay in
//! their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ArtError, ImageSize, OpenAiClient, Result};

// ── Collaborators ───────────────────────────────────────────────────
pub use crate::backend::{ImageBackend, ImageFetcher, TextBackend};

// ── Prompts and images ──────────────────────────────────────────────
pub use crate::image::{ImageProducer, ImageReference};
pub use crate::prompt::{
    CorpusSources, Prompt, PromptCorpus, PromptSelector, PromptSource, PromptSynthesizer,
};

// ── Runs ────────────────────────────────────────────────────────────
pub use crate::archive::{Archive, DayBoundary};
pub use crate::events::{
    CompositeObserver, FnObserver, LoggingObserver, NoopObserver, RunEvent, RunObserver, RunStage,
};
pub use crate::pipeline::{Pipeline, RunReport};
pub use crate::scheduler::{OverlapPolicy, Scheduler, SchedulerConfig, SchedulerStats};

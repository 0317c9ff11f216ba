//! Prompt sourcing: corpora, the selection policy, and synthesis.
//!
//! - [`corpus`] - [`PromptCorpus`], three line-based corpora loaded once at
//!   startup and shared read-only across runs.
//! - [`selector`] - [`PromptSelector`], the per-run coin flip between
//!   synthesizing a fresh prompt and reusing a ready-made one.
//! - [`synthesizer`] - [`PromptSynthesizer`], the system/user exchange with
//!   the text backend and label extraction from its reply.

pub mod corpus;
pub mod selector;
pub mod synthesizer;

pub use corpus::{CorpusSources, PromptCorpus, load_lines};
pub use selector::{PromptChoice, PromptSelector};
pub use synthesizer::{PromptSynthesizer, extract_prompt};

/// Where a prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptSource {
    /// Written by the text backend for this run.
    Synthesized,
    /// Drawn verbatim from the ready-made corpus.
    Corpus,
}

impl std::fmt::Display for PromptSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptSource::Synthesized => write!(f, "generated"),
            PromptSource::Corpus => write!(f, "random"),
        }
    }
}

/// A non-empty, trimmed instruction for the image backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    text: String,
    source: PromptSource,
}

impl Prompt {
    /// Returns `None` when `text` is empty or whitespace-only.
    pub fn new(text: impl Into<String>, source: PromptSource) -> Option<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let text = if trimmed.len() == text.len() {
            text
        } else {
            trimmed.to_string()
        };
        Some(Self { text, source })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> PromptSource {
        self.source
    }
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

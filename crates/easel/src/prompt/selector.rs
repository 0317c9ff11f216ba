//! Per-run prompt selection policy.
//!
//! Each run flips a fair coin: heads synthesizes a fresh prompt from one
//! random system-role line and one random user-role line, tails reuses a
//! random ready-made prompt. A branch whose corpora are empty drops out of
//! the pool, in which case the remaining branch is taken without a flip.
//!
//! The random source is injected so a seeded RNG makes selection
//! reproducible.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::info;

use super::corpus::PromptCorpus;
use super::synthesizer::PromptSynthesizer;
use super::{Prompt, PromptSource};
use crate::{ArtError, Result};

/// Probability of taking the synthesis branch when both branches are
/// available.
pub const SYNTHESIS_PROBABILITY: f64 = 0.5;

/// The outcome of the coin flip, before any backend is involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptChoice {
    /// Ask the text backend for a prompt using these role lines.
    Synthesize { system: String, user: String },
    /// Use this ready-made prompt as-is.
    Ready(String),
}

pub struct PromptSelector {
    corpus: Arc<PromptCorpus>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl PromptSelector {
    pub fn new(corpus: Arc<PromptCorpus>, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            corpus,
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Selector backed by an OS-seeded [`StdRng`].
    pub fn from_os_rng(corpus: Arc<PromptCorpus>) -> Self {
        Self::new(corpus, StdRng::from_os_rng())
    }

    /// Selector with a fixed seed; identical seeds yield identical choices.
    pub fn seeded(corpus: Arc<PromptCorpus>, seed: u64) -> Self {
        Self::new(corpus, StdRng::seed_from_u64(seed))
    }

    pub fn corpus(&self) -> &PromptCorpus {
        &self.corpus
    }

    /// Flip the coin and draw the corpus lines for the chosen branch.
    pub fn choose(&self) -> Result<PromptChoice> {
        let corpus = &*self.corpus;
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        let synthesize = match (corpus.can_synthesize(), corpus.has_prompts()) {
            (true, true) => rng.random_bool(SYNTHESIS_PROBABILITY),
            (true, false) => true,
            (false, true) => false,
            (false, false) => {
                return Err(ArtError::InsufficientData(
                    "no role lines for synthesis and no ready-made prompts".into(),
                ));
            }
        };

        if synthesize {
            let system = pick(&mut *rng, corpus.system_roles());
            let user = pick(&mut *rng, corpus.user_roles());
            Ok(PromptChoice::Synthesize { system, user })
        } else {
            Ok(PromptChoice::Ready(pick(&mut *rng, corpus.prompts())))
        }
    }

    /// Produce this run's prompt, calling the synthesizer on the synthesis
    /// branch.
    pub async fn select(&self, synthesizer: &PromptSynthesizer) -> Result<Prompt> {
        self.choose()?.resolve(synthesizer).await
    }
}

impl PromptChoice {
    pub fn is_synthesis(&self) -> bool {
        matches!(self, PromptChoice::Synthesize { .. })
    }

    /// Turn the choice into a prompt, calling the synthesizer if needed.
    pub async fn resolve(self, synthesizer: &PromptSynthesizer) -> Result<Prompt> {
        match self {
            PromptChoice::Synthesize { system, user } => {
                info!("System Content: {system}");
                info!("User Content: {user}");
                let prompt = synthesizer.synthesize(&system, &user).await?;
                info!("Generated Prompt: {prompt}");
                Ok(prompt)
            }
            PromptChoice::Ready(text) => {
                let prompt = Prompt::new(text, PromptSource::Corpus).ok_or_else(|| {
                    ArtError::InsufficientData("ready-made prompt was blank".into())
                })?;
                info!("Using Random Prompt: {prompt}");
                Ok(prompt)
            }
        }
    }
}

/// Uniform draw from a non-empty slice.
fn pick(rng: &mut dyn RngCore, lines: &[String]) -> String {
    let idx = rng.random_range(0..lines.len());
    lines[idx].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields the same word forever.
    struct ConstRng(u64);

    impl RngCore for ConstRng {
        fn next_u32(&mut self) -> u32 {
            self.0 as u32
        }

        fn next_u64(&mut self) -> u64 {
            self.0
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(self.0 as u8);
        }
    }

    fn full_corpus() -> Arc<PromptCorpus> {
        Arc::new(PromptCorpus::from_lines(
            &["sys-a", "sys-b", "sys-c"],
            &["user-a", "user-b"],
            &["ready-1", "ready-2", "ready-3", "ready-4"],
        ))
    }

    #[test]
    fn seeded_selection_is_reproducible() {
        let a = PromptSelector::seeded(full_corpus(), 42);
        let b = PromptSelector::seeded(full_corpus(), 42);
        let seq_a: Vec<_> = (0..32).map(|_| a.choose().unwrap()).collect();
        let seq_b: Vec<_> = (0..32).map(|_| b.choose().unwrap()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn both_branches_are_reachable() {
        let selector = PromptSelector::seeded(full_corpus(), 7);
        let choices: Vec<_> = (0..200).map(|_| selector.choose().unwrap()).collect();
        assert!(
            choices
                .iter()
                .any(|c| matches!(c, PromptChoice::Synthesize { .. }))
        );
        assert!(choices.iter().any(|c| matches!(c, PromptChoice::Ready(_))));
    }

    #[test]
    fn choices_come_from_the_corpus() {
        let corpus = full_corpus();
        let selector = PromptSelector::seeded(corpus.clone(), 99);
        for _ in 0..100 {
            match selector.choose().unwrap() {
                PromptChoice::Synthesize { system, user } => {
                    assert!(corpus.system_roles().contains(&system));
                    assert!(corpus.user_roles().contains(&user));
                }
                PromptChoice::Ready(p) => {
                    assert!(corpus.prompts().contains(&p));
                    assert!(!p.trim().is_empty());
                }
            }
        }
    }

    #[test]
    fn only_ready_prompts_skips_the_coin_flip() {
        let corpus = Arc::new(PromptCorpus::from_lines(&[], &["user"], &["only"]));
        // A constant RNG would always land on the same side of the flip.
        let selector = PromptSelector::new(corpus, ConstRng(0));
        for _ in 0..10 {
            assert_eq!(selector.choose().unwrap(), PromptChoice::Ready("only".into()));
        }
    }

    #[test]
    fn only_role_lines_always_synthesizes() {
        let corpus = Arc::new(PromptCorpus::from_lines(&["s"], &["u"], &[]));
        let selector = PromptSelector::new(corpus, ConstRng(u64::MAX));
        assert_eq!(
            selector.choose().unwrap(),
            PromptChoice::Synthesize {
                system: "s".into(),
                user: "u".into()
            }
        );
    }

    #[test]
    fn empty_corpus_is_insufficient_data() {
        let selector = PromptSelector::seeded(Arc::new(PromptCorpus::default()), 1);
        let err = selector.choose().unwrap_err();
        assert!(matches!(err, ArtError::InsufficientData(_)));
    }
}

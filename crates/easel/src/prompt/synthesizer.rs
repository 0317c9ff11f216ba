//! Prompt synthesis through the text backend.
//!
//! The backend gets a two-message exchange (system role, user role) and
//! answers in free text. Models often wrap the answer in a labelled line such
//! as `Prompt: ...`; [`extract_prompt`] keeps only what follows the first
//! label, otherwise the whole reply.

use std::sync::Arc;

use tracing::debug;

use super::{Prompt, PromptSource};
use crate::backend::TextBackend;
use crate::{ArtError, ChatRequest, DEFAULT_TEXT_MODEL, Message, PROMPT_TEMPERATURE, Result};

const PROMPT_LABEL: &str = "prompt:";

/// Keep the text after the first case-insensitive `Prompt:` label, trimmed,
/// newlines included. Without a label, the whole trimmed reply.
pub fn extract_prompt(reply: &str) -> &str {
    let trimmed = reply.trim();
    // ASCII lowercasing keeps byte offsets aligned with `trimmed`.
    let lowered = trimmed.to_ascii_lowercase();
    match lowered
        .find(PROMPT_LABEL)
        .and_then(|idx| trimmed.get(idx + PROMPT_LABEL.len()..))
    {
        Some(rest) => rest.trim(),
        None => trimmed,
    }
}

pub struct PromptSynthesizer {
    backend: Arc<dyn TextBackend>,
    model: String,
    temperature: f32,
}

impl PromptSynthesizer {
    pub fn new(backend: Arc<dyn TextBackend>) -> Self {
        Self {
            backend,
            model: DEFAULT_TEXT_MODEL.to_string(),
            temperature: PROMPT_TEMPERATURE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The request sent for a system/user pair.
    pub fn request(&self, system: &str, user: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::system(system), Message::user(user)],
            temperature: self.temperature,
            ..Default::default()
        }
    }

    pub async fn synthesize(&self, system: &str, user: &str) -> Result<Prompt> {
        if system.trim().is_empty() || user.trim().is_empty() {
            return Err(ArtError::InsufficientData(
                "system or user content is missing for generating a prompt".into(),
            ));
        }

        let request = self.request(system, user);
        let reply = self
            .backend
            .complete(&request)
            .await?
            .ok_or(ArtError::EmptyGeneration)?;
        debug!("Synthesis reply: {} chars", reply.chars().count());

        if reply.trim().is_empty() {
            return Err(ArtError::EmptyGeneration);
        }
        Prompt::new(extract_prompt(&reply), PromptSource::Synthesized)
            .ok_or(ArtError::EmptyGeneration)
    }
}

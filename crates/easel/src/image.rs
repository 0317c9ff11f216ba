//! Image generation: style directive, request shape, reference validation.

use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::ImageBackend;
use crate::prompt::Prompt;
use crate::{ArtError, DEFAULT_IMAGE_MODEL, ImageRequest, ImageSize, Result};

/// Appended to every prompt before it is sent to the image backend.
pub const SAFETY_SUFFIX: &str = "If the image includes people or animals, ensure their eyes, \
faces, and bodies are realistically proportioned and free from distortions, maintaining a \
natural and cohesive appearance.";

/// A validated, fetchable reference to a rendered image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    url: String,
    revised_prompt: Option<String>,
}

impl ImageReference {
    /// Validate a raw reference: non-blank, absolute, `http` or `https`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ArtError::EmptyImageResult);
        }
        let url = reqwest::Url::parse(raw)
            .map_err(|e| ArtError::InvalidImageReference(format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ArtError::InvalidImageReference(format!(
                "{raw}: unsupported scheme '{}'",
                url.scheme()
            )));
        }
        Ok(Self {
            url: raw.to_string(),
            revised_prompt: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The prompt the backend says it actually rendered, if it rewrote ours.
    pub fn revised_prompt(&self) -> Option<&str> {
        self.revised_prompt.as_deref()
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}

/// Full text sent to the image backend for `prompt`.
pub fn styled_prompt(prompt: &str) -> String {
    format!("{prompt}\n{SAFETY_SUFFIX}")
}

pub struct ImageProducer {
    backend: Arc<dyn ImageBackend>,
    model: String,
    size: ImageSize,
}

impl ImageProducer {
    pub fn new(backend: Arc<dyn ImageBackend>) -> Self {
        Self {
            backend,
            model: DEFAULT_IMAGE_MODEL.to_string(),
            size: ImageSize::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    /// The single-image request for `prompt`.
    pub fn request(&self, prompt: &Prompt) -> ImageRequest {
        ImageRequest {
            model: self.model.clone(),
            prompt: styled_prompt(prompt.text()),
            n: 1,
            size: self.size,
        }
    }

    /// Render `prompt` and return a reference to the result. No retries.
    pub async fn produce(&self, prompt: &Prompt) -> Result<ImageReference> {
        let request = self.request(prompt);
        let generation = self
            .backend
            .generate(&request)
            .await?
            .ok_or(ArtError::EmptyImageResult)?;

        let url = generation.url.as_deref().ok_or(ArtError::EmptyImageResult)?;
        let mut reference = ImageReference::parse(url)?;
        if let Some(revised) = generation.revised_prompt.filter(|r| !r.trim().is_empty()) {
            debug!("Backend revised prompt: {revised}");
            reference.revised_prompt = Some(revised);
        }
        info!("Image URL: {reference}");
        Ok(reference)
    }
}

//! Scheduled generative-art pipeline.
//!
//! `easel` periodically produces a piece of generated artwork: it picks or
//! synthesizes a textual prompt, asks an image model to render it, and files
//! the result into a dated archive next to a rolling "latest" snapshot,
//! recording the prompt that produced each image.
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use easel::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ArtError> {
//!     let client = Arc::new(OpenAiClient::new(std::env::var("OPENAI_API_KEY").unwrap())?);
//!     let corpus = Arc::new(PromptCorpus::load(&CorpusSources::in_dir(".")));
//!
//!     let pipeline = Arc::new(Pipeline::new(
//!         PromptSelector::from_os_rng(corpus),
//!         PromptSynthesizer::new(client.clone()),
//!         ImageProducer::new(client.clone()),
//!         client,
//!         Archive::new("archive", "daily_art.png", DayBoundary::Utc),
//!     ));
//!
//!     Scheduler::new(pipeline, SchedulerConfig::default())
//!         .with_observer(Arc::new(LoggingObserver))
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`prompt`] | Line corpora, the random selection policy, prompt synthesis via the text backend |
//! | [`image`] | Image request with the fixed style directive, reference validation |
//! | [`archive`] | Daily directories, sequence numbering, multi-destination writes, prompt log |
//! | [`pipeline`] | One complete run from prompt to archived file |
//! | [`scheduler`] | Fixed-interval trigger, run guard, execution-time log |
//! | [`events`] | [`RunEvent`](events::RunEvent) narration and observers |
//! | [`backend`] | Collaborator traits implemented by [`OpenAiClient`] and by test doubles |

pub mod archive;
pub mod backend;
pub mod error;
pub mod events;
pub mod image;
pub mod pipeline;
pub mod prelude;
pub mod prompt;
pub mod scheduler;

pub use error::{ArtError, Result};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

/// Default API base for OpenAI-compatible endpoints.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for prompt synthesis.
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o";

/// Default model for image generation.
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// Sampling temperature used for prompt synthesis.
pub const PROMPT_TEMPERATURE: f32 = 0.7;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ── Chat types ─────────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug, Default, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

/// Role of a message in the exchange.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// A message in the exchange.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Clean return type from [`OpenAiClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

// ── Image types ────────────────────────────────────────────────────

/// Rendered image dimensions accepted by the image endpoint.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ImageSize {
    #[serde(rename = "1024x1024")]
    Square,
    #[default]
    #[serde(rename = "1792x1024")]
    Wide,
    #[serde(rename = "1024x1792")]
    Tall,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Wide => "1792x1024",
            ImageSize::Tall => "1024x1792",
        }
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImageSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "1024x1024" | "square" => Ok(ImageSize::Square),
            "1792x1024" | "wide" => Ok(ImageSize::Wide),
            "1024x1792" | "tall" => Ok(ImageSize::Tall),
            other => Err(format!(
                "unsupported image size '{other}' (expected 1024x1024, 1792x1024 or 1024x1792)"
            )),
        }
    }
}

/// Image generation request body.
#[derive(Serialize, Debug, Clone)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: ImageSize,
}

/// One rendered image as reported by the image endpoint.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ImageGeneration {
    pub url: Option<String>,
    /// The prompt the backend actually rendered, when it rewrote ours.
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawImageResponse {
    #[serde(default)]
    data: Vec<ImageGeneration>,
}

#[derive(Deserialize, Debug)]
struct RawErrorEnvelope {
    error: Option<ApiErrorResponse>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Decode a JSON response body, surfacing HTTP and API-level errors.
fn decode_response<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    text: &str,
    endpoint: &str,
) -> Result<T> {
    if let Ok(RawErrorEnvelope { error: Some(err) }) = serde_json::from_str(text) {
        return Err(ArtError::Backend(format!(
            "{endpoint} API error (HTTP {status}): {}",
            err.message
        )));
    }
    if !status.is_success() {
        return Err(ArtError::Backend(format!("{endpoint} API HTTP {status}: {text}")));
    }
    serde_json::from_str(text)
        .map_err(|e| ArtError::Backend(format!("failed to parse {endpoint} response: {e}")))
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for OpenAI-compatible chat and image endpoints.
///
/// Implements [`TextBackend`](backend::TextBackend),
/// [`ImageBackend`](backend::ImageBackend) and
/// [`ImageFetcher`](backend::ImageFetcher).
pub struct OpenAiClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) base_url: String,
}

impl OpenAiClient {
    /// Create a client against the default OpenAI base URL.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, OPENAI_BASE_URL)
    }

    /// Create a client against a custom OpenAI-compatible base URL.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("easel/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ArtError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ArtError::Backend(format!("request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ArtError::Backend(format!("failed to read response: {e}")))?;

        debug!(
            "{path}: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        decode_response(status, &text, path)
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion> {
        debug!(
            "Chat request: model={}, messages={}, temp={}",
            body.model,
            body.messages.len(),
            body.temperature,
        );

        let parsed: RawChatResponse = self.post_json("chat/completions", body).await?;

        if let Some(ref usage) = parsed.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }

        let choice = parsed.choices.and_then(|c| c.into_iter().next());
        Ok(match choice {
            Some(c) => ChatCompletion {
                content: c.message.content,
                usage: parsed.usage,
            },
            None => {
                debug!("Chat output: empty (no choices)");
                ChatCompletion {
                    content: None,
                    usage: parsed.usage,
                }
            }
        })
    }

    /// Request rendered images. Returns the first entry, if any.
    pub async fn generate_image(&self, body: &ImageRequest) -> Result<Option<ImageGeneration>> {
        debug!(
            "Image request: model={}, n={}, size={}, prompt={} chars",
            body.model,
            body.n,
            body.size,
            body.prompt.chars().count(),
        );
        let parsed: RawImageResponse = self.post_json("images/generations", body).await?;
        Ok(parsed.data.into_iter().next())
    }

    /// Download the bytes behind a rendered-image URL.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let start = Instant::now();
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArtError::Backend(format!("download failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ArtError::Backend(format!("download HTTP {status} for {url}")));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ArtError::Backend(format!("failed to read image body: {e}")))?;
        debug!(
            "Downloaded {} bytes in {:.1}s",
            bytes.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(bytes.to_vec())
    }
}

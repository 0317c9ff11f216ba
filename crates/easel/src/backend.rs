//! Collaborator seams: text generation, image generation, byte retrieval.
//!
//! The pipeline only talks to these traits. [`OpenAiClient`] implements all
//! three against OpenAI-compatible HTTP endpoints; tests substitute in-memory
//! doubles. Methods return boxed futures so the traits stay object-safe and
//! the pipeline can hold `Arc<dyn TextBackend>` and friends.

use crate::{ChatRequest, ImageGeneration, ImageRequest, OpenAiClient, Result};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every backend method.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Turns a system/user message pair into free text.
pub trait TextBackend: Send + Sync {
    /// Returns the first choice's text, or `None` when the backend produced
    /// nothing.
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> BackendFuture<'a, Option<String>>;
}

/// Renders a prompt into an image reference.
pub trait ImageBackend: Send + Sync {
    fn generate<'a>(&'a self, request: &'a ImageRequest)
    -> BackendFuture<'a, Option<ImageGeneration>>;
}

/// Retrieves the bytes behind an image reference.
pub trait ImageFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BackendFuture<'a, Vec<u8>>;
}

impl TextBackend for OpenAiClient {
    fn complete<'a>(&'a self, request: &'a ChatRequest) -> BackendFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.chat(request).await?.content) })
    }
}

impl ImageBackend for OpenAiClient {
    fn generate<'a>(
        &'a self,
        request: &'a ImageRequest,
    ) -> BackendFuture<'a, Option<ImageGeneration>> {
        Box::pin(self.generate_image(request))
    }
}

impl ImageFetcher for OpenAiClient {
    fn fetch<'a>(&'a self, url: &'a str) -> BackendFuture<'a, Vec<u8>> {
        Box::pin(self.download(url))
    }
}

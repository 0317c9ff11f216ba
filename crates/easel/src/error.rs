//! Error taxonomy for the generation-and-archiving pipeline.
//!
//! Every variant except [`ArtError::SourceUnavailable`] aborts the run it
//! occurs in. The scheduler catches aborts at the top of each run, logs them,
//! and keeps ticking; nothing is retried.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ArtError>;

#[derive(Debug, thiserror::Error)]
pub enum ArtError {
    /// A corpus file is missing or unreadable. Non-fatal: the corpus is
    /// treated as empty.
    #[error("corpus source unavailable at {}: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    /// No usable prompt could be produced from the loaded corpora.
    #[error("insufficient data to proceed: {0}")]
    InsufficientData(String),

    /// The text backend returned nothing usable.
    #[error("prompt generation returned an empty response")]
    EmptyGeneration,

    /// The image backend returned no reference.
    #[error("image generation returned an empty URL")]
    EmptyImageResult,

    /// The image backend returned something that is not a fetchable URL.
    #[error("image generation returned an invalid reference: {0}")]
    InvalidImageReference(String),

    /// Transport or API failure reported by a collaborator.
    #[error("backend error: {0}")]
    Backend(String),

    /// One or more destination writes failed. Destinations that were written
    /// successfully are left in place.
    #[error("failed to persist image to {} destination(s): {}", failures.len(), describe_failures(failures))]
    PersistenceFailure { failures: Vec<(PathBuf, String)> },

    /// The scheduler has shut down and accepts no more runs.
    #[error("run slot closed: scheduler has shut down")]
    SlotClosed,

    /// Archive directory or log I/O failed.
    #[error("archive I/O failed at {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtError {
    /// Whether this error aborts the current run.
    pub fn is_run_abort(&self) -> bool {
        !matches!(self, ArtError::SourceUnavailable { .. })
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArtError::Archive {
            path: path.into(),
            source,
        }
    }
}

fn describe_failures(failures: &[(PathBuf, String)]) -> String {
    failures
        .iter()
        .map(|(path, reason)| format!("{} ({reason})", path.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

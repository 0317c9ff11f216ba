//! Line-based prompt corpora.
//!
//! A corpus file is plain text with one entry per line. Lines are trimmed and
//! blank lines dropped; order is preserved. Corpora are loaded once by an
//! explicit [`PromptCorpus::load`] call and never reloaded.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{ArtError, Result};

pub const SYSTEM_ROLE_FILE: &str = "role_system.txt";
pub const USER_ROLE_FILE: &str = "role_user.txt";
pub const READY_PROMPTS_FILE: &str = "prompts.txt";

/// Locations of the three corpus files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSources {
    /// System-role lines used to steer prompt synthesis.
    pub system_roles: PathBuf,
    /// User-role lines used as the synthesis request.
    pub user_roles: PathBuf,
    /// Ready-made image prompts.
    pub prompts: PathBuf,
}

impl CorpusSources {
    /// The conventional file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            system_roles: dir.join(SYSTEM_ROLE_FILE),
            user_roles: dir.join(USER_ROLE_FILE),
            prompts: dir.join(READY_PROMPTS_FILE),
        }
    }
}

/// Split corpus text into trimmed, non-empty lines.
pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read a corpus file. A missing or unreadable file is
/// [`ArtError::SourceUnavailable`].
pub fn load_lines(path: &Path) -> Result<Vec<String>> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ArtError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(parse_lines(&content))
}

/// Load a corpus, downgrading an unavailable source to an empty corpus.
fn load_or_empty(label: &str, path: &Path) -> Vec<String> {
    match load_lines(path) {
        Ok(lines) => {
            info!("Loaded {} {label} line(s) from {}", lines.len(), path.display());
            lines
        }
        Err(e) => {
            warn!("{e}; continuing without {label} lines");
            Vec::new()
        }
    }
}

/// The three read-only corpora shared by every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptCorpus {
    system_roles: Vec<String>,
    user_roles: Vec<String>,
    prompts: Vec<String>,
}

impl PromptCorpus {
    /// Load all three corpora. Never fails: unavailable sources are logged
    /// and become empty.
    pub fn load(sources: &CorpusSources) -> Self {
        Self {
            system_roles: load_or_empty("system-role", &sources.system_roles),
            user_roles: load_or_empty("user-role", &sources.user_roles),
            prompts: load_or_empty("ready-made prompt", &sources.prompts),
        }
    }

    /// Build a corpus from in-memory lines. Entries go through the same
    /// trimming and blank-line filtering as file-loaded corpora.
    pub fn from_lines<S: AsRef<str>>(system_roles: &[S], user_roles: &[S], prompts: &[S]) -> Self {
        let clean = |lines: &[S]| -> Vec<String> {
            lines
                .iter()
                .map(|l| l.as_ref().trim())
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        };
        Self {
            system_roles: clean(system_roles),
            user_roles: clean(user_roles),
            prompts: clean(prompts),
        }
    }

    pub fn system_roles(&self) -> &[String] {
        &self.system_roles
    }

    pub fn user_roles(&self) -> &[String] {
        &self.user_roles
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Both role corpora are populated, so prompts can be synthesized.
    pub fn can_synthesize(&self) -> bool {
        !self.system_roles.is_empty() && !self.user_roles.is_empty()
    }

    /// The ready-made corpus is populated.
    pub fn has_prompts(&self) -> bool {
        !self.prompts.is_empty()
    }

    /// No selection branch is available.
    pub fn is_empty(&self) -> bool {
        !self.can_synthesize() && !self.has_prompts()
    }
}

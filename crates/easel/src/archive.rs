//! Dated image archive with a rolling snapshot.
//!
//! Directory layout:
//! ```text
//! archive_root/
//!   20250114_digital-art/
//!     20250114_image_1.png
//!     20250114_image_2.png
//!     prompts.txt            # "20250114_image_1.png: <prompt>" per line
//!   20250115_digital-art/
//!     ...
//! daily_art.png              # snapshot path, always the newest image
//! ```
//!
//! The [`Archive`] owns every path under its root plus the snapshot path.
//! Sequence numbers come from a per-day counter guarded by a mutex. Every
//! allocation also rescans the day's directory and claims the chosen name
//! on disk with `create_new`, so a second process writing into the same
//! archive can never be handed, or overwrite, an existing image.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{ArtError, Result};

/// Suffix of each day's directory name.
pub const DAY_DIR_SUFFIX: &str = "_digital-art";

/// Per-day prompt log file name.
pub const PROMPT_LOG_FILE: &str = "prompts.txt";

/// Default snapshot file name.
pub const DEFAULT_SNAPSHOT_FILE: &str = "daily_art.png";

// ── DayBoundary ────────────────────────────────────────────────────

/// Which calendar decides where one archive day ends.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DayBoundary {
    #[default]
    Utc,
    Local,
}

impl DayBoundary {
    /// `YYYYMMDD` for `now` in this calendar.
    pub fn date_key(&self, now: DateTime<Utc>) -> String {
        match self {
            DayBoundary::Utc => now.format("%Y%m%d").to_string(),
            DayBoundary::Local => now.with_timezone(&Local).format("%Y%m%d").to_string(),
        }
    }
}

impl std::str::FromStr for DayBoundary {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utc" => Ok(DayBoundary::Utc),
            "local" => Ok(DayBoundary::Local),
            other => Err(format!("unknown day boundary '{other}' (expected utc or local)")),
        }
    }
}

// ── ArchiveDay ─────────────────────────────────────────────────────

/// One calendar day of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDay {
    date_key: String,
    dir: PathBuf,
}

impl ArchiveDay {
    pub fn date_key(&self) -> &str {
        &self.date_key
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prompt_log_path(&self) -> PathBuf {
        self.dir.join(PROMPT_LOG_FILE)
    }

    /// `{date}_image_{n}.png`
    pub fn image_file_name(&self, n: u32) -> String {
        format!("{}_image_{n}.png", self.date_key)
    }

    /// Parse the sequence number out of one of this day's image file names.
    fn parse_image_number(&self, name: &str) -> Option<u32> {
        name.strip_prefix(self.date_key.as_str())?
            .strip_prefix("_image_")?
            .strip_suffix(".png")?
            .parse()
            .ok()
    }
}

// ── Archive ────────────────────────────────────────────────────────

pub struct Archive {
    root: PathBuf,
    snapshot_path: PathBuf,
    boundary: DayBoundary,
    /// Last allocated sequence number per date key.
    counters: Mutex<HashMap<String, u32>>,
}

impl Archive {
    pub fn new(
        root: impl Into<PathBuf>,
        snapshot_path: impl Into<PathBuf>,
        boundary: DayBoundary,
    ) -> Self {
        Self {
            root: root.into(),
            snapshot_path: snapshot_path.into(),
            boundary,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn day_boundary(&self) -> DayBoundary {
        self.boundary
    }

    /// The archive day containing `now`, with its directory created.
    /// Idempotent: repeated calls for the same day return the same directory.
    pub async fn resolve_day(&self, now: DateTime<Utc>) -> Result<ArchiveDay> {
        let date_key = self.boundary.date_key(now);
        let dir = self.root.join(format!("{date_key}{DAY_DIR_SUFFIX}"));
        let existed = tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir());
        if !existed {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ArtError::archive(&dir, e))?;
            info!("Created directory: {}", dir.display());
        }
        Ok(ArchiveDay { date_key, dir })
    }

    /// Allocate and claim the next image file name for `day`.
    ///
    /// The number is one past the larger of this process's counter and what
    /// is already on disk. The name is claimed by creating an empty file with
    /// `create_new`; a name taken in the meantime by another writer moves the
    /// allocation on to the next number. [`persist`](Self::persist) later
    /// replaces the empty claim with the image.
    pub async fn next_sequence_path(&self, day: &ArchiveDay) -> Result<(String, PathBuf)> {
        let mut counters = self.counters.lock().await;
        let known = counters.get(day.date_key()).copied().unwrap_or(0);
        let mut next = known.max(Self::scan_existing(day).await?) + 1;

        loop {
            let file_name = day.image_file_name(next);
            let path = day.dir().join(&file_name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => {
                    counters.insert(day.date_key().to_string(), next);
                    debug!("Allocated {file_name}");
                    return Ok((file_name, path));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!("{file_name} already taken, trying the next number");
                    next += 1;
                }
                Err(e) => return Err(ArtError::archive(&path, e)),
            }
        }
    }

    /// Highest sequence number already present in the day's directory.
    ///
    /// Takes the larger of the entry count and the highest parsed number so
    /// that neither a gap nor a stray file can cause a reused name.
    async fn scan_existing(day: &ArchiveDay) -> Result<u32> {
        let mut entries = match tokio::fs::read_dir(day.dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(ArtError::archive(day.dir(), e)),
        };

        let mut count = 0u32;
        let mut highest = 0u32;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ArtError::archive(day.dir(), e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(day.date_key()) {
                continue;
            }
            count += 1;
            if let Some(n) = day.parse_image_number(&name) {
                highest = highest.max(n);
            }
        }
        Ok(count.max(highest))
    }

    /// Remove a claimed daily file that never received image bytes.
    pub async fn release_claim(&self, path: &Path) {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() == 0 => {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!("Failed to release claim {}: {e}", path.display());
                }
            }
            _ => {}
        }
    }

    /// Where one run's image goes: the snapshot plus the numbered daily file.
    pub fn destinations(&self, daily_path: &Path) -> Vec<PathBuf> {
        vec![self.snapshot_path.clone(), daily_path.to_path_buf()]
    }

    /// Write `bytes` to every destination concurrently and wait for all of
    /// them. Each file is written to a temp sibling and renamed into place.
    ///
    /// Any failed destination makes the whole call fail with
    /// [`ArtError::PersistenceFailure`]; destinations that were written are
    /// not rolled back.
    pub async fn persist(&self, bytes: &[u8], destinations: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let writes = destinations.iter().map(|dest| async move {
            write_atomic(dest, bytes)
                .await
                .map(|()| dest.clone())
                .map_err(|e| (dest.clone(), e.to_string()))
        });

        let mut written = Vec::with_capacity(destinations.len());
        let mut failures = Vec::new();
        for result in join_all(writes).await {
            match result {
                Ok(path) => {
                    info!("Image successfully saved to {}", path.display());
                    written.push(path);
                }
                Err(failure) => failures.push(failure),
            }
        }

        if failures.is_empty() {
            Ok(written)
        } else {
            Err(ArtError::PersistenceFailure { failures })
        }
    }

    /// Append `"{file_name}: {prompt}\n"` to the day's prompt log.
    pub async fn append_prompt_record(
        &self,
        day: &ArchiveDay,
        file_name: &str,
        prompt: &str,
    ) -> Result<()> {
        let path = day.prompt_log_path();
        append_line(&path, &format!("{file_name}: {prompt}")).await?;
        info!("Appended prompt to file: {}", path.display());
        Ok(())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Temp file + rename, creating missing parent directories.
async fn write_atomic(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = dest.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = dest
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"))?;
    let tmp_name = format!(".{}.tmp", file_name.to_string_lossy());
    let tmp_path = match parent {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    };

    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    tokio::fs::rename(&tmp_path, dest).await
}

/// Append one newline-terminated line, creating the file if needed.
pub(crate) async fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| ArtError::archive(path, e))?;
    file.write_all(format!("{line}\n").as_bytes())
        .await
        .map_err(|e| ArtError::archive(path, e))?;
    file.flush().await.map_err(|e| ArtError::archive(path, e))
}

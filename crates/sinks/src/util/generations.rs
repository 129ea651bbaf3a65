//! Generation ledger for compressed files
//!
//! Each rolling sink keeps at most `limit` compressed files next to its
//! active file, named `<active>.<id>.gz` with `id` in `1..=limit`. The
//! ledger remembers which ids exist and when each was last (re)written, so
//! the worker can decide whether a rotated file gets a fresh slot or
//! overwrites the least recently replaced one.
//!
//! There is no metadata file. The ledger is rebuilt from the directory
//! listing on startup, which is what lets the generation count survive a
//! restart.
//!
//! ```text
//! app.log            <- active file
//! app.log.8412937    <- rotated, waiting for the worker
//! app.log.1.gz       <- generation 1
//! app.log.2.gz       <- generation 2
//! ```

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Extension appended to every generation file
pub const COMPRESSED_EXTENSION: &str = "gz";

/// One retained compressed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationEntry {
    /// Generation id, `1..=limit`
    pub id: u32,

    /// Path of the compressed file
    pub path: PathBuf,

    /// When the slot was last written (or the file's mtime when discovered)
    pub last_touched: SystemTime,
}

/// Ledger of the compressed generations of one log stream
///
/// Owned by the compression worker once the sink is built; nothing else
/// touches it, so it carries no lock.
#[derive(Debug)]
pub struct GenerationRegistry {
    /// Absolute path of the active file
    active_path: PathBuf,

    /// Maximum number of retained generations
    limit: u32,

    /// Known generations, in discovery/allocation order
    entries: Vec<GenerationEntry>,
}

impl GenerationRegistry {
    /// Create an empty ledger
    pub fn new(active_path: impl Into<PathBuf>, limit: u32) -> Self {
        Self {
            active_path: active_path.into(),
            limit: limit.max(1),
            entries: Vec::new(),
        }
    }

    /// Create a ledger seeded from the compressed files already on disk
    ///
    /// Every `<active>.<id>.gz` with `id` in `1..=limit` becomes an entry
    /// whose `last_touched` is the file's modification time. Anything else
    /// matching the glob is ignored.
    pub fn scan(active_path: impl Into<PathBuf>, limit: u32) -> Self {
        let mut registry = Self::new(active_path, limit);

        let Some(active) = registry.active_path.to_str() else {
            tracing::warn!(
                path = %registry.active_path.display(),
                "active path is not valid UTF-8, skipping generation scan"
            );
            return registry;
        };
        let pattern = format!(
            "{}.*.{}",
            glob::Pattern::escape(active),
            COMPRESSED_EXTENSION
        );

        let matches = match glob::glob(&pattern) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "invalid generation pattern");
                return registry;
            }
        };

        for candidate in matches {
            let path = match candidate {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(error = %e, "unreadable entry during generation scan");
                    continue;
                }
            };

            let Some(id) = registry.parse_id(&path) else {
                tracing::debug!(path = %path.display(), "ignoring non-generation file");
                continue;
            };

            let last_touched = match fs::symlink_metadata(&path).and_then(|m| m.modified()) {
                Ok(mtime) => mtime,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to stat generation file, skipping"
                    );
                    continue;
                }
            };

            registry.entries.push(GenerationEntry {
                id,
                path,
                last_touched,
            });
        }

        registry.entries.sort_by_key(|entry| entry.id);

        tracing::debug!(
            path = %registry.active_path.display(),
            generations = registry.entries.len(),
            limit = registry.limit,
            "generation scan complete"
        );

        registry
    }

    /// Path of the active file this ledger belongs to
    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    /// Maximum number of retained generations
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of known generations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no generation exists yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Known generations
    pub fn entries(&self) -> &[GenerationEntry] {
        &self.entries
    }

    /// Path of generation `id` for this ledger's active file
    pub fn generation_path(&self, id: u32) -> PathBuf {
        with_suffix(&self.active_path, &format!(".{id}.{COMPRESSED_EXTENSION}"))
    }

    /// Pick the compressed file a rotated temp file should be written to
    ///
    /// Below the limit this allocates a new slot named after the temp file
    /// minus its random suffix. At the limit it reuses the slot with the
    /// oldest `last_touched` and refreshes it; the caller overwrites that
    /// file in place.
    ///
    /// A temp name without a `.suffix` to strip is logged and returned
    /// unchanged, and no slot is touched.
    pub fn destination_for(&mut self, temp_path: &Path) -> PathBuf {
        self.destination_at(temp_path, SystemTime::now())
    }

    pub(crate) fn destination_at(&mut self, temp_path: &Path, now: SystemTime) -> PathBuf {
        let Some(base) = strip_temp_suffix(temp_path) else {
            tracing::error!(path = %temp_path.display(), "malformed rotated file name");
            return temp_path.to_path_buf();
        };

        let touched = self.next_touch(now);

        if let Some(id) = self.next_free_id() {
            let path = with_suffix(&base, &format!(".{id}.{COMPRESSED_EXTENSION}"));
            self.entries.push(GenerationEntry {
                id,
                path: path.clone(),
                last_touched: touched,
            });
            return path;
        }

        // At capacity: evict the least recently replaced slot (first wins ties)
        let mut oldest = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.last_touched < self.entries[oldest].last_touched {
                oldest = i;
            }
        }
        let entry = &mut self.entries[oldest];
        entry.last_touched = touched;
        entry.path.clone()
    }

    /// Lowest id in `1..=limit` not held by an entry, or None when full
    ///
    /// With ids `1..=k` on disk this is `k + 1`.
    fn next_free_id(&self) -> Option<u32> {
        if self.entries.len() >= self.limit as usize {
            return None;
        }
        (1..=self.limit).find(|id| self.entries.iter().all(|e| e.id != *id))
    }

    /// Timestamp for a slot written at `now`, strictly after every known one
    ///
    /// Keeps eviction order equal to write order even when the clock is
    /// coarse or a discovered file carries a future mtime.
    fn next_touch(&self, now: SystemTime) -> SystemTime {
        match self.entries.iter().map(|e| e.last_touched).max() {
            Some(latest) if latest >= now => latest + Duration::from_nanos(1),
            _ => now,
        }
    }

    /// Parse `<active>.<id>.gz` into `id` if it is within `1..=limit`
    fn parse_id(&self, path: &Path) -> Option<u32> {
        if path.parent() != self.active_path.parent() {
            return None;
        }
        let active_name = self.active_path.file_name()?.to_str()?;
        let id = path
            .file_name()?
            .to_str()?
            .strip_prefix(active_name)?
            .strip_prefix('.')?
            .strip_suffix(COMPRESSED_EXTENSION)?
            .strip_suffix('.')?;

        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        id.parse::<u32>()
            .ok()
            .filter(|id| (1..=self.limit).contains(id))
    }
}

/// Drop the trailing `.suffix` of a rotated file name
///
/// Returns None when the file name has no `.` to split on.
pub fn strip_temp_suffix(temp_path: &Path) -> Option<PathBuf> {
    let name = temp_path.file_name()?.to_str()?;
    let (stem, _suffix) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    Some(temp_path.with_file_name(stem))
}

/// Append `suffix` to the full file name of `path`
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
#[path = "generations_test.rs"]
mod generations_test;

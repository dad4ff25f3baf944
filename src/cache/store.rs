// Local entry store (tier 1).
// Keyed JSON entries on disk with write time and expiry, written atomically.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::error::Result;

use super::paths;

/// Wrapper for a cached payload with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    /// Logical query name, e.g. `all_students`.
    pub key: String,
    /// The cached data.
    pub payload: T,
    /// When the data was written.
    pub written_at: DateTime<Utc>,
    /// When the data stops being served.
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Create a new entry written at `now` that lives for `ttl`.
    pub fn new(key: impl Into<String>, payload: T, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl =
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self {
            key: key.into(),
            payload,
            written_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Whether the TTL the entry was written with has run out at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Time elapsed from `since` to `now`. Times in the future count as age zero.
pub fn age_at(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(since)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Directory-backed keyed store for local entries.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at the per-user cache directory.
    pub fn from_default_dir() -> Option<Self> {
        paths::cache_dir().map(Self::new)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read an entry without interpreting its payload.
    pub fn read_raw(&self, key: &str) -> Result<Option<CacheEntry<serde_json::Value>>> {
        self.read(key)
    }

    /// Read an entry and deserialize its payload.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CacheEntry<T>>> {
        let path = paths::entry_path(&self.root, key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)?;
        let entry: CacheEntry<T> = serde_json::from_str(&contents)?;
        Ok(Some(entry))
    }

    /// Upsert an entry.
    pub fn write<T: Serialize>(&self, entry: &CacheEntry<T>) -> Result<()> {
        let path = paths::entry_path(&self.root, &entry.key);
        let json = serde_json::to_string_pretty(entry)?;
        write_atomic(&path, json.as_bytes())?;
        debug!(key = %entry.key, path = %path.display(), "wrote local cache entry");
        Ok(())
    }

    /// Delete an entry if present.
    pub fn delete(&self, key: &str) -> Result<()> {
        let path = paths::entry_path(&self.root, key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Delete every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let dir = paths::entries_dir(&self.root);
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for item in fs::read_dir(&dir)? {
            let path = item?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Write bytes via a temp file and rename, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    Ok(())
}

//! Persistent file fingerprints used to decide which stages can be skipped.
//!
//! Each tracked path keeps one fingerprint per consumer (the stage that read
//! it, or `__target` for final products). Fingerprints are Adler-32 checksums
//! of the whole file rendered in decimal; directories always fingerprint as
//! `"0"`. The table is stored as pretty JSON in `.f4cache`.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the cache in the build directory.
pub const CACHE_FILE: &str = ".f4cache";

/// Consumer used for dependencies requested as targets or produced by stages.
pub const TARGET_CONSUMER: &str = "__target";

type HashTable = BTreeMap<String, BTreeMap<String, String>>;

/// Change status of a (path, consumer) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Changed,
    Same,
    Untracked,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredHash {
    Text(String),
    Number(u64),
}

impl StoredHash {
    fn into_text(self) -> String {
        match self {
            StoredHash::Text(text) => text,
            StoredHash::Number(number) => number.to_string(),
        }
    }
}

/// Fingerprint of a path: `"0"` for directories, Adler-32 of the bytes otherwise.
pub fn fingerprint(path: &Path) -> Result<String> {
    if path.is_dir() {
        return Ok("0".to_string());
    }
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = adler2::Adler32::new();
    hasher.write_slice(&bytes);
    Ok(hasher.checksum().to_string())
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[derive(Debug)]
pub struct FingerprintCache {
    path: PathBuf,
    hashes: HashTable,
    status: BTreeMap<(String, String), FileStatus>,
    dirty: bool,
}

impl FingerprintCache {
    /// Empty cache that will be written to `path`.
    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            hashes: HashTable::new(),
            status: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the table from `path`. Missing or unreadable files start empty.
    pub fn load(path: &Path) -> Self {
        let mut cache = Self::empty(path.to_path_buf());
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "cannot open cache file; the flow will run from the beginning"
                );
                return cache;
            }
        };
        match serde_json::from_slice::<BTreeMap<String, BTreeMap<String, StoredHash>>>(&bytes) {
            Ok(stored) => {
                cache.hashes = stored
                    .into_iter()
                    .map(|(path, consumers)| {
                        let consumers = consumers
                            .into_iter()
                            .map(|(consumer, hash)| (consumer, hash.into_text()))
                            .collect();
                        (path, consumers)
                    })
                    .collect();
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "cache file is corrupted; the flow will run from the beginning"
                );
            }
        }
        cache
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Fingerprint `path` for `consumer` and record the result.
    ///
    /// Returns true when the file changed since the last run, was not tracked
    /// for this consumer, or no longer exists (its record is then dropped).
    pub fn update(&mut self, path: &Path, consumer: &str) -> Result<bool> {
        let path_key = key(path);
        if !path.exists() {
            self.pop_consumer(&path_key, consumer);
            return Ok(true);
        }
        let hash = fingerprint(path)?;
        let consumers = self.hashes.entry(path_key.clone()).or_default();
        let changed = consumers.get(consumer) != Some(&hash);
        let status = if changed {
            consumers.insert(consumer.to_string(), hash);
            self.dirty = true;
            FileStatus::Changed
        } else {
            FileStatus::Same
        };
        self.status
            .insert((path_key, consumer.to_string()), status);
        Ok(changed)
    }

    /// Status recorded by `update` during this run.
    pub fn status(&self, path: &Path, consumer: &str) -> FileStatus {
        self.status
            .get(&(key(path), consumer.to_string()))
            .copied()
            .unwrap_or(FileStatus::Untracked)
    }

    /// Compare the file against the stored fingerprint without recording anything.
    pub fn probe(&self, path: &Path, consumer: &str) -> FileStatus {
        let Some(stored) = self
            .hashes
            .get(&key(path))
            .and_then(|consumers| consumers.get(consumer))
        else {
            return FileStatus::Untracked;
        };
        match fingerprint(path) {
            Ok(hash) if &hash == stored => FileStatus::Same,
            _ => FileStatus::Changed,
        }
    }

    /// Whether any path carries a record for `consumer`.
    pub fn has_consumer(&self, consumer: &str) -> bool {
        self.hashes
            .values()
            .any(|consumers| consumers.contains_key(consumer))
    }

    /// Drop every record owned by `consumer`.
    pub fn forget_consumer(&mut self, consumer: &str) {
        let mut removed = false;
        self.hashes.retain(|_, consumers| {
            removed |= consumers.remove(consumer).is_some();
            !consumers.is_empty()
        });
        self.status.retain(|(_, owner), _| owner != consumer);
        if removed {
            self.dirty = true;
        }
    }

    fn pop_consumer(&mut self, path_key: &str, consumer: &str) {
        self.status
            .remove(&(path_key.to_string(), consumer.to_string()));
        if let Some(consumers) = self.hashes.get_mut(path_key) {
            if consumers.remove(consumer).is_some() {
                self.dirty = true;
            }
            if consumers.is_empty() {
                self.hashes.remove(path_key);
            }
        }
    }

    /// Write the table if it changed since it was loaded.
    pub fn save(&mut self) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let text = serde_json::to_string_pretty(&self.hashes).context("serialize cache")?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("create temporary cache in {}", dir.display()))?;
        tmp.write_all(text.as_bytes())
            .with_context(|| format!("write {}", tmp.path().display()))?;
        tmp.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("write cache {}", self.path.display()))?;
        self.dirty = false;
        Ok(())
    }
}

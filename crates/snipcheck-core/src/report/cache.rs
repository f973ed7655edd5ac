//! Persistent outcome cache using rkyv.
//!
//! Maps a unit's content hash to the raw diagnostics its last completed
//! check produced. Raw (unit-local) diagnostics are stored rather than
//! mapped ones, so a cached outcome is re-mapped against the current unit
//! layout on every run.
//!
//! # Cache Structure
//!
//! The snapshot stores:
//! - The cache format version
//! - The profile fingerprint (backend, target and strictness options)
//! - Raw diagnostics per content hash
//!
//! A version or fingerprint mismatch, or a file that fails validation,
//! discards the whole cache. The run then simply rechecks everything.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rkyv::{Archive, Deserialize, Serialize, rancor};
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::compile::{RawDiagnostic, Severity};

/// Current cache format version.
///
/// Increment this when the snapshot layout changes.
pub const CACHE_VERSION: u32 = 1;

/// Snapshot of the outcome cache as persisted to disk.
#[derive(Archive, Serialize, Deserialize, Debug, Clone)]
pub struct CacheSnapshot {
    /// Cache format version for compatibility checking.
    pub version: u32,

    /// Fingerprint of the compiler profile that produced the entries.
    pub fingerprint: String,

    /// Completed outcomes keyed by unit content hash.
    pub entries: HashMap<String, CachedOutcome>,

    /// Unix timestamp when the snapshot was written.
    pub created_at: u64,
}

/// Completed check of one unit.
#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CachedOutcome {
    pub hash: String,
    /// Empty for a clean unit.
    pub diagnostics: Vec<CachedDiagnostic>,
}

#[derive(Archive, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CachedDiagnostic {
    pub line: u32,
    pub column: u32,
    pub warning: bool,
    pub message: String,
    pub code: Option<String>,
}

impl From<&RawDiagnostic> for CachedDiagnostic {
    fn from(d: &RawDiagnostic) -> Self {
        Self {
            line: u32::try_from(d.line).unwrap_or(u32::MAX),
            column: u32::try_from(d.column).unwrap_or(u32::MAX),
            warning: d.severity == Severity::Warning,
            message: d.message.clone(),
            code: d.code.clone(),
        }
    }
}

impl From<&CachedDiagnostic> for RawDiagnostic {
    fn from(d: &CachedDiagnostic) -> Self {
        Self {
            line: d.line as usize,
            column: d.column as usize,
            severity: if d.warning { Severity::Warning } else { Severity::Error },
            message: d.message.clone(),
            code: d.code.clone(),
        }
    }
}

/// Error type for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] io::Error),

    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("cache was written under a different compiler profile")]
    ProfileMismatch,

    #[error("cache deserialize error: {0}")]
    Deserialize(String),

    #[error("cache serialize error: {0}")]
    Serialize(String),
}

/// Cache persistence operations.
pub struct CachePersistence;

impl CachePersistence {
    /// Save a snapshot with an atomic write (temp file, then rename).
    ///
    /// Creates parent directories if they don't exist.
    pub fn save(path: &Path, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = rkyv::to_bytes::<rancor::Error>(snapshot)
            .map_err(|e| CacheError::Serialize(e.to_string()))?;

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;

        tracing::debug!(
            "Saved outcome cache: {} entries, {} bytes",
            snapshot.entries.len(),
            bytes.len()
        );
        Ok(())
    }

    /// Load a snapshot written under `fingerprint`.
    ///
    /// Returns `Ok(None)` if the cache file doesn't exist.
    pub fn load(path: &Path, fingerprint: &str) -> Result<Option<CacheSnapshot>, CacheError> {
        if !path.exists() {
            tracing::debug!("No cache file at {}", path.display());
            return Ok(None);
        }

        let bytes = fs::read(path)?;
        let archived = rkyv::access::<ArchivedCacheSnapshot, rancor::Error>(&bytes)
            .map_err(|e| CacheError::Deserialize(e.to_string()))?;

        let found: u32 = archived.version.into();
        if found != CACHE_VERSION {
            return Err(CacheError::VersionMismatch {
                expected: CACHE_VERSION,
                found,
            });
        }
        if archived.fingerprint.as_str() != fingerprint {
            return Err(CacheError::ProfileMismatch);
        }

        let snapshot = rkyv::deserialize::<CacheSnapshot, rancor::Error>(archived)
            .map_err(|e| CacheError::Deserialize(e.to_string()))?;

        tracing::debug!(
            "Loaded outcome cache: {} entries, created at {}",
            snapshot.entries.len(),
            snapshot.created_at
        );
        Ok(Some(snapshot))
    }

    /// Delete the cache file if it exists.
    pub fn invalidate(path: &Path) -> Result<(), CacheError> {
        if path.exists() {
            fs::remove_file(path)?;
            tracing::debug!("Invalidated cache at {}", path.display());
        }
        Ok(())
    }
}

impl CacheSnapshot {
    pub fn new(fingerprint: String) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            version: CACHE_VERSION,
            fingerprint,
            entries: HashMap::new(),
            created_at,
        }
    }
}

/// In-memory view of the cache for one run.
///
/// Lookups and commits happen on the aggregator's task only. Entries for
/// units that no longer exist in the corpus are pruned on save.
#[derive(Debug)]
pub struct OutcomeCache {
    path: Option<PathBuf>,
    fingerprint: String,
    entries: HashMap<String, CachedOutcome>,
    live: FxHashSet<String>,
    dirty: bool,
    discarded: Option<String>,
}

impl OutcomeCache {
    /// Open the cache at `path`, starting empty when it is missing or unusable.
    pub fn open(path: PathBuf, fingerprint: String) -> Self {
        let (entries, discarded) = match CachePersistence::load(&path, &fingerprint) {
            Ok(Some(snapshot)) => (snapshot.entries, None),
            Ok(None) => (HashMap::new(), None),
            Err(e) => {
                tracing::warn!("Discarding outcome cache {}: {}", path.display(), e);
                (HashMap::new(), Some(e.to_string()))
            }
        };

        Self {
            path: Some(path),
            fingerprint,
            entries,
            live: FxHashSet::default(),
            // A discarded file is rewritten even when nothing gets committed.
            dirty: discarded.is_some(),
            discarded,
        }
    }

    /// A cache that never hits and never persists.
    pub fn disabled() -> Self {
        Self {
            path: None,
            fingerprint: String::new(),
            entries: HashMap::new(),
            live: FxHashSet::default(),
            dirty: false,
            discarded: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Why the persisted cache was discarded on open, if it was.
    pub fn discarded(&self) -> Option<&str> {
        self.discarded.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark a content hash as part of the current corpus.
    pub fn touch(&mut self, hash: &str) {
        if self.is_enabled() {
            self.live.insert(hash.to_string());
        }
    }

    /// Raw diagnostics of the last completed check of `hash`.
    pub fn get(&self, hash: &str) -> Option<Vec<RawDiagnostic>> {
        self.entries
            .get(hash)
            .map(|entry| entry.diagnostics.iter().map(RawDiagnostic::from).collect())
    }

    /// Commit a completed check.
    pub fn insert(&mut self, hash: &str, diagnostics: &[RawDiagnostic]) {
        if !self.is_enabled() {
            return;
        }
        let entry = CachedOutcome {
            hash: hash.to_string(),
            diagnostics: diagnostics.iter().map(CachedDiagnostic::from).collect(),
        };
        if self.entries.get(hash) != Some(&entry) {
            self.entries.insert(hash.to_string(), entry);
            self.dirty = true;
        }
        self.live.insert(hash.to_string());
    }

    /// Persist the cache if anything changed.
    pub fn save(&mut self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let before = self.entries.len();
        let live = &self.live;
        self.entries.retain(|hash, _| live.contains(hash));
        if self.entries.len() != before {
            self.dirty = true;
        }
        if !self.dirty {
            return Ok(());
        }

        let mut snapshot = CacheSnapshot::new(self.fingerprint.clone());
        snapshot.entries = self.entries.clone();
        CachePersistence::save(path, &snapshot)?;
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn raw() -> Vec<RawDiagnostic> {
        vec![
            RawDiagnostic::error(2, 5, "TS2322", "Type 'string' is not assignable to type 'number'."),
            RawDiagnostic::warning(3, 7, "TS6133", "'a' is declared but its value is never read."),
        ]
    }

    #[test]
    fn test_cache_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outcomes.bin");

        let mut cache = OutcomeCache::open(path.clone(), "fp".into());
        assert!(cache.is_empty());
        cache.insert("aaa", &raw());
        cache.insert("bbb", &[]);
        cache.save().unwrap();
        assert!(path.exists());

        let cache = OutcomeCache::open(path, "fp".into());
        assert!(cache.discarded().is_none());
        assert_eq!(cache.get("aaa"), Some(raw()));
        assert_eq!(cache.get("bbb"), Some(Vec::new()));
        assert_eq!(cache.get("ccc"), None);
    }

    #[test]
    fn test_fingerprint_mismatch_discards() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outcomes.bin");

        let mut cache = OutcomeCache::open(path.clone(), "strict".into());
        cache.insert("aaa", &raw());
        cache.save().unwrap();

        let cache = OutcomeCache::open(path.clone(), "loose".into());
        assert!(cache.is_empty());
        assert!(cache.discarded().unwrap().contains("profile"));

        let err = CachePersistence::load(&path, "loose").unwrap_err();
        assert!(matches!(err, CacheError::ProfileMismatch));
    }

    #[test]
    fn test_corrupt_cache_discards() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outcomes.bin");
        fs::write(&path, b"definitely not an archive").unwrap();

        let mut cache = OutcomeCache::open(path.clone(), "fp".into());
        assert!(cache.is_empty());
        assert!(cache.discarded().is_some());

        // The unusable file is replaced on the next save.
        cache.save().unwrap();
        let reopened = OutcomeCache::open(path, "fp".into());
        assert!(reopened.discarded().is_none());
    }

    #[test]
    fn test_stale_entries_pruned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outcomes.bin");

        let mut cache = OutcomeCache::open(path.clone(), "fp".into());
        cache.insert("old", &[]);
        cache.save().unwrap();

        let mut cache = OutcomeCache::open(path.clone(), "fp".into());
        cache.touch("new");
        cache.insert("new", &raw());
        cache.save().unwrap();

        let cache = OutcomeCache::open(path, "fp".into());
        assert_eq!(cache.len(), 1);
        assert!(cache.get("old").is_none());
    }

    #[test]
    fn test_disabled_cache() {
        let mut cache = OutcomeCache::disabled();
        cache.insert("aaa", &raw());
        assert!(cache.get("aaa").is_none());
        cache.save().unwrap();
    }

    #[test]
    fn test_invalidate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outcomes.bin");
        CachePersistence::save(&path, &CacheSnapshot::new("fp".into())).unwrap();
        assert!(path.exists());

        CachePersistence::invalidate(&path).unwrap();
        assert!(!path.exists());
        CachePersistence::invalidate(&path).unwrap();
    }
}

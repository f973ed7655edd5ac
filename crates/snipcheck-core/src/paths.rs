//! Corpus directory management.
//!
//! Provides a consistent layout for the state snipcheck keeps next to a
//! corpus, so the CLI and library agree on where the outcome cache lives.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Name of the state directory created under the corpus root.
pub const STATE_DIR_NAME: &str = ".snipcheck";

/// Directory structure for a validated corpus.
///
/// ```text
/// lessons/
/// ├── 01-basics.md
/// └── .snipcheck/
///     └── cache/
///         └── outcomes.bin   # content hash → outcome
/// ```
#[derive(Debug, Clone)]
pub struct CorpusDirs {
    /// The `.snipcheck` directory itself.
    pub state_dir: PathBuf,

    /// Cache directory for persisted unit outcomes.
    pub cache_dir: PathBuf,
}

impl CorpusDirs {
    /// Compute the layout for a corpus root without touching the filesystem.
    pub fn for_root(root: &Path) -> Self {
        let state_dir = root.join(STATE_DIR_NAME);
        let cache_dir = state_dir.join("cache");
        Self {
            state_dir,
            cache_dir,
        }
    }

    /// Compute the layout and create the directories.
    ///
    /// # Errors
    /// Returns an error if directory creation fails.
    pub fn create(root: &Path) -> Result<Self> {
        let dirs = Self::for_root(root);
        fs::create_dir_all(&dirs.cache_dir)?;
        Ok(dirs)
    }

    /// Default location of the outcome cache file.
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join("outcomes.bin")
    }

    /// Remove all persisted state.
    pub fn clean(&self) -> Result<()> {
        if self.state_dir.exists() {
            fs::remove_dir_all(&self.state_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_layout() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dirs = CorpusDirs::create(temp.path()).expect("Failed to create dirs");

        assert!(dirs.state_dir.ends_with(STATE_DIR_NAME));
        assert!(dirs.cache_dir.exists());
        assert!(dirs.cache_file().ends_with("cache/outcomes.bin"));
    }

    #[test]
    fn test_clean() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dirs = CorpusDirs::create(temp.path()).expect("Failed to create dirs");
        fs::write(dirs.cache_file(), b"stale").expect("Failed to write cache");

        dirs.clean().expect("Failed to clean");
        assert!(!dirs.state_dir.exists());

        // Cleaning twice is fine
        dirs.clean().expect("Failed to clean twice");
    }
}

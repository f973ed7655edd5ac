//! Clean command implementation for snipcheck CLI.

use std::path::Path;

use snipcheck_core::report::CachePersistence;
use snipcheck_core::{CompilerProfile, CorpusDirs};

/// Remove the persisted state of a corpus.
pub fn execute(root: &Path) -> anyhow::Result<()> {
    if !root.is_dir() {
        return Err(snipcheck_core::Error::CorpusNotFound(root.to_path_buf()).into());
    }

    let profile = CompilerProfile::discover(root)?;
    if let Some(path) = &profile.cache_path {
        let path = if path.is_absolute() {
            path.clone()
        } else {
            root.join(path)
        };
        CachePersistence::invalidate(&path)
            .map_err(|e| snipcheck_core::Error::Cache(e.to_string()))?;
    }

    let dirs = CorpusDirs::for_root(root);
    let existed = dirs.state_dir.exists();
    dirs.clean()?;

    if existed {
        println!("Removed {}", dirs.state_dir.display());
    } else {
        println!("Nothing to clean");
    }
    Ok(())
}

//! Error types for snipcheck-core.
//!
//! Configuration problems (including a missing backend tool) abort a run. Every other failure is recorded as a
//! per-unit outcome by the report aggregator so one bad snippet never blocks
//! validation of the rest of the corpus.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for snipcheck-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in snipcheck-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or contradictory compiler profile.
    #[error("invalid profile: {0}")]
    Config(String),

    /// Failed to read or parse the profile file.
    #[error("failed to load profile {}: {message}", path.display())]
    ProfileLoad { path: PathBuf, message: String },

    /// The corpus root does not exist or is not a directory.
    #[error("corpus root not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    /// Failed to walk the corpus tree.
    #[error("failed to scan corpus: {0}")]
    Scan(String),

    /// Type-checking backend failed outside of normal diagnostics.
    #[error("backend '{backend}' failed: {message}")]
    Backend { backend: String, message: String },

    /// The requested backend tool could not be located.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// Cache read/write failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Report serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The run was cancelled before completion.
    #[error("run aborted")]
    Aborted,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must abort the run before any unit is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::ProfileLoad { .. }
                | Error::CorpusNotFound(_)
                | Error::Toolchain(_)
        )
    }

    /// Render the error together with a recovery hint for terminal display.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::Config(_) | Error::ProfileLoad { .. } => {
                Some("check snipcheck.toml or the command-line overrides")
            }
            Error::CorpusNotFound(_) => Some("pass the directory that contains the lesson files"),
            Error::Toolchain(_) => {
                Some("install TypeScript (`npm i -g typescript`) or use `--backend builtin`")
            }
            Error::Cache(_) => Some("run `snipcheck clean` to discard the cache"),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_errors_are_fatal() {
        assert!(Error::Config("concurrency must be > 0".into()).is_fatal());
        assert!(Error::CorpusNotFound(PathBuf::from("lessons")).is_fatal());
        assert!(!Error::Cache("truncated".into()).is_fatal());
        assert!(
            !Error::Backend {
                backend: "tsc".into(),
                message: "crashed".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_hint_rendering() {
        let rendered = Error::Toolchain("tsc not found".into()).with_hint();
        assert!(rendered.starts_with("toolchain error: tsc not found"));
        assert!(rendered.contains("hint:"));

        let plain = Error::Aborted.with_hint();
        assert_eq!(plain, "run aborted");
    }
}

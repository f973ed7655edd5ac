//! Corpus discovery and document loading.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::extract::{document_title, parse_front_matter};
use crate::graph::curriculum_ordinals;
use crate::profile::CompilerProfile;

/// Paths never treated as lessons.
const DEFAULT_EXCLUDES: &[&str] = &["**/.snipcheck/**", "**/.git/**", "**/node_modules/**"];

/// A lesson document loaded from the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Corpus-relative path with forward slashes.
    pub path: String,
    pub text: String,
    pub title: String,
    /// Position in curriculum order (0-based).
    pub ordinal: usize,
    /// `order:` from front matter.
    pub order_hint: Option<u64>,
}

impl Document {
    /// Build a document from raw text. The ordinal is assigned by the corpus.
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into();
        let text = text.into();
        let order_hint = parse_front_matter(&text).and_then(|(fm, _)| fm.order);
        let title = document_title(&text).unwrap_or_else(|| file_stem(&path));
        Self {
            path,
            text,
            title,
            ordinal: 0,
            order_hint,
        }
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// The documents of a corpus, in curriculum order.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub root: PathBuf,
    pub documents: Vec<Document>,
    /// Files that matched but could not be read.
    pub warnings: Vec<String>,
}

impl Corpus {
    /// Walk `root` and load every document matched by the profile globs.
    pub fn load(root: &Path, profile: &CompilerProfile) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::CorpusNotFound(root.to_path_buf()));
        }

        let include = build_globset(&profile.include)?;
        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        excludes.extend(profile.exclude.iter().cloned());
        let exclude = build_globset(&excludes)?;

        let mut documents = Vec::new();
        let mut warnings = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Scan(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if exclude.is_match(&rel) || !include.is_match(&rel) {
                continue;
            }

            match std::fs::read_to_string(path) {
                Ok(text) => documents.push(Document::new(rel, text)),
                Err(e) => {
                    tracing::warn!("Skipping unreadable document {}: {}", rel, e);
                    warnings.push(format!("{rel}: unreadable ({e})"));
                }
            }
        }

        tracing::debug!("Loaded {} documents from {}", documents.len(), root.display());
        Ok(Self::from_documents(root.to_path_buf(), documents, warnings))
    }

    /// Assemble a corpus from already-loaded documents, assigning ordinals.
    pub fn from_documents(root: PathBuf, mut documents: Vec<Document>, warnings: Vec<String>) -> Self {
        let entries: Vec<(&str, Option<u64>)> = documents
            .iter()
            .map(|d| (d.path.as_str(), d.order_hint))
            .collect();
        let ordinals = curriculum_ordinals(&entries);

        for (doc, ordinal) in documents.iter_mut().zip(ordinals) {
            doc.ordinal = ordinal;
        }
        documents.sort_by_key(|d| d.ordinal);

        Self {
            root,
            documents,
            warnings,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid glob '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid glob set: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_orders_by_curriculum() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("02-second")).unwrap();
        fs::write(dir.path().join("10-last.md"), "# Last\n").unwrap();
        fs::write(dir.path().join("2-middle.md"), "no heading\n").unwrap();
        fs::write(dir.path().join("02-second/1-a.md"), "# A\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let corpus = Corpus::load(dir.path(), &CompilerProfile::default()).unwrap();
        let paths: Vec<&str> = corpus.documents.iter().map(|d| d.path.as_str()).collect();

        assert_eq!(paths, vec!["2-middle.md", "02-second/1-a.md", "10-last.md"]);
        assert_eq!(corpus.documents[0].title, "2-middle");
        assert_eq!(corpus.documents[2].title, "Last");
        assert_eq!(corpus.documents[2].ordinal, 2);
    }

    #[test]
    fn test_default_and_profile_excludes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.path().join("drafts")).unwrap();
        fs::write(dir.path().join("node_modules/pkg/README.md"), "x").unwrap();
        fs::write(dir.path().join("drafts/wip.md"), "x").unwrap();
        fs::write(dir.path().join("lesson.md"), "x").unwrap();

        let profile = CompilerProfile {
            exclude: vec!["drafts/**".into()],
            ..CompilerProfile::default()
        };
        let corpus = Corpus::load(dir.path(), &profile).unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.documents[0].path, "lesson.md");
    }

    #[test]
    fn test_missing_root() {
        let err = Corpus::load(Path::new("/nonexistent/lessons"), &CompilerProfile::default())
            .unwrap_err();
        assert!(matches!(err, Error::CorpusNotFound(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_front_matter_order_hint() {
        let doc = Document::new("03-c.md", "---\ntitle: Intro\norder: 0\n---\nbody\n");
        assert_eq!(doc.order_hint, Some(0));
        assert_eq!(doc.title, "Intro");

        let corpus = Corpus::from_documents(
            PathBuf::from("."),
            vec![Document::new("01-a.md", ""), doc],
            Vec::new(),
        );
        assert_eq!(corpus.documents[0].path, "03-c.md");
    }
}

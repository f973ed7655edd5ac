//! Snippet extraction from lesson documents.
//!
//! This module provides:
//! - Fenced code block scanning (backtick and tilde fences)
//! - Language tag and fence attribute parsing
//! - Section tracking (headings, thematic breaks) for continuity inference
//! - Front-matter and title discovery

mod parser;
mod types;

pub use parser::{DEFAULT_SECTION_DEPTH, SnippetIter, document_title, extract, parse_front_matter};
pub use types::{FenceAttributes, FrontMatter, Snippet, SourceSpan};

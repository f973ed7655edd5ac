//! Compilation units produced by the assembler.

use serde::Serialize;

use super::preamble::Preamble;
use crate::extract::{Snippet, SourceSpan};
use crate::graph::ContinuityLink;

/// How a unit is treated by the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitKind {
    /// Submitted to the compiler driver.
    Checked,
    /// Language not checked under the profile, or opted out.
    Unchecked { language: String },
    /// Never reaches the compiler driver. Position is in document coordinates.
    Malformed {
        snippet: usize,
        line: usize,
        column: usize,
        message: String,
    },
}

/// Placement of one snippet inside a unit's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    /// Snippet sequence index.
    pub snippet: usize,
    /// First unit line (1-indexed, preamble included) of the snippet body.
    pub unit_line: usize,
    pub line_count: usize,
    /// Document line of the snippet's first body line.
    pub document_line: usize,
}

/// The smallest thing submitted to the compiler driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilationUnit {
    /// `<document path>#<unit index>`.
    pub id: String,
    pub document: String,
    pub document_ordinal: usize,
    /// Unit index within the document.
    pub index: usize,
    /// Language tag of the first snippet.
    pub language: String,
    /// Snippet indices in compilation order.
    pub snippets: Vec<usize>,
    pub preamble: Preamble,
    /// Concatenated snippet texts.
    pub body: String,
    pub segments: Vec<Segment>,
    /// SHA-256 over preamble version, preamble and snippet texts.
    pub hash: String,
    /// Fence lines covering every constituent snippet.
    pub span: SourceSpan,
    pub kind: UnitKind,
}

impl CompilationUnit {
    /// Full program text handed to a backend.
    pub fn source(&self) -> String {
        let mut source = String::with_capacity(self.preamble.text.len() + self.body.len());
        source.push_str(&self.preamble.text);
        source.push_str(&self.body);
        source
    }

    pub fn is_checked(&self) -> bool {
        matches!(self.kind, UnitKind::Checked)
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self.kind, UnitKind::Malformed { .. })
    }

    /// Whether a unit line falls inside the synthesized preamble.
    pub fn in_preamble(&self, unit_line: usize) -> bool {
        unit_line >= 1 && unit_line <= self.preamble.line_count
    }
}

/// Result of assembling one document.
#[derive(Debug, Clone, Default)]
pub struct AssembledDocument {
    pub path: String,
    pub ordinal: usize,
    pub title: String,
    pub snippets: Vec<Snippet>,
    pub units: Vec<CompilationUnit>,
    pub links: Vec<ContinuityLink>,
    /// Corpus-level warnings (unknown ids, cycles).
    pub warnings: Vec<String>,
}

impl AssembledDocument {
    pub fn checked_units(&self) -> impl Iterator<Item = &CompilationUnit> {
        self.units.iter().filter(|u| u.is_checked())
    }
}

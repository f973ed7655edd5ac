//! Report data model.

use std::time::Duration;

use serde::Serialize;

use crate::compile::{Diagnostic, Severity};

/// Final status of one compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    /// Checked without diagnostics.
    Ok,
    /// Checked; the backend reported at least one diagnostic.
    Diagnostics { diagnostics: Vec<Diagnostic> },
    /// Failed the syntax gate or has an unterminated fence.
    Malformed {
        snippet: usize,
        line: usize,
        column: usize,
        message: String,
    },
    /// Not a checked language, or opted out.
    Unchecked { language: String },
    /// The check exceeded the per-unit timeout.
    Timeout { timeout_ms: u64 },
    /// Backend failure or rejected preamble.
    Error { message: String },
    /// The run was aborted before the check started.
    Cancelled,
}

impl UnitOutcome {
    /// Short status name, as serialized.
    pub fn label(&self) -> &'static str {
        match self {
            UnitOutcome::Ok => "ok",
            UnitOutcome::Diagnostics { .. } => "diagnostics",
            UnitOutcome::Malformed { .. } => "malformed",
            UnitOutcome::Unchecked { .. } => "unchecked",
            UnitOutcome::Timeout { .. } => "timeout",
            UnitOutcome::Error { .. } => "error",
            UnitOutcome::Cancelled => "cancelled",
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            UnitOutcome::Diagnostics { diagnostics } => diagnostics,
            _ => &[],
        }
    }

    /// Whether this outcome fails the run.
    ///
    /// Warnings only fail a run under `deny_warnings`. Cancelled units are
    /// not failures by themselves; an aborted run is reported as such.
    pub fn is_failure(&self, deny_warnings: bool) -> bool {
        match self {
            UnitOutcome::Ok | UnitOutcome::Unchecked { .. } | UnitOutcome::Cancelled => false,
            UnitOutcome::Diagnostics { diagnostics } => {
                deny_warnings || diagnostics.iter().any(Diagnostic::is_error)
            }
            UnitOutcome::Malformed { .. } | UnitOutcome::Timeout { .. } | UnitOutcome::Error { .. } => {
                true
            }
        }
    }
}

/// One entry of the report per compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub unit_id: String,
    pub document: String,
    /// Unit index within the document.
    pub index: usize,
    /// Snippet indices in compilation order.
    pub snippets: Vec<usize>,
    pub start_line: usize,
    pub end_line: usize,
    pub outcome: UnitOutcome,
    #[serde(skip)]
    pub document_ordinal: usize,
}

/// Per-document counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub document: String,
    pub title: String,
    pub ordinal: usize,
    pub units: usize,
    pub ok: usize,
    pub failed: usize,
    pub unchecked: usize,
    pub cancelled: usize,
    pub errors: usize,
    pub warnings: usize,
    pub passed: bool,
}

/// Corpus-wide counts by outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportCounts {
    pub documents: usize,
    pub units: usize,
    pub ok: usize,
    pub diagnostics: usize,
    pub malformed: usize,
    pub unchecked: usize,
    pub timeout: usize,
    pub error: usize,
    pub cancelled: usize,
    /// Error-severity diagnostics, malformed positions included.
    pub errors: usize,
    pub warnings: usize,
}

impl ReportCounts {
    pub(crate) fn add(&mut self, outcome: &UnitOutcome) {
        self.units += 1;
        match outcome {
            UnitOutcome::Ok => self.ok += 1,
            UnitOutcome::Diagnostics { diagnostics } => {
                self.diagnostics += 1;
                for d in diagnostics {
                    match d.severity {
                        Severity::Error => self.errors += 1,
                        Severity::Warning => self.warnings += 1,
                    }
                }
            }
            UnitOutcome::Malformed { .. } => {
                self.malformed += 1;
                self.errors += 1;
            }
            UnitOutcome::Unchecked { .. } => self.unchecked += 1,
            UnitOutcome::Timeout { .. } => self.timeout += 1,
            UnitOutcome::Error { .. } => self.error += 1,
            UnitOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

/// Validation result for one corpus snapshot.
///
/// Contains no timings or cache statistics, so an unchanged corpus always
/// serializes to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
    pub passed: bool,
    pub counts: ReportCounts,
    pub documents: Vec<DocumentSummary>,
    /// Every unit, ordered by (document ordinal, unit index).
    pub units: Vec<UnitReport>,
    /// Every diagnostic, ordered by (document ordinal, line, column).
    pub diagnostics: Vec<Diagnostic>,
    /// Corpus-level warnings (unknown `continues=` targets, cycles, unreadable files).
    pub warnings: Vec<String>,
}

impl Report {
    /// Whether any unit was cancelled by an abort.
    pub fn is_partial(&self) -> bool {
        self.counts.cancelled > 0
    }

    pub fn unit(&self, unit_id: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.unit_id == unit_id)
    }

    pub fn failed_units(&self, deny_warnings: bool) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(move |u| u.outcome.is_failure(deny_warnings))
    }
}

/// Run statistics kept out of the report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub documents: usize,
    pub units: usize,
    /// Units of a checked language that passed the syntax gate.
    pub checked: usize,
    pub cache_hits: usize,
    /// Units that went through a backend.
    pub compiled: usize,
    pub cancelled: usize,
    /// Why a persisted cache was discarded, if it was.
    pub cache_discarded: Option<String>,
    pub elapsed: Duration,
}

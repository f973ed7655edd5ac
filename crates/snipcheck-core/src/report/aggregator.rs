//! Merging of per-unit outcomes into a corpus report.

use std::collections::BTreeMap;

use super::cache::{CacheError, OutcomeCache};
use super::types::{DocumentSummary, Report, ReportCounts, UnitOutcome, UnitReport};
use crate::assemble::{AssembledDocument, CompilationUnit, UnitKind};
use crate::compile::{CheckOutcome, Diagnostic, RawDiagnostic, Severity, map_diagnostics};

struct DocumentEntry {
    path: String,
    title: String,
    ordinal: usize,
}

/// Single writer of unit results and of the outcome cache.
///
/// Outcomes may arrive in any order; [`Aggregator::finish`] re-imposes
/// (document ordinal, unit index) order.
pub struct Aggregator {
    deny_warnings: bool,
    cache: OutcomeCache,
    documents: Vec<DocumentEntry>,
    units: BTreeMap<(usize, usize), UnitReport>,
    warnings: Vec<String>,
}

impl Aggregator {
    pub fn new(deny_warnings: bool, cache: OutcomeCache) -> Self {
        Self {
            deny_warnings,
            cache,
            documents: Vec::new(),
            units: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn cache(&self) -> &OutcomeCache {
        &self.cache
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Register a document and record the outcomes that need no backend.
    ///
    /// Unchecked and malformed units are final as soon as the document is
    /// assembled. Checked units are left pending.
    pub fn add_document(&mut self, document: &AssembledDocument) {
        self.documents.push(DocumentEntry {
            path: document.path.clone(),
            title: document.title.clone(),
            ordinal: document.ordinal,
        });
        self.warnings.extend(document.warnings.iter().cloned());

        for unit in &document.units {
            match &unit.kind {
                UnitKind::Checked => self.cache.touch(&unit.hash),
                UnitKind::Unchecked { language } => self.record(
                    unit,
                    UnitOutcome::Unchecked {
                        language: language.clone(),
                    },
                ),
                UnitKind::Malformed {
                    snippet,
                    line,
                    column,
                    message,
                } => self.record(
                    unit,
                    UnitOutcome::Malformed {
                        snippet: *snippet,
                        line: *line,
                        column: *column,
                        message: message.clone(),
                    },
                ),
            }
        }
    }

    /// Record the cached outcome for `unit`, if one exists.
    pub fn record_cached(&mut self, unit: &CompilationUnit) -> Option<UnitOutcome> {
        let raw = self.cache.get(&unit.hash)?;
        tracing::debug!("{}: cache hit", unit.id);
        let outcome = completed_outcome(unit, &raw);
        self.record(unit, outcome.clone());
        Some(outcome)
    }

    /// Record the driver's result for `unit`. Only completed checks are cached.
    pub fn record_check(&mut self, unit: &CompilationUnit, check: CheckOutcome) -> UnitOutcome {
        let outcome = match check {
            CheckOutcome::Completed(raw) => {
                self.cache.insert(&unit.hash, &raw);
                completed_outcome(unit, &raw)
            }
            CheckOutcome::Failed(message) => UnitOutcome::Error { message },
            CheckOutcome::TimedOut(limit) => UnitOutcome::Timeout {
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            },
        };
        self.record(unit, outcome.clone());
        outcome
    }

    pub fn record_cancelled(&mut self, unit: &CompilationUnit) {
        self.record(unit, UnitOutcome::Cancelled);
    }

    /// Record a final outcome. A later record for the same unit replaces it.
    pub fn record(&mut self, unit: &CompilationUnit, outcome: UnitOutcome) {
        let key = (unit.document_ordinal, unit.index);
        self.units.insert(
            key,
            UnitReport {
                unit_id: unit.id.clone(),
                document: unit.document.clone(),
                index: unit.index,
                snippets: unit.snippets.clone(),
                start_line: unit.span.start_line,
                end_line: unit.span.end_line,
                outcome,
                document_ordinal: unit.document_ordinal,
            },
        );
    }

    /// Write the cache back to disk.
    pub fn persist_cache(&mut self) -> Result<(), CacheError> {
        self.cache.save()
    }

    /// Build the report.
    pub fn finish(self) -> Report {
        let Self {
            deny_warnings,
            mut documents,
            units,
            warnings,
            ..
        } = self;

        documents.sort_by_key(|d| d.ordinal);
        let units: Vec<UnitReport> = units.into_values().collect();

        let mut counts = ReportCounts {
            documents: documents.len(),
            ..ReportCounts::default()
        };
        let mut diagnostics: Vec<(usize, Diagnostic)> = Vec::new();

        for unit in &units {
            counts.add(&unit.outcome);
            match &unit.outcome {
                UnitOutcome::Diagnostics { diagnostics: list } => {
                    diagnostics.extend(list.iter().map(|d| (unit.document_ordinal, d.clone())));
                }
                UnitOutcome::Malformed {
                    snippet,
                    line,
                    column,
                    message,
                } => diagnostics.push((
                    unit.document_ordinal,
                    Diagnostic {
                        document: unit.document.clone(),
                        line: *line,
                        column: *column,
                        severity: Severity::Error,
                        message: message.clone(),
                        code: None,
                        snippet: *snippet,
                        unit_id: unit.unit_id.clone(),
                    },
                )),
                _ => {}
            }
        }

        // Stable: equal positions keep unit order.
        diagnostics.sort_by_key(|(ordinal, d)| (*ordinal, d.line, d.column));

        let summaries: Vec<DocumentSummary> = documents
            .iter()
            .map(|doc| summarize(doc, &units, deny_warnings))
            .collect();

        let passed = !units.iter().any(|u| u.outcome.is_failure(deny_warnings));

        Report {
            passed,
            counts,
            documents: summaries,
            units,
            diagnostics: diagnostics.into_iter().map(|(_, d)| d).collect(),
            warnings,
        }
    }
}

fn completed_outcome(unit: &CompilationUnit, raw: &[RawDiagnostic]) -> UnitOutcome {
    let diagnostics = map_diagnostics(unit, raw);
    if diagnostics.is_empty() {
        UnitOutcome::Ok
    } else {
        UnitOutcome::Diagnostics { diagnostics }
    }
}

fn summarize(doc: &DocumentEntry, units: &[UnitReport], deny_warnings: bool) -> DocumentSummary {
    let mut summary = DocumentSummary {
        document: doc.path.clone(),
        title: doc.title.clone(),
        ordinal: doc.ordinal,
        ..DocumentSummary::default()
    };

    for unit in units.iter().filter(|u| u.document_ordinal == doc.ordinal) {
        summary.units += 1;
        match &unit.outcome {
            UnitOutcome::Ok => summary.ok += 1,
            UnitOutcome::Unchecked { .. } => summary.unchecked += 1,
            UnitOutcome::Cancelled => summary.cancelled += 1,
            outcome if outcome.is_failure(deny_warnings) => summary.failed += 1,
            // Warnings only.
            _ => summary.ok += 1,
        }
        for d in unit.outcome.diagnostics() {
            match d.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
            }
        }
        if matches!(unit.outcome, UnitOutcome::Malformed { .. }) {
            summary.errors += 1;
        }
    }

    summary.passed = summary.failed == 0;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::Assembler;
    use crate::corpus::Document;
    use crate::profile::CompilerProfile;
    use std::time::Duration;

    fn assemble(path: &str, ordinal: usize, text: &str) -> AssembledDocument {
        let assembler = Assembler::new(&CompilerProfile::default()).unwrap();
        let mut doc = Document::new(path, text);
        doc.ordinal = ordinal;
        assembler.assemble(&doc)
    }

    #[test]
    fn test_out_of_order_completion_is_sorted() {
        let first = assemble("01.md", 0, "```ts\nlet a = 1;\n```\n\n# Next\n\n```ts\nlet b = 2;\n```\n");
        let second = assemble("02.md", 1, "```ts\nlet x: number = \"s\";\n```\n");

        let mut aggregator = Aggregator::new(false, OutcomeCache::disabled());
        aggregator.add_document(&second);
        aggregator.add_document(&first);

        let raw = vec![RawDiagnostic::error(1, 5, "TS2322", "Type 'string' is not assignable to type 'number'.")];
        aggregator.record_check(&second.units[0], CheckOutcome::Completed(raw));
        aggregator.record_check(&first.units[1], CheckOutcome::Completed(Vec::new()));
        aggregator.record_check(&first.units[0], CheckOutcome::Completed(Vec::new()));

        let report = aggregator.finish();
        let ids: Vec<&str> = report.units.iter().map(|u| u.unit_id.as_str()).collect();
        assert_eq!(ids, vec!["01.md#0", "01.md#1", "02.md#0"]);
        assert_eq!(report.documents[0].document, "01.md");
        assert!(!report.passed);
        assert!(report.documents[0].passed);
        assert!(!report.documents[1].passed);

        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].line, 2);
        assert_eq!(report.diagnostics[0].column, 5);
        assert_eq!(report.counts.ok, 2);
        assert_eq!(report.counts.diagnostics, 1);
        assert_eq!(report.counts.errors, 1);
    }

    #[test]
    fn test_unchecked_and_malformed_recorded_on_add() {
        let doc = assemble("a.md", 0, "```bash\nls\n```\n\n```ts\nlet a = (1;\n```\n");
        let mut aggregator = Aggregator::new(false, OutcomeCache::disabled());
        aggregator.add_document(&doc);
        let report = aggregator.finish();

        assert_eq!(report.counts.unchecked, 1);
        assert_eq!(report.counts.malformed, 1);
        assert!(!report.passed);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn test_warnings_only_fail_under_deny_warnings() {
        let doc = assemble("a.md", 0, "```ts\nlet a = 1;\n```\n");
        let raw = vec![RawDiagnostic::warning(1, 5, "TS6133", "'a' is declared but its value is never read.")];

        let mut lenient = Aggregator::new(false, OutcomeCache::disabled());
        lenient.add_document(&doc);
        lenient.record_check(&doc.units[0], CheckOutcome::Completed(raw.clone()));
        let report = lenient.finish();
        assert!(report.passed);
        assert_eq!(report.counts.warnings, 1);
        assert_eq!(report.documents[0].ok, 1);

        let mut strict = Aggregator::new(true, OutcomeCache::disabled());
        strict.add_document(&doc);
        strict.record_check(&doc.units[0], CheckOutcome::Completed(raw));
        assert!(!strict.finish().passed);
    }

    #[test]
    fn test_timeout_and_error_fail_but_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcomes.bin");
        let doc = assemble("a.md", 0, "```ts\nlet a = 1;\n```\n\n---\n\n```ts\nlet b = 2;\n```\n");

        let mut aggregator = Aggregator::new(false, OutcomeCache::open(path.clone(), "fp".into()));
        aggregator.add_document(&doc);
        let outcome = aggregator.record_check(&doc.units[0], CheckOutcome::TimedOut(Duration::from_millis(5)));
        assert_eq!(outcome, UnitOutcome::Timeout { timeout_ms: 5 });
        aggregator.record_check(&doc.units[1], CheckOutcome::Failed("crashed".into()));
        aggregator.persist_cache().unwrap();

        let report = aggregator.finish();
        assert!(!report.passed);
        assert_eq!(report.counts.timeout, 1);
        assert_eq!(report.counts.error, 1);

        let cache = OutcomeCache::open(path, "fp".into());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_hit_replays_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outcomes.bin");
        let doc = assemble("a.md", 0, "```ts\nlet x: number = \"s\";\n```\n");
        let raw = vec![RawDiagnostic::error(1, 5, "TS2322", "Type 'string' is not assignable to type 'number'.")];

        let mut first = Aggregator::new(false, OutcomeCache::open(path.clone(), "fp".into()));
        first.add_document(&doc);
        assert!(first.record_cached(&doc.units[0]).is_none());
        first.record_check(&doc.units[0], CheckOutcome::Completed(raw));
        first.persist_cache().unwrap();
        let first = first.finish();

        let mut second = Aggregator::new(false, OutcomeCache::open(path, "fp".into()));
        second.add_document(&doc);
        assert!(matches!(
            second.record_cached(&doc.units[0]),
            Some(UnitOutcome::Diagnostics { .. })
        ));
        assert_eq!(second.finish(), first);
    }

    #[test]
    fn test_cancelled_is_not_a_failure() {
        let doc = assemble("a.md", 0, "```ts\nlet a = 1;\n```\n");
        let mut aggregator = Aggregator::new(false, OutcomeCache::disabled());
        aggregator.add_document(&doc);
        aggregator.record_cancelled(&doc.units[0]);
        let report = aggregator.finish();
        assert!(report.passed);
        assert!(report.is_partial());
        assert_eq!(report.documents[0].cancelled, 1);
    }
}

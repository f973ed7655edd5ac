//! Human and machine renderings of a report.

use std::fmt::Write;

use super::types::{Report, UnitOutcome};
use crate::error::{Error, Result};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Pretty-printed JSON. Deterministic for a given report.
pub fn render_json(report: &Report) -> Result<String> {
    let mut json =
        serde_json::to_string_pretty(report).map_err(|e| Error::Serialization(e.to_string()))?;
    json.push('\n');
    Ok(json)
}

/// Grouped-by-document summary for terminals.
pub fn render_human(report: &Report, color: bool) -> String {
    let paint = |code: &'static str| if color { code } else { "" };
    let mut out = String::new();

    for doc in &report.documents {
        let status = if doc.passed {
            format!("{}ok{}", paint(GREEN), paint(RESET))
        } else {
            format!("{}FAILED{}", paint(RED), paint(RESET))
        };
        let _ = writeln!(
            out,
            "{}{}{} ({}) ... {status}",
            paint(BOLD),
            doc.document,
            paint(RESET),
            doc.title
        );

        for unit in report.units.iter().filter(|u| u.document == doc.document) {
            let lines = format!("lines {}-{}", unit.start_line, unit.end_line);
            match &unit.outcome {
                UnitOutcome::Ok | UnitOutcome::Unchecked { .. } => {}
                UnitOutcome::Diagnostics { diagnostics } => {
                    for d in diagnostics {
                        for line in d.format_terminal(color).lines() {
                            let _ = writeln!(out, "  {line}");
                        }
                    }
                }
                UnitOutcome::Malformed {
                    line,
                    column,
                    message,
                    ..
                } => {
                    let _ = writeln!(
                        out,
                        "  {}malformed{}: {message}\n    --> {}:{line}:{column}",
                        paint(RED),
                        paint(RESET),
                        unit.document
                    );
                }
                UnitOutcome::Timeout { timeout_ms } => {
                    let _ = writeln!(
                        out,
                        "  {}timeout{}: {} ({lines}) exceeded {timeout_ms}ms",
                        paint(YELLOW),
                        paint(RESET),
                        unit.unit_id
                    );
                }
                UnitOutcome::Error { message } => {
                    let _ = writeln!(
                        out,
                        "  {}internal error{}: {} ({lines}): {message}",
                        paint(RED),
                        paint(RESET),
                        unit.unit_id
                    );
                }
                UnitOutcome::Cancelled => {
                    let _ = writeln!(
                        out,
                        "  {}cancelled{}: {} ({lines})",
                        paint(DIM),
                        paint(RESET),
                        unit.unit_id
                    );
                }
            }
        }
    }

    if !report.warnings.is_empty() {
        out.push('\n');
        for warning in &report.warnings {
            let _ = writeln!(out, "{}warning{}: {warning}", paint(YELLOW), paint(RESET));
        }
    }

    let c = &report.counts;
    let _ = writeln!(
        out,
        "\n{} documents, {} units: {} ok, {} with diagnostics, {} malformed, {} unchecked, {} timed out, {} errored, {} cancelled",
        c.documents, c.units, c.ok, c.diagnostics, c.malformed, c.unchecked, c.timeout, c.error, c.cancelled
    );
    let _ = writeln!(out, "{} errors, {} warnings", c.errors, c.warnings);

    let verdict = match (report.passed, report.is_partial()) {
        (_, true) => format!("{}{}INCOMPLETE{}", paint(BOLD), paint(YELLOW), paint(RESET)),
        (true, false) => format!("{}{}PASSED{}", paint(BOLD), paint(GREEN), paint(RESET)),
        (false, false) => format!("{}{}FAILED{}", paint(BOLD), paint(RED), paint(RESET)),
    };
    let _ = writeln!(out, "{verdict}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::Assembler;
    use crate::compile::{CheckOutcome, RawDiagnostic};
    use crate::corpus::Document;
    use crate::profile::CompilerProfile;
    use crate::report::{Aggregator, OutcomeCache};

    fn sample_report() -> Report {
        let assembler = Assembler::new(&CompilerProfile::default()).unwrap();
        let doc = assembler.assemble(&Document::new(
            "01-types.md",
            "# Types\n\n```ts\nlet x: number = \"s\";\n```\n\n```bash\nnpm test\n```\n",
        ));
        let mut aggregator = Aggregator::new(false, OutcomeCache::disabled());
        aggregator.add_document(&doc);
        aggregator.record_check(
            &doc.units[0],
            CheckOutcome::Completed(vec![RawDiagnostic::error(
                1,
                5,
                "TS2322",
                "Type 'string' is not assignable to type 'number'.",
            )]),
        );
        aggregator.finish()
    }

    #[test]
    fn test_human_output() {
        let text = render_human(&sample_report(), false);
        assert!(text.starts_with("01-types.md (Types) ... FAILED\n"));
        assert!(text.contains("  error[TS2322]: Type 'string' is not assignable to type 'number'.\n"));
        assert!(text.contains("    --> 01-types.md:4:5\n"));
        assert!(text.contains("1 documents, 2 units: 0 ok, 1 with diagnostics"));
        assert!(text.ends_with("FAILED\n"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn test_json_output() {
        let report = sample_report();
        let json = render_json(&report).unwrap();
        assert_eq!(json, render_json(&report).unwrap());

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["passed"], false);
        assert_eq!(value["diagnostics"][0]["line"], 4);
        assert_eq!(value["diagnostics"][0]["code"], "TS2322");
        assert_eq!(value["diagnostics"][0]["unit_id"], "01-types.md#0");
        assert_eq!(value["units"][0]["outcome"]["status"], "diagnostics");
        assert_eq!(value["units"][1]["outcome"]["status"], "unchecked");
        assert_eq!(value["units"][1]["outcome"]["language"], "bash");
        assert!(value["units"][0].get("document_ordinal").is_none());
    }
}

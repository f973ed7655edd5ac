//! Translation of unit-local positions back to document coordinates.
//!
//! A unit's source is the preamble followed by its snippets, each snippet a
//! contiguous run of lines recorded as a [`Segment`]. Mapping is a pure
//! lookup over those segments.

use crate::assemble::{CompilationUnit, Segment};

use super::types::{Diagnostic, RawDiagnostic};

/// A document position resolved from a unit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedPosition {
    /// Snippet sequence index.
    pub snippet: usize,
    /// Document line (1-indexed).
    pub line: usize,
    /// Column (1-indexed).
    pub column: usize,
}

/// Map a unit line/column to its document position.
///
/// Returns `None` for positions inside the preamble. Positions past the end
/// of the body clamp to the last body line of the last snippet.
pub fn map_position(unit: &CompilationUnit, line: usize, column: usize) -> Option<MappedPosition> {
    let line = line.max(1);
    let column = column.max(1);

    if unit.in_preamble(line) {
        return None;
    }

    if let Some(segment) = unit
        .segments
        .iter()
        .find(|s| line >= s.unit_line && line < s.unit_line + s.line_count)
    {
        return Some(MappedPosition {
            snippet: segment.snippet,
            line: segment.document_line + (line - segment.unit_line),
            column,
        });
    }

    clamp_to_end(&unit.segments)
}

fn clamp_to_end(segments: &[Segment]) -> Option<MappedPosition> {
    match segments.iter().rev().find(|s| s.line_count > 0) {
        Some(last) => Some(MappedPosition {
            snippet: last.snippet,
            line: last.document_line + last.line_count - 1,
            column: 1,
        }),
        // Only empty snippets: point at the opening fence.
        None => segments.first().map(|s| MappedPosition {
            snippet: s.snippet,
            line: s.document_line.saturating_sub(1).max(1),
            column: 1,
        }),
    }
}

/// Map raw backend diagnostics to document diagnostics.
///
/// Diagnostics inside the preamble are dropped; callers that treat preamble
/// errors specially must inspect the raw list first.
pub fn map_diagnostics(unit: &CompilationUnit, raw: &[RawDiagnostic]) -> Vec<Diagnostic> {
    raw.iter()
        .filter_map(|d| {
            let pos = map_position(unit, d.line, d.column)?;
            Some(Diagnostic {
                document: unit.document.clone(),
                line: pos.line,
                column: pos.column,
                severity: d.severity,
                message: d.message.clone(),
                code: d.code.clone(),
                snippet: pos.snippet,
                unit_id: unit.id.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{Preamble, UnitKind};
    use crate::compile::Severity;
    use crate::extract::SourceSpan;

    fn unit(preamble_lines: usize, segments: Vec<Segment>) -> CompilationUnit {
        CompilationUnit {
            id: "a.md#0".into(),
            document: "a.md".into(),
            document_ordinal: 0,
            index: 0,
            language: "ts".into(),
            snippets: segments.iter().map(|s| s.snippet).collect(),
            preamble: Preamble {
                text: "declare const console: any;\n".repeat(preamble_lines),
                line_count: preamble_lines,
                ..Preamble::default()
            },
            body: String::new(),
            segments,
            hash: String::new(),
            span: SourceSpan {
                start_line: 1,
                end_line: 20,
            },
            kind: UnitKind::Checked,
        }
    }

    fn segments() -> Vec<Segment> {
        // Snippet 0: document lines 3-4, snippet 1: document lines 9-11.
        vec![
            Segment {
                snippet: 0,
                unit_line: 2,
                line_count: 2,
                document_line: 3,
            },
            Segment {
                snippet: 1,
                unit_line: 4,
                line_count: 3,
                document_line: 9,
            },
        ]
    }

    #[test]
    fn test_maps_into_segments() {
        let unit = unit(1, segments());
        assert_eq!(
            map_position(&unit, 2, 5),
            Some(MappedPosition {
                snippet: 0,
                line: 3,
                column: 5
            })
        );
        assert_eq!(map_position(&unit, 5, 1).map(|p| (p.snippet, p.line)), Some((1, 10)));
    }

    #[test]
    fn test_preamble_positions_dropped() {
        let unit = unit(1, segments());
        assert_eq!(map_position(&unit, 1, 1), None);
    }

    #[test]
    fn test_past_end_clamps_to_last_line() {
        let unit = unit(1, segments());
        assert_eq!(map_position(&unit, 40, 7).map(|p| (p.snippet, p.line)), Some((1, 11)));
    }

    #[test]
    fn test_map_diagnostics_filters_preamble() {
        let unit = unit(1, segments());
        let raw = vec![
            RawDiagnostic {
                line: 1,
                column: 15,
                severity: Severity::Error,
                message: "in preamble".into(),
                code: None,
            },
            RawDiagnostic {
                line: 3,
                column: 2,
                severity: Severity::Error,
                message: "Cannot find name 'x'.".into(),
                code: Some("TS2304".into()),
            },
        ];

        let mapped = map_diagnostics(&unit, &raw);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].line, 4);
        assert_eq!(mapped[0].snippet, 0);
        assert_eq!(mapped[0].unit_id, "a.md#0");
    }
}

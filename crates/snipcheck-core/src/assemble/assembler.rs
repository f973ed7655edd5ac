//! Grouping of snippets into compilation units.

use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

use super::preamble::Preamble;
use super::scan::scan;
use super::syntax::check_delimiters;
use super::types::{AssembledDocument, CompilationUnit, Segment, UnitKind};
use crate::compile::map_position;
use crate::corpus::Document;
use crate::error::Result;
use crate::extract::{Snippet, SourceSpan, extract};
use crate::graph::{ContinuityGraph, ContinuityLink};
use crate::profile::{AmbientGlobal, BackendKind, CompilerProfile, is_jsx_dialect};

/// Turns the snippets of a document into compilation units.
#[derive(Debug, Clone)]
pub struct Assembler {
    globals: Vec<AmbientGlobal>,
    languages: Vec<String>,
    continuity: bool,
    section_depth: u8,
}

/// How one unit is built, keyed by its lowest snippet index.
enum UnitPlan {
    Checked(Vec<usize>),
    Unchecked(usize),
    UnterminatedFence(usize),
}

impl Assembler {
    /// Create an assembler for a validated profile.
    ///
    /// The builtin backend has no JSX grammar, so `tsx` fences are left
    /// unchecked unless units go to `tsc`.
    pub fn new(profile: &CompilerProfile) -> Result<Self> {
        let languages = profile
            .languages
            .iter()
            .map(|l| l.to_ascii_lowercase())
            .filter(|l| profile.backend == BackendKind::Tsc || !is_jsx_dialect(l))
            .collect();
        Ok(Self {
            globals: profile.ambient_globals()?,
            languages,
            continuity: profile.continuity,
            section_depth: profile.section_depth,
        })
    }

    fn is_checked_language(&self, tag: &str) -> bool {
        self.languages.iter().any(|l| l == tag)
    }

    fn is_checked(&self, snippet: &Snippet) -> bool {
        !snippet.malformed && !snippet.attributes.ignore && self.is_checked_language(&snippet.language)
    }

    /// Assemble every unit of a document.
    pub fn assemble(&self, document: &Document) -> AssembledDocument {
        let snippets: Vec<Snippet> = extract(&document.text)
            .with_section_depth(self.section_depth)
            .collect();
        let checked: Vec<bool> = snippets.iter().map(|s| self.is_checked(s)).collect();

        let mut warnings = Vec::new();
        let links = self.link(document, &snippets, &checked, &mut warnings);

        let mut graph = ContinuityGraph::new(snippets.len());
        for link in &links {
            graph.add_link(link);
        }

        let members: Vec<usize> = (0..snippets.len()).filter(|&i| checked[i]).collect();
        let mut plans: Vec<(usize, UnitPlan)> = Vec::new();

        for component in graph.components(&members) {
            let order = graph.order(&component);
            if !order.cycle.is_empty() {
                let lines: Vec<String> = order
                    .cycle
                    .iter()
                    .map(|&i| snippets[i].span.start_line.to_string())
                    .collect();
                tracing::warn!(
                    "Continuity cycle in {} (snippets at lines {}); using document order",
                    document.path,
                    lines.join(", ")
                );
                warnings.push(format!(
                    "{}: continuity cycle between snippets at lines {}; using document order",
                    document.path,
                    lines.join(", ")
                ));
            }
            plans.push((component[0], UnitPlan::Checked(order.order)));
        }

        for (i, snippet) in snippets.iter().enumerate() {
            if checked[i] {
                continue;
            }
            let plan = if snippet.malformed
                && !snippet.attributes.ignore
                && self.is_checked_language(&snippet.language)
            {
                UnitPlan::UnterminatedFence(i)
            } else {
                UnitPlan::Unchecked(i)
            };
            plans.push((i, plan));
        }

        plans.sort_by_key(|(first, _)| *first);

        let units: Vec<CompilationUnit> = plans
            .into_iter()
            .enumerate()
            .map(|(index, (_, plan))| self.build_unit(document, index, plan, &snippets))
            .collect();

        tracing::debug!(
            "Assembled {}: {} snippets, {} units, {} links",
            document.path,
            snippets.len(),
            units.len(),
            links.len()
        );

        AssembledDocument {
            path: document.path.clone(),
            ordinal: document.ordinal,
            title: document.title.clone(),
            snippets,
            units,
            links,
            warnings,
        }
    }

    /// Infer adjacency links and resolve explicit `continues=` references.
    fn link(
        &self,
        document: &Document,
        snippets: &[Snippet],
        checked: &[bool],
        warnings: &mut Vec<String>,
    ) -> Vec<ContinuityLink> {
        let mut ids: FxHashMap<&str, usize> = FxHashMap::default();
        for snippet in snippets {
            let Some(id) = snippet.attributes.id.as_deref() else {
                continue;
            };
            if let Some(&first) = ids.get(id) {
                warnings.push(format!(
                    "{}:{}: duplicate snippet id '{id}' (first defined at line {})",
                    document.path, snippet.span.start_line, snippets[first].span.start_line
                ));
            } else {
                ids.insert(id, snippet.index);
            }
        }

        let mut links = Vec::new();
        for (i, snippet) in snippets.iter().enumerate() {
            if !checked[i] {
                continue;
            }

            if let Some(target) = snippet.attributes.continues.as_deref() {
                let line = snippet.span.start_line;
                match ids.get(target).copied() {
                    Some(j) if j == i => warnings.push(format!(
                        "{}:{line}: snippet continues itself ('{target}')",
                        document.path
                    )),
                    Some(j) if checked[j] => links.push(ContinuityLink {
                        from: j,
                        to: i,
                        explicit: true,
                    }),
                    Some(_) => warnings.push(format!(
                        "{}:{line}: continues='{target}' refers to an unchecked snippet",
                        document.path
                    )),
                    None => warnings.push(format!(
                        "{}:{line}: continues='{target}' names no snippet in this document",
                        document.path
                    )),
                }
                continue;
            }

            if self.continuity
                && i > 0
                && checked[i - 1]
                && snippets[i - 1].section == snippet.section
                && !snippet.attributes.standalone
            {
                links.push(ContinuityLink {
                    from: i - 1,
                    to: i,
                    explicit: false,
                });
            }
        }

        links
    }

    fn build_unit(
        &self,
        document: &Document,
        index: usize,
        plan: UnitPlan,
        snippets: &[Snippet],
    ) -> CompilationUnit {
        let order = match &plan {
            UnitPlan::Checked(order) => order.clone(),
            UnitPlan::Unchecked(i) | UnitPlan::UnterminatedFence(i) => vec![*i],
        };
        let first = &snippets[order[0]];

        let mut body = String::new();
        let mut placed: Vec<(usize, usize)> = Vec::with_capacity(order.len());
        let mut body_line = 1;
        for &i in &order {
            let snippet = &snippets[i];
            body.push_str(&snippet.text);
            if !snippet.text.is_empty() && !snippet.text.ends_with('\n') {
                body.push('\n');
            }
            placed.push((i, body_line));
            body_line += snippet.line_count();
        }

        let mut syntax_error = None;
        let preamble = match &plan {
            UnitPlan::Checked(_) => match scan(&body) {
                Ok(tokens) => {
                    syntax_error = check_delimiters(&tokens).err();
                    Preamble::build(&self.globals, &tokens)
                }
                Err(e) => {
                    syntax_error = Some(e);
                    Preamble::default()
                }
            },
            _ => Preamble::default(),
        };

        let segments: Vec<Segment> = placed
            .into_iter()
            .map(|(i, line)| Segment {
                snippet: i,
                unit_line: preamble.line_count + line,
                line_count: snippets[i].line_count(),
                document_line: snippets[i].body_start_line(),
            })
            .collect();

        let span = SourceSpan {
            start_line: order.iter().map(|&i| snippets[i].span.start_line).min().unwrap_or(1),
            end_line: order.iter().map(|&i| snippets[i].span.end_line).max().unwrap_or(1),
        };

        let kind = match &plan {
            UnitPlan::Checked(_) => UnitKind::Checked,
            UnitPlan::Unchecked(_) => UnitKind::Unchecked {
                language: first.language.clone(),
            },
            UnitPlan::UnterminatedFence(i) => UnitKind::Malformed {
                snippet: *i,
                line: first.span.start_line,
                column: 1,
                message: "unterminated code fence".to_string(),
            },
        };

        let texts: Vec<&str> = order.iter().map(|&i| snippets[i].text.as_str()).collect();
        let mut unit = CompilationUnit {
            id: format!("{}#{}", document.path, index),
            document: document.path.clone(),
            document_ordinal: document.ordinal,
            index,
            language: first.language.clone(),
            snippets: order,
            hash: content_hash(&first.language, &preamble, &texts),
            preamble,
            body,
            segments,
            span,
            kind,
        };

        if let Some(err) = syntax_error {
            let unit_line = unit.preamble.line_count + err.line;
            let pos = map_position(&unit, unit_line, err.column);
            let (snippet, line, column) = match pos {
                Some(p) => (p.snippet, p.line, p.column),
                None => (unit.snippets[0], unit.span.start_line, 1),
            };
            tracing::debug!("{} is malformed at {}:{}: {}", unit.id, line, column, err.message);
            unit.kind = UnitKind::Malformed {
                snippet,
                line,
                column,
                message: err.message,
            };
        }

        unit
    }
}

/// SHA-256 over the language tag, the preamble version, the preamble and
/// each snippet text.
pub fn content_hash(language: &str, preamble: &Preamble, texts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(language.as_bytes());
    hasher.update([0u8]);
    hasher.update(preamble.version.to_le_bytes());
    hasher.update(preamble.text.as_bytes());
    for text in texts {
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(text: &str) -> AssembledDocument {
        assemble_with(text, CompilerProfile::default())
    }

    fn assemble_with(text: &str, profile: CompilerProfile) -> AssembledDocument {
        let assembler = Assembler::new(&profile).unwrap();
        assembler.assemble(&Document::new("lesson.md", text))
    }

    #[test]
    fn test_adjacent_snippets_merge() {
        let doc = assemble("# A\n\n```ts\nlet a = 1;\n```\n\n```ts\nlet b = a;\n```\n");
        assert_eq!(doc.units.len(), 1);
        let unit = &doc.units[0];
        assert_eq!(unit.snippets, vec![0, 1]);
        assert_eq!(unit.body, "let a = 1;\nlet b = a;\n");
        assert_eq!(doc.links.len(), 1);
        assert!(!doc.links[0].explicit);
        assert_eq!(unit.segments[1].document_line, 8);
        assert_eq!(unit.segments[1].unit_line, 2);
    }

    #[test]
    fn test_heading_and_dialect_break_continuity() {
        let doc = assemble(
            "```ts\nlet a = 1;\n```\n# Next\n```ts\nlet b = 2;\n```\n```sh\nls\n```\n```ts\nlet c = 3;\n```\n",
        );
        let kinds: Vec<bool> = doc.units.iter().map(|u| u.is_checked()).collect();
        assert_eq!(kinds, vec![true, true, false, true]);
        assert!(doc.links.is_empty());
        assert_eq!(
            doc.units[2].kind,
            UnitKind::Unchecked {
                language: "sh".into()
            }
        );
    }

    #[test]
    fn test_continuity_disabled_and_standalone() {
        let text = "```ts\nlet a = 1;\n```\n```ts\nlet b = 2;\n```\n";
        let profile = CompilerProfile {
            continuity: false,
            ..CompilerProfile::default()
        };
        assert_eq!(assemble_with(text, profile).units.len(), 2);

        let doc = assemble("```ts\nlet a = 1;\n```\n```ts standalone\nlet b = 2;\n```\n");
        assert_eq!(doc.units.len(), 2);
    }

    #[test]
    fn test_explicit_continues_across_sections() {
        let doc = assemble(
            "# One\n```ts id=setup\nconst n = 1;\n```\n# Two\n```ts continues=setup\nn + 1;\n```\n```ts continues=missing\nlet z = 0;\n```\n",
        );
        assert_eq!(doc.units[0].snippets, vec![0, 1]);
        assert!(doc.links.iter().any(|l| l.explicit && l.from == 0 && l.to == 1));
        assert_eq!(doc.warnings.len(), 1);
        assert!(doc.warnings[0].contains("missing"));
    }

    #[test]
    fn test_unterminated_fence_is_malformed() {
        let doc = assemble("```ts\nlet a = 1;\n```\n\n```ts\nlet b = 2;\n");
        assert_eq!(doc.units.len(), 2);
        assert!(doc.units[0].is_checked());
        assert!(matches!(
            doc.units[1].kind,
            UnitKind::Malformed { line: 5, .. }
        ));
    }

    #[test]
    fn test_unbalanced_body_is_malformed_at_document_line() {
        let doc = assemble("Intro\n\n```ts\nfunction f() {\n  return 1;\n```\n");
        let UnitKind::Malformed { line, column, .. } = &doc.units[0].kind else {
            panic!("expected malformed unit");
        };
        assert_eq!((*line, *column), (4, 14));
    }

    #[test]
    fn test_preamble_and_hash() {
        let doc = assemble("```ts\nconsole.log(1);\n```\n");
        let unit = &doc.units[0];
        assert_eq!(unit.preamble.globals, vec!["console"]);
        assert_eq!(unit.segments[0].unit_line, 2);
        assert!(unit.source().starts_with("declare const console: any;\n"));
        assert_eq!(unit.hash.len(), 64);

        let again = assemble("Other prose\n\n```ts\nconsole.log(1);\n```\n");
        assert_eq!(again.units[0].hash, unit.hash);

        let changed = assemble("```ts\nconsole.log(2);\n```\n");
        assert_ne!(changed.units[0].hash, unit.hash);
    }

    #[test]
    fn test_ignored_snippet_is_unchecked() {
        let doc = assemble("```ts ignore\nthis is not code\n```\n");
        assert!(matches!(doc.units[0].kind, UnitKind::Unchecked { .. }));
    }

    #[test]
    fn test_language_is_part_of_hash() {
        let tsc = CompilerProfile {
            backend: BackendKind::Tsc,
            ..CompilerProfile::default()
        };
        let ts = assemble_with("```ts
const a = 1;
```
", tsc.clone());
        let tsx = assemble_with("```tsx
const a = 1;
```
", tsc);
        assert!(tsx.units[0].is_checked());
        assert_ne!(ts.units[0].hash, tsx.units[0].hash);
    }

    #[test]
    fn test_tsx_is_unchecked_on_builtin_backend() {
        let doc = assemble("```tsx
const el = <div>hi</div>;
```
");
        assert_eq!(
            doc.units[0].kind,
            UnitKind::Unchecked {
                language: "tsx".into()
            }
        );
    }

    #[test]
    fn test_language_list_is_case_insensitive() {
        let profile = CompilerProfile {
            languages: vec!["TypeScript".into()],
            ..CompilerProfile::default()
        };
        let doc = assemble_with("```typescript
const a = 1;
```
", profile);
        assert!(doc.units[0].is_checked());
    }
}

//! Ambient declarations prepended to a unit.
//!
//! Lesson snippets routinely use host globals (`console`, `document`) that a
//! bare compilation would reject. For every allow-listed global the body
//! references without declaring it, the preamble adds a `declare const`.
//! Nothing outside the allow-list is ever declared, so genuinely undefined
//! names still surface as diagnostics.

use rustc_hash::FxHashSet;
use serde::Serialize;

use super::scan::{ScanKind, ScanToken};
use crate::profile::AmbientGlobal;

/// Bumped whenever the generated text changes shape. Part of the unit hash.
pub const PREAMBLE_VERSION: u32 = 1;

/// Keywords whose following identifier is a declaration.
const DECLARING_KEYWORDS: &[&str] = &[
    "const",
    "let",
    "var",
    "function",
    "class",
    "interface",
    "type",
    "enum",
    "namespace",
];

/// Generated ambient declarations for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preamble {
    pub version: u32,
    /// Declaration text, one declaration per line.
    pub text: String,
    /// Lines occupied by `text`.
    pub line_count: usize,
    /// Globals declared, in allow-list order.
    pub globals: Vec<String>,
}

impl Default for Preamble {
    fn default() -> Self {
        Self {
            version: PREAMBLE_VERSION,
            text: String::new(),
            line_count: 0,
            globals: Vec::new(),
        }
    }
}

impl Preamble {
    /// Build the preamble for a scanned unit body.
    pub fn build(allowed: &[AmbientGlobal], body: &[ScanToken<'_>]) -> Self {
        let mut referenced: FxHashSet<&str> = FxHashSet::default();
        let mut declared: FxHashSet<&str> = FxHashSet::default();

        let mut i = 0;
        while i < body.len() {
            let tok = &body[i];
            let after_dot = i > 0 && body[i - 1].is_punct('.');

            if tok.kind == ScanKind::Ident && !after_dot {
                if tok.text == "import" {
                    // Every identifier up to `from` or `;` is a binding.
                    let mut j = i + 1;
                    while j < body.len() && !body[j].is_ident("from") && !body[j].is_punct(';') {
                        if body[j].kind == ScanKind::Ident {
                            declared.insert(body[j].text);
                        }
                        j += 1;
                    }
                    i = j;
                    continue;
                }

                if matches!(tok.text, "const" | "let" | "var") {
                    collect_declarators(body, i + 1, &mut declared);
                } else if DECLARING_KEYWORDS.contains(&tok.text) {
                    let mut j = i + 1;
                    if body.get(j).is_some_and(|t| t.is_punct('*')) {
                        j += 1;
                    }
                    if let Some(name) = body.get(j).filter(|t| t.kind == ScanKind::Ident) {
                        declared.insert(name.text);
                    }
                } else {
                    referenced.insert(tok.text);
                }
            }
            i += 1;
        }

        let mut preamble = Self::default();
        for global in allowed {
            let name = global.name.as_str();
            if referenced.contains(name) && !declared.contains(name) {
                preamble
                    .text
                    .push_str(&format!("declare const {name}: {};\n", global.type_annotation));
                preamble.line_count += 1;
                preamble.globals.push(global.name.clone());
            }
        }

        if !preamble.globals.is_empty() {
            tracing::debug!("Preamble declares {}", preamble.globals.join(", "));
        }
        preamble
    }

    pub fn is_empty(&self) -> bool {
        self.line_count == 0
    }
}

/// Record every name bound by the declarator list starting at `start`,
/// e.g. `a = 1, { b, c: [d] } = e`.
fn collect_declarators<'a>(body: &[ScanToken<'a>], start: usize, declared: &mut FxHashSet<&'a str>) {
    let mut j = start;
    while j < body.len() {
        j = collect_pattern(body, j, declared);
        if body.get(j).is_some_and(|t| t.is_punct('=')) {
            j = skip_initializer(body, j + 1);
        }
        if body.get(j).is_some_and(|t| t.is_punct(',')) {
            j += 1;
        } else {
            break;
        }
    }
}

/// Record the names of one binding: an identifier or an object/array
/// destructuring pattern. Returns the index just past it.
fn collect_pattern<'a>(body: &[ScanToken<'a>], start: usize, declared: &mut FxHashSet<&'a str>) -> usize {
    let Some(first) = body.get(start) else {
        return start;
    };
    let close = match first.kind {
        ScanKind::Ident => {
            declared.insert(first.text);
            return start + 1;
        }
        ScanKind::Punct('{') => '}',
        ScanKind::Punct('[') => ']',
        _ => return start,
    };

    let mut j = start + 1;
    while let Some(tok) = body.get(j) {
        match tok.kind {
            ScanKind::Punct(c) if c == close => return j + 1,
            ScanKind::Punct('{') | ScanKind::Punct('[') => j = collect_pattern(body, j, declared),
            // Default value.
            ScanKind::Punct('=') => j = skip_initializer(body, j + 1),
            ScanKind::Ident if body.get(j + 1).is_some_and(|t| t.is_punct(':')) => j += 2,
            ScanKind::Ident => {
                declared.insert(tok.text);
                j += 1;
            }
            _ => j += 1,
        }
    }
    j
}

/// Skip an initializer expression up to the `,`, `;` or closing delimiter
/// that ends it at its own nesting level. A line break between a complete
/// operand and an identifier also ends it.
fn skip_initializer(body: &[ScanToken<'_>], start: usize) -> usize {
    let mut depth = 0usize;
    let mut j = start;
    while let Some(tok) = body.get(j) {
        match tok.kind {
            ScanKind::Punct('(' | '[' | '{') => depth += 1,
            ScanKind::Punct(')' | ']' | '}') => {
                if depth == 0 {
                    return j;
                }
                depth -= 1;
            }
            ScanKind::Punct(',' | ';') if depth == 0 => return j,
            ScanKind::Ident | ScanKind::Literal if depth == 0 && j > start => {
                let prev = &body[j - 1];
                let ends_operand = matches!(
                    prev.kind,
                    ScanKind::Ident | ScanKind::Literal | ScanKind::Punct(')' | ']' | '}')
                );
                if prev.line < tok.line && ends_operand {
                    return j;
                }
            }
            _ => {}
        }
        j += 1;
    }
    j
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::scan::scan;

    fn globals(names: &[&str]) -> Vec<AmbientGlobal> {
        names
            .iter()
            .map(|n| AmbientGlobal {
                name: n.to_string(),
                type_annotation: "any".into(),
            })
            .collect()
    }

    #[test]
    fn test_declares_referenced_globals_only() {
        let body = "console.log(document.title);\n";
        let tokens = scan(body).unwrap();
        let preamble = Preamble::build(&globals(&["console", "window", "document"]), &tokens);

        assert_eq!(preamble.globals, vec!["console", "document"]);
        assert_eq!(
            preamble.text,
            "declare const console: any;\ndeclare const document: any;\n"
        );
        assert_eq!(preamble.line_count, 2);
    }

    #[test]
    fn test_never_declares_outside_allow_list() {
        let tokens = scan("undefinedThing();\n").unwrap();
        let preamble = Preamble::build(&globals(&["console"]), &tokens);
        assert!(preamble.is_empty());
        assert!(preamble.text.is_empty());
    }

    #[test]
    fn test_skips_locally_declared_and_member_names() {
        let body = "const console = { log() {} };\nimport { fetch } from './http';\nfoo.window = 1;\n";
        let tokens = scan(body).unwrap();
        let preamble = Preamble::build(&globals(&["console", "fetch", "window"]), &tokens);
        assert!(preamble.is_empty());
    }

    #[test]
    fn test_destructured_names_are_declarations() {
        let body = "const props = { document: 1, w: [2] };\nconst { document, w: [window] } = props;\n\
                    let [fetch = () => 0, ...rest] = [];\nconsole.log(document, window, fetch, rest);\n";
        let tokens = scan(body).unwrap();
        let preamble = Preamble::build(&globals(&["console", "document", "window", "fetch"]), &tokens);
        assert_eq!(preamble.globals, vec!["console"]);
    }

    #[test]
    fn test_declarator_lists_and_initializers() {
        let body = "let a = f(document, 1), window = 2\nlocation.reload();\n";
        let tokens = scan(body).unwrap();
        let preamble = Preamble::build(&globals(&["document", "window", "location"]), &tokens);
        assert_eq!(preamble.globals, vec!["document", "location"]);
    }

    #[test]
    fn test_uses_configured_type() {
        let allowed = vec![AmbientGlobal {
            name: "process".into(),
            type_annotation: "{ env: Record<string, string> }".into(),
        }];
        let tokens = scan("process.env.HOME;").unwrap();
        let preamble = Preamble::build(&allowed, &tokens);
        assert_eq!(
            preamble.text,
            "declare const process: { env: Record<string, string> };\n"
        );
    }
}

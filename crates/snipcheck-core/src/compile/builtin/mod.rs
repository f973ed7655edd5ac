//! In-process checker for a practical TypeScript subset.
//!
//! The pipeline is the usual one: [`lexer`] → [`parser`] → [`checker`].
//! The checker is deliberately conservative. Whenever a construct is not
//! modeled it types as `any`, so the diagnostics it does emit match what
//! `tsc` reports for the same source.

mod ast;
mod checker;
mod expr;
mod lexer;
mod lib;
mod narrow;
mod parser;
mod relate;
mod types;

use async_trait::async_trait;

use super::driver::TypeChecker;
use super::types::RawDiagnostic;
use crate::assemble::CompilationUnit;
use crate::error::{Error, Result};
use crate::profile::CompilerProfile;

pub use ast::Pos;

/// A lexer or parser error.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxIssue {
    pub pos: Pos,
    pub code: String,
    pub message: String,
}

/// Check a complete unit source under a profile.
///
/// A source with syntax errors reports only the first of them: later ones
/// are usually follow-on noise of the parser's recovery.
///
/// # Errors
/// Fails when the source nests deeper than the checker supports.
pub fn check_source(source: &str, profile: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
    let (program, issues) = parser::parse(source);
    if program.too_deep {
        return Err(Error::Backend {
            backend: "builtin".into(),
            message: format!("source nests deeper than {} levels", parser::MAX_NESTING),
        });
    }
    if let Some(first) = issues.into_iter().min_by_key(|i| (i.pos.line, i.pos.column)) {
        return Ok(vec![RawDiagnostic::error(
            first.pos.line,
            first.pos.column,
            &first.code,
            first.message,
        )]);
    }

    let options = checker::Options {
        target: profile.target,
        strict: profile.strict,
        no_implicit_any: profile.no_implicit_any(),
        no_unused_locals: profile.no_unused_locals,
    };
    Ok(checker::check_program(&program, options))
}

/// The in-process backend.
#[derive(Debug, Clone, Default)]
pub struct BuiltinChecker;

impl BuiltinChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TypeChecker for BuiltinChecker {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn version(&self) -> String {
        format!("builtin {}", env!("CARGO_PKG_VERSION"))
    }

    async fn check(&self, unit: &CompilationUnit, profile: &CompilerProfile) -> Result<Vec<RawDiagnostic>> {
        let source = unit.source();
        let profile = profile.clone();
        tokio::task::spawn_blocking(move || check_source(&source, &profile))
            .await
            .map_err(|e| Error::Backend {
                backend: "builtin".into(),
                message: format!("checker task failed: {e}"),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Severity;
    use crate::profile::Target;

    fn check(source: &str) -> Vec<RawDiagnostic> {
        check_source(source, &CompilerProfile::default()).unwrap()
    }

    fn codes(source: &str) -> Vec<String> {
        check(source).into_iter().filter_map(|d| d.code).collect()
    }

    #[test]
    fn test_type_mismatch_in_initializer() {
        let diagnostics = check("let x: number = \"s\";\n");
        assert_eq!(diagnostics.len(), 1);
        let d = &diagnostics[0];
        assert_eq!(d.code.as_deref(), Some("TS2322"));
        assert_eq!((d.line, d.column), (1, 5));
        assert_eq!(d.message, "Type 'string' is not assignable to type 'number'.");
        assert_eq!(d.severity, Severity::Error);
    }

    #[test]
    fn test_cannot_find_name() {
        let diagnostics = check("const total = price * 2;\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS2304"));
        assert_eq!(diagnostics[0].message, "Cannot find name 'price'.");
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (1, 15));
    }

    #[test]
    fn test_realistic_snippet_is_clean() {
        let source = r#"
interface User {
  id: number;
  name: string;
  email?: string;
}

function greet(user: User): string {
  return `Hello, ${user.name}!`;
}

const users: User[] = [
  { id: 1, name: "Ada" },
  { id: 2, name: "Linus", email: "linus@example.com" },
];

const names = users.map((u) => u.name.toUpperCase());
const first = users.find((u) => u.id === 1);
if (first) {
  greet(first);
}

class Counter {
  private count = 0;
  increment(by: number = 1): number {
    this.count += by;
    return this.count;
  }
}

const counter = new Counter();
counter.increment();
const message: string = names.join(", ");
"#;
        assert_eq!(check(source), Vec::new());
    }

    #[test]
    fn test_argument_count() {
        let diagnostics = check("function add(a: number, b: number) { return a + b; }\nadd(1);\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS2554"));
        assert_eq!(diagnostics[0].message, "Expected 2 arguments, but got 1.");
        assert_eq!(diagnostics[0].line, 2);
    }

    #[test]
    fn test_argument_type() {
        let diagnostics = check("function twice(n: number) { return n * 2; }\ntwice(\"4\");\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS2345"));
        assert_eq!(
            diagnostics[0].message,
            "Argument of type 'string' is not assignable to parameter of type 'number'."
        );
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (2, 7));
    }

    #[test]
    fn test_assign_to_const() {
        let diagnostics = check("const limit = 10;\nlimit = 20;\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS2588"));
        assert_eq!(diagnostics[0].message, "Cannot assign to 'limit' because it is a constant.");
    }

    #[test]
    fn test_block_scoped_redeclaration() {
        let diagnostics = check("let a = 1;\nlet a = 2;\n");
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|d| d.code.as_deref() == Some("TS2451")));
        assert_eq!(diagnostics[0].message, "Cannot redeclare block-scoped variable 'a'.");
        assert_eq!(diagnostics[1].line, 2);
    }

    #[test]
    fn test_unknown_property() {
        let diagnostics = check("const point: { a: number } = { a: 1 };\npoint.b;\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS2339"));
        assert_eq!(diagnostics[0].message, "Property 'b' does not exist on type '{ a: number; }'.");
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (2, 7));
    }

    #[test]
    fn test_implicit_any_parameter() {
        let diagnostics = check("function log(value) { return value; }\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS7006"));
        assert_eq!(diagnostics[0].message, "Parameter 'value' implicitly has an 'any' type.");

        let loose = CompilerProfile {
            strict: false,
            ..CompilerProfile::default()
        };
        assert!(check_source("function log(value) { return value; }\n", &loose).unwrap().is_empty());
    }

    #[test]
    fn test_strict_null_checks() {
        let source = "function size(s: string | null) { return s.length; }\n";
        let diagnostics = check(source);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS18047"));
        assert_eq!(diagnostics[0].message, "'s' is possibly 'null'.");

        let narrowed = "function size(s: string | null) {\n  if (s === null) return 0;\n  return s.length;\n}\n";
        assert!(check(narrowed).is_empty());

        let loose = CompilerProfile {
            strict: false,
            ..CompilerProfile::default()
        };
        assert!(check_source(source, &loose).unwrap().is_empty());
    }

    #[test]
    fn test_bigint_requires_es2020() {
        let source = "const big = 10n;\n";
        assert!(check(source).is_empty());

        let old = CompilerProfile {
            target: Target::Es2017,
            ..CompilerProfile::default()
        };
        let diagnostics = check_source(source, &old).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS2737"));
    }

    #[test]
    fn test_unused_locals_are_warnings() {
        let profile = CompilerProfile {
            no_unused_locals: true,
            ..CompilerProfile::default()
        };
        let diagnostics = check_source("function f() {\n  const unused = 1;\n  return 2;\n}\nf();\n", &profile).unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS6133"));
        assert_eq!(diagnostics[0].message, "'unused' is declared but its value is never read.");
    }

    #[test]
    fn test_syntax_error_reports_once() {
        let diagnostics = check("let x = ;\nlet y = ;\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(diagnostics[0].line, 1);
    }

    #[test]
    fn test_arithmetic_on_string() {
        assert_eq!(codes("const n = \"a\" * 2;\n"), vec!["TS2362"]);
        assert_eq!(codes("const n = 2 - \"a\";\n"), vec!["TS2363"]);
        assert!(codes("const s = \"a\" + 2;\n").is_empty());
    }

    #[test]
    fn test_not_callable() {
        let diagnostics = check("const n = 5;\nn();\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some("TS2349"));
        assert!(diagnostics[0].message.starts_with("This expression is not callable."));
    }

    #[test]
    fn test_discriminated_union() {
        let source = r#"
type Shape =
  | { kind: "circle"; radius: number }
  | { kind: "square"; size: number };

function area(shape: Shape): number {
  switch (shape.kind) {
    case "circle":
      return Math.PI * shape.radius ** 2;
    case "square":
      return shape.size * shape.size;
  }
}
"#;
        assert!(check(source).is_empty());
    }

    #[test]
    fn test_declare_provides_ambient() {
        let source = "declare const console: any;\nconsole.log(\"hi\");\n";
        assert!(check(source).is_empty());
    }

    #[test]
    fn test_template_substitutions() {
        assert!(check("const total = 3;\nconst msg = `Total: ${total}`;\n").is_empty());
        assert!(check("const x = 1;\nconst s = `a${x}b${1 + 2}c`;\n").is_empty());
        assert!(check("function tag(parts: any, ...values: number[]): number {\n  return values.length;\n}\nconst n: number = tag`a${1}b`;\n").is_empty());

        let diagnostics = check("const s = `a${missing}b`;\n");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "Cannot find name 'missing'.");
    }

    #[test]
    fn test_object_entries_and_values() {
        let source = "const pairs = Object.entries({ a: 1 });\nconst vals = Object.values({ a: 1, b: 2 });\nconst empty: {} = { a: 1 };\n";
        assert!(check(source).is_empty());
    }

    #[test]
    fn test_destructured_array_literal_is_a_tuple() {
        let source = "const [a, b] = [1, 'x'];\nconst n: number = a;\nconst s: string = b;\n";
        assert!(check(source).is_empty());

        let diagnostics = check("let [a, b] = [1, 'x'];\nconst s: string = a;\n");
        assert_eq!(codes("let [a, b] = [1, 'x'];\nconst s: string = a;\n"), vec!["TS2322"]);
        assert_eq!(diagnostics[0].message, "Type 'number' is not assignable to type 'string'.");
    }

    #[test]
    fn test_ambient_module_and_namespace() {
        let source = "declare module \"foo\" {\n  export const x: number;\n}\ndeclare namespace App {\n  const version: string;\n}\n";
        assert!(check(source).is_empty());
    }

    #[test]
    fn test_deep_nesting_is_a_backend_error() {
        let depth = 200;
        let source = format!("const v = {}1{};\n", "[".repeat(depth), "]".repeat(depth));
        let err = check_source(&source, &CompilerProfile::default()).unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));

        let shallow = format!("const v = {}1{};\n", "[".repeat(20), "]".repeat(20));
        assert!(check(&shallow).is_empty());
    }
}

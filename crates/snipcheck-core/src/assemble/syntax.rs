//! Structural syntax gate run before a unit reaches a backend.

use super::scan::{ScanKind, ScanToken, SyntaxError, scan};

/// Check that a unit body lexes cleanly and its delimiters balance.
///
/// Positions in the returned error are relative to `body`.
pub fn check_body(body: &str) -> Result<(), SyntaxError> {
    let tokens = scan(body)?;
    check_delimiters(&tokens)
}

/// Check that `(`, `[` and `{` are closed in nesting order.
pub fn check_delimiters(tokens: &[ScanToken<'_>]) -> Result<(), SyntaxError> {
    let mut open: Vec<&ScanToken<'_>> = Vec::new();

    for tok in tokens {
        let ScanKind::Punct(c) = tok.kind else {
            continue;
        };
        match c {
            '(' | '[' | '{' => open.push(tok),
            ')' | ']' | '}' => {
                let Some(opener) = open.pop() else {
                    return Err(SyntaxError {
                        line: tok.line,
                        column: tok.column,
                        message: format!("unexpected '{c}'"),
                    });
                };
                let expected = closer_for(opener.text);
                if expected != c {
                    return Err(SyntaxError {
                        line: tok.line,
                        column: tok.column,
                        message: format!(
                            "expected '{expected}' to close '{}' from line {}, found '{c}'",
                            opener.text, opener.line
                        ),
                    });
                }
            }
            _ => {}
        }
    }

    match open.pop() {
        Some(opener) => Err(SyntaxError {
            line: opener.line,
            column: opener.column,
            message: format!("'{}' is never closed", opener.text),
        }),
        None => Ok(()),
    }
}

fn closer_for(opener: &str) -> char {
    match opener {
        "(" => ')',
        "[" => ']',
        _ => '}',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_body() {
        assert!(check_body("function f(a: number[]) {\n  return { a };\n}\n").is_ok());
        assert!(check_body("const s = `${ {x: 1}.x }`;").is_ok());
        assert!(check_body("const s = '}';").is_ok());
    }

    #[test]
    fn test_unclosed_brace_reported_at_opener() {
        let err = check_body("let a = 1;\nif (a) {\n  a = 2;\n").unwrap_err();
        assert_eq!((err.line, err.column), (2, 8));
        assert!(err.message.contains("never closed"));
    }

    #[test]
    fn test_mismatch_and_stray_closer() {
        let err = check_body("foo(1];").unwrap_err();
        assert_eq!((err.line, err.column), (1, 6));
        assert!(err.message.contains("expected ')'"));

        let err = check_body("}\n").unwrap_err();
        assert_eq!(err.message, "unexpected '}'");
    }
}

//! Lightweight lexical scanner for C-family snippet bodies.
//!
//! The scanner knows just enough about the checked language to find
//! identifiers and delimiters: it skips comments, string, template and
//! regular-expression literals, and follows `${ ... }` template holes.
//! It never interprets the program.

use serde::Serialize;

/// Kind of a scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    Ident,
    Punct(char),
    Literal,
}

/// A scanned token with its 1-indexed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanToken<'a> {
    pub kind: ScanKind,
    pub text: &'a str,
    pub line: usize,
    pub column: usize,
}

impl ScanToken<'_> {
    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == ScanKind::Ident && self.text == text
    }

    pub fn is_punct(&self, c: char) -> bool {
        self.kind == ScanKind::Punct(c)
    }
}

/// A position-tagged syntax problem in a unit body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Keywords after which `/` starts a regular expression.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "instanceof", "yield", "await",
];

#[derive(Debug, Clone, Copy)]
struct TemplateFrame {
    /// Open `{` inside the current `${ ... }` hole.
    depth: usize,
    line: usize,
    column: usize,
}

struct Scanner<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    i: usize,
    line: usize,
    column: usize,
    templates: Vec<TemplateFrame>,
    tokens: Vec<ScanToken<'a>>,
}

/// Scan `source` into tokens.
///
/// # Errors
/// Returns the first unterminated comment, string, template or regular
/// expression literal.
pub fn scan(source: &str) -> Result<Vec<ScanToken<'_>>, SyntaxError> {
    let mut scanner = Scanner {
        source,
        chars: source.char_indices().collect(),
        i: 0,
        line: 1,
        column: 1,
        templates: Vec::new(),
        tokens: Vec::new(),
    };
    scanner.run()?;
    Ok(scanner.tokens)
}

impl<'a> Scanner<'a> {
    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.i + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.i)
            .map(|&(o, _)| o)
            .unwrap_or(self.source.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.i += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: &str) -> SyntaxError {
        SyntaxError {
            line,
            column,
            message: message.to_string(),
        }
    }

    fn push(&mut self, kind: ScanKind, start: usize, line: usize, column: usize) {
        let text = &self.source[start..self.offset()];
        self.tokens.push(ScanToken {
            kind,
            text,
            line,
            column,
        });
    }

    fn regex_allowed(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(tok) => match tok.kind {
                ScanKind::Punct(c) => !matches!(c, ')' | ']' | '}'),
                ScanKind::Ident => REGEX_PREFIX_KEYWORDS.contains(&tok.text),
                ScanKind::Literal => false,
            },
        }
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        while let Some(c) = self.peek(0) {
            let (start, line, column) = (self.offset(), self.line, self.column);

            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '/' if self.peek(1) == Some('/') => {
                    while let Some(c) = self.peek(0) {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '/' if self.peek(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek(0) == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(self.error(line, column, "unterminated block comment"));
                            }
                        }
                    }
                }
                '"' | '\'' => {
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('\\') => {
                                self.bump();
                            }
                            Some(q) if q == c => break,
                            Some('\n') | None => {
                                return Err(self.error(line, column, "unterminated string literal"));
                            }
                            Some(_) => {}
                        }
                    }
                    self.push(ScanKind::Literal, start, line, column);
                }
                '`' => {
                    self.bump();
                    self.templates.push(TemplateFrame {
                        depth: 0,
                        line,
                        column,
                    });
                    self.template_chars(start, line, column)?;
                }
                '{' => {
                    if let Some(frame) = self.templates.last_mut() {
                        frame.depth += 1;
                    }
                    self.bump();
                    self.push(ScanKind::Punct('{'), start, line, column);
                }
                '}' if self.templates.last().is_some_and(|f| f.depth == 0) => {
                    // Closes a `${` hole: resume the template text.
                    self.bump();
                    self.template_chars(start, line, column)?;
                }
                '}' => {
                    if let Some(frame) = self.templates.last_mut() {
                        frame.depth -= 1;
                    }
                    self.bump();
                    self.push(ScanKind::Punct('}'), start, line, column);
                }
                '/' if self.regex_allowed() => {
                    self.bump();
                    let mut in_class = false;
                    loop {
                        match self.bump() {
                            Some('\\') => {
                                self.bump();
                            }
                            Some('[') => in_class = true,
                            Some(']') => in_class = false,
                            Some('/') if !in_class => break,
                            Some('\n') | None => {
                                return Err(self.error(
                                    line,
                                    column,
                                    "unterminated regular expression literal",
                                ));
                            }
                            Some(_) => {}
                        }
                    }
                    while self.peek(0).is_some_and(|c| c.is_ascii_alphabetic()) {
                        self.bump();
                    }
                    self.push(ScanKind::Literal, start, line, column);
                }
                c if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) => {
                    let mut prev = c;
                    self.bump();
                    while let Some(n) = self.peek(0) {
                        let exponent_sign = matches!(n, '+' | '-') && matches!(prev, 'e' | 'E');
                        if n.is_ascii_alphanumeric() || n == '.' || n == '_' || exponent_sign {
                            prev = n;
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    self.push(ScanKind::Literal, start, line, column);
                }
                c if c.is_alphabetic() || c == '_' || c == '$' || c == '#' => {
                    self.bump();
                    while self
                        .peek(0)
                        .is_some_and(|n| n.is_alphanumeric() || n == '_' || n == '$')
                    {
                        self.bump();
                    }
                    self.push(ScanKind::Ident, start, line, column);
                }
                other => {
                    self.bump();
                    self.push(ScanKind::Punct(other), start, line, column);
                }
            }
        }

        if let Some(frame) = self.templates.last() {
            return Err(self.error(frame.line, frame.column, "unterminated template literal"));
        }
        Ok(())
    }

    /// Consume template text up to the closing backtick or the next `${`.
    fn template_chars(&mut self, start: usize, line: usize, column: usize) -> Result<(), SyntaxError> {
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some('`') => {
                    self.templates.pop();
                    self.push(ScanKind::Literal, start, line, column);
                    return Ok(());
                }
                Some('$') if self.peek(0) == Some('{') => {
                    self.bump();
                    self.push(ScanKind::Literal, start, line, column);
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    let frame = self.templates.last().copied().unwrap_or(TemplateFrame {
                        depth: 0,
                        line,
                        column,
                    });
                    return Err(self.error(frame.line, frame.column, "unterminated template literal"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idents(source: &str) -> Vec<&str> {
        scan(source)
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == ScanKind::Ident)
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_skips_comments_and_strings() {
        let ids = idents("let a = 'b c'; // d e\n/* f */ g(\"h\");");
        assert_eq!(ids, vec!["let", "a", "g"]);
    }

    #[test]
    fn test_template_holes_are_scanned() {
        let ids = idents("const s = `hello ${name.first} and ${ {a: other}.a }`;");
        assert_eq!(ids, vec!["const", "s", "name", "first", "a", "other", "a"]);
    }

    #[test]
    fn test_regex_literal() {
        let tokens = scan("const re = /[(]+\\//g; x = a / b;").unwrap();
        assert!(tokens.iter().any(|t| t.text == "/[(]+\\//g"));
        assert!(tokens.iter().any(|t| t.is_punct('/')));
    }

    #[test]
    fn test_positions() {
        let tokens = scan("a\n  bb").unwrap();
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn test_unterminated_literals() {
        let err = scan("let s = 'abc\nnext").unwrap_err();
        assert_eq!((err.line, err.column), (1, 9));
        assert!(err.message.contains("string"));

        let err = scan("x /* never closed").unwrap_err();
        assert!(err.message.contains("comment"));

        let err = scan("const t = `open ${a}").unwrap_err();
        assert!(err.message.contains("template"));
    }
}

//! Tokenizer for the checked TypeScript subset.
//!
//! `>` is always emitted as a single token; the parser recombines `>>`,
//! `>=` and friends from adjacent tokens so that nested generic argument
//! lists close cleanly.

use super::ast::Pos;
use super::SyntaxIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplatePart {
    /// `` `text` ``
    Whole,
    /// `` `text${ ``
    Head,
    /// `}text${`
    Middle,
    /// `` }text` ``
    Tail,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    /// Identifier or keyword.
    Ident(String),
    PrivateName(String),
    Number(String),
    BigInt(String),
    Str(String),
    Template(TemplatePart),
    Regex,
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub pos: Pos,
    /// Character offsets, used to recombine adjacent punctuators.
    pub start: usize,
    pub end: usize,
    /// A line break precedes this token.
    pub newline_before: bool,
}

impl Token {
    pub fn is(&self, punct: &str) -> bool {
        matches!(&self.tok, Tok::Punct(p) if *p == punct)
    }

    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.tok, Tok::Ident(w) if w == word)
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.tok {
            Tok::Ident(w) => Some(w),
            _ => None,
        }
    }
}

/// Punctuators, longest first.
const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "<<=", "&&=", "||=", "??=", "=>", "==", "!=", "<=", "&&", "||",
    "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "**", "<<", "{", "}",
    "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^", "!", "~", "?",
    ":", "=", ".", "@",
];

const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "of", "new", "delete", "void", "throw",
    "instanceof", "yield", "await",
];

struct Lexer<'a> {
    chars: Vec<char>,
    i: usize,
    line: usize,
    column: usize,
    newline: bool,
    /// Open `{` count per active template hole.
    templates: Vec<usize>,
    tokens: Vec<Token>,
    issues: &'a mut Vec<SyntaxIssue>,
}

/// Tokenize `source`, recording lexical errors in `issues`.
pub fn tokenize(source: &str, issues: &mut Vec<SyntaxIssue>) -> Vec<Token> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        i: 0,
        line: 1,
        column: 1,
        newline: false,
        templates: Vec::new(),
        tokens: Vec::new(),
        issues,
    };
    lexer.run();
    let pos = Pos {
        line: lexer.line,
        column: lexer.column,
    };
    let end = lexer.i;
    lexer.tokens.push(Token {
        tok: Tok::Eof,
        pos,
        start: end,
        end,
        newline_before: true,
    });
    lexer.tokens
}

impl Lexer<'_> {
    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.i + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.i += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
            self.newline = true;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn issue(&mut self, pos: Pos, code: &str, message: &str) {
        self.issues.push(SyntaxIssue {
            pos,
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    fn push(&mut self, tok: Tok, pos: Pos, start: usize) {
        self.tokens.push(Token {
            tok,
            pos,
            start,
            end: self.i,
            newline_before: self.newline,
        });
        self.newline = false;
    }

    fn text(&self, start: usize) -> String {
        self.chars[start..self.i].iter().collect()
    }

    fn regex_allowed(&self) -> bool {
        match self.tokens.last().map(|t| &t.tok) {
            None => true,
            Some(Tok::Punct(p)) => !matches!(*p, ")" | "]" | "}" | ">"),
            Some(Tok::Ident(w)) => REGEX_PREFIX_KEYWORDS.contains(&w.as_str()),
            Some(_) => false,
        }
    }

    fn run(&mut self) {
        while let Some(c) = self.peek(0) {
            let pos = self.pos();
            let start = self.i;

            if c.is_whitespace() {
                self.bump();
                continue;
            }

            if c == '/' && self.peek(1) == Some('/') {
                while self.peek(0).is_some_and(|c| c != '\n') {
                    self.bump();
                }
                continue;
            }

            if c == '/' && self.peek(1) == Some('*') {
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
                            let end = self.pos();
                            self.issue(end, "TS1010", "'*/' expected.");
                            break;
                        }
                    }
                }
                continue;
            }

            match c {
                '"' | '\'' => self.string(c, pos, start),
                '`' => {
                    self.bump();
                    self.template(pos, start, true);
                }
                '}' if self.templates.last() == Some(&0) => {
                    self.bump();
                    self.template(pos, start, false);
                }
                '{' => {
                    if let Some(depth) = self.templates.last_mut() {
                        *depth += 1;
                    }
                    self.bump();
                    self.push(Tok::Punct("{"), pos, start);
                }
                '}' => {
                    if let Some(depth) = self.templates.last_mut() {
                        *depth -= 1;
                    }
                    self.bump();
                    self.push(Tok::Punct("}"), pos, start);
                }
                '/' if self.regex_allowed() => self.regex(pos, start),
                c if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) => {
                    self.number(pos, start)
                }
                '#' if self.peek(1).is_some_and(is_ident_start) => {
                    self.bump();
                    while self.peek(0).is_some_and(is_ident_part) {
                        self.bump();
                    }
                    let name = self.text(start);
                    self.push(Tok::PrivateName(name), pos, start);
                }
                c if is_ident_start(c) => {
                    while self.peek(0).is_some_and(is_ident_part) {
                        self.bump();
                    }
                    let word = self.text(start);
                    self.push(Tok::Ident(word), pos, start);
                }
                _ => self.punctuator(pos, start),
            }
        }

        if !self.templates.is_empty() {
            let end = self.pos();
            self.issue(end, "TS1160", "Unterminated template literal.");
        }
    }

    fn string(&mut self, quote: char, pos: Pos, start: usize) {
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek(0) {
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('\n') => {}
                        Some(c) => value.push(c),
                        None => break,
                    }
                }
                Some(c) if c == quote => {
                    self.bump();
                    self.push(Tok::Str(value), pos, start);
                    return;
                }
                Some('\n') | None => break,
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        let end = self.pos();
        self.issue(end, "TS1002", "Unterminated string literal.");
        self.push(Tok::Str(value), pos, start);
    }

    /// Scan template text after a backtick or a hole-closing `}`.
    fn template(&mut self, pos: Pos, start: usize, opening: bool) {
        if !opening {
            self.templates.pop();
        }
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some('`') => {
                    let part = if opening { TemplatePart::Whole } else { TemplatePart::Tail };
                    self.push(Tok::Template(part), pos, start);
                    return;
                }
                Some('$') if self.peek(0) == Some('{') => {
                    self.bump();
                    self.templates.push(0);
                    let part = if opening { TemplatePart::Head } else { TemplatePart::Middle };
                    self.push(Tok::Template(part), pos, start);
                    return;
                }
                Some(_) => {}
                None => {
                    let end = self.pos();
                    self.issue(end, "TS1160", "Unterminated template literal.");
                    let part = if opening { TemplatePart::Whole } else { TemplatePart::Tail };
                    self.push(Tok::Template(part), pos, start);
                    return;
                }
            }
        }
    }

    fn regex(&mut self, pos: Pos, start: usize) {
        self.bump();
        let mut in_class = false;
        loop {
            match self.peek(0) {
                Some('\\') => {
                    self.bump();
                    self.bump();
                }
                Some('[') => {
                    in_class = true;
                    self.bump();
                }
                Some(']') => {
                    in_class = false;
                    self.bump();
                }
                Some('/') if !in_class => {
                    self.bump();
                    break;
                }
                Some('\n') | None => {
                    self.issue(pos, "TS1161", "Unterminated regular expression literal.");
                    break;
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        while self.peek(0).is_some_and(|c| c.is_ascii_alphabetic()) {
            self.bump();
        }
        self.push(Tok::Regex, pos, start);
    }

    fn number(&mut self, pos: Pos, start: usize) {
        let radix_prefix = self.peek(0) == Some('0')
            && self
                .peek(1)
                .is_some_and(|c| matches!(c, 'x' | 'X' | 'b' | 'B' | 'o' | 'O'));
        let mut prev = '\0';
        while let Some(c) = self.peek(0) {
            let exponent_sign = !radix_prefix && matches!(c, '+' | '-') && matches!(prev, 'e' | 'E');
            if c.is_ascii_alphanumeric() || c == '_' || exponent_sign || (c == '.' && !radix_prefix) {
                if c == '.' && self.peek(1) == Some('.') {
                    break;
                }
                prev = c;
                self.bump();
            } else {
                break;
            }
        }

        let text = self.text(start);
        if let Some(digits) = text.strip_suffix('n') {
            self.push(Tok::BigInt(digits.to_string()), pos, start);
        } else {
            self.push(Tok::Number(normalize_number(&text)), pos, start);
        }
    }

    fn punctuator(&mut self, pos: Pos, start: usize) {
        for &punct in PUNCTUATORS {
            let len = punct.chars().count();
            let matches = punct
                .chars()
                .enumerate()
                .all(|(k, pc)| self.peek(k) == Some(pc));
            if !matches {
                continue;
            }
            // `?.5` is a conditional followed by a number.
            if punct == "?." && self.peek(2).is_some_and(|c| c.is_ascii_digit()) {
                continue;
            }
            for _ in 0..len {
                self.bump();
            }
            self.push(Tok::Punct(punct), pos, start);
            return;
        }

        self.bump();
        self.issue(pos, "TS1127", "Invalid character.");
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Canonical spelling of a numeric literal, as shown in literal types.
pub fn normalize_number(text: &str) -> String {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let lower = cleaned.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok().map(|v| v as f64)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok().map(|v| v as f64)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok().map(|v| v as f64)
    } else {
        lower.parse::<f64>().ok()
    };

    match parsed {
        Some(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e21 => format!("{}", v as i64),
        Some(v) if v.is_finite() => format!("{v}"),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(source: &str) -> Vec<Tok> {
        let mut issues = Vec::new();
        let tokens = tokenize(source, &mut issues);
        assert!(issues.is_empty(), "{issues:?}");
        tokens.into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            toks("let x = a?.b ?? 1_000;"),
            vec![
                Tok::Ident("let".into()),
                Tok::Ident("x".into()),
                Tok::Punct("="),
                Tok::Ident("a".into()),
                Tok::Punct("?."),
                Tok::Ident("b".into()),
                Tok::Punct("??"),
                Tok::Number("1000".into()),
                Tok::Punct(";"),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_greater_than_is_split() {
        let tokens = toks("a >>= b");
        assert_eq!(tokens[1], Tok::Punct(">"));
        assert_eq!(tokens[2], Tok::Punct(">"));
        assert_eq!(tokens[3], Tok::Punct("="));
    }

    #[test]
    fn test_template_parts() {
        let tokens = toks("`a${b}c${d}e`");
        assert_eq!(tokens[0], Tok::Template(TemplatePart::Head));
        assert_eq!(tokens[2], Tok::Template(TemplatePart::Middle));
        assert_eq!(tokens[4], Tok::Template(TemplatePart::Tail));
    }

    #[test]
    fn test_bigint_and_numbers() {
        assert_eq!(toks("10n")[0], Tok::BigInt("10".into()));
        assert_eq!(toks("0x1F")[0], Tok::Number("31".into()));
        assert_eq!(toks("1.50")[0], Tok::Number("1.5".into()));
    }

    #[test]
    fn test_newline_flag_and_positions() {
        let mut issues = Vec::new();
        let tokens = tokenize("a\n  b", &mut issues);
        assert!(!tokens[0].newline_before);
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].pos, Pos { line: 2, column: 3 });
    }

    #[test]
    fn test_unterminated_string() {
        let mut issues = Vec::new();
        tokenize("let s = \"abc\n", &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "TS1002");
    }
}

//! Types produced by the snippet extractor.

use serde::Serialize;

/// Line span of a fenced block in its document (1-indexed, inclusive).
///
/// `start_line` is the opening fence, `end_line` the closing fence, or the
/// last line of the document when the block is unterminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceSpan {
    pub start_line: usize,
    pub end_line: usize,
}

/// Attributes parsed from a fence info string after the language tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FenceAttributes {
    /// Name other snippets can refer to with `continues=`.
    pub id: Option<String>,
    /// Name of the snippet this one continues.
    pub continues: Option<String>,
    /// Never merge with the previous snippet.
    pub standalone: bool,
    /// Exclude from checking (`ignore`, `no-check`).
    pub ignore: bool,
    /// Anything else, verbatim.
    pub extra: Vec<String>,
}

impl FenceAttributes {
    /// Parse the attribute tokens of an info string.
    pub fn parse<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        let mut attrs = Self::default();
        for token in tokens {
            let token = token.trim_matches(|c| c == ',' || c == '{' || c == '}');
            if token.is_empty() {
                continue;
            }
            match token.split_once('=') {
                Some(("id", value)) => attrs.id = Some(unquote(value).to_string()),
                Some(("continues", value)) => attrs.continues = Some(unquote(value).to_string()),
                Some(_) => attrs.extra.push(token.to_string()),
                None => match token {
                    "standalone" | "isolated" => attrs.standalone = true,
                    "ignore" | "no-check" | "nocheck" | "skip" => attrs.ignore = true,
                    other => attrs.extra.push(other.to_string()),
                },
            }
        }
        attrs
    }
}

fn unquote(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'')
}

/// A fenced code block extracted from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    /// Sequence index within the document (0-based, stable).
    pub index: usize,
    /// Lower-cased language tag; empty when the fence has no info string.
    pub language: String,
    /// Attributes following the language tag.
    pub attributes: FenceAttributes,
    /// Exact bytes between the fences.
    pub text: String,
    /// Fence line span.
    pub span: SourceSpan,
    /// Topic section the block sits in (bumped by headings and breaks).
    pub section: usize,
    /// Unterminated fence.
    pub malformed: bool,
}

impl Snippet {
    /// Document line of the first body line.
    pub fn body_start_line(&self) -> usize {
        self.span.start_line + 1
    }

    /// Number of body lines.
    pub fn line_count(&self) -> usize {
        if self.text.is_empty() {
            0
        } else {
            self.text.lines().count()
        }
    }
}

/// Metadata read from a leading `---` front-matter block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub order: Option<u64>,
    /// Number of lines the block occupies, including both delimiters.
    pub line_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attributes() {
        let attrs = FenceAttributes::parse(["id=setup", "standalone", "title=\"x\""]);
        assert_eq!(attrs.id.as_deref(), Some("setup"));
        assert!(attrs.standalone);
        assert!(!attrs.ignore);
        assert_eq!(attrs.extra, vec!["title=\"x\"".to_string()]);

        let attrs = FenceAttributes::parse(["{continues='setup'}", "no-check"]);
        assert_eq!(attrs.continues.as_deref(), Some("setup"));
        assert!(attrs.ignore);
    }

    #[test]
    fn test_line_count() {
        let snippet = Snippet {
            index: 0,
            language: "ts".into(),
            attributes: FenceAttributes::default(),
            text: "let a = 1;\nlet b = 2;\n".into(),
            span: SourceSpan {
                start_line: 3,
                end_line: 6,
            },
            section: 0,
            malformed: false,
        };
        assert_eq!(snippet.line_count(), 2);
        assert_eq!(snippet.body_start_line(), 4);
    }
}

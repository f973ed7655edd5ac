//! Fenced-block scanner for Markdown lesson documents.
//!
//! The scanner recognizes a minimal CommonMark fence grammar: up to three
//! spaces of indentation, then a run of at least three backticks or tildes.
//! A block closes on a line holding a run of the same character that is at
//! least as long as the opener and nothing else.

use super::types::{FenceAttributes, FrontMatter, SourceSpan, Snippet};

/// Default heading depth that starts a fresh topic.
pub const DEFAULT_SECTION_DEPTH: u8 = 6;

/// One physical line of the source.
#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    /// Line content without the terminator.
    text: &'a str,
    /// Byte offset of the first character.
    start: usize,
    /// 1-indexed line number.
    number: usize,
}

/// Cursor over the lines of a document, tracking byte offsets.
#[derive(Debug, Clone)]
struct LineCursor<'a> {
    source: &'a str,
    pos: usize,
    number: usize,
}

impl<'a> LineCursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            number: 1,
        }
    }

    fn next_line(&mut self) -> Option<Line<'a>> {
        if self.pos >= self.source.len() {
            return None;
        }

        let start = self.pos;
        let (end, next) = match self.source[start..].find('\n') {
            Some(offset) => (start + offset, start + offset + 1),
            None => (self.source.len(), self.source.len()),
        };

        let line = Line {
            text: self.source[start..end].trim_end_matches('\r'),
            start,
            number: self.number,
        };

        self.pos = next;
        self.number += 1;
        Some(line)
    }
}

/// An opening fence.
#[derive(Debug, Clone, Copy)]
struct Fence<'a> {
    marker: char,
    len: usize,
    info: &'a str,
}

fn strip_indent(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    (indent <= 3).then(|| &line[indent..])
}

fn parse_fence_open(line: &str) -> Option<Fence<'_>> {
    let rest = strip_indent(line)?;
    let marker = rest.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }

    let len = rest.chars().take_while(|&c| c == marker).count();
    if len < 3 {
        return None;
    }

    let info = rest[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }

    Some(Fence { marker, len, info })
}

fn is_fence_close(line: &str, fence: &Fence<'_>) -> bool {
    let Some(rest) = strip_indent(line) else {
        return false;
    };
    let len = rest.chars().take_while(|&c| c == fence.marker).count();
    len >= fence.len && rest[len..].trim().is_empty()
}

/// ATX heading level (1-6) of a line, if it is a heading.
fn heading_level(line: &str) -> Option<u8> {
    let rest = strip_indent(line)?;
    let hashes = rest.chars().take_while(|&c| c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    match rest[hashes..].chars().next() {
        None | Some(' ') | Some('\t') => Some(hashes as u8),
        _ => None,
    }
}

fn is_thematic_break(line: &str) -> bool {
    let Some(rest) = strip_indent(line) else {
        return false;
    };
    let mut marks = rest.chars().filter(|c| !c.is_whitespace());
    let Some(first) = marks.next() else {
        return false;
    };
    if !matches!(first, '-' | '*' | '_') {
        return false;
    }
    let mut count = 1;
    for c in marks {
        if c != first {
            return false;
        }
        count += 1;
    }
    count >= 3
}

/// Split a fence info string into the lower-cased language tag and attributes.
fn parse_info(info: &str) -> (String, FenceAttributes) {
    let mut tokens = info.split_whitespace();
    let first = tokens.next().unwrap_or("");
    let (tag, inline) = match first.split_once(',') {
        Some((tag, rest)) => (tag, Some(rest)),
        None => (first, None),
    };

    let inline_tokens = inline.into_iter().flat_map(|rest| rest.split(','));
    let attributes = FenceAttributes::parse(inline_tokens.chain(tokens));
    (tag.to_lowercase(), attributes)
}

/// Parse a leading `---` front-matter block.
///
/// Returns the metadata and the byte offset where the document body starts.
pub fn parse_front_matter(source: &str) -> Option<(FrontMatter, usize)> {
    let mut cursor = LineCursor::new(source);
    let first = cursor.next_line()?;
    if first.text != "---" {
        return None;
    }

    let mut front = FrontMatter::default();
    while let Some(line) = cursor.next_line() {
        if line.text == "---" || line.text == "..." {
            front.line_count = line.number;
            return Some((front, cursor.pos));
        }

        let Some((key, value)) = line.text.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match key.trim() {
            "title" if !value.is_empty() => front.title = Some(value.to_string()),
            "order" => front.order = value.parse().ok(),
            _ => {}
        }
    }

    // No closing delimiter: not front matter.
    None
}

/// Title of a document: front-matter `title`, else the first level-1 heading.
pub fn document_title(source: &str) -> Option<String> {
    if let Some((front, _)) = parse_front_matter(source)
        && let Some(title) = front.title
    {
        return Some(title);
    }

    let mut cursor = LineCursor::new(source);
    let mut open: Option<Fence<'_>> = None;
    while let Some(line) = cursor.next_line() {
        if let Some(fence) = open {
            if is_fence_close(line.text, &fence) {
                open = None;
            }
            continue;
        }
        if let Some(fence) = parse_fence_open(line.text) {
            open = Some(fence);
            continue;
        }
        if heading_level(line.text) == Some(1) {
            let rest = strip_indent(line.text).unwrap_or(line.text);
            let title = rest[1..].trim().trim_end_matches('#').trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}

/// Lazy, restartable iterator over the fenced blocks of a document.
///
/// Cloning the iterator (or calling [`extract`] again) restarts the scan;
/// the scan itself is a pure function of the input text.
#[derive(Debug, Clone)]
pub struct SnippetIter<'a> {
    cursor: LineCursor<'a>,
    section: usize,
    index: usize,
    section_depth: u8,
    total_lines: usize,
}

/// Scan a document for fenced code blocks.
pub fn extract(source: &str) -> SnippetIter<'_> {
    let mut cursor = LineCursor::new(source);
    if let Some((front, body_start)) = parse_front_matter(source) {
        cursor.pos = body_start;
        cursor.number = front.line_count + 1;
    }

    SnippetIter {
        cursor,
        section: 0,
        index: 0,
        section_depth: DEFAULT_SECTION_DEPTH,
        total_lines: source.lines().count(),
    }
}

impl<'a> SnippetIter<'a> {
    /// Only headings at this depth or shallower start a new section.
    pub fn with_section_depth(mut self, depth: u8) -> Self {
        self.section_depth = depth;
        self
    }

    fn read_block(&mut self, open: Line<'a>, fence: Fence<'a>) -> Snippet {
        let source = self.cursor.source;
        let body_start = self.cursor.pos;
        let (language, attributes) = parse_info(fence.info);

        let (text, end_line, malformed) = loop {
            match self.cursor.next_line() {
                Some(line) if is_fence_close(line.text, &fence) => {
                    break (&source[body_start..line.start], line.number, false);
                }
                Some(_) => continue,
                None => {
                    let rest = source.get(body_start..).unwrap_or("");
                    break (rest, self.total_lines.max(open.number), true);
                }
            }
        };

        if malformed {
            tracing::debug!(
                "Unterminated fence opened at line {} runs to end of document",
                open.number
            );
        }

        let snippet = Snippet {
            index: self.index,
            language,
            attributes,
            text: text.to_string(),
            span: SourceSpan {
                start_line: open.number,
                end_line,
            },
            section: self.section,
            malformed,
        };
        self.index += 1;
        snippet
    }
}

impl Iterator for SnippetIter<'_> {
    type Item = Snippet;

    fn next(&mut self) -> Option<Snippet> {
        while let Some(line) = self.cursor.next_line() {
            if let Some(fence) = parse_fence_open(line.text) {
                return Some(self.read_block(line, fence));
            }

            if let Some(level) = heading_level(line.text) {
                if level <= self.section_depth {
                    self.section += 1;
                }
            } else if is_thematic_break(line.text) {
                self.section += 1;
            }
        }
        None
    }
}

impl std::iter::FusedIterator for SnippetIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    const LESSON: &str = "\
# Variables

Declare a value:

```ts
let count: number = 1;
```

Then use it:

```TS id=use
count += 1;
```

## Shell

~~~bash
npm install
~~~
";

    #[test]
    fn test_extract_in_order() {
        let snippets: Vec<_> = extract(LESSON).collect();
        assert_eq!(snippets.len(), 3);

        assert_eq!(snippets[0].language, "ts");
        assert_eq!(snippets[0].text, "let count: number = 1;\n");
        assert_eq!(snippets[0].span.start_line, 5);
        assert_eq!(snippets[0].span.end_line, 7);

        assert_eq!(snippets[1].language, "ts");
        assert_eq!(snippets[1].attributes.id.as_deref(), Some("use"));
        assert_eq!(snippets[1].section, snippets[0].section);

        assert_eq!(snippets[2].language, "bash");
        assert_eq!(snippets[2].text, "npm install\n");
        assert!(snippets[2].section > snippets[1].section);

        assert!(snippets.iter().all(|s| !s.malformed));
        assert_eq!(
            snippets.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_restartable() {
        let iter = extract(LESSON);
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unterminated_fence() {
        let source = "# Intro\n\n```ts\nfunction f() {\n  return 1;\n";
        let snippets: Vec<_> = extract(source).collect();
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].malformed);
        assert_eq!(snippets[0].span.start_line, 3);
        assert_eq!(snippets[0].span.end_line, 5);
        assert_eq!(snippets[0].text, "function f() {\n  return 1;\n");
    }

    #[test]
    fn test_longer_closing_fence_and_nested_backticks() {
        let source = "````md\n```ts\nlet a = 1;\n```\n`````\n";
        let snippets: Vec<_> = extract(source).collect();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].language, "md");
        assert_eq!(snippets[0].text, "```ts\nlet a = 1;\n```\n");
    }

    #[test]
    fn test_empty_info_and_inline_attributes() {
        let source = "```\nplain\n```\n\n```ts,ignore\nlet x = 1;\n```\n";
        let snippets: Vec<_> = extract(source).collect();
        assert_eq!(snippets[0].language, "");
        assert_eq!(snippets[1].language, "ts");
        assert!(snippets[1].attributes.ignore);
    }

    #[test]
    fn test_section_depth() {
        let source = "```ts\na;\n```\n#### Detail\n```ts\nb;\n```\n";
        let deep: Vec<_> = extract(source).collect();
        assert_ne!(deep[0].section, deep[1].section);

        let shallow: Vec<_> = extract(source).with_section_depth(3).collect();
        assert_eq!(shallow[0].section, shallow[1].section);
    }

    #[test]
    fn test_thematic_break_starts_section() {
        let source = "```ts\na;\n```\n\n---\n\n```ts\nb;\n```\n";
        let snippets: Vec<_> = extract(source).collect();
        assert_ne!(snippets[0].section, snippets[1].section);
    }

    #[test]
    fn test_front_matter() {
        let source = "---\ntitle: \"Generics\"\norder: 3\n---\n# Ignored\n```ts\nlet a = 1;\n```\n";
        let (front, _) = parse_front_matter(source).unwrap();
        assert_eq!(front.title.as_deref(), Some("Generics"));
        assert_eq!(front.order, Some(3));
        assert_eq!(front.line_count, 4);

        let snippets: Vec<_> = extract(source).collect();
        assert_eq!(snippets[0].span.start_line, 6);
        assert_eq!(document_title(source).as_deref(), Some("Generics"));
    }

    #[test]
    fn test_document_title_skips_fenced_headings() {
        let source = "```md\n# Not a title\n```\n\n# Real Title\n";
        assert_eq!(document_title(source).as_deref(), Some("Real Title"));
        assert_eq!(document_title("no headings here"), None);
    }

    #[test]
    fn test_crlf_text_preserved() {
        let source = "```ts\r\nlet a = 1;\r\n```\r\n";
        let snippets: Vec<_> = extract(source).collect();
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].text, "let a = 1;\r\n");
        assert!(!snippets[0].malformed);
    }
}

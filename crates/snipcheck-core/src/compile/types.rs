//! Diagnostic types for the compilation pipeline.

use std::fmt;

use serde::Serialize;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A backend diagnostic in unit-local coordinates.
///
/// Line 1 is the first preamble line (or the first body line when the
/// preamble is empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawDiagnostic {
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
    pub message: String,
    /// Error code (e.g. "TS2322")
    pub code: Option<String>,
}

impl RawDiagnostic {
    pub fn error(line: usize, column: usize, code: &str, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            severity: Severity::Error,
            message: message.into(),
            code: Some(code.to_string()),
        }
    }

    pub fn warning(line: usize, column: usize, code: &str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(line, column, code, message)
        }
    }
}

/// A diagnostic positioned in its document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Corpus-relative document path.
    pub document: String,
    pub line: usize,
    pub column: usize,
    pub severity: Severity,
    pub message: String,
    pub code: Option<String>,
    /// Originating snippet sequence index.
    pub snippet: usize,
    pub unit_id: String,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Format the diagnostic for terminal display.
    pub fn format_terminal(&self, color: bool) -> String {
        let level = match (self.severity, color) {
            (Severity::Error, true) => "\x1b[1;31merror\x1b[0m".to_string(),
            (Severity::Warning, true) => "\x1b[1;33mwarning\x1b[0m".to_string(),
            (severity, false) => severity.to_string(),
        };

        let mut output = match &self.code {
            Some(code) => format!("{level}[{code}]: {}\n", self.message),
            None => format!("{level}: {}\n", self.message),
        };

        let arrow = if color { "\x1b[1;34m-->\x1b[0m" } else { "-->" };
        output.push_str(&format!(
            "  {arrow} {}:{}:{}\n",
            self.document, self.line, self.column
        ));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_terminal() {
        let diagnostic = Diagnostic {
            document: "01-intro.md".into(),
            line: 10,
            column: 5,
            severity: Severity::Error,
            message: "Cannot find name 'x'.".into(),
            code: Some("TS2304".into()),
            snippet: 0,
            unit_id: "01-intro.md#0".into(),
        };

        let plain = diagnostic.format_terminal(false);
        assert_eq!(
            plain,
            "error[TS2304]: Cannot find name 'x'.\n  --> 01-intro.md:10:5\n"
        );

        let colored = diagnostic.format_terminal(true);
        assert!(colored.contains("\x1b[1;31merror"));
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let raw = RawDiagnostic::warning(3, 7, "TS6133", "'a' is declared but its value is never read.");
        let json = serde_json::to_string(&raw).unwrap();
        assert!(json.contains("\"severity\":\"warning\""));
        assert!(json.contains("\"code\":\"TS6133\""));
    }
}

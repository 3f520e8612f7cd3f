//! Diagnostics for the senddat toolchain.
//!
//! Provides [`Diagnostic`], [`Severity`], [`Span`], and [`LineIndex`] types
//! used to report scanner errors, compiler warnings, and informational
//! messages while compiling send-data source. Diagnostic codes are defined in
//! the [`codes`] module.

#![warn(missing_docs)]

/// Diagnostic ID constants.
pub mod codes;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

// ── LineIndex ────────────────────────────────────────────────────────────

/// 1-based line and column of a byte offset, as shown to users.
///
/// Columns count bytes, not characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Line number, starting at 1.
    pub line: usize,
    /// Column number, starting at 1.
    pub col: usize,
}

/// Line table for one source text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Offset of the first byte of each line. Never empty.
    line_starts: Vec<usize>,
}

impl LineIndex {
    /// Index the line breaks of `text`.
    pub fn new(text: &str) -> Self {
        let breaks = text.match_indices('\n').map(|(i, _)| i + 1);
        Self {
            line_starts: std::iter::once(0).chain(breaks).collect(),
        }
    }

    /// Position of `offset`. Offsets past the end of the source map onto the last line.
    pub fn position(&self, offset: usize) -> Position {
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        Position {
            line: line + 1,
            col: offset - self.line_starts[line] + 1,
        }
    }

    /// Pair a diagnostic with the position of its span start.
    pub fn locate<'a>(&self, diagnostic: &'a Diagnostic) -> Located<'a> {
        Located {
            diagnostic,
            position: diagnostic.span.map(|span| self.position(span.start)),
        }
    }
}

/// A diagnostic serialized together with its line and column.
#[derive(Debug, Clone, Serialize)]
pub struct Located<'a> {
    /// The diagnostic itself; its fields serialize inline.
    #[serde(flatten)]
    pub diagnostic: &'a Diagnostic,
    /// Where the span starts, absent for spanless diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// Severity level for a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Severity {
    /// Hard error; the source cannot be compiled.
    Error,
    /// Warning; the token was skipped and produced no bytes.
    Warn,
    /// Informational note.
    Info,
}

/// Byte span in the source input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Span {
    /// Byte offset of the first character (0-based).
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl Span {
    /// Create a span covering `[start, end)`.
    ///
    /// Panics if `end < start`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(end >= start, "Span end ({end}) < start ({start})");
        Self { start, end }
    }

    /// Create a zero-width span at the given position.
    pub fn empty(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }
}

/// A diagnostic message produced by the scanner or compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Unique diagnostic code (e.g., `"SD1001"`).
    pub id: Cow<'static, str>,
    /// Severity level.
    pub severity: Severity,
    /// Human-readable diagnostic message.
    pub message: String,
    /// Optional byte span in the source input that this diagnostic relates to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    /// Machine-readable context for tooling. Keys and values are free-form strings.
    /// Absent when no context is applicable. Serialized only when present.
    ///
    /// Uses `BTreeMap` for deterministic key ordering in serialized output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, String>>,
}

impl Diagnostic {
    /// Create a diagnostic with the given fields.
    pub fn new(
        id: impl Into<Cow<'static, str>>,
        severity: Severity,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            message: message.into(),
            span,
            context: None,
        }
    }

    /// Shorthand for an `Error` diagnostic.
    pub fn error(
        id: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self::new(id, Severity::Error, message, span)
    }

    /// Shorthand for a `Warn` diagnostic.
    pub fn warn(
        id: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self::new(id, Severity::Warn, message, span)
    }

    /// Shorthand for an `Info` diagnostic.
    pub fn info(
        id: impl Into<Cow<'static, str>>,
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self::new(id, Severity::Info, message, span)
    }

    /// Attach machine-readable context metadata (builder pattern).
    ///
    /// Context is a set of key-value string pairs providing structured details
    /// about the diagnostic for tooling, filtering, and programmatic consumption.
    /// Keys are short descriptors like `"token"`, `"file"`, `"bytes"`, etc.
    pub fn with_context(mut self, ctx: BTreeMap<String, String>) -> Self {
        self.context = Some(ctx);
        self
    }

    /// Returns the human-readable explanation for this diagnostic's code, if available.
    pub fn explain(&self) -> Option<&'static str> {
        explain(&self.id)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warn => write!(f, "warn"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.id, self.message)
    }
}

/// Returns the human-readable explanation for a diagnostic code, if known.
pub fn explain(id: &str) -> Option<&'static str> {
    let text = match id {
        codes::UNTERMINATED_STRING => {
            "A double-quoted string must be closed on the same line it was opened."
        }
        codes::UNTERMINATED_RAW_STRING => {
            "A back-quoted raw string was never closed; raw strings may span lines but need a closing back-quote."
        }
        codes::UNTERMINATED_COMMENT => "A /* block comment */ was never closed.",
        codes::INVALID_ESCAPE => {
            "Only \\a \\b \\f \\n \\r \\t \\v \\\\ \\\" and numeric escapes are accepted inside a double-quoted string."
        }
        codes::MALFORMED_INTEGER => {
            "An integer with a 0x, 0o or 0b prefix must have at least one digit of that base."
        }
        codes::UNKNOWN_TOKEN => {
            "The character has no meaning in send-data source and was skipped. Quote it to send it to the printer."
        }
        codes::IMAGE_UNSUPPORTED => {
            "The # image inclusion command is reserved; its file name is read and ignored."
        }
        codes::FILE_INCLUDED => "The @ command copied the named file verbatim into the output.",
        codes::UNKNOWN_IDENTIFIER => {
            "Bare identifiers must name an ASCII control code such as ESC, GS, LF or CR."
        }
        codes::INTEGER_OUT_OF_RANGE => "Integer literals become a single byte and must be 0 to 255.",
        codes::INVALID_INTEGER => "The integer literal could not be parsed in its base.",
        codes::EXPECTED_DELAY => "The * delay command must be followed by an integer number of milliseconds.",
        codes::UNREADABLE_LINE => {
            "The . and ! commands read text up to the end of the line; the line was missing its newline or too long."
        }
        codes::INCLUDE_FAILED => "The file named by an @ command could not be opened or copied.",
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── LineIndex ────────────────────────────────────────────────────────

    fn pos(line: usize, col: usize) -> Position {
        Position { line, col }
    }

    #[test]
    fn positions_on_one_line() {
        let idx = LineIndex::new("ESC \"@\"");
        assert_eq!(idx.position(0), pos(1, 1));
        assert_eq!(idx.position(4), pos(1, 5));
    }

    #[test]
    fn newline_belongs_to_its_line() {
        let idx = LineIndex::new("CR\nLF\n");
        assert_eq!(idx.position(2), pos(1, 3));
        assert_eq!(idx.position(3), pos(2, 1));
        assert_eq!(idx.position(6), pos(3, 1));
    }

    #[test]
    fn offset_past_end_stays_on_last_line() {
        let idx = LineIndex::new("hi");
        assert_eq!(idx.position(100), pos(1, 101));
    }

    #[test]
    fn located_diagnostic_serializes_inline() {
        let idx = LineIndex::new("LF\nESC FOO");
        let d = Diagnostic::error(
            codes::UNKNOWN_IDENTIFIER,
            "unknown identifier",
            Some(Span::new(7, 10)),
        );
        let json = serde_json::to_value(idx.locate(&d)).unwrap();
        assert_eq!(json["id"], "SD3001");
        assert_eq!(json["span"]["start"], 7);
        assert_eq!(json["position"]["line"], 2);
        assert_eq!(json["position"]["col"], 5);

        let spanless = Diagnostic::error(codes::INCLUDE_FAILED, "missing", None);
        let json = serde_json::to_value(idx.locate(&spanless)).unwrap();
        assert!(json.get("position").is_none());
    }

    // ── Span ────────────────────────────────────────────────────────────

    #[test]
    fn span_empty() {
        let s = Span::empty(7);
        assert_eq!((s.start, s.end), (7, 7));
    }

    #[test]
    #[should_panic(expected = "Span end (3) < start (5)")]
    fn span_new_inverted_panics() {
        Span::new(5, 3);
    }

    // ── Diagnostic ──────────────────────────────────────────────────────

    #[test]
    fn diagnostic_display() {
        let d = Diagnostic::warn(codes::UNKNOWN_TOKEN, "unknown token ','", None);
        assert_eq!(format!("{}", d), "warn[SD2001]: unknown token ','");
    }

    #[test]
    fn diagnostic_explain_known_and_unknown() {
        let d = Diagnostic::error(codes::UNTERMINATED_STRING, "test", None);
        assert!(d.explain().unwrap().contains("same line"));
        assert!(explain("SD9999").is_none());
    }

    #[test]
    fn all_codes_have_explanations() {
        let all = [
            codes::UNTERMINATED_STRING,
            codes::UNTERMINATED_RAW_STRING,
            codes::UNTERMINATED_COMMENT,
            codes::INVALID_ESCAPE,
            codes::MALFORMED_INTEGER,
            codes::UNKNOWN_TOKEN,
            codes::IMAGE_UNSUPPORTED,
            codes::FILE_INCLUDED,
            codes::UNKNOWN_IDENTIFIER,
            codes::INTEGER_OUT_OF_RANGE,
            codes::INVALID_INTEGER,
            codes::EXPECTED_DELAY,
            codes::UNREADABLE_LINE,
            codes::INCLUDE_FAILED,
        ];
        for code in &all {
            assert!(
                explain(code).is_some(),
                "diagnostic code {code} has no explain() entry"
            );
        }
    }

    #[test]
    fn diagnostic_serde_omits_none_fields() {
        let d = Diagnostic::info(codes::FILE_INCLUDED, "included", None);
        let json = serde_json::to_string(&d).unwrap();
        assert!(!json.contains("span"), "None span should be omitted: {json}");
        assert!(!json.contains("context"), "None context should be omitted: {json}");
    }

    #[test]
    fn diagnostic_context_serde_roundtrip() {
        let d = Diagnostic::info(codes::FILE_INCLUDED, "included", Some(Span::new(0, 9)))
            .with_context(BTreeMap::from([
                ("file".into(), "logo.prn".into()),
                ("bytes".into(), "512".into()),
            ]));
        let json = serde_json::to_string(&d).unwrap();
        let d2: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(d, d2);
        assert!(json.find("bytes").unwrap() < json.find("file").unwrap());
    }
}

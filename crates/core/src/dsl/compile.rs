use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use senddat_diagnostics::{Diagnostic, Span, codes};
use senddat_spec_tables::ControlCode;

use super::lexer::{LineError, Scanner, TokKind, Token};

const DELAY: char = '*';
const COMMENT: char = '\'';
const KEY_WAIT: char = '.';
const PRINT: char = '!';
const INCLUDE: char = '@';
const IMAGE: char = '#';

/// Compiler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct CompileConfig {
    /// Scale factor for `*` delays. `0` disables sleeping.
    pub delay_multiplier: u32,
    /// Directory `@` include paths are resolved against. Relative paths
    /// resolve against the working directory when unset.
    pub include_dir: Option<PathBuf>,
    /// Maximum characters in a `.`, `!`, `@`, or `#` text line.
    pub max_line_len: usize,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            delay_multiplier: 1,
            include_dir: None,
            max_line_len: 250,
        }
    }
}

impl CompileConfig {
    /// Set [`CompileConfig::delay_multiplier`].
    pub fn with_delay_multiplier(mut self, multiplier: u32) -> Self {
        self.delay_multiplier = multiplier;
        self
    }

    /// Set [`CompileConfig::include_dir`].
    pub fn with_include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_dir = Some(dir.into());
        self
    }

    /// Set [`CompileConfig::max_line_len`].
    pub fn with_max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max;
        self
    }
}

/// Result of a successful compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CompileReport {
    /// Bytes written to the output, included files counted.
    pub bytes_written: u64,
    /// Warnings and notes, in source order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Compilation failures.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// An identifier that names no control code.
    #[error("unknown identifier {name:?}")]
    UnknownIdentifier {
        /// The identifier.
        name: String,
        /// Where it appears.
        span: Span,
    },
    /// An integer literal that does not fit in one byte.
    #[error("integer {literal} does not fit in a byte")]
    IntegerOutOfRange {
        /// The literal as written.
        literal: String,
        /// Where it appears.
        span: Span,
    },
    /// An integer literal that cannot be parsed.
    #[error("invalid integer {literal:?}")]
    InvalidInteger {
        /// The literal as written.
        literal: String,
        /// Where it appears.
        span: Span,
    },
    /// `*` not followed by an integer.
    #[error("expected integer after '*', got {found:?}")]
    ExpectedDelay {
        /// The token found instead, empty at end of input.
        found: String,
        /// Where it appears.
        span: Span,
    },
    /// The text line after a meta-command could not be read.
    #[error("cannot read text after '{command}'")]
    Line {
        /// The meta-command marker.
        command: char,
        /// Where the line starts.
        span: Span,
        /// Underlying line error.
        #[source]
        source: LineError,
    },
    /// An `@` include file could not be copied.
    #[error("cannot include {}", path.display())]
    Include {
        /// Resolved file path.
        path: PathBuf,
        /// The file name as written.
        span: Span,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The scanner reported errors; compilation ran to the end regardless.
    #[error("{count} scan error(s)")]
    Scan {
        /// Number of scan errors.
        count: usize,
        /// All diagnostics, scan errors and warnings, in source order.
        diagnostics: Vec<Diagnostic>,
    },
    /// Writing compiled bytes failed.
    #[error("write failed")]
    Write(#[source] io::Error),
    /// Writing to the console failed.
    #[error("console write failed")]
    Console(#[source] io::Error),
}

impl CompileError {
    /// Source span the error refers to, if any.
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::UnknownIdentifier { span, .. }
            | CompileError::IntegerOutOfRange { span, .. }
            | CompileError::InvalidInteger { span, .. }
            | CompileError::ExpectedDelay { span, .. }
            | CompileError::Line { span, .. }
            | CompileError::Include { span, .. } => Some(*span),
            CompileError::Scan { .. } | CompileError::Write(_) | CompileError::Console(_) => None,
        }
    }

    /// The error as diagnostics: every collected diagnostic for
    /// [`CompileError::Scan`], one error diagnostic otherwise. Output
    /// failures carry no code of their own and yield nothing.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let id = match self {
            CompileError::Scan { diagnostics, .. } => return diagnostics.clone(),
            CompileError::Write(_) | CompileError::Console(_) => return Vec::new(),
            CompileError::UnknownIdentifier { .. } => codes::UNKNOWN_IDENTIFIER,
            CompileError::IntegerOutOfRange { .. } => codes::INTEGER_OUT_OF_RANGE,
            CompileError::InvalidInteger { .. } => codes::INVALID_INTEGER,
            CompileError::ExpectedDelay { .. } => codes::EXPECTED_DELAY,
            CompileError::Line { .. } => codes::UNREADABLE_LINE,
            CompileError::Include { .. } => codes::INCLUDE_FAILED,
        };
        let message = match std::error::Error::source(self) {
            Some(cause) => format!("{self}: {cause}"),
            None => self.to_string(),
        };
        vec![Diagnostic::error(id, message, self.span())]
    }
}

/// Compile `source` into `out` with the default configuration, echoing
/// `.` and `!` text to stderr.
pub fn compile<W: Write>(source: &str, out: W) -> Result<CompileReport, CompileError> {
    compile_with(source, out, &mut io::stderr(), &CompileConfig::default())
}

/// Compile `source` into `out`. `.` and `!` text goes to `console`.
///
/// Output is buffered and flushed before each delay and once the whole
/// source compiled.
pub fn compile_with<W: Write>(
    source: &str,
    out: W,
    console: &mut dyn Write,
    config: &CompileConfig,
) -> Result<CompileReport, CompileError> {
    let mut compiler = Compiler {
        scanner: Scanner::new(source),
        out: BufWriter::new(out),
        console,
        config,
        written: 0,
        diagnostics: Vec::new(),
    };
    while let Some(tok) = compiler.scanner.next_token() {
        compiler.token(tok)?;
    }
    compiler.finish()
}

/// Compile `source` to a byte vector without delays or console output.
pub fn compile_to_vec(source: &str) -> Result<Vec<u8>, CompileError> {
    let mut buf = Vec::new();
    let config = CompileConfig::default().with_delay_multiplier(0);
    compile_with(source, &mut buf, &mut io::sink(), &config)?;
    Ok(buf)
}

/// Parse a command prefix written in send-data notation, e.g. `ESC "@"`.
///
/// Suitable as the prefix parser for command tables.
pub fn parse_prefix(text: &str) -> Result<Vec<u8>, CompileError> {
    compile_to_vec(text)
}

/// Parse an integer literal: decimal, or `0x`/`0o`/`0b` prefixed.
pub fn parse_int(text: &str) -> Option<u64> {
    let lower = text.to_ascii_lowercase();
    let (digits, radix) = match lower.as_bytes() {
        [b'0', b'x', ..] => (&lower[2..], 16),
        [b'0', b'o', ..] => (&lower[2..], 8),
        [b'0', b'b', ..] => (&lower[2..], 2),
        _ => (lower.as_str(), 10),
    };
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

struct Compiler<'a, 'c, W: Write> {
    scanner: Scanner<'a>,
    out: BufWriter<W>,
    console: &'c mut dyn Write,
    config: &'c CompileConfig,
    written: u64,
    diagnostics: Vec<Diagnostic>,
}

impl<'a, W: Write> Compiler<'a, '_, W> {
    fn emit(&mut self, bytes: &[u8]) -> Result<(), CompileError> {
        self.out.write_all(bytes).map_err(CompileError::Write)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn token(&mut self, tok: Token<'a>) -> Result<(), CompileError> {
        tracing::debug!(kind = ?tok.kind, text = tok.text, offset = tok.start, "token");
        match tok.kind {
            TokKind::Ident => {
                let Some(code) = ControlCode::from_name(tok.text) else {
                    return Err(CompileError::UnknownIdentifier {
                        name: tok.text.to_string(),
                        span: tok.span(),
                    });
                };
                self.emit(&[code.byte()])
            }
            TokKind::String => self.emit(strip_delims(tok.text, '"').as_bytes()),
            TokKind::RawString => self.emit(strip_delims(tok.text, '`').as_bytes()),
            TokKind::Int => {
                let b = int_byte(&tok)?;
                self.emit(&[b])
            }
            TokKind::Comment => Ok(()),
            TokKind::Char(c @ (DELAY | COMMENT | KEY_WAIT | PRINT | INCLUDE | IMAGE)) => {
                self.meta(c, &tok)
            }
            TokKind::Char(c) => {
                tracing::warn!(token = %c, offset = tok.start, "unknown token");
                self.diagnostics.push(
                    Diagnostic::warn(
                        codes::UNKNOWN_TOKEN,
                        format!("unknown token {c:?}"),
                        Some(tok.span()),
                    )
                    .with_context(ctx!("token" => tok.text)),
                );
                Ok(())
            }
        }
    }

    fn meta(&mut self, command: char, tok: &Token<'a>) -> Result<(), CompileError> {
        match command {
            COMMENT => {
                let text = self.scanner.skip_line();
                tracing::debug!(text, offset = tok.start, "comment");
            }
            DELAY => self.delay()?,
            KEY_WAIT | PRINT => {
                let (text, _) = self.line(command)?;
                tracing::debug!(text, command = %command, "console text");
                writeln!(self.console, "{text}").map_err(CompileError::Console)?;
            }
            INCLUDE => self.include()?,
            IMAGE => {
                let (name, span) = self.line(command)?;
                tracing::warn!(file = name, "image inclusion is not supported");
                self.diagnostics.push(
                    Diagnostic::warn(
                        codes::IMAGE_UNSUPPORTED,
                        "image inclusion is not supported; no bytes emitted",
                        Some(Span::new(tok.start, span.end)),
                    )
                    .with_context(ctx!("file" => name)),
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn line(&mut self, command: char) -> Result<(&'a str, Span), CompileError> {
        let start = self.scanner.position();
        self.scanner
            .read_line(self.config.max_line_len)
            .map_err(|source| CompileError::Line {
                command,
                span: Span::empty(start),
                source,
            })
    }

    fn delay(&mut self) -> Result<(), CompileError> {
        let tok = match self.scanner.next_token() {
            Some(tok) if tok.kind == TokKind::Int => tok,
            Some(other) => {
                return Err(CompileError::ExpectedDelay {
                    found: other.text.to_string(),
                    span: other.span(),
                });
            }
            None => {
                return Err(CompileError::ExpectedDelay {
                    found: String::new(),
                    span: Span::empty(self.scanner.position()),
                });
            }
        };
        let ms = parse_int(tok.text).ok_or_else(|| CompileError::InvalidInteger {
            literal: tok.text.to_string(),
            span: tok.span(),
        })?;
        let pause = Duration::from_millis(ms).saturating_mul(self.config.delay_multiplier);
        tracing::debug!(ms, multiplier = self.config.delay_multiplier, "delay");
        if !pause.is_zero() {
            self.out.flush().map_err(CompileError::Write)?;
            std::thread::sleep(pause);
        }
        Ok(())
    }

    fn include(&mut self) -> Result<(), CompileError> {
        let (name, span) = self.line(INCLUDE)?;
        let name = name.trim();
        let path = match &self.config.include_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };
        let copied = File::open(&path).and_then(|mut f| io::copy(&mut f, &mut self.out));
        let n = copied.map_err(|source| CompileError::Include {
            path: path.clone(),
            span,
            source,
        })?;
        self.written += n;
        tracing::info!(file = %path.display(), bytes = n, "included file");
        self.diagnostics.push(
            Diagnostic::info(
                codes::FILE_INCLUDED,
                format!("included {} ({n} bytes)", path.display()),
                Some(span),
            )
            .with_context(ctx!("file" => path.display().to_string(), "bytes" => n.to_string())),
        );
        Ok(())
    }

    fn finish(mut self) -> Result<CompileReport, CompileError> {
        let scan_errors = self.scanner.error_count();
        let mut diagnostics = self.diagnostics;
        diagnostics.extend(self.scanner.into_diagnostics());
        diagnostics.sort_by_key(|d| d.span.map_or(0, |s| s.start));
        if scan_errors > 0 {
            return Err(CompileError::Scan {
                count: scan_errors,
                diagnostics,
            });
        }
        self.out.flush().map_err(CompileError::Write)?;
        tracing::debug!(bytes = self.written, "compiled");
        Ok(CompileReport {
            bytes_written: self.written,
            diagnostics,
        })
    }
}

fn strip_delims(text: &str, delim: char) -> &str {
    let inner = text.strip_prefix(delim).unwrap_or(text);
    inner.strip_suffix(delim).unwrap_or(inner)
}

fn int_byte(tok: &Token<'_>) -> Result<u8, CompileError> {
    let value = parse_int(tok.text).ok_or_else(|| CompileError::InvalidInteger {
        literal: tok.text.to_string(),
        span: tok.span(),
    })?;
    u8::try_from(value).map_err(|_| CompileError::IntegerOutOfRange {
        literal: tok.text.to_string(),
        span: tok.span(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_literals() {
        assert_eq!(parse_int("255"), Some(255));
        assert_eq!(parse_int("0xFF"), Some(255));
        assert_eq!(parse_int("0XfF"), Some(255));
        assert_eq!(parse_int("0o17"), Some(15));
        assert_eq!(parse_int("0b101"), Some(5));
        assert_eq!(parse_int("010"), Some(10));
        assert_eq!(parse_int("0x"), None);
        assert_eq!(parse_int("0b102"), None);
    }

    #[test]
    fn delimiters_strip_once() {
        assert_eq!(strip_delims("\"abc\"", '"'), "abc");
        assert_eq!(strip_delims("\"\"", '"'), "");
        assert_eq!(strip_delims("\"abc", '"'), "abc");
        assert_eq!(strip_delims("`a\"b`", '`'), "a\"b");
    }

    #[test]
    fn error_spans() {
        let err = compile_to_vec("ESC FOO").unwrap_err();
        assert_eq!(err.span(), Some(Span::new(4, 7)));
        assert_eq!(err.to_string(), "unknown identifier \"FOO\"");
    }

    #[test]
    fn errors_as_diagnostics() {
        let err = compile_to_vec("LF 300").unwrap_err();
        let diags = err.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].id, codes::INTEGER_OUT_OF_RANGE);
        assert_eq!(diags[0].span, Some(Span::new(3, 6)));

        let err = compile_to_vec("\"open\n\"x\\q\"").unwrap_err();
        let ids: Vec<_> = err.diagnostics().iter().map(|d| d.id.to_string()).collect();
        assert_eq!(ids, [codes::UNTERMINATED_STRING, codes::INVALID_ESCAPE]);
    }
}

use senddat_diagnostics::{Diagnostic, Span, codes};

/// Classification of a send-data token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokKind {
    /// A letter or `_` followed by letters, digits, and `_`.
    Ident,
    /// A `"…"` string, quotes included in the token text.
    String,
    /// A `` `…` `` raw string, backquotes included in the token text.
    RawString,
    /// A decimal, `0x`, `0o`, or `0b` integer literal.
    Int,
    /// A `//` line comment or `/* … */` block comment.
    Comment,
    /// Any other single character, including the meta-command markers.
    Char(char),
}

/// A token that borrows its text from the source.
///
/// `text` is always exactly `&input[start..end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// The classification of this token.
    pub kind: TokKind,
    /// Borrowed slice of the source input for this token.
    pub text: &'a str,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl Token<'_> {
    /// The token's byte span.
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

/// Failure to read a line of text after a meta-command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    /// The source ended before the terminating newline.
    #[error("unexpected end of input before newline")]
    UnexpectedEof,
    /// The line is longer than the allowed maximum.
    #[error("line longer than {max} characters")]
    TooLong {
        /// Maximum number of characters.
        max: usize,
    },
}

/// On-demand tokenizer for send-data source.
///
/// Whitespace is skipped. Malformed literals still produce a token; the
/// problem is recorded as an error [`Diagnostic`] and scanning continues.
#[derive(Debug)]
pub struct Scanner<'a> {
    input: &'a str,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Scanner<'a> {
    /// Create a scanner at the start of `input`.
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Byte offset of the next unread character.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Scan errors recorded so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Number of scan errors recorded so far.
    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    /// Consume the scanner, returning its diagnostics.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut it = self.input[self.pos..].chars();
        it.next();
        it.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn token(&self, kind: TokKind, start: usize) -> Token<'a> {
        Token {
            kind,
            text: &self.input[start..self.pos],
            start,
            end: self.pos,
        }
    }

    /// Scan the next token, or `None` at the end of input.
    pub fn next_token(&mut self) -> Option<Token<'a>> {
        self.eat_while(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
        let start = self.pos;
        let c = self.bump()?;
        let kind = match c {
            c if c.is_alphabetic() || c == '_' => {
                self.eat_while(|c| c.is_alphanumeric() || c == '_');
                TokKind::Ident
            }
            '0'..='9' => {
                self.scan_int(c, start);
                TokKind::Int
            }
            '"' => {
                self.scan_string(start);
                TokKind::String
            }
            '`' => {
                self.scan_raw_string(start);
                TokKind::RawString
            }
            '/' if self.peek() == Some('/') => {
                self.eat_while(|c| c != '\n');
                TokKind::Comment
            }
            '/' if self.peek() == Some('*') => {
                self.scan_block_comment(start);
                TokKind::Comment
            }
            c => TokKind::Char(c),
        };
        Some(self.token(kind, start))
    }

    fn scan_int(&mut self, first: char, start: usize) {
        let radix = match (first, self.peek()) {
            ('0', Some('x' | 'X')) => 16,
            ('0', Some('o' | 'O')) => 8,
            ('0', Some('b' | 'B')) => 2,
            _ => {
                self.eat_while(|c| c.is_ascii_digit());
                return;
            }
        };
        self.bump();
        let digits_start = self.pos;
        self.eat_while(|c| c.is_digit(radix));
        if self.pos == digits_start {
            let text = &self.input[start..self.pos];
            self.diagnostics.push(
                Diagnostic::error(
                    codes::MALFORMED_INTEGER,
                    format!("integer literal {text:?} has no digits"),
                    Some(Span::new(start, self.pos)),
                )
                .with_context(ctx!("literal" => text)),
            );
        }
    }

    fn scan_string(&mut self, start: usize) {
        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.diagnostics.push(Diagnostic::error(
                        codes::UNTERMINATED_STRING,
                        "string literal not terminated",
                        Some(Span::new(start, self.pos)),
                    ));
                    return;
                }
                Some('"') => {
                    self.bump();
                    return;
                }
                Some('\\') => {
                    let esc_start = self.pos;
                    self.bump();
                    self.scan_escape(esc_start);
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
    }

    /// Validate one escape sequence after the backslash. Nothing is
    /// interpreted; string bytes are emitted as written.
    fn scan_escape(&mut self, esc_start: usize) {
        let (count, radix) = match self.peek() {
            Some('a' | 'b' | 'f' | 'n' | 'r' | 't' | 'v' | '\\' | '"') => {
                self.bump();
                return;
            }
            Some('0'..='7') => (3, 8),
            Some('x') => {
                self.bump();
                (2, 16)
            }
            Some('u') => {
                self.bump();
                (4, 16)
            }
            Some('U') => {
                self.bump();
                (8, 16)
            }
            _ => {
                self.invalid_escape(esc_start);
                return;
            }
        };
        for _ in 0..count {
            match self.peek() {
                Some(c) if c.is_digit(radix) => {
                    self.bump();
                }
                _ => {
                    self.invalid_escape(esc_start);
                    return;
                }
            }
        }
    }

    fn invalid_escape(&mut self, esc_start: usize) {
        let end = if self.pos == esc_start + 1 {
            self.pos + self.peek().map_or(0, char::len_utf8)
        } else {
            self.pos
        };
        let seq = &self.input[esc_start..end];
        self.diagnostics.push(
            Diagnostic::error(
                codes::INVALID_ESCAPE,
                format!("invalid escape sequence {seq:?}"),
                Some(Span::new(esc_start, end)),
            )
            .with_context(ctx!("escape" => seq)),
        );
    }

    fn scan_raw_string(&mut self, start: usize) {
        self.eat_while(|c| c != '`');
        if self.bump().is_none() {
            self.diagnostics.push(Diagnostic::error(
                codes::UNTERMINATED_RAW_STRING,
                "raw string literal not terminated",
                Some(Span::new(start, self.pos)),
            ));
        }
    }

    fn scan_block_comment(&mut self, start: usize) {
        self.bump();
        while let Some(c) = self.bump() {
            if c == '*' && self.peek() == Some('/') {
                self.bump();
                return;
            }
        }
        self.diagnostics.push(Diagnostic::error(
            codes::UNTERMINATED_COMMENT,
            "comment not terminated",
            Some(Span::new(start, self.pos)),
        ));
    }

    /// Read raw source text from the current position up to the next `\n`,
    /// which is consumed but not returned. A trailing `\r` is dropped.
    ///
    /// Fails when the input ends first or more than `max` characters precede
    /// the newline.
    pub fn read_line(&mut self, max: usize) -> Result<(&'a str, Span), LineError> {
        let start = self.pos;
        let mut count = 0usize;
        loop {
            match self.peek() {
                None => return Err(LineError::UnexpectedEof),
                Some('\n') => {
                    let line = &self.input[start..self.pos];
                    self.bump();
                    let line = line.strip_suffix('\r').unwrap_or(line);
                    return Ok((line, Span::new(start, start + line.len())));
                }
                Some('\r') if self.peek_second() == Some('\n') => {
                    self.bump();
                }
                Some(_) => {
                    count += 1;
                    if count > max {
                        return Err(LineError::TooLong { max });
                    }
                    self.bump();
                }
            }
        }
    }

    /// Skip the rest of the current line, including the newline. The end of
    /// input also ends the line.
    pub fn skip_line(&mut self) -> &'a str {
        let start = self.pos;
        self.eat_while(|c| c != '\n');
        let line = &self.input[start..self.pos];
        self.bump();
        line.strip_suffix('\r').unwrap_or(line)
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        self.next_token()
    }
}

/// Tokenize all of `input`, returning the tokens and any scan errors.
#[cfg(test)]
fn tokenize(input: &str) -> (Vec<Token<'_>>, Vec<Diagnostic>) {
    let mut scanner = Scanner::new(input);
    let toks = scanner.by_ref().collect();
    (toks, scanner.into_diagnostics())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(TokKind, &str)> {
        let (toks, diags) = tokenize(input);
        assert!(diags.is_empty(), "{diags:?}");
        toks.into_iter().map(|t| (t.kind, t.text)).collect()
    }

    #[test]
    fn mixed_tokens() {
        assert_eq!(
            kinds("ESC \"p\" 0 2 0x14 `raw\"` // tail"),
            vec![
                (TokKind::Ident, "ESC"),
                (TokKind::String, "\"p\""),
                (TokKind::Int, "0"),
                (TokKind::Int, "2"),
                (TokKind::Int, "0x14"),
                (TokKind::RawString, "`raw\"`"),
                (TokKind::Comment, "// tail"),
            ]
        );
    }

    #[test]
    fn meta_markers_are_chars() {
        assert_eq!(
            kinds("*100 ' . ! @ # ,"),
            vec![
                (TokKind::Char('*'), "*"),
                (TokKind::Int, "100"),
                (TokKind::Char('\''), "'"),
                (TokKind::Char('.'), "."),
                (TokKind::Char('!'), "!"),
                (TokKind::Char('@'), "@"),
                (TokKind::Char('#'), "#"),
                (TokKind::Char(','), ","),
            ]
        );
    }

    #[test]
    fn int_prefixes() {
        assert_eq!(
            kinds("0b101 0o17 0XfF 007 12ab"),
            vec![
                (TokKind::Int, "0b101"),
                (TokKind::Int, "0o17"),
                (TokKind::Int, "0XfF"),
                (TokKind::Int, "007"),
                (TokKind::Int, "12"),
                (TokKind::Ident, "ab"),
            ]
        );
    }

    #[test]
    fn spans_borrow_source() {
        let src = "  GS\t\"(L\"";
        let (toks, _) = tokenize(src);
        assert_eq!(toks[0].span(), Span::new(2, 4));
        assert_eq!(&src[toks[1].start..toks[1].end], "\"(L\"");
    }

    #[test]
    fn block_comment_spans_lines() {
        assert_eq!(
            kinds("/* a\n b */ LF"),
            vec![(TokKind::Comment, "/* a\n b */"), (TokKind::Ident, "LF")]
        );
    }

    #[test]
    fn raw_string_spans_lines() {
        assert_eq!(kinds("`a\nb`"), vec![(TokKind::RawString, "`a\nb`")]);
    }

    #[test]
    fn unterminated_string_stops_at_newline() {
        let (toks, diags) = tokenize("\"abc\nLF");
        assert_eq!(toks[0].text, "\"abc");
        assert_eq!(toks[1].text, "LF");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].id, codes::UNTERMINATED_STRING);
        assert_eq!(diags[0].span, Some(Span::new(0, 4)));
    }

    #[test]
    fn scan_errors_are_collected() {
        let (_, diags) = tokenize("\"\\q\" 0x `open /* never");
        let ids: Vec<&str> = diags.iter().map(|d| d.id.as_ref()).collect();
        assert_eq!(
            ids,
            vec![
                codes::INVALID_ESCAPE,
                codes::MALFORMED_INTEGER,
                codes::UNTERMINATED_RAW_STRING,
            ]
        );
    }

    #[test]
    fn valid_escapes() {
        let (_, diags) = tokenize(r#""\n\t\\\"\x1b\033\u00e9""#);
        assert!(diags.is_empty(), "{diags:?}");
        let (_, diags) = tokenize(r#""\x1""#);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn read_line_after_marker() {
        let mut s = Scanner::new(".Press any key\r\n4");
        assert_eq!(s.next_token().map(|t| t.kind), Some(TokKind::Char('.')));
        let (line, span) = s.read_line(250).unwrap();
        assert_eq!(line, "Press any key");
        assert_eq!(span, Span::new(1, 14));
        assert_eq!(s.next_token().map(|t| t.text), Some("4"));
    }

    #[test]
    fn read_line_limits() {
        let mut s = Scanner::new("abcd\n");
        assert_eq!(s.read_line(4).map(|(l, _)| l), Ok("abcd"));
        let mut s = Scanner::new("abcde\n");
        assert_eq!(s.read_line(4), Err(LineError::TooLong { max: 4 }));
        let mut s = Scanner::new("no newline");
        assert_eq!(s.read_line(250), Err(LineError::UnexpectedEof));
    }

    #[test]
    fn skip_line_tolerates_eof() {
        let mut s = Scanner::new(" comment\nLF");
        assert_eq!(s.skip_line(), " comment");
        assert_eq!(s.next_token().map(|t| t.text), Some("LF"));
        let mut s = Scanner::new("last line");
        assert_eq!(s.skip_line(), "last line");
        assert_eq!(s.next_token(), None);
    }
}

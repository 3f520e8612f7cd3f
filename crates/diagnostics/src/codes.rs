//! Diagnostic ID constants.
//!
//! `SD1xxx` codes come from the DSL scanner, `SD2xxx` codes are compiler
//! warnings and notes, `SD3xxx` codes are errors that stop compilation. Use these instead of string literals so typos fail to compile.

/// A `"…"` string literal is not closed before the end of the line.
pub const UNTERMINATED_STRING: &str = "SD1001";
/// A `` `…` `` raw string literal is not closed before the end of input.
pub const UNTERMINATED_RAW_STRING: &str = "SD1002";
/// A `/* … */` comment is not closed before the end of input.
pub const UNTERMINATED_COMMENT: &str = "SD1003";
/// Unknown backslash escape inside a string literal.
pub const INVALID_ESCAPE: &str = "SD1004";
/// Integer literal with a base prefix but no digits (e.g. `0x`).
pub const MALFORMED_INTEGER: &str = "SD1005";

/// Token that has no meaning in send-data source; skipped.
pub const UNKNOWN_TOKEN: &str = "SD2001";
/// `#` image inclusion is recognized but not implemented.
pub const IMAGE_UNSUPPORTED: &str = "SD2002";
/// `@` include copied a file into the output.
pub const FILE_INCLUDED: &str = "SD2003";

/// Identifier that names no control code.
pub const UNKNOWN_IDENTIFIER: &str = "SD3001";
/// Integer literal above 255.
pub const INTEGER_OUT_OF_RANGE: &str = "SD3002";
/// Integer literal that cannot be parsed.
pub const INVALID_INTEGER: &str = "SD3003";
/// `*` delay without an integer.
pub const EXPECTED_DELAY: &str = "SD3004";
/// `.` or `!` text line missing its newline or too long.
pub const UNREADABLE_LINE: &str = "SD3005";
/// `@` include file could not be read.
pub const INCLUDE_FAILED: &str = "SD3006";

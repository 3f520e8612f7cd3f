//! Send-data source compiler.
//!
//! Source text names control bytes by mnemonic (`ESC`, `GS`, `LF`, …),
//! writes literal bytes as strings or integers, and uses single-character
//! meta-commands for side effects:
//!
//! | marker | meaning |
//! |--------|---------|
//! | `*n`   | pause for `n` milliseconds |
//! | `'`    | comment to end of line |
//! | `.`    | show the rest of the line and wait for the operator |
//! | `!`    | show the rest of the line |
//! | `@`    | copy the named file into the output |
//! | `#`    | image inclusion (recognized, not implemented) |
//!
//! ```
//! let bytes = senddat_core::dsl::compile_to_vec(r#"ESC "@" "Hello" CR LF"#).unwrap();
//! assert_eq!(bytes, b"\x1b@Hello\r\n");
//! ```

/// Diagnostic context from key-value pairs.
macro_rules! ctx {
    ($($k:expr => $v:expr),+ $(,)?) => {
        std::collections::BTreeMap::from([$(($k.into(), $v.into())),+])
    };
}

/// Compiler entry points and settings.
pub mod compile;
/// Tokenizer for send-data source.
pub mod lexer;

pub use compile::{
    CompileConfig, CompileError, CompileReport, compile, compile_to_vec, compile_with, parse_int,
    parse_prefix,
};
pub use lexer::{LineError, Scanner, TokKind, Token};
pub use senddat_spec_tables::ControlCode;

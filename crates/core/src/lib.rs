//! senddat core library.
//!
//! Provides the two directions of the send-data toolchain: compiling
//! human-readable send-data source into printer bytes ([`dsl::compile`]) and
//! decoding printer byte streams back into commands ([`decode::decode`]).
//! Command definitions come from `senddat_spec_tables`; a generic ESC/POS
//! table is built in ([`tables::generic_trie`]).

#![warn(missing_docs)]

/// Byte stream decoder.
pub mod decode;
/// Send-data source compiler.
pub mod dsl;
/// Built-in command tables and table-file loading.
pub mod tables;

// ── Convenience re-exports ──────────────────────────────────────────────────

// Decoder
pub use decode::{
    DecodeError, DecodeErrorKind, DecodeOptions, Decoder, Entry, Section, decode,
    decode_with_options,
};

// Compiler
pub use dsl::{CompileConfig, CompileError, CompileReport, compile, compile_to_vec, compile_with};

// Tables
pub use tables::{PrefixFormat, generic_specs, generic_trie, load_specs_file, load_subcommands_file};

// Diagnostics (re-exported from the diagnostics crate)
pub use senddat_diagnostics::{Diagnostic, Severity, Span, codes};

//! ESC/POS command specification tables.
//!
//! Defines the data structures for printer command metadata: the
//! [`CommandSpec`] model, the payload-length [`Formula`] evaluator, the
//! [`CommandTrie`] used for prefix recognition while scanning a byte stream,
//! and the CSV loader that builds specs from tabular data.  Tables are
//! immutable once built and can be shared read-only between decoders.

#![warn(missing_docs)]

/// Named ASCII control codes (`ESC`, `GS`, `LF`, …).
pub mod control;
/// Payload-length formulas over command arguments.
pub mod formula;
/// CSV loading of command and subcommand tables.
pub mod load;
/// The command spec model.
pub mod spec;
/// Arena-backed prefix trie over command prefixes.
pub mod trie;

pub use control::ControlCode;
pub use formula::{EvalError, Formula, FormulaError};
pub use load::{
    LoadError, ParseHexError, SpecRow, load_command_specs, parse_hex_bytes, read_command_specs,
    read_subcommands,
};
pub use spec::{CommandSpec, SpecError};
pub use trie::{
    ByteSource, CommandTrie, MatchError, NodeId, PrefixMatch, PushbackReader, SpecId, TrieError,
};

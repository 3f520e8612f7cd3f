//! Shared test helpers for `senddat_spec_tables` integration tests.

#![allow(unreachable_pub)]

use std::sync::LazyLock;

use senddat_spec_tables::{CommandSpec, CommandTrie};

/// Eight specs with shared `ESC`, `ESC (` and `GS (` paths plus two
/// single-byte commands.
pub static SAMPLE_TRIE: LazyLock<CommandTrie> = LazyLock::new(|| {
    CommandTrie::build(vec![
        spec(b"\x1b@", "Initialize Printer", &[]),
        spec(b"\x1bi", "Select Character Set", &["n"]),
        spec(b"\x1b(A", "Select Character Set 1", &[]),
        spec(b"\x1d(k", "Set Barcode Height", &["n"]),
        spec(b"\x1d(V", "Paper cut", &["n"]),
        spec(b"\t", "Horizontal Tab", &[]),
        spec(b"\n", "Print and Line Feed", &[]),
        spec(b"\x1b(Y", "Specify Batch Print", &[]),
    ])
    .unwrap_or_else(|e| panic!("sample trie: {e}"))
});

/// Build a spec without a payload.
pub fn spec(prefix: &[u8], name: &str, args: &[&str]) -> CommandSpec {
    CommandSpec::new(prefix, name, args.iter().copied())
        .unwrap_or_else(|e| panic!("spec {name}: {e}"))
}

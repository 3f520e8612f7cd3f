//! Shared test helpers for `senddat_core` integration tests.

#![allow(unreachable_pub)]

use std::sync::LazyLock;

use senddat_core::{CompileConfig, CompileError, CompileReport, Entry, compile_with};
use senddat_spec_tables::{CommandSpec, CommandTrie};

/// A small command set: single-byte commands, fixed arguments, a payload
/// formula, shared `ESC (` paths, and one ignored command.
pub static TRIE: LazyLock<CommandTrie> = LazyLock::new(|| {
    CommandTrie::build(vec![
        spec(b"\n", "Print and line feed", &[]),
        spec(b"\t", "Horizontal tab", &[]),
        spec(b"\x1b@", "Initialize printer", &[]),
        spec(b"\x1bi", "Partial cut", &[]),
        spec(b"\x1bE", "Turn emphasized mode on/off", &["n"]),
        spec(b"\x1b(A", "Beeper", &["pL", "pH"])
            .with_formula("pL + 256 * pH")
            .unwrap_or_else(|e| panic!("{e}")),
        spec(b"\x1b*", "Select bit-image mode", &["m", "nL", "nH"])
            .with_formula("nL + 256*nH")
            .unwrap_or_else(|e| panic!("{e}")),
        spec(b"\x1c\x7a", "Vendor block", &["n"])
            .with_formula("n")
            .unwrap_or_else(|e| panic!("{e}"))
            .with_ignore(true),
        spec(b"\x1d/", "Divide", &["a", "b"])
            .with_formula("a / b")
            .unwrap_or_else(|e| panic!("{e}")),
    ])
    .unwrap_or_else(|e| panic!("test trie: {e}"))
});

/// Build a spec without a payload.
pub fn spec(prefix: &[u8], name: &str, args: &[&str]) -> CommandSpec {
    CommandSpec::new(prefix, name, args.iter().copied())
        .unwrap_or_else(|e| panic!("spec {name}: {e}"))
}

/// Compile with delays disabled and console text captured.
pub fn compile_capture(source: &str) -> Result<(Vec<u8>, String, CompileReport), CompileError> {
    compile_capture_with(source, &CompileConfig::default().with_delay_multiplier(0))
}

/// Compile with the given config, capturing console text.
pub fn compile_capture_with(
    source: &str,
    config: &CompileConfig,
) -> Result<(Vec<u8>, String, CompileReport), CompileError> {
    let mut out = Vec::new();
    let mut console = Vec::new();
    let report = compile_with(source, &mut out, &mut console, config)?;
    let console = String::from_utf8(console).unwrap_or_else(|e| panic!("console text: {e}"));
    Ok((out, console, report))
}

/// Render entries the way the decoder displays them.
#[allow(dead_code)]
pub fn lines(entries: &[Entry<'_>]) -> Vec<String> {
    entries.iter().map(ToString::to_string).collect()
}

//! Built-in command tables and table-file loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;

use senddat_spec_tables::{
    CommandSpec, CommandTrie, LoadError, load_command_specs, parse_hex_bytes, read_command_specs,
    read_subcommands,
};

use crate::dsl::parse_prefix;

const GENERIC_CSV: &str = include_str!("../data/generic.csv");
const GENERIC_SUBCOMMANDS_CSV: &str = include_str!("../data/generic_subcommands.csv");

// The embedded tables ship with the crate and are covered by tests, so a
// load failure is a build defect.
static GENERIC_SPECS: LazyLock<Vec<CommandSpec>> = LazyLock::new(|| {
    let mut specs = read_command_specs(GENERIC_CSV.as_bytes(), parse_prefix)
        .unwrap_or_else(|e| panic!("built-in command table: {e}"));
    read_subcommands(GENERIC_SUBCOMMANDS_CSV.as_bytes(), parse_prefix, &mut specs)
        .unwrap_or_else(|e| panic!("built-in subcommand table: {e}"));
    specs
});

static GENERIC_TRIE: LazyLock<CommandTrie> = LazyLock::new(|| {
    CommandTrie::build(GENERIC_SPECS.clone())
        .unwrap_or_else(|e| panic!("built-in command table: {e}"))
});

/// The built-in generic ESC/POS command set.
pub fn generic_specs() -> &'static [CommandSpec] {
    &GENERIC_SPECS
}

/// Trie over [`generic_specs`], built once.
pub fn generic_trie() -> &'static CommandTrie {
    &GENERIC_TRIE
}

/// How the `prefix` column of a table file is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrefixFormat {
    /// Send-data notation: `ESC "@"`.
    #[default]
    Dsl,
    /// Whitespace-separated hex bytes: `1B 40`.
    Hex,
}

/// Load a command table file.
pub fn load_specs_file(path: &Path, format: PrefixFormat) -> Result<Vec<CommandSpec>, LoadError> {
    match format {
        PrefixFormat::Dsl => load_command_specs(path, parse_prefix),
        PrefixFormat::Hex => load_command_specs(path, parse_hex_bytes),
    }
}

/// Load a subcommand table file and attach its rows to `specs`. Returns the
/// number of subcommands attached.
pub fn load_subcommands_file(
    path: &Path,
    format: PrefixFormat,
    specs: &mut [CommandSpec],
) -> Result<usize, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    match format {
        PrefixFormat::Dsl => read_subcommands(reader, parse_prefix, specs),
        PrefixFormat::Hex => read_subcommands(reader, parse_hex_bytes, specs),
    }
}

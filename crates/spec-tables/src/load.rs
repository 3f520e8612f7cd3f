//! CSV command tables.
//!
//! A command table has the header `prefix,name,arg_names,payload_formula`
//! with an optional trailing `ignore` column. Prefixes are parsed by a
//! caller-supplied function so the same loader serves send-data notation
//! (`ESC "@"`) and plain hex (`1B 40`). Argument names are separated by
//! whitespace; an empty formula means the command has no payload.
//!
//! A subcommand table has at least `prefix,name` columns. Each prefix is split
//! into the longest known command prefix and a selector made of the
//! remaining bytes.

use std::fmt::Display;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::formula::FormulaError;
use crate::spec::{CommandSpec, SpecError};

/// One row of a command table, as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SpecRow {
    /// Prefix in the notation understood by the prefix parser.
    pub prefix: String,
    /// Command name.
    pub name: String,
    /// Whitespace-separated argument names.
    #[serde(default)]
    pub arg_names: String,
    /// Payload formula, empty for commands without a payload.
    #[serde(default)]
    pub payload_formula: String,
    /// `true`/`1`/`yes` to mark the command as ignored.
    #[serde(default)]
    pub ignore: String,
}

#[derive(Debug, Deserialize)]
struct SubcommandRow {
    prefix: String,
    name: String,
}

/// A token in a hex prefix that is not a byte.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid hex byte {token:?}")]
pub struct ParseHexError {
    /// The offending token.
    pub token: String,
}

/// Errors raised while loading command or subcommand tables.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Opening a table file failed.
    #[error("{}: {source}", path.display())]
    Open {
        /// The table path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Malformed CSV, or a row that does not fit the table header.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// The prefix parser rejected a row's prefix.
    #[error("line {line}: prefix {prefix:?}: {message}")]
    Prefix {
        /// Line of the offending row.
        line: u64,
        /// The prefix text.
        prefix: String,
        /// Parser message.
        message: String,
    },
    /// The row does not describe a valid spec.
    #[error("line {line}: {source}")]
    Spec {
        /// Line of the offending row.
        line: u64,
        /// Underlying spec error.
        #[source]
        source: SpecError,
    },
    /// The payload formula does not compile.
    #[error("line {line}: payload formula for {name:?}: {source}")]
    Formula {
        /// Line of the offending row.
        line: u64,
        /// Command name.
        name: String,
        /// Underlying formula error.
        #[source]
        source: FormulaError,
    },
    /// The `ignore` column holds something other than a boolean.
    #[error("line {line}: invalid ignore value {value:?}")]
    Ignore {
        /// Line of the offending row.
        line: u64,
        /// The cell text.
        value: String,
    },
    /// A subcommand whose prefix extends no known command.
    #[error("line {line}: subcommand {name:?} does not extend any known command")]
    OrphanSubcommand {
        /// Line of the offending row.
        line: u64,
        /// Subcommand name.
        name: String,
        /// Full subcommand prefix bytes.
        prefix: Vec<u8>,
    },
}

/// Read a command table from `reader`, parsing prefixes with `parse_prefix`.
pub fn read_command_specs<R, F, E>(reader: R, mut parse_prefix: F) -> Result<Vec<CommandSpec>, LoadError>
where
    R: Read,
    F: FnMut(&str) -> Result<Vec<u8>, E>,
    E: Display,
{
    let mut rdr = csv_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut record = csv::StringRecord::new();
    let mut specs = Vec::new();
    while rdr.read_record(&mut record)? {
        let line = record.position().map_or(0, csv::Position::line);
        let row: SpecRow = record.deserialize(Some(&headers))?;
        specs.push(spec_from_row(row, line, &mut parse_prefix)?);
    }
    tracing::debug!(specs = specs.len(), "loaded command table");
    Ok(specs)
}

/// Open and read a command table file.
pub fn load_command_specs<F, E>(path: &Path, parse_prefix: F) -> Result<Vec<CommandSpec>, LoadError>
where
    F: FnMut(&str) -> Result<Vec<u8>, E>,
    E: Display,
{
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    read_command_specs(io::BufReader::new(file), parse_prefix)
}

/// Read a subcommand table and attach each row to the spec with the longest
/// prefix that strictly precedes it. Returns the number of subcommands
/// attached.
pub fn read_subcommands<R, F, E>(
    reader: R,
    mut parse_prefix: F,
    specs: &mut [CommandSpec],
) -> Result<usize, LoadError>
where
    R: Read,
    F: FnMut(&str) -> Result<Vec<u8>, E>,
    E: Display,
{
    let mut rdr = csv_reader(reader);
    let headers = rdr.headers()?.clone();
    let mut record = csv::StringRecord::new();
    let mut attached = 0;
    while rdr.read_record(&mut record)? {
        let line = record.position().map_or(0, csv::Position::line);
        let row: SubcommandRow = record.deserialize(Some(&headers))?;
        let bytes = parse_prefix(&row.prefix).map_err(|e| LoadError::Prefix {
            line,
            prefix: row.prefix.clone(),
            message: e.to_string(),
        })?;
        let parent = specs
            .iter_mut()
            .filter(|s| bytes.len() > s.prefix.len() && bytes.starts_with(&s.prefix))
            .max_by_key(|s| s.prefix.len());
        let Some(parent) = parent else {
            return Err(LoadError::OrphanSubcommand {
                line,
                name: row.name,
                prefix: bytes,
            });
        };
        let selector = bytes[parent.prefix.len()..].to_vec();
        parent.subcommands.insert(selector, row.name);
        attached += 1;
    }
    tracing::debug!(subcommands = attached, "loaded subcommand table");
    Ok(attached)
}

/// Parse whitespace-separated hex bytes: `"1B 40"` → `[0x1B, 0x40]`.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, ParseHexError> {
    s.split_whitespace()
        .map(|tok| {
            u8::from_str_radix(tok, 16).map_err(|_| ParseHexError {
                token: tok.to_string(),
            })
        })
        .collect()
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(reader)
}

fn spec_from_row<F, E>(row: SpecRow, line: u64, parse_prefix: &mut F) -> Result<CommandSpec, LoadError>
where
    F: FnMut(&str) -> Result<Vec<u8>, E>,
    E: Display,
{
    let prefix = parse_prefix(&row.prefix).map_err(|e| LoadError::Prefix {
        line,
        prefix: row.prefix.clone(),
        message: e.to_string(),
    })?;
    let ignore = parse_ignore(&row.ignore).ok_or_else(|| LoadError::Ignore {
        line,
        value: row.ignore.clone(),
    })?;
    let mut spec = CommandSpec::new(prefix, row.name, row.arg_names.split_whitespace())
        .map_err(|source| LoadError::Spec { line, source })?
        .with_ignore(ignore);
    if !row.payload_formula.trim().is_empty() {
        let name = spec.name.clone();
        spec = spec
            .with_formula(&row.payload_formula)
            .map_err(|source| LoadError::Formula { line, name, source })?;
    }
    Ok(spec)
}

fn parse_ignore(cell: &str) -> Option<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" => Some(false),
        "1" | "true" | "yes" | "x" => Some(true),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_bytes() {
        assert_eq!(parse_hex_bytes("1B 40").unwrap(), vec![0x1B, 0x40]);
        assert_eq!(parse_hex_bytes("  1d\t28 6B ").unwrap(), vec![0x1D, 0x28, 0x6B]);
        assert!(parse_hex_bytes("").unwrap().is_empty());
        assert_eq!(
            parse_hex_bytes("1B 4G"),
            Err(ParseHexError {
                token: "4G".into()
            })
        );
        assert!(parse_hex_bytes("100").is_err());
    }

    #[test]
    fn ignore_cells() {
        assert_eq!(parse_ignore(""), Some(false));
        assert_eq!(parse_ignore("TRUE"), Some(true));
        assert_eq!(parse_ignore(" 1 "), Some(true));
        assert_eq!(parse_ignore("maybe"), None);
    }

    #[test]
    fn reads_hex_table() {
        let csv = "prefix,name,arg_names,payload_formula\n\
                   1B 40,Initialize,,\n\
                   1B 2A,Bit image,m nL nH,nL + 256 * nH\n";
        let specs = read_command_specs(csv.as_bytes(), parse_hex_bytes).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].prefix, vec![0x1B, 0x40]);
        assert_eq!(specs[0].arg_count(), 0);
        assert!(specs[0].payload_formula.is_none());
        assert_eq!(specs[1].arg_names, vec!["m", "nL", "nH"]);
        assert_eq!(specs[1].payload_len(&[0, 2, 1]), Ok(Some(258)));
        assert!(!specs[1].ignore);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let csv = "prefix,name,arg_names,payload_formula\n\
                   1B 40,Initialize,,\n\
                   1B 2A,Bit image,m nL nH,nL + count\n";
        let err = read_command_specs(csv.as_bytes(), parse_hex_bytes).unwrap_err();
        assert!(matches!(err, LoadError::Formula { line: 3, .. }), "{err:?}");

        let csv = "prefix,name,arg_names,payload_formula\nZZ,Bad,,\n";
        let err = read_command_specs(csv.as_bytes(), parse_hex_bytes).unwrap_err();
        assert_eq!(
            err.to_string(),
            "line 2: prefix \"ZZ\": invalid hex byte \"ZZ\""
        );
    }
}

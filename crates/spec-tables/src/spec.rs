use std::collections::BTreeMap;

use serde::Serialize;

use crate::control::ControlCode;
use crate::formula::{EvalError, Formula, FormulaError};

/// Errors raised while building a spec or mapping its arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    /// A command must be identified by at least one byte.
    #[error("command {name:?} has an empty prefix")]
    EmptyPrefix {
        /// Display name of the command.
        name: String,
    },
    /// Argument bytes do not match the declared argument count.
    #[error("expected {expected} args, got {got}")]
    ArgCount {
        /// Declared argument count.
        expected: usize,
        /// Number of bytes supplied.
        got: usize,
    },
}

/// Description of one protocol command.
///
/// A command is a fixed byte `prefix`, followed by one byte per entry in
/// `arg_names`, followed by a payload whose length is computed by
/// `payload_formula` (no payload when absent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// Leading bytes that identify the command (e.g. `1B 40` for `ESC @`).
    pub prefix: Vec<u8>,
    /// Human-readable command name.
    pub name: String,
    /// Argument names, one byte each, in wire order.
    pub arg_names: Vec<String>,
    /// Payload length formula over the arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_formula: Option<Formula>,
    /// Suppress this command from decoder output and tolerate one unhandled
    /// prefix right after it.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignore: bool,
    /// Named function selectors, keyed by the payload bytes that select them.
    #[serde(skip)]
    pub subcommands: BTreeMap<Vec<u8>, String>,
}

impl CommandSpec {
    /// Create a spec without a payload.
    pub fn new(
        prefix: impl Into<Vec<u8>>,
        name: impl Into<String>,
        arg_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, SpecError> {
        let prefix = prefix.into();
        let name = name.into();
        if prefix.is_empty() {
            return Err(SpecError::EmptyPrefix { name });
        }
        Ok(Self {
            prefix,
            name,
            arg_names: arg_names.into_iter().map(Into::into).collect(),
            payload_formula: None,
            ignore: false,
            subcommands: BTreeMap::new(),
        })
    }

    /// Attach a payload formula compiled against this spec's argument names.
    pub fn with_formula(mut self, text: &str) -> Result<Self, FormulaError> {
        self.payload_formula = Some(Formula::compile(text, &self.arg_names)?);
        Ok(self)
    }

    /// Set the ignore flag.
    pub fn with_ignore(mut self, ignore: bool) -> Self {
        self.ignore = ignore;
        self
    }

    /// Register a named subcommand selected by the leading payload bytes.
    pub fn with_subcommand(mut self, selector: impl Into<Vec<u8>>, name: impl Into<String>) -> Self {
        self.subcommands.insert(selector.into(), name.into());
        self
    }

    /// Number of single-byte arguments following the prefix.
    pub fn arg_count(&self) -> usize {
        self.arg_names.len()
    }

    /// Pair each argument name with its byte, in declaration order.
    pub fn arg_values<'a>(&'a self, args: &[u8]) -> Result<Vec<(&'a str, u8)>, SpecError> {
        if args.len() != self.arg_count() {
            return Err(SpecError::ArgCount {
                expected: self.arg_count(),
                got: args.len(),
            });
        }
        Ok(self
            .arg_names
            .iter()
            .map(String::as_str)
            .zip(args.iter().copied())
            .collect())
    }

    /// Payload length for the given argument bytes, or `None` when the
    /// command carries no payload.
    pub fn payload_len(&self, args: &[u8]) -> Result<Option<usize>, EvalError> {
        let Some(formula) = &self.payload_formula else {
            return Ok(None);
        };
        let n = formula.eval(args)?;
        usize::try_from(n)
            .map(Some)
            .map_err(|_| EvalError::NegativeLength(n))
    }

    /// Name of the subcommand whose selector is the longest prefix of `payload`.
    pub fn subcommand_name(&self, payload: &[u8]) -> Option<&str> {
        self.subcommands
            .iter()
            .filter(|(sel, _)| payload.starts_with(sel))
            .max_by_key(|(sel, _)| sel.len())
            .map(|(_, name)| name.as_str())
    }
}

/// Renders the prefix the way it is written in send-data source:
/// `ESC @`, `GS ( k`, `0x1F 0x11`.
impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, &b) in self.prefix.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match ControlCode::from_byte(b) {
                Some(code) if i == 0 || b != b' ' => write!(f, "{code}")?,
                _ if b.is_ascii_graphic() => write!(f, "{}", b as char)?,
                _ => write!(f, "0x{b:02X}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bit_image() -> CommandSpec {
        CommandSpec::new(*b"\x1b*", "Select bit-image mode", ["m", "nL", "nH"])
            .unwrap()
            .with_formula("nL + 256*nH")
            .unwrap()
    }

    #[test]
    fn serializes_formula_as_source_text() {
        let json = serde_json::to_value(bit_image().with_subcommand(*b"\x01", "unused")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "prefix": [0x1B, 0x2A],
                "name": "Select bit-image mode",
                "arg_names": ["m", "nL", "nH"],
                "payload_formula": "nL + 256*nH",
            })
        );

        let vendor = CommandSpec::new(*b"\x1cz", "Vendor block", ["n"])
            .unwrap()
            .with_ignore(true);
        let json = serde_json::to_value(&vendor).unwrap();
        assert_eq!(json["ignore"], true);
        assert!(json.get("payload_formula").is_none());
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let err = CommandSpec::new(Vec::new(), "nothing", Vec::<String>::new()).unwrap_err();
        assert_eq!(
            err,
            SpecError::EmptyPrefix {
                name: "nothing".into()
            }
        );
    }

    #[test]
    fn arg_values_in_order() {
        let spec = bit_image();
        assert_eq!(
            spec.arg_values(&[33, 128, 1]).unwrap(),
            vec![("m", 33), ("nL", 128), ("nH", 1)]
        );
        assert_eq!(
            spec.arg_values(&[1]),
            Err(SpecError::ArgCount {
                expected: 3,
                got: 1
            })
        );
    }

    #[test]
    fn payload_len_from_formula() {
        let spec = bit_image();
        assert_eq!(spec.payload_len(&[0, 128, 1]), Ok(Some(384)));
        let plain = CommandSpec::new(*b"\x1bJ", "Print and feed paper", ["n"]).unwrap();
        assert_eq!(plain.payload_len(&[5]), Ok(None));
    }

    #[test]
    fn negative_payload_len_is_an_error() {
        let spec = CommandSpec::new(*b"\x1dk", "odd", ["n"])
            .unwrap()
            .with_formula("n - 10")
            .unwrap();
        assert_eq!(spec.payload_len(&[3]), Err(EvalError::NegativeLength(-7)));
    }

    #[test]
    fn formula_names_must_be_arguments() {
        let res = CommandSpec::new(*b"\x1b*", "x", ["m"])
            .unwrap()
            .with_formula("nL");
        assert!(matches!(res, Err(FormulaError::UnknownIdentifier { .. })));
    }

    #[test]
    fn subcommand_longest_selector_wins() {
        let spec = CommandSpec::new(*b"\x1d(k", "2D code", ["pL", "pH"])
            .unwrap()
            .with_formula("pL + 256*pH")
            .unwrap()
            .with_subcommand([49u8], "QR")
            .with_subcommand([49u8, 80], "QR: store data");
        assert_eq!(spec.subcommand_name(&[49, 80, 48, b'x']), Some("QR: store data"));
        assert_eq!(spec.subcommand_name(&[49, 81]), Some("QR"));
        assert_eq!(spec.subcommand_name(&[50]), None);
    }

    #[test]
    fn display_prefix() {
        assert_eq!(bit_image().to_string(), "ESC *");
        let gs = CommandSpec::new(*b"\x1d(k", "x", Vec::<String>::new()).unwrap();
        assert_eq!(gs.to_string(), "GS ( k");
        let raw = CommandSpec::new([0x1f, 0x11, b' '], "x", Vec::<String>::new()).unwrap();
        assert_eq!(raw.to_string(), "0x1F 0x11 0x20");
    }
}

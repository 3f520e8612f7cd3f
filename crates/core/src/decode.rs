//! ESC/POS stream decoder.
//!
//! Splits a flat byte stream into [`Entry`] values: runs of bytes that start
//! no known command become [`Entry::Raw`], recognized prefixes become
//! [`Entry::Command`] with their argument and payload bytes. Framing is
//! driven entirely by the [`CommandTrie`] and the specs' payload formulas.

use std::fmt;
use std::io::{self, BufReader, Read};

use senddat_spec_tables::{
    ByteSource, CommandSpec, CommandTrie, EvalError, MatchError, PrefixMatch, PushbackReader,
};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

/// One decoded unit of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<'t> {
    /// A recognized command.
    Command {
        /// Offset of the first prefix byte.
        offset: usize,
        /// The matched spec.
        spec: &'t CommandSpec,
        /// Argument bytes, one per declared argument.
        args: Vec<u8>,
        /// Payload bytes, empty when the spec has no formula.
        payload: Vec<u8>,
    },
    /// A run of bytes that start no known command.
    Raw {
        /// Offset of the first byte.
        offset: usize,
        /// The bytes, in stream order.
        data: Vec<u8>,
    },
    /// Placeholder entry with no bytes.
    Empty {
        /// Offset the entry refers to.
        offset: usize,
    },
}

impl Entry<'_> {
    /// Whether this is a [`Entry::Command`].
    pub fn is_command(&self) -> bool {
        matches!(self, Entry::Command { .. })
    }

    /// Whether this is a [`Entry::Raw`].
    pub fn is_raw(&self) -> bool {
        matches!(self, Entry::Raw { .. })
    }

    /// Whether this is a [`Entry::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Entry::Empty { .. })
    }

    /// Stream offset at which the entry starts.
    pub fn offset(&self) -> usize {
        match self {
            Entry::Command { offset, .. } | Entry::Raw { offset, .. } | Entry::Empty { offset } => {
                *offset
            }
        }
    }

    /// Command name, or a fixed label for raw and empty entries.
    pub fn name(&self) -> &str {
        match self {
            Entry::Command { spec, .. } => &spec.name,
            Entry::Raw { .. } => "RAW",
            Entry::Empty { .. } => "EMPTY",
        }
    }

    /// Name of the subcommand selected by the payload, if the spec has one.
    pub fn subcommand(&self) -> Option<&str> {
        match self {
            Entry::Command { spec, payload, .. } => spec.subcommand_name(payload),
            _ => None,
        }
    }

    /// Total number of stream bytes the entry covers.
    pub fn byte_len(&self) -> usize {
        match self {
            Entry::Command {
                spec,
                args,
                payload,
                ..
            } => spec.prefix.len() + args.len() + payload.len(),
            Entry::Raw { data, .. } => data.len(),
            Entry::Empty { .. } => 0,
        }
    }
}

impl fmt::Display for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Empty { offset } => write!(f, "[@{offset:6}: EMPTY]"),
            Entry::Raw { offset, data } => write!(
                f,
                "[@{offset:6}: RAW,len={} \"{}\"]",
                data.len(),
                data.escape_ascii()
            ),
            Entry::Command {
                offset,
                spec,
                args,
                payload,
            } => {
                write!(f, "[@{offset:6}: {}", spec.name)?;
                if let Some(sub) = spec.subcommand_name(payload) {
                    write!(f, " ({sub})")?;
                }
                if !args.is_empty() {
                    f.write_str(", args=[")?;
                    for (i, (name, value)) in spec.arg_names.iter().zip(args).enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        write!(f, "{name}={value}")?;
                    }
                    f.write_str("]")?;
                }
                if !payload.is_empty() {
                    write!(f, ", payload={} bytes", payload.len())?;
                }
                f.write_str("]")
            }
        }
    }
}

struct NamedArgs<'a>(&'a [String], &'a [u8]);

impl Serialize for NamedArgs<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.1.len()))?;
        for (name, value) in self.0.iter().zip(self.1) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl Serialize for Entry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Entry::Command {
                offset,
                spec,
                args,
                payload,
            } => {
                let sub = spec.subcommand_name(payload);
                let mut st = serializer.serialize_struct("Entry", 7)?;
                st.serialize_field("kind", "command")?;
                st.serialize_field("offset", offset)?;
                st.serialize_field("name", &spec.name)?;
                st.serialize_field("prefix", &spec.to_string())?;
                st.serialize_field("args", &NamedArgs(&spec.arg_names, args))?;
                if let Some(sub) = sub {
                    st.serialize_field("subcommand", sub)?;
                } else {
                    st.skip_field("subcommand")?;
                }
                st.serialize_field("payload_len", &payload.len())?;
                st.end()
            }
            Entry::Raw { offset, data } => {
                let mut st = serializer.serialize_struct("Entry", 3)?;
                st.serialize_field("kind", "raw")?;
                st.serialize_field("offset", offset)?;
                st.serialize_field("data", data)?;
                st.end()
            }
            Entry::Empty { offset } => {
                let mut st = serializer.serialize_struct("Entry", 2)?;
                st.serialize_field("kind", "empty")?;
                st.serialize_field("offset", offset)?;
                st.end()
            }
        }
    }
}

/// Part of a command frame that was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// The fixed argument bytes.
    Arguments,
    /// The formula-sized payload.
    Payload,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Arguments => f.write_str("argument"),
            Section::Payload => f.write_str("payload"),
        }
    }
}

/// What went wrong while decoding.
#[derive(Debug, thiserror::Error)]
pub enum DecodeErrorKind {
    /// A known prefix continued with a byte no command uses.
    #[error("unhandled command: byte {byte:#04x} after {} matched prefix byte(s)", consumed - 1)]
    Unhandled {
        /// The byte with no trie edge.
        byte: u8,
        /// Bytes consumed, including the failing one.
        consumed: usize,
    },
    /// The stream ended inside a command prefix.
    #[error("stream ended after {consumed} byte(s) of a command prefix")]
    Incomplete {
        /// Prefix bytes read before the end of the stream.
        consumed: usize,
    },
    /// The stream ended inside a command's arguments or payload.
    #[error("{command}: expected {expected} {section} byte(s), got {got}")]
    Truncated {
        /// Command name.
        command: String,
        /// Which part of the frame was short.
        section: Section,
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        got: usize,
    },
    /// The payload formula could not be evaluated.
    #[error("{command}: cannot compute payload length")]
    Eval {
        /// Command name.
        command: String,
        /// Underlying evaluation error.
        #[source]
        source: EvalError,
    },
    /// Reading the stream failed.
    #[error("read failed")]
    Io(#[source] io::Error),
}

/// A decoding failure at a known stream offset.
#[derive(Debug)]
pub struct DecodeError {
    /// Offset at which the failing entry started.
    pub offset: usize,
    /// What went wrong.
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    fn new(offset: usize, kind: DecodeErrorKind) -> Self {
        Self { offset, kind }
    }

    fn io(offset: usize, err: io::Error) -> Self {
        Self::new(offset, DecodeErrorKind::Io(err))
    }

    fn from_match(offset: usize, err: MatchError) -> Self {
        let kind = match err {
            MatchError::Unhandled { byte, consumed } => {
                DecodeErrorKind::Unhandled { byte, consumed }
            }
            MatchError::Incomplete { consumed } => DecodeErrorKind::Incomplete { consumed },
            MatchError::Io(e) => DecodeErrorKind::Io(e),
        };
        Self::new(offset, kind)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.offset)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

/// Decoder settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct DecodeOptions {
    /// Skip unhandled command prefixes instead of failing. The bytes of the
    /// partial prefix are dropped and scanning resumes at the failing byte.
    pub ignore_unknown: bool,
}

impl DecodeOptions {
    /// Set [`DecodeOptions::ignore_unknown`].
    pub fn with_ignore_unknown(mut self, ignore_unknown: bool) -> Self {
        self.ignore_unknown = ignore_unknown;
        self
    }
}

/// Pull-based decoder over a byte stream.
///
/// Each decoder owns its cursor; the trie is borrowed read-only and can be
/// shared between decoders.
pub struct Decoder<'t, R> {
    src: PushbackReader<BufReader<R>>,
    trie: &'t CommandTrie,
    options: DecodeOptions,
    /// Set by an ignored command: the next unhandled prefix is skipped even
    /// without `ignore_unknown`.
    resync: bool,
    failed: bool,
}

impl<'t, R: Read> Decoder<'t, R> {
    /// Create a decoder with default options.
    pub fn new(reader: R, trie: &'t CommandTrie) -> Self {
        Self::with_options(reader, trie, DecodeOptions::default())
    }

    /// Create a decoder with the given options.
    pub fn with_options(reader: R, trie: &'t CommandTrie, options: DecodeOptions) -> Self {
        Self {
            src: PushbackReader::new(BufReader::new(reader)),
            trie,
            options,
            resync: false,
            failed: false,
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.src.offset()
    }

    /// Decode the next entry. `Ok(None)` marks the end of the stream.
    pub fn next_entry(&mut self, ignore_unknown: bool) -> Result<Option<Entry<'t>>, DecodeError> {
        let trie = self.trie;
        let mut start = self.src.offset();
        let mut raw = Vec::new();
        loop {
            let peeked = self
                .src
                .peek_byte()
                .map_err(|e| DecodeError::io(self.src.offset(), e))?;
            let Some(b) = peeked else {
                if raw.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.emit(Entry::Raw {
                    offset: start,
                    data: raw,
                })));
            };
            if !trie.starts_command(b) {
                self.src
                    .read_byte()
                    .map_err(|e| DecodeError::io(self.src.offset(), e))?;
                raw.push(b);
                continue;
            }
            if !raw.is_empty() {
                return Ok(Some(self.emit(Entry::Raw {
                    offset: start,
                    data: raw,
                })));
            }
            match trie.match_prefix(&mut self.src) {
                Ok(PrefixMatch {
                    spec: Some(spec), ..
                }) => {
                    let entry = self.read_command(spec, start)?;
                    if spec.ignore {
                        tracing::debug!(offset = start, name = %spec.name, "ignoring command");
                        self.resync = true;
                        start = self.src.offset();
                        continue;
                    }
                    tracing::debug!(offset = start, name = %spec.name, args = ?entry_args(&entry), "command");
                    return Ok(Some(self.emit(entry)));
                }
                Ok(PrefixMatch { spec: None, .. }) => {
                    // starts_command guarantees an edge, so this only happens
                    // with a source that could not supply the peeked byte
                    if let Some(b) = self
                        .src
                        .read_byte()
                        .map_err(|e| DecodeError::io(self.src.offset(), e))?
                    {
                        raw.push(b);
                    }
                }
                Err(MatchError::Unhandled { byte, consumed })
                    if ignore_unknown || self.resync =>
                {
                    tracing::debug!(
                        offset = start,
                        byte,
                        dropped = consumed - 1,
                        "unhandled command, resyncing"
                    );
                    self.resync = false;
                    self.src.unread_byte(byte);
                    start = self.src.offset();
                }
                Err(e) => return Err(DecodeError::from_match(start, e)),
            }
        }
    }

    fn emit(&mut self, entry: Entry<'t>) -> Entry<'t> {
        self.resync = false;
        entry
    }

    fn read_command(&mut self, spec: &'t CommandSpec, start: usize) -> Result<Entry<'t>, DecodeError> {
        let args = self.read_section(spec, Section::Arguments, spec.arg_count(), start)?;
        let payload_len = spec.payload_len(&args).map_err(|source| {
            DecodeError::new(
                start,
                DecodeErrorKind::Eval {
                    command: spec.name.clone(),
                    source,
                },
            )
        })?;
        let payload = match payload_len {
            Some(n) => self.read_section(spec, Section::Payload, n, start)?,
            None => Vec::new(),
        };
        Ok(Entry::Command {
            offset: start,
            spec,
            args,
            payload,
        })
    }

    fn read_section(
        &mut self,
        spec: &CommandSpec,
        section: Section,
        expected: usize,
        start: usize,
    ) -> Result<Vec<u8>, DecodeError> {
        let bytes = self
            .src
            .read_up_to(expected)
            .map_err(|e| DecodeError::io(start, e))?;
        if bytes.len() < expected {
            return Err(DecodeError::new(
                start,
                DecodeErrorKind::Truncated {
                    command: spec.name.clone(),
                    section,
                    expected,
                    got: bytes.len(),
                },
            ));
        }
        Ok(bytes)
    }
}

fn entry_args<'a>(entry: &'a Entry<'_>) -> &'a [u8] {
    match entry {
        Entry::Command { args, .. } => args,
        _ => &[],
    }
}

impl<'t, R: Read> Iterator for Decoder<'t, R> {
    type Item = Result<Entry<'t>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let ignore_unknown = self.options.ignore_unknown;
        match self.next_entry(ignore_unknown) {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode a whole stream with default options.
pub fn decode<R: Read>(reader: R, trie: &CommandTrie) -> Result<Vec<Entry<'_>>, DecodeError> {
    decode_with_options(reader, trie, DecodeOptions::default())
}

/// Decode a whole stream, stopping at the first error.
pub fn decode_with_options<R: Read>(
    reader: R,
    trie: &CommandTrie,
    options: DecodeOptions,
) -> Result<Vec<Entry<'_>>, DecodeError> {
    let entries = Decoder::with_options(reader, trie, options).collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(entries = entries.len(), "decoded stream");
    Ok(entries)
}

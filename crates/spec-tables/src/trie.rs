//! Prefix trie over command prefixes.
//!
//! The trie is an arena: nodes live in one `Vec` and refer to each other by
//! index, and terminal nodes hold an index into the owned spec table. Lookup
//! follows the "first terminal wins" rule: as soon as a terminal node is
//! reached the match is returned without looking deeper, so [`CommandTrie::build`]
//! rejects tables in which one prefix is a strict prefix of another.

use std::collections::BTreeMap;
use std::io::{self, BufRead};

use crate::spec::CommandSpec;

/// Index of a node in the trie arena.
pub type NodeId = usize;
/// Index of a spec in the trie's spec table.
pub type SpecId = usize;

const ROOT: NodeId = 0;

/// Largest up-front reservation made by [`PushbackReader::read_up_to`].
const READ_CHUNK: usize = 8 * 1024;

/// Errors raised while building a trie.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrieError {
    /// A spec with no prefix bytes.
    #[error("command {name:?} has an empty prefix")]
    EmptyPrefix {
        /// Display name of the command.
        name: String,
    },
    /// Two specs share the same prefix.
    #[error("commands {first:?} and {second:?} share the prefix {}", hex(prefix))]
    DuplicatePrefix {
        /// The command inserted first.
        first: String,
        /// The command inserted second.
        second: String,
        /// The shared prefix bytes.
        prefix: Vec<u8>,
    },
    /// One spec's prefix is a strict prefix of another's, which would make the
    /// longer command unreachable.
    #[error("prefix of {shorter:?} ({}) is a strict prefix of {longer:?}", hex(prefix))]
    AmbiguousPrefix {
        /// The command with the shorter prefix.
        shorter: String,
        /// The command with the longer prefix.
        longer: String,
        /// The shorter prefix bytes.
        prefix: Vec<u8>,
    },
}

/// Errors raised while matching a prefix against a byte source.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// At least one prefix byte matched, then a byte with no trie edge was read.
    #[error("unhandled command: {byte:02x} ({:?})", *byte as char)]
    Unhandled {
        /// The byte with no matching edge.
        byte: u8,
        /// Bytes consumed, including the failing one.
        consumed: usize,
    },
    /// The input ended in the middle of a command prefix.
    #[error("input ended after {consumed} byte(s) of a command prefix")]
    Incomplete {
        /// Bytes consumed before the end of input.
        consumed: usize,
    },
    /// Reading from the source failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Outcome of a successful [`CommandTrie::match_prefix`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixMatch<'t> {
    /// The matched spec, or `None` when the first byte starts no command.
    pub spec: Option<&'t CommandSpec>,
    /// Bytes consumed from the source.
    pub consumed: usize,
}

/// A byte-at-a-time source with a single byte of pushback.
pub trait ByteSource {
    /// Read the next byte, `None` at end of input.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
    /// Push `b` back so the next read returns it. Only one byte of pushback
    /// is supported.
    fn unread_byte(&mut self, b: u8);
}

/// [`ByteSource`] over any `BufRead`, with peeking and a running offset.
#[derive(Debug)]
pub struct PushbackReader<R> {
    inner: R,
    pending: Option<u8>,
    offset: usize,
}

impl<R: BufRead> PushbackReader<R> {
    /// Wrap a buffered reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: None,
            offset: 0,
        }
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Look at the next byte without consuming it.
    pub fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.pending {
            return Ok(Some(b));
        }
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read up to `n` bytes. A shorter result means the input ended.
    /// `n` comes from a payload formula, so the buffer grows only as bytes arrive.
    pub fn read_up_to(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n.min(READ_CHUNK));
        if n > 0
            && let Some(b) = self.pending.take()
        {
            out.push(b);
            self.offset += 1;
        }
        while out.len() < n {
            let available = loop {
                match self.inner.fill_buf() {
                    Ok(buf) => break buf,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            };
            if available.is_empty() {
                break;
            }
            let take = available.len().min(n - out.len());
            out.extend_from_slice(&available[..take]);
            self.inner.consume(take);
            self.offset += take;
        }
        Ok(out)
    }
}

impl<R: BufRead> ByteSource for PushbackReader<R> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let b = match self.pending.take() {
            Some(b) => Some(b),
            None => {
                let b = self.peek_byte()?;
                if b.is_some() {
                    self.inner.consume(1);
                }
                b
            }
        };
        if b.is_some() {
            self.offset += 1;
        }
        Ok(b)
    }

    fn unread_byte(&mut self, b: u8) {
        debug_assert!(self.pending.is_none(), "only one byte of pushback");
        self.pending = Some(b);
        self.offset -= 1;
    }
}

/// A node in the trie arena.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrieNode {
    /// Child nodes keyed by the next prefix byte.
    pub children: BTreeMap<u8, NodeId>,
    /// The command whose prefix ends at this node.
    pub spec: Option<SpecId>,
}

/// Prefix trie over an owned, immutable table of command specs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTrie {
    nodes: Vec<TrieNode>,
    specs: Vec<CommandSpec>,
}

impl CommandTrie {
    /// Build a trie from `specs`, rejecting empty, duplicate, and ambiguous
    /// prefixes.
    pub fn build(specs: Vec<CommandSpec>) -> Result<Self, TrieError> {
        let mut nodes = vec![TrieNode::default()];
        for (id, spec) in specs.iter().enumerate() {
            if spec.prefix.is_empty() {
                return Err(TrieError::EmptyPrefix {
                    name: spec.name.clone(),
                });
            }
            let mut cur = ROOT;
            for (depth, &b) in spec.prefix.iter().enumerate() {
                if let Some(other) = nodes[cur].spec {
                    return Err(TrieError::AmbiguousPrefix {
                        shorter: specs[other].name.clone(),
                        longer: spec.name.clone(),
                        prefix: spec.prefix[..depth].to_vec(),
                    });
                }
                cur = match nodes[cur].children.get(&b) {
                    Some(&next) => next,
                    None => {
                        nodes.push(TrieNode::default());
                        let next = nodes.len() - 1;
                        nodes[cur].children.insert(b, next);
                        next
                    }
                };
            }
            if let Some(other) = nodes[cur].spec {
                return Err(TrieError::DuplicatePrefix {
                    first: specs[other].name.clone(),
                    second: spec.name.clone(),
                    prefix: spec.prefix.clone(),
                });
            }
            if !nodes[cur].children.is_empty() {
                let longer = first_terminal_below(&nodes, cur)
                    .map(|other| specs[other].name.clone())
                    .unwrap_or_default();
                return Err(TrieError::AmbiguousPrefix {
                    shorter: spec.name.clone(),
                    longer,
                    prefix: spec.prefix.clone(),
                });
            }
            nodes[cur].spec = Some(id);
        }
        tracing::debug!(specs = specs.len(), nodes = nodes.len(), "built command trie");
        Ok(Self { nodes, specs })
    }

    /// Resolve the next command prefix from `src`.
    ///
    /// * First byte starts no command: the byte is pushed back and
    ///   `spec: None, consumed: 0` is returned.
    /// * A terminal node is reached: its spec is returned immediately.
    /// * A byte has no edge after at least one matched byte:
    ///   [`MatchError::Unhandled`]. Silently re-framing a partially matched
    ///   command as raw data would shift every later offset.
    pub fn match_prefix<S: ByteSource + ?Sized>(
        &self,
        src: &mut S,
    ) -> Result<PrefixMatch<'_>, MatchError> {
        let mut cur = ROOT;
        let mut consumed = 0usize;
        loop {
            let Some(b) = src.read_byte()? else {
                if consumed == 0 {
                    return Ok(PrefixMatch {
                        spec: None,
                        consumed,
                    });
                }
                return Err(MatchError::Incomplete { consumed });
            };
            consumed += 1;
            match self.nodes[cur].children.get(&b) {
                Some(&next) => {
                    cur = next;
                    if let Some(id) = self.nodes[cur].spec {
                        return Ok(PrefixMatch {
                            spec: Some(&self.specs[id]),
                            consumed,
                        });
                    }
                }
                None if consumed == 1 => {
                    src.unread_byte(b);
                    return Ok(PrefixMatch {
                        spec: None,
                        consumed: 0,
                    });
                }
                None => return Err(MatchError::Unhandled { byte: b, consumed }),
            }
        }
    }

    /// Whether `b` is the first byte of any command prefix.
    pub fn starts_command(&self, b: u8) -> bool {
        self.nodes[ROOT].children.contains_key(&b)
    }

    /// Exact lookup of the spec with the given prefix.
    pub fn find(&self, prefix: &[u8]) -> Option<&CommandSpec> {
        let mut cur = ROOT;
        for b in prefix {
            cur = *self.nodes[cur].children.get(b)?;
        }
        self.nodes[cur].spec.map(|id| &self.specs[id])
    }

    /// The spec with the given id.
    pub fn spec(&self, id: SpecId) -> Option<&CommandSpec> {
        self.specs.get(id)
    }

    /// All specs in insertion order.
    pub fn specs(&self) -> &[CommandSpec] {
        &self.specs
    }

    /// Number of specs.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the trie holds no specs.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The root node; its children are the possible first prefix bytes.
    pub fn root(&self) -> &TrieNode {
        &self.nodes[ROOT]
    }

    /// A node by id.
    pub fn node(&self, id: NodeId) -> Option<&TrieNode> {
        self.nodes.get(id)
    }
}

fn first_terminal_below(nodes: &[TrieNode], from: NodeId) -> Option<SpecId> {
    let mut stack: Vec<NodeId> = nodes[from].children.values().rev().copied().collect();
    while let Some(id) = stack.pop() {
        if let Some(spec) = nodes[id].spec {
            return Some(spec);
        }
        stack.extend(nodes[id].children.values().rev().copied());
    }
    None
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(prefix: &[u8], name: &str) -> CommandSpec {
        CommandSpec::new(prefix, name, Vec::<String>::new()).unwrap()
    }

    #[test]
    fn shared_paths_reuse_nodes() {
        let trie = CommandTrie::build(vec![
            spec(b"\x1b@", "Initialize"),
            spec(b"\x1b(A", "A"),
            spec(b"\x1b(Y", "Y"),
        ])
        .unwrap();
        // root, ESC, @, (, A, Y
        assert_eq!(trie.node_count(), 6);
        assert!(trie.starts_command(0x1B));
        assert!(!trie.starts_command(b'A'));
        assert_eq!(trie.find(b"\x1b(Y").map(|s| s.name.as_str()), Some("Y"));
        assert!(trie.find(b"\x1b(").is_none());
    }

    #[test]
    fn shorter_then_longer_is_ambiguous() {
        let err = CommandTrie::build(vec![spec(b"\x1dV", "Cut"), spec(b"\x1dVA", "Cut A")])
            .unwrap_err();
        assert_eq!(
            err,
            TrieError::AmbiguousPrefix {
                shorter: "Cut".into(),
                longer: "Cut A".into(),
                prefix: b"\x1dV".to_vec(),
            }
        );
    }

    #[test]
    fn longer_then_shorter_is_ambiguous() {
        let err = CommandTrie::build(vec![spec(b"\x1dVA", "Cut A"), spec(b"\x1dV", "Cut")])
            .unwrap_err();
        assert!(matches!(
            err,
            TrieError::AmbiguousPrefix { ref shorter, ref longer, .. }
                if shorter == "Cut" && longer == "Cut A"
        ));
    }

    #[test]
    fn duplicate_prefix() {
        let err = CommandTrie::build(vec![spec(b"\n", "LF"), spec(b"\n", "LF again")]).unwrap_err();
        assert!(matches!(err, TrieError::DuplicatePrefix { .. }));
        assert_eq!(
            err.to_string(),
            "commands \"LF\" and \"LF again\" share the prefix 0A"
        );
    }

    #[test]
    fn pushback_reader_tracks_offset() {
        let mut r = PushbackReader::new(&b"abc"[..]);
        assert_eq!(r.peek_byte().unwrap(), Some(b'a'));
        assert_eq!(r.read_byte().unwrap(), Some(b'a'));
        assert_eq!(r.offset(), 1);
        r.unread_byte(b'a');
        assert_eq!(r.offset(), 0);
        assert_eq!(r.read_up_to(5).unwrap(), b"abc");
        assert_eq!(r.offset(), 3);
        assert_eq!(r.read_byte().unwrap(), None);
        assert_eq!(r.offset(), 3);
    }

    #[test]
    fn read_up_to_huge_length_returns_what_is_there() {
        let mut r = PushbackReader::new(&b"xyz"[..]);
        let bytes = r.read_up_to(usize::MAX).unwrap();
        assert_eq!(bytes, b"xyz");
        assert!(bytes.capacity() <= READ_CHUNK);
        assert_eq!(r.offset(), 3);
    }
}

//! Lossless YAML document access and rewriting
//!
//! Documents are parsed with tree-sitter; mutations are expressed as byte
//! range [`Edit`]s spliced into the original text, so comments, quoting and
//! formatting survive a rewrite untouched. Filters navigate the tree with
//! the helpers here, collect edits, and [`YamlDocument::apply`] produces the
//! re-parsed result.

use std::ops::Range;

use thiserror::Error;
use tracing::warn;
use tree_sitter::{Node, Tree};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to load YAML grammar: {0}")]
    Language(String),

    #[error("failed to parse document")]
    ParseFailed,

    #[error("conflicting edits at byte {0}")]
    ConflictingEdits(usize),

    #[error("edit range {0}..{1} out of bounds")]
    OutOfBounds(usize, usize),
}

/// A single text replacement. An empty range is an insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub value: String,
}

/// A scalar value together with the byte range of its content (inside any
/// surrounding quotes), suitable for building an [`Edit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar {
    pub value: String,
    pub range: Range<usize>,
}

/// A parsed YAML document owning its source text and parse tree.
pub struct YamlDocument {
    source: String,
    tree: Tree,
}

impl std::fmt::Debug for YamlDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YamlDocument")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl YamlDocument {
    pub fn parse(source: String) -> Result<Self, DocumentError> {
        let mut parser = tree_sitter::Parser::new();
        let language = tree_sitter_yaml::LANGUAGE;
        parser
            .set_language(&language.into())
            .map_err(|e| DocumentError::Language(e.to_string()))?;
        let tree = parser.parse(&source, None).ok_or_else(|| {
            warn!("failed to parse YAML content");
            DocumentError::ParseFailed
        })?;
        Ok(Self { source, tree })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn into_source(self) -> String {
        self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Returns the value node for `key` in the mapping reachable from `node`.
    pub fn get<'t>(&'t self, node: Node<'t>, key: &str) -> Option<Node<'t>> {
        self.pair(node, key)
            .and_then(|pair| pair.child_by_field_name("value"))
    }

    /// Returns the `key: value` pair node for `key` in the mapping reachable
    /// from `node`.
    pub fn pair<'t>(&'t self, node: Node<'t>, key: &str) -> Option<Node<'t>> {
        let mapping = self.content(node);
        if !matches!(mapping.kind(), "block_mapping" | "flow_mapping") {
            return None;
        }
        let mut cursor = mapping.walk();
        for pair in mapping.named_children(&mut cursor) {
            if !matches!(pair.kind(), "block_mapping_pair" | "flow_pair") {
                continue;
            }
            let Some(key_node) = pair.child_by_field_name("key") else {
                continue;
            };
            if self.node_text(key_node) == key {
                return Some(pair);
            }
        }
        None
    }

    /// Follows a chain of mapping keys from `node`.
    pub fn lookup<'t>(&'t self, node: Node<'t>, path: &[&str]) -> Option<Node<'t>> {
        path.iter()
            .try_fold(node, |current, key| self.get(current, key))
    }

    /// Returns the content node of every element in the sequence reachable
    /// from `node`.
    pub fn items<'t>(&'t self, node: Node<'t>) -> Vec<Node<'t>> {
        let sequence = self.content(node);
        let mut out = Vec::new();
        let mut cursor = sequence.walk();
        match sequence.kind() {
            "block_sequence" => {
                for item in sequence.named_children(&mut cursor) {
                    if item.kind() == "block_sequence_item"
                        && let Some(content) = item.named_child(0)
                    {
                        out.push(content);
                    }
                }
            }
            "flow_sequence" => {
                for item in sequence.named_children(&mut cursor) {
                    if item.kind() == "flow_node" {
                        out.push(item);
                    }
                }
            }
            _ => {}
        }
        out
    }

    /// Returns every `(key, value)` pair of the mapping reachable from
    /// `node`. Pairs without a value are skipped.
    pub fn fields<'t>(&'t self, node: Node<'t>) -> Vec<(String, Node<'t>)> {
        let mapping = self.content(node);
        let mut out = Vec::new();
        if !matches!(mapping.kind(), "block_mapping" | "flow_mapping") {
            return out;
        }
        let mut cursor = mapping.walk();
        for pair in mapping.named_children(&mut cursor) {
            if !matches!(pair.kind(), "block_mapping_pair" | "flow_pair") {
                continue;
            }
            let (Some(key_node), Some(value_node)) = (
                pair.child_by_field_name("key"),
                pair.child_by_field_name("value"),
            ) else {
                continue;
            };
            out.push((self.node_text(key_node), value_node));
        }
        out
    }

    /// Returns the scalar value reachable from `node`, unwrapping quotes.
    pub fn scalar<'t>(&'t self, node: Node<'t>) -> Option<Scalar> {
        let content = self.content(node);
        let range = content.byte_range();
        match content.kind() {
            "plain_scalar" => Some(Scalar {
                value: self.source[range.clone()].to_string(),
                range,
            }),
            "single_quote_scalar" | "double_quote_scalar" => {
                // Range of the content inside the quotes, so an edit keeps
                // the original quoting style.
                let inner = range.start + 1..range.end.saturating_sub(1);
                if inner.start > inner.end {
                    return None;
                }
                Some(Scalar {
                    value: self.source[inner.clone()].to_string(),
                    range: inner,
                })
            }
            _ => None,
        }
    }

    /// Splices the edits into the source and re-parses. Edits must not
    /// overlap; ranges refer to the current source.
    pub fn apply(&self, mut edits: Vec<Edit>) -> Result<YamlDocument, DocumentError> {
        edits.sort_by_key(|e| e.range.start);
        for pair in edits.windows(2) {
            if pair[1].range.start < pair[0].range.end {
                return Err(DocumentError::ConflictingEdits(pair[1].range.start));
            }
        }
        let mut source = self.source.clone();
        for edit in edits.iter().rev() {
            if edit.range.end > source.len() || edit.range.start > edit.range.end {
                return Err(DocumentError::OutOfBounds(edit.range.start, edit.range.end));
            }
            source.replace_range(edit.range.clone(), &edit.value);
        }
        Self::parse(source)
    }

    /// Key text of a node, trimmed with matching quotes removed.
    fn node_text(&self, node: Node<'_>) -> String {
        let text = self.source[node.byte_range()].trim();
        let unquoted = text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .or_else(|| text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
            .unwrap_or(text);
        unquoted.to_string()
    }

    /// Descends through stream/document/node wrappers to the underlying
    /// mapping, sequence or scalar.
    fn content<'t>(&'t self, node: Node<'t>) -> Node<'t> {
        let mut current = node;
        loop {
            if !matches!(
                current.kind(),
                "stream" | "document" | "block_node" | "flow_node"
            ) {
                return current;
            }
            let mut next = None;
            let mut cursor = current.walk();
            for child in current.named_children(&mut cursor) {
                if matches!(
                    child.kind(),
                    "stream"
                        | "document"
                        | "block_node"
                        | "flow_node"
                        | "block_mapping"
                        | "block_sequence"
                        | "flow_mapping"
                        | "flow_sequence"
                        | "plain_scalar"
                        | "single_quote_scalar"
                        | "double_quote_scalar"
                        | "block_scalar"
                ) {
                    next = Some(child);
                    break;
                }
            }
            match next {
                Some(n) => current = n,
                None => return current,
            }
        }
    }
}

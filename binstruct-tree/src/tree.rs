use std::fmt;
use std::ops::Range;

use binstruct_common::{ByteView, OutOfBounds};

use crate::error::{ParseError, ParseErrorKind};
use crate::fields::Fields;
use crate::format;
use crate::kind::{NodeKind, Width};
use crate::options::ParseOptions;

/// The index of a [`Node`] within its [`Tree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Returns the position of this node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The index of a buffer owned by a [`Tree`].
///
/// The buffer passed to [`Tree::parse`] always has index `0`. Decoders that inflate data, such as
/// the embedded Portable PDB decoder, register additional buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub(crate) usize);

impl BufferId {
    /// Returns the position of this buffer in the tree.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Where a new node is placed within its parent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// At an absolute offset into the parent's buffer.
    At(usize),
    /// Immediately after the parent's last child, or at the parent's start if it has none.
    Sequential,
}

/// A labelled span `[start, start + length)` of a buffer.
#[derive(Clone, Debug)]
pub struct Node {
    buffer: BufferId,
    start: usize,
    length: usize,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    nested: Option<NodeId>,
    kind: NodeKind,
    label: Option<String>,
}

impl Node {
    /// The buffer this node's span refers to.
    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    /// The absolute offset of the first byte.
    pub fn start(&self) -> usize {
        self.start
    }

    /// The number of bytes covered by this node.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The absolute offset one past the last byte.
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// The covered span as a range.
    pub fn span(&self) -> Range<usize> {
        self.start..self.end()
    }

    /// Returns `true` if `offset` lies within this node's span.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end()
    }

    /// The parent of this node.
    ///
    /// For the root of a nested tree, this is the node that owns it.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The children of this node, sorted by start offset.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The root of a tree over a separate buffer that is owned by this node.
    pub fn nested(&self) -> Option<NodeId> {
        self.nested
    }

    /// The variant of this node.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The explicit label of this node, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// State to restore when adding a node fails.
struct Checkpoint {
    nodes: usize,
    buffers: usize,
    parent: NodeId,
    index: usize,
    lengths: Vec<(NodeId, usize)>,
}

/// A tree of nested spans over one or more byte buffers.
///
/// All nodes live in an arena owned by the tree and refer to each other by [`NodeId`]. Children
/// of a node are sorted by their start offset and never overlap. A node may additionally own the
/// root of a *nested* tree over a different buffer, which is how decompressed data is attached to
/// the span that contained it.
///
/// # Example
///
/// ```
/// use binstruct_common::ByteView;
/// use binstruct_tree::{NodeKind, Placement, Tree, Width};
///
/// let view = ByteView::from_slice(b"\x2a\x00\x00\x00\xff\xff");
/// let mut tree = Tree::parse(view, 0..6, NodeKind::Generic).unwrap();
/// let root = tree.root();
///
/// let answer = tree
///     .add(root, Placement::Sequential, 4, NodeKind::Scalar(Width::U32))
///     .unwrap();
/// assert_eq!(tree.value(answer), Some(42));
/// assert_eq!(tree.find(root, 2), Some(answer));
/// ```
pub struct Tree<'data> {
    buffers: Vec<ByteView<'data>>,
    nodes: Vec<Node>,
    root: NodeId,
    options: ParseOptions,
}

impl<'data> Tree<'data> {
    /// Decodes `range` of `buffer` as a node of the given kind, using default options.
    pub fn parse(
        buffer: ByteView<'data>,
        range: Range<usize>,
        kind: NodeKind,
    ) -> Result<Self, ParseError> {
        Self::parse_with_options(buffer, range, kind, ParseOptions::default())
    }

    /// Decodes `range` of `buffer` as a node of the given kind.
    pub fn parse_with_options(
        buffer: ByteView<'data>,
        range: Range<usize>,
        kind: NodeKind,
        options: ParseOptions,
    ) -> Result<Self, ParseError> {
        let mut tree = Tree {
            buffers: Vec::new(),
            nodes: Vec::new(),
            root: NodeId(0),
            options,
        };

        if range.end < range.start {
            return Err(ParseError::new(
                ParseErrorKind::InvalidLength,
                range.start,
                format!("range ends at {:#x} before it starts", range.end),
            ));
        }

        let buffer = tree.push_buffer(buffer);
        let length = range.end - range.start;
        tree.root = tree.new_root(buffer, range.start, length, kind, None)?;
        Ok(tree)
    }

    /// The root node, covering the range passed to [`Tree::parse`].
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The options this tree is built with.
    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// The total number of nodes, including nested trees.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree has no nodes.
    ///
    /// A successfully parsed tree always has at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if the id does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Returns the node with the given id, if it exists.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Returns the buffer with the given id.
    pub fn buffer(&self, id: BufferId) -> &ByteView<'data> {
        &self.buffers[id.0]
    }

    /// The children of a node, sorted by start offset.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// The parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// The root of the nested tree owned by a node.
    pub fn nested(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).nested
    }

    /// Iterates the ancestors of a node, starting with its parent.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_, 'data> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Returns the first ancestor of the given kind.
    pub fn ancestor_of_kind(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.ancestors(id).find(|ancestor| self.node(*ancestor).kind == kind)
    }

    /// The bytes covered by a node.
    pub fn bytes(&self, id: NodeId) -> &[u8] {
        let node = self.node(id);
        self.buffer(node.buffer)
            .get(node.span())
            .unwrap_or_default()
    }

    /// The decoded value of a [`Scalar`](NodeKind::Scalar) node.
    pub fn value(&self, id: NodeId) -> Option<u64> {
        match self.node(id).kind {
            NodeKind::Scalar(width) => self.read_scalar(id, width).ok(),
            _ => None,
        }
    }

    /// Replaces the label of a node.
    pub fn set_label(&mut self, id: NodeId, label: impl Into<String>) {
        self.nodes[id.0].label = Some(label.into());
    }

    /// Returns a builder that appends fields to `parent` from left to right.
    pub fn fields(&mut self, parent: NodeId) -> Fields<'_, 'data> {
        Fields::new(self, parent)
    }

    /// Adds a node below `parent` and decodes it.
    ///
    /// With [`Placement::Sequential`], the node starts where the parent's last child ends. With
    /// [`Placement::At`], the node is inserted in start order; if the offset falls within an
    /// existing child, the node is added to that child instead, recursively.
    ///
    /// After the node has been decoded, its length covers all of its children, and every ancestor
    /// is grown to cover the node.
    ///
    /// If adding fails, every change made on behalf of the new node is rolled back and the tree
    /// is left as it was before the call.
    pub fn add(
        &mut self,
        parent: NodeId,
        placement: Placement,
        length: usize,
        kind: NodeKind,
    ) -> Result<NodeId, ParseError> {
        self.insert(parent, placement, length, kind, None)
    }

    /// Like [`add`](Self::add), but assigns a label to the new node.
    pub fn add_labeled(
        &mut self,
        parent: NodeId,
        placement: Placement,
        length: usize,
        kind: NodeKind,
        label: impl Into<String>,
    ) -> Result<NodeId, ParseError> {
        self.insert(parent, placement, length, kind, Some(label.into()))
    }

    /// Returns the deepest node below `root` whose span contains `offset`.
    ///
    /// Returns `None` if `offset` lies outside of `root`, or if it falls into a gap between the
    /// children of some node before a leaf is reached. Nested trees are not entered.
    pub fn find(&self, root: NodeId, offset: usize) -> Option<NodeId> {
        if !self.node(root).contains(offset) {
            return None;
        }

        let mut current = root;
        loop {
            let children = &self.node(current).children;
            if children.is_empty() {
                return Some(current);
            }

            let index = children.partition_point(|child| self.node(*child).start <= offset);
            match index.checked_sub(1).map(|i| children[i]) {
                Some(child) if self.node(child).contains(offset) => current = child,
                _ => return None,
            }
        }
    }

    /// The offset at which the next sequential child of `parent` starts.
    pub fn cursor(&self, parent: NodeId) -> usize {
        let node = self.node(parent);
        match node.children.last() {
            Some(last) => self.node(*last).end(),
            None => node.start,
        }
    }

    pub(crate) fn push_buffer(&mut self, buffer: ByteView<'data>) -> BufferId {
        self.buffers.push(buffer);
        BufferId(self.buffers.len() - 1)
    }

    /// Creates and decodes the root of a tree over `buffer`.
    pub(crate) fn new_root(
        &mut self,
        buffer: BufferId,
        start: usize,
        length: usize,
        kind: NodeKind,
        owner: Option<NodeId>,
    ) -> Result<NodeId, ParseError> {
        self.check_bounds(buffer, start, length)?;

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            buffer,
            start,
            length,
            parent: owner,
            children: Vec::new(),
            nested: None,
            kind,
            label: None,
        });

        self.decode(id)?;
        Ok(id)
    }

    /// Grows a node being decoded so that it ends at least at `end`.
    pub(crate) fn extend_to(&mut self, id: NodeId, end: usize) -> Result<(), ParseError> {
        let node = self.node(id);
        let length = end.saturating_sub(node.start).max(node.length);
        self.check_bounds(node.buffer, node.start, length)?;
        self.check_next_sibling(id, node.start + length)?;
        self.nodes[id.0].length = length;
        Ok(())
    }

    pub(crate) fn set_nested(&mut self, owner: NodeId, root: NodeId) {
        self.nodes[owner.0].nested = Some(root);
    }

    pub(crate) fn read_scalar(&self, id: NodeId, width: Width) -> Result<u64, ParseError> {
        let node = self.node(id);
        self.read(node.buffer, node.start, width)
    }

    /// Reads a little-endian integer of the given width from a buffer.
    pub(crate) fn read(
        &self,
        buffer: BufferId,
        offset: usize,
        width: Width,
    ) -> Result<u64, ParseError> {
        let view = self.buffer(buffer);
        let value = match width {
            Width::U8 => view.read_u8(offset).map(u64::from),
            Width::U16 => view.read_u16(offset).map(u64::from),
            Width::U24 => view.read_u24(offset).map(u64::from),
            Width::U32 => view.read_u32(offset).map(u64::from),
            Width::U64 => view.read_u64(offset),
        };
        value.map_err(truncated)
    }

    fn check_bounds(&self, buffer: BufferId, start: usize, length: usize) -> Result<(), ParseError> {
        self.buffer(buffer)
            .read_bytes(start, length)
            .map(|_| ())
            .map_err(truncated)
    }

    fn insert(
        &mut self,
        parent: NodeId,
        placement: Placement,
        length: usize,
        kind: NodeKind,
        label: Option<String>,
    ) -> Result<NodeId, ParseError> {
        let (parent, index, start) = self.locate(parent, placement, length)?;
        let buffer = self.node(parent).buffer;
        self.check_bounds(buffer, start, length)?;

        let checkpoint = self.checkpoint(parent, index);
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            buffer,
            start,
            length,
            parent: Some(parent),
            children: Vec::new(),
            nested: None,
            kind,
            label,
        });
        self.nodes[parent.0].children.insert(index, id);

        match self.decode(id).and_then(|()| self.extend_ancestors(id)) {
            Ok(()) => Ok(id),
            Err(err) => {
                tracing::warn!(
                    kind = kind.name(),
                    start,
                    error = &err as &(dyn std::error::Error + 'static),
                    "rolling back node"
                );
                self.rollback(checkpoint);
                Err(err)
            }
        }
    }

    /// Resolves the final parent, child index and start offset of a node about to be added.
    fn locate(
        &self,
        mut parent: NodeId,
        placement: Placement,
        length: usize,
    ) -> Result<(NodeId, usize, usize), ParseError> {
        let start = match placement {
            Placement::Sequential => {
                let index = self.node(parent).children.len();
                return Ok((parent, index, self.cursor(parent)));
            }
            Placement::At(start) => start,
        };

        let end = start
            .checked_add(length)
            .ok_or_else(|| ParseError::at(ParseErrorKind::Truncated, start))?;

        loop {
            let node = self.node(parent);
            if start < node.start {
                return Err(ParseError::at(ParseErrorKind::Overlap, start));
            }

            let index = node
                .children
                .partition_point(|child| self.node(*child).start <= start);

            if let Some(prev) = index.checked_sub(1).map(|i| node.children[i]) {
                let prev_node = self.node(prev);
                if prev_node.contains(start) {
                    if end > prev_node.end() {
                        return Err(ParseError::at(ParseErrorKind::Overlap, start));
                    }
                    parent = prev;
                    continue;
                }
            }

            if let Some(next) = node.children.get(index) {
                let next_start = self.node(*next).start;
                if end > next_start {
                    return Err(ParseError::at(ParseErrorKind::Overlap, next_start));
                }
            }

            return Ok((parent, index, start));
        }
    }

    fn decode(&mut self, id: NodeId) -> Result<(), ParseError> {
        let kind = self.node(id).kind;
        match kind {
            NodeKind::Generic
            | NodeKind::Scalar(_)
            | NodeKind::Guid
            | NodeKind::Padding
            | NodeKind::Unknown => Ok(()),
            NodeKind::DebugDirectories => format::debug_directory::parse_directories(self, id),
            NodeKind::DebugDirectory => format::debug_directory::parse_directory(self, id),
            NodeKind::CodeView => format::codeview::parse_codeview(self, id),
            NodeKind::PdbChecksum => format::codeview::parse_pdb_checksum(self, id),
            NodeKind::EmbeddedPdb => format::embedded_pdb::parse_embedded_pdb(self, id),
            NodeKind::CompressedDeflateStream { decompressed_size } => {
                format::embedded_pdb::parse_compressed_stream(self, id, decompressed_size)
            }
            NodeKind::Metadata => format::metadata::parse_metadata(self, id),
            NodeKind::StreamHeader => format::metadata::parse_stream_header(self, id),
            NodeKind::PdbStream => format::pdb_stream::parse_pdb_stream(self, id),
            NodeKind::TinyMethod { code_size } => {
                format::method::parse_tiny_method(self, id, code_size)
            }
            NodeKind::FatMethod => format::method::parse_fat_method(self, id),
            NodeKind::ExtraSection => format::method::parse_extra_section(self, id),
        }
    }

    /// Grows every ancestor within the same buffer until it covers `id`.
    fn extend_ancestors(&mut self, id: NodeId) -> Result<(), ParseError> {
        let mut child = id;
        while let Some(parent) = self.node(child).parent {
            let child_node = self.node(child);
            let parent_node = self.node(parent);
            if parent_node.buffer != child_node.buffer || child_node.end() <= parent_node.end() {
                return Ok(());
            }

            let end = child_node.end();
            self.check_next_sibling(parent, end)?;

            let parent_node = &mut self.nodes[parent.0];
            parent_node.length = end - parent_node.start;
            child = parent;
        }

        Ok(())
    }

    /// Fails if `id` ending at `end` would run into its next sibling.
    fn check_next_sibling(&self, id: NodeId, end: usize) -> Result<(), ParseError> {
        let Some(parent) = self.node(id).parent else {
            return Ok(());
        };

        let siblings = &self.node(parent).children;
        let next = siblings
            .iter()
            .position(|sibling| *sibling == id)
            .and_then(|position| siblings.get(position + 1));
        match next {
            Some(next) if end > self.node(*next).start => {
                Err(ParseError::at(ParseErrorKind::Overlap, self.node(*next).start))
            }
            _ => Ok(()),
        }
    }

    fn checkpoint(&self, parent: NodeId, index: usize) -> Checkpoint {
        let mut lengths = vec![(parent, self.node(parent).length)];
        lengths.extend(
            self.ancestors(parent)
                .map(|ancestor| (ancestor, self.node(ancestor).length)),
        );

        Checkpoint {
            nodes: self.nodes.len(),
            buffers: self.buffers.len(),
            parent,
            index,
            lengths,
        }
    }

    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.nodes.truncate(checkpoint.nodes);
        self.buffers.truncate(checkpoint.buffers);
        self.nodes[checkpoint.parent.0]
            .children
            .remove(checkpoint.index);
        for (id, length) in checkpoint.lengths {
            self.nodes[id.0].length = length;
        }
    }
}

impl fmt::Debug for Tree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("buffers", &self.buffers.len())
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .field("options", &self.options)
            .finish()
    }
}

/// An iterator over the ancestors of a node.
///
/// Returned by [`Tree::ancestors`].
pub struct Ancestors<'t, 'data> {
    tree: &'t Tree<'data>,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_, '_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

fn truncated(err: OutOfBounds) -> ParseError {
    ParseError::new(ParseErrorKind::Truncated, err.offset, err)
}

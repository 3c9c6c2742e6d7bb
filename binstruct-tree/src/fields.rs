use binstruct_common::OutOfBounds;
use uuid::Uuid;

use crate::error::{ParseError, ParseErrorKind};
use crate::kind::{NodeKind, Width};
use crate::tree::{NodeId, Placement, Tree};

/// Appends fields to a node from left to right.
///
/// Returned by [`Tree::fields`]. Every field is placed immediately after the previous one unless
/// [`align`](Self::align) moves the cursor forward. Scalar fields are labelled with their name and
/// decoded value, and the value is returned to the caller.
///
/// If the parent already has a length when the builder is created, no field may extend past its
/// end. Parents created with a length of zero grow with their fields instead.
///
/// # Example
///
/// ```
/// use binstruct_common::ByteView;
/// use binstruct_tree::{NodeKind, Tree};
///
/// let view = ByteView::from_slice(b"\x07\x00\x01\x00\x00\x00");
/// let mut tree = Tree::parse(view, 0..6, NodeKind::Generic).unwrap();
/// let root = tree.root();
///
/// let mut fields = tree.fields(root);
/// assert_eq!(fields.u16("Kind").unwrap(), 7);
/// assert_eq!(fields.u32("Count").unwrap(), 1);
///
/// let count = tree.children(root)[1];
/// assert_eq!(tree.text(count), "Count: 1");
/// ```
pub struct Fields<'t, 'data> {
    tree: &'t mut Tree<'data>,
    parent: NodeId,
    placement: Placement,
    limit: Option<usize>,
    last: Option<NodeId>,
}

impl<'t, 'data> Fields<'t, 'data> {
    pub(crate) fn new(tree: &'t mut Tree<'data>, parent: NodeId) -> Self {
        let node = tree.node(parent);
        let limit = (node.length() > 0).then(|| node.end());
        Self {
            tree,
            parent,
            placement: Placement::Sequential,
            limit,
            last: None,
        }
    }

    /// The node that fields are added to.
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// The offset at which the next field starts.
    pub fn cursor(&self) -> usize {
        match self.placement {
            Placement::At(offset) => offset,
            Placement::Sequential => self.tree.cursor(self.parent),
        }
    }

    /// The tree that fields are added to.
    pub fn tree(&mut self) -> &mut Tree<'data> {
        self.tree
    }

    /// The most recently added field.
    pub fn last(&self) -> Option<NodeId> {
        self.last
    }

    /// Replaces the label of the most recently added field.
    pub fn label_last(&mut self, label: impl Into<String>) {
        if let Some(last) = self.last {
            self.tree.set_label(last, label);
        }
    }

    /// Moves the cursor forward to the next multiple of `alignment`, returning the number of
    /// skipped bytes.
    ///
    /// The skipped bytes are left uncovered.
    pub fn align(&mut self, alignment: usize) -> usize {
        let cursor = self.cursor();
        let aligned = cursor.next_multiple_of(alignment);
        self.placement = Placement::At(aligned);
        aligned - cursor
    }

    /// Adds a node of any kind and length, returning its id.
    pub fn node(
        &mut self,
        kind: NodeKind,
        length: usize,
        label: Option<String>,
    ) -> Result<NodeId, ParseError> {
        if let Some(limit) = self.limit {
            let start = self.cursor();
            if start.saturating_add(length) > limit {
                return Err(ParseError::new(
                    ParseErrorKind::Truncated,
                    start,
                    format!("field of {length} bytes exceeds the parent ending at {limit:#x}"),
                ));
            }
        }

        let placement = std::mem::replace(&mut self.placement, Placement::Sequential);
        let id = match label {
            Some(label) => self
                .tree
                .add_labeled(self.parent, placement, length, kind, label)?,
            None => self.tree.add(self.parent, placement, length, kind)?,
        };
        self.last = Some(id);
        Ok(id)
    }

    /// Adds an opaque span of `length` bytes.
    pub fn bytes(&mut self, name: &str, length: usize) -> Result<NodeId, ParseError> {
        self.node(NodeKind::Generic, length, Some(name.to_owned()))
    }

    fn scalar(&mut self, name: &str, width: Width) -> Result<u64, ParseError> {
        let id = self.node(NodeKind::Scalar(width), width.size(), None)?;
        let value = self.tree.read_scalar(id, width)?;
        self.tree.set_label(id, format!("{name}: {value}"));
        Ok(value)
    }

    /// Adds a byte.
    pub fn u8(&mut self, name: &str) -> Result<u8, ParseError> {
        self.scalar(name, Width::U8).map(|v| v as u8)
    }

    /// Adds a little-endian `u16`.
    pub fn u16(&mut self, name: &str) -> Result<u16, ParseError> {
        self.scalar(name, Width::U16).map(|v| v as u16)
    }

    /// Adds a little-endian 24-bit integer.
    pub fn u24(&mut self, name: &str) -> Result<u32, ParseError> {
        self.scalar(name, Width::U24).map(|v| v as u32)
    }

    /// Adds a little-endian `u32`.
    pub fn u32(&mut self, name: &str) -> Result<u32, ParseError> {
        self.scalar(name, Width::U32).map(|v| v as u32)
    }

    /// Adds a little-endian `u64`.
    pub fn u64(&mut self, name: &str) -> Result<u64, ParseError> {
        self.scalar(name, Width::U64)
    }

    /// Adds a 16-byte GUID.
    pub fn guid(&mut self, name: &str) -> Result<Uuid, ParseError> {
        let id = self.node(NodeKind::Guid, 16, None)?;
        let guid = read_guid(self.tree.bytes(id))
            .ok_or_else(|| ParseError::at(ParseErrorKind::Truncated, self.tree.node(id).start()))?;
        self.tree.set_label(id, format!("{name}: {guid}"));
        Ok(guid)
    }

    /// Adds a NUL-terminated UTF-8 string of at most `max_length` bytes including the terminator.
    ///
    /// The terminator is part of the added node. A string without terminator within
    /// `max_length` bytes, or one that is not valid UTF-8, is rejected.
    pub fn c_string(&mut self, name: &str, max_length: usize) -> Result<String, ParseError> {
        let start = self.cursor();
        let buffer = self.tree.node(self.parent).buffer();
        let view = self.tree.buffer(buffer);
        let end = self.limit.unwrap_or(view.len()).min(view.len());
        let available = end.saturating_sub(start).min(max_length);
        let data = view
            .read_bytes(start, available)
            .map_err(|err: OutOfBounds| {
                ParseError::new(ParseErrorKind::Truncated, err.offset, err)
            })?;

        let nul = data
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| ParseError::at(ParseErrorKind::InvalidString, start))?;
        let string = std::str::from_utf8(&data[..nul])
            .map_err(|err| ParseError::new(ParseErrorKind::InvalidString, start, err))?
            .to_owned();

        self.node(NodeKind::Generic, nul + 1, Some(format!("{name}: {string}")))?;
        Ok(string)
    }
}

/// Decodes a GUID stored with little-endian leading fields.
pub(crate) fn read_guid(bytes: &[u8]) -> Option<Uuid> {
    let bytes: [u8; 16] = bytes.get(..16)?.try_into().ok()?;
    Some(Uuid::from_bytes_le(bytes))
}

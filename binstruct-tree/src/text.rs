use std::borrow::Cow;
use std::fmt::{self, Write};

use crate::fields::read_guid;
use crate::kind::NodeKind;
use crate::tree::{NodeId, Tree};

/// Number of bytes shown in the default text of an opaque node.
const PREVIEW_BYTES: usize = 16;

/// Layout of [`Tree::hex_text`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HexFormat {
    /// Number of bytes per line. `0` puts all bytes on a single line.
    pub columns: usize,
    /// Number of bytes per group within a line. Groups are separated by two spaces.
    pub group: usize,
}

impl Default for HexFormat {
    fn default() -> Self {
        Self {
            columns: 16,
            group: 8,
        }
    }
}

impl<'data> Tree<'data> {
    /// Returns the label of a node, or a rendering of its contents if it has none.
    ///
    /// Scalars render their value, GUIDs their canonical form, and decoded structures their kind.
    /// Opaque spans render a hex preview of their first bytes.
    pub fn text(&self, id: NodeId) -> Cow<'_, str> {
        let node = self.node(id);
        if let Some(label) = node.label() {
            return Cow::Borrowed(label);
        }

        match node.kind() {
            NodeKind::Scalar(_) => match self.value(id) {
                Some(value) => Cow::Owned(format!("{value} ({value:#x})")),
                None => Cow::Borrowed("<invalid>"),
            },
            NodeKind::Guid => match read_guid(self.bytes(id)) {
                Some(guid) => Cow::Owned(guid.to_string()),
                None => Cow::Borrowed("<invalid>"),
            },
            NodeKind::Generic | NodeKind::Padding | NodeKind::Unknown => {
                let bytes = self.bytes(id);
                let preview = &bytes[..bytes.len().min(PREVIEW_BYTES)];
                let mut text = match node.kind() {
                    NodeKind::Padding => String::from("Padding "),
                    NodeKind::Unknown => String::from("Unknown "),
                    _ => String::new(),
                };
                text.push_str(&hex(preview, &HexFormat { columns: 0, group: 0 }));
                if bytes.len() > PREVIEW_BYTES {
                    text.push_str(" ...");
                }
                Cow::Owned(text.trim_end().to_owned())
            }
            kind => Cow::Borrowed(kind.name()),
        }
    }

    /// Renders the bytes of a node as uppercase hex digits.
    ///
    /// # Example
    ///
    /// ```
    /// use binstruct_common::ByteView;
    /// use binstruct_tree::{HexFormat, NodeKind, Tree};
    ///
    /// let view = ByteView::from_slice(b"MPDB\x01\x02");
    /// let tree = Tree::parse(view, 0..6, NodeKind::Generic).unwrap();
    /// let text = tree.hex_text(tree.root(), &HexFormat { columns: 4, group: 2 });
    /// assert_eq!(text, "4D 50  44 42\n01 02");
    /// ```
    pub fn hex_text(&self, id: NodeId, format: &HexFormat) -> String {
        hex(self.bytes(id), format)
    }

    /// Returns an outline of a node and all of its descendants, one node per line.
    ///
    /// Each line shows the span and [`text`](Self::text) of a node, indented by its depth.
    /// Nested trees are shown below the node that owns them, marked with `~`.
    pub fn display(&self, id: NodeId) -> TreeDisplay<'_, 'data> {
        TreeDisplay { tree: self, id }
    }
}

fn hex(bytes: &[u8], format: &HexFormat) -> String {
    let mut text = String::with_capacity(bytes.len() * 3);
    for (index, byte) in bytes.iter().enumerate() {
        if index > 0 {
            if format.columns > 0 && index % format.columns == 0 {
                text.push('\n');
            } else if format.group > 0 && index % format.group == 0 {
                text.push_str("  ");
            } else {
                text.push(' ');
            }
        }
        // writing into a String cannot fail
        let _ = write!(text, "{byte:02X}");
    }
    text
}

/// Helper to render an outline of a subtree.
///
/// Returned by [`Tree::display`].
pub struct TreeDisplay<'t, 'data> {
    tree: &'t Tree<'data>,
    id: NodeId,
}

impl TreeDisplay<'_, '_> {
    fn write_node(
        &self,
        f: &mut fmt::Formatter<'_>,
        id: NodeId,
        depth: usize,
        marker: &str,
    ) -> fmt::Result {
        let node = self.tree.node(id);
        writeln!(
            f,
            "{:indent$}{marker}{:#x}..{:#x} {}",
            "",
            node.start(),
            node.end(),
            self.tree.text(id),
            indent = depth * 2,
        )?;

        for child in node.children() {
            self.write_node(f, *child, depth + 1, "")?;
        }
        if let Some(nested) = node.nested() {
            self.write_node(f, nested, depth + 1, "~ ")?;
        }
        Ok(())
    }
}

impl fmt::Display for TreeDisplay<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_node(f, self.id, 0, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use binstruct_common::ByteView;
    use similar_asserts::assert_eq;

    use crate::{Placement, Width};

    #[test]
    fn test_hex_single_line() {
        let text = hex(&[0x00, 0xab, 0x10], &HexFormat { columns: 0, group: 0 });
        assert_eq!(text, "00 AB 10");
    }

    #[test]
    fn test_hex_columns_and_groups() {
        let bytes: Vec<u8> = (0..10).collect();
        let text = hex(&bytes, &HexFormat { columns: 6, group: 3 });
        assert_eq!(text, "00 01 02  03 04 05\n06 07 08  09");
    }

    #[test]
    fn test_default_text() {
        let data = b"\x05\x00\x00\x00\xde\xad\xbe\xef";
        let mut tree = Tree::parse(ByteView::from_slice(data), 0..8, NodeKind::Generic).unwrap();
        let root = tree.root();

        let scalar = tree
            .add(root, Placement::Sequential, 4, NodeKind::Scalar(Width::U32))
            .unwrap();
        let opaque = tree
            .add(root, Placement::Sequential, 4, NodeKind::Generic)
            .unwrap();

        assert_eq!(tree.text(scalar), "5 (0x5)");
        assert_eq!(tree.text(opaque), "DE AD BE EF");

        tree.set_label(opaque, "Cookie");
        assert_eq!(tree.text(opaque), "Cookie");
    }

    #[test]
    fn test_display() {
        let data = b"\x01\x00\x02\x00\x00\x00";
        let mut tree = Tree::parse(ByteView::from_slice(data), 0..6, NodeKind::Generic).unwrap();
        let root = tree.root();
        tree.set_label(root, "Root");

        let mut fields = tree.fields(root);
        fields.u16("Major").unwrap();
        fields.u32("Minor").unwrap();

        insta::assert_snapshot!(tree.display(root).to_string(), @r###"
        0x0..0x6 Root
          0x0..0x2 Major: 1
          0x2..0x6 Minor: 2
        "###);
    }
}

use std::io::Read;

use binstruct_common::ByteView;
use flate2::read::DeflateDecoder;

use crate::error::{ParseError, ParseErrorKind};
use crate::kind::NodeKind;
use crate::tree::{NodeId, Tree};

use super::le_u32;

/// Signature of an embedded Portable PDB blob, `MPDB` in little-endian byte order.
pub const EMBEDDED_PDB_SIGNATURE: u32 = 0x4244_504D;

/// Size of the signature and decompressed size preceding the DEFLATE stream.
const EMBEDDED_PDB_HEADER_SIZE: usize = 8;

#[tracing::instrument(level = "trace", name = "EmbeddedPdb::parse", skip_all)]
pub(crate) fn parse_embedded_pdb(tree: &mut Tree<'_>, id: NodeId) -> Result<(), ParseError> {
    let node = tree.node(id);
    let start = node.start();
    let compressed_size = node.length().saturating_sub(EMBEDDED_PDB_HEADER_SIZE);

    let mut fields = tree.fields(id);
    let signature = fields.u32("Signature")?;
    if signature != EMBEDDED_PDB_SIGNATURE {
        return Err(ParseError::new(
            ParseErrorKind::BadMagic,
            start,
            format!("expected MPDB signature, found {signature:#010x}"),
        ));
    }
    fields.label_last("Signature: MPDB");

    let decompressed_size = fields.u32("DecompressedSize")? as usize;
    fields.node(
        NodeKind::CompressedDeflateStream { decompressed_size },
        compressed_size,
        None,
    )?;

    Ok(())
}

/// Inflates the stream into a new buffer and decodes it as a metadata root.
#[tracing::instrument(level = "trace", name = "CompressedDeflateStream::parse", skip_all)]
pub(crate) fn parse_compressed_stream(
    tree: &mut Tree<'_>,
    id: NodeId,
    decompressed_size: usize,
) -> Result<(), ParseError> {
    let start = tree.node(id).start();
    let max_size = tree.options().max_decompressed_size;
    if decompressed_size > max_size {
        return Err(ParseError::new(
            ParseErrorKind::Decompression,
            start,
            format!("declared size of {decompressed_size} bytes exceeds the limit of {max_size}"),
        ));
    }

    let compressed = tree.bytes(id);
    let mut output = Vec::with_capacity(decompressed_size);
    DeflateDecoder::new(compressed)
        .take(decompressed_size as u64 + 1)
        .read_to_end(&mut output)
        .map_err(|e| ParseError::new(ParseErrorKind::Decompression, start, e))?;

    if output.len() > decompressed_size {
        return Err(ParseError::new(
            ParseErrorKind::Decompression,
            start,
            format!("stream inflates to more than {decompressed_size} bytes"),
        ));
    }
    if output.len() < decompressed_size {
        return Err(ParseError::new(
            ParseErrorKind::Decompression,
            start,
            format!(
                "stream inflated to {} bytes, expected {decompressed_size}",
                output.len()
            ),
        ));
    }

    tracing::debug!(
        compressed = compressed.len(),
        decompressed = decompressed_size,
        "inflated embedded portable pdb"
    );

    let buffer = tree.push_buffer(ByteView::from_vec(output));
    let root = tree.new_root(buffer, 0, decompressed_size, NodeKind::Metadata, Some(id))?;
    tree.set_nested(id, root);
    tree.set_label(id, format!("Compressed metadata ({decompressed_size} bytes inflated)"));

    Ok(())
}

/// Field accessors for an [`EmbeddedPdb`](NodeKind::EmbeddedPdb) node.
///
/// Returned by [`Tree::embedded_pdb`].
#[derive(Clone, Copy, Debug)]
pub struct EmbeddedPdbView<'t, 'data> {
    tree: &'t Tree<'data>,
    id: NodeId,
}

impl<'t, 'data> EmbeddedPdbView<'t, 'data> {
    /// The size of the inflated Portable PDB.
    pub fn decompressed_size(&self) -> u32 {
        le_u32(self.tree.bytes(self.id), 4)
    }

    /// The node holding the DEFLATE stream.
    pub fn compressed_stream(&self) -> Option<NodeId> {
        self.tree.children(self.id).iter().copied().find(|child| {
            matches!(
                self.tree.node(*child).kind(),
                NodeKind::CompressedDeflateStream { .. }
            )
        })
    }

    /// The root of the metadata tree decoded from the inflated data.
    pub fn metadata(&self) -> Option<NodeId> {
        self.compressed_stream()
            .and_then(|stream| self.tree.nested(stream))
    }

    /// The inflated Portable PDB.
    pub fn decompressed(&self) -> Option<&'t [u8]> {
        self.metadata().map(|root| self.tree.bytes(root))
    }
}

impl<'data> Tree<'data> {
    /// Returns field accessors if `id` is an [`EmbeddedPdb`](NodeKind::EmbeddedPdb).
    pub fn embedded_pdb(&self, id: NodeId) -> Option<EmbeddedPdbView<'_, 'data>> {
        if self.node(id).kind() != NodeKind::EmbeddedPdb
            || self.bytes(id).len() < EMBEDDED_PDB_HEADER_SIZE
        {
            return None;
        }

        Some(EmbeddedPdbView { tree: self, id })
    }
}

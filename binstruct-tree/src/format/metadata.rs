use crate::error::{ParseError, ParseErrorKind};
use crate::kind::NodeKind;
use crate::tree::{NodeId, Placement, Tree};

use super::le_u32;

/// Signature for physical metadata as specified by ECMA-335, `BSJB` in little-endian byte order.
pub const METADATA_SIGNATURE: u32 = 0x424A_5342;

/// Stream names, including the NUL terminator, are limited to 32 bytes.
const MAX_STREAM_NAME_LENGTH: usize = 32;

/// Decodes a metadata root as specified in ECMA-335, II.24.2.1, followed by its streams.
///
/// Streams are placed at the offsets declared in their headers, relative to the start of the
/// root. The `#Pdb` stream is decoded, all other streams are opaque.
#[tracing::instrument(level = "trace", name = "Metadata::parse", skip_all)]
pub(crate) fn parse_metadata(tree: &mut Tree<'_>, id: NodeId) -> Result<(), ParseError> {
    let base = tree.node(id).start();

    let mut fields = tree.fields(id);
    let signature = fields.u32("Signature")?;
    if signature != METADATA_SIGNATURE {
        return Err(ParseError::new(
            ParseErrorKind::BadMagic,
            base,
            format!("expected BSJB signature, found {signature:#010x}"),
        ));
    }
    fields.label_last("Signature: BSJB");

    fields.u16("MajorVersion")?;
    fields.u16("MinorVersion")?;
    fields.u32("Reserved")?;
    let version_length = fields.u32("VersionLength")? as usize;
    let version_start = fields.cursor();
    let version_id = fields.bytes("Version", version_length)?;

    let version_buf = fields.tree().bytes(version_id);
    let version_buf = version_buf.split(|c| *c == 0).next().unwrap_or_default();
    let version = std::str::from_utf8(version_buf)
        .map_err(|e| ParseError::new(ParseErrorKind::InvalidString, version_start, e))?
        .to_owned();
    fields.label_last(format!("Version: {version}"));

    fields.u16("Flags")?;
    let stream_count = fields.u16("Streams")?;

    let mut headers = Vec::with_capacity(stream_count as usize);
    for _ in 0..stream_count {
        headers.push(fields.node(NodeKind::StreamHeader, 0, None)?);
    }

    for header in headers {
        let header_start = tree.node(header).start();
        let (offset, size, name) = tree
            .stream_header(header)
            .and_then(|view| Some((view.offset(), view.size(), view.name()?.to_owned())))
            .ok_or_else(|| ParseError::at(ParseErrorKind::InvalidString, header_start))?;

        let start = base
            .checked_add(offset as usize)
            .ok_or_else(|| ParseError::at(ParseErrorKind::Truncated, header_start))?;
        let kind = match name.as_str() {
            "#Pdb" => NodeKind::PdbStream,
            _ => NodeKind::Generic,
        };

        tree.add_labeled(id, Placement::At(start), size as usize, kind, name)?;
    }

    Ok(())
}

/// Decodes a stream header as specified in ECMA-335, II.24.2.2.
///
/// The header covers its name up to the next multiple of four bytes.
pub(crate) fn parse_stream_header(tree: &mut Tree<'_>, id: NodeId) -> Result<(), ParseError> {
    let start = tree.node(id).start();

    let mut fields = tree.fields(id);
    fields.u32("Offset")?;
    fields.u32("Size")?;
    let name = fields.c_string("Name", MAX_STREAM_NAME_LENGTH)?;

    let end = fields.cursor();
    let padded_end = start + (end - start).next_multiple_of(4);
    tree.extend_to(id, padded_end)?;
    tree.set_label(id, format!("StreamHeader: {name}"));

    Ok(())
}

/// Field accessors for a [`StreamHeader`](NodeKind::StreamHeader) node.
///
/// Returned by [`Tree::stream_header`].
#[derive(Clone, Copy, Debug)]
pub struct StreamHeaderView<'t> {
    bytes: &'t [u8],
}

impl<'t> StreamHeaderView<'t> {
    /// The offset of the stream, relative to the start of the metadata root.
    pub fn offset(&self) -> u32 {
        le_u32(self.bytes, 0)
    }

    /// The size of the stream in bytes.
    pub fn size(&self) -> u32 {
        le_u32(self.bytes, 4)
    }

    /// The name of the stream, such as `#Pdb` or `#Strings`.
    pub fn name(&self) -> Option<&'t str> {
        let name = self.bytes[8..].split(|c| *c == 0).next()?;
        std::str::from_utf8(name).ok()
    }
}

impl<'data> Tree<'data> {
    /// Returns field accessors if `id` is a [`StreamHeader`](NodeKind::StreamHeader).
    pub fn stream_header(&self, id: NodeId) -> Option<StreamHeaderView<'_>> {
        if self.node(id).kind() != NodeKind::StreamHeader {
            return None;
        }

        let bytes = self.bytes(id);
        (bytes.len() > 8).then_some(StreamHeaderView { bytes })
    }

    /// Returns the stream with the given name of a [`Metadata`](NodeKind::Metadata) node.
    pub fn metadata_stream(&self, metadata: NodeId, name: &str) -> Option<NodeId> {
        if self.node(metadata).kind() != NodeKind::Metadata {
            return None;
        }

        self.children(metadata).iter().copied().find(|child| {
            let node = self.node(*child);
            node.kind() != NodeKind::StreamHeader && node.label() == Some(name)
        })
    }
}

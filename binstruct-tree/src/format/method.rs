//! IL method bodies as specified in ECMA-335, II.25.4.

use bitflags::bitflags;

use crate::error::{ParseError, ParseErrorKind};
use crate::kind::NodeKind;
use crate::tree::{NodeId, Placement, Tree};

use super::{le_u16, le_u32};

/// Size of a fat method header.
const FAT_HEADER_SIZE: usize = 12;

/// The low two bits of the first header byte select the method body format.
const FORMAT_MASK: u8 = 0x3;
const TINY_FORMAT: u8 = 0x2;
const FAT_FORMAT: u8 = 0x3;

/// Bits of the first fat header word that hold flags, excluding the format and header size.
const FLAGS_MASK: u16 = 0x0ffc;

/// Size of the header of every extra section, small or fat.
const SECTION_HEADER_SIZE: usize = 4;

bitflags! {
    /// Flags in the first two bytes of a fat method header.
    ///
    /// The format bits and the header size share the same word but are not flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MethodFlags: u16 {
        /// Extra sections follow the IL code.
        const MORE_SECTS = 0x8;
        /// Local variables are zero-initialized.
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    /// Flags in the first byte of an extra section header.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u8 {
        /// The section contains exception handling clauses.
        const EH_TABLE = 0x01;
        /// Reserved, must be zero.
        const OPT_IL_TABLE = 0x02;
        /// The section header stores a 24-bit data size.
        const FAT_FORMAT = 0x40;
        /// Another section follows this one.
        const MORE_SECTS = 0x80;
    }
}

/// Decodes the header byte and IL code of a tiny method body.
pub(crate) fn parse_tiny_method(
    tree: &mut Tree<'_>,
    id: NodeId,
    code_size: usize,
) -> Result<(), ParseError> {
    let mut fields = tree.fields(id);
    fields.u8("Header")?;
    fields.label_last(format!("Header: tiny, {code_size} bytes of code"));
    fields.bytes("Code", code_size)?;
    Ok(())
}

/// Decodes a fat method header, its IL code and the chain of extra sections following it.
#[tracing::instrument(level = "trace", name = "FatMethod::parse", skip_all)]
pub(crate) fn parse_fat_method(tree: &mut Tree<'_>, id: NodeId) -> Result<(), ParseError> {
    let max_sections = tree.options().max_extra_sections;

    let mut fields = tree.fields(id);
    let flags = MethodFlags::from_bits_retain(fields.u16("Flags")?);
    fields.label_last(format!("Flags: {:#06x}", flags.bits()));
    fields.u16("MaxStack")?;
    let code_size = fields.u32("CodeSize")? as usize;
    fields.u32("LocalVarSigTok")?;
    fields.bytes("Code", code_size)?;

    let mut more_sections = flags.contains(MethodFlags::MORE_SECTS);
    let mut count = 0;
    while more_sections {
        if count == max_sections {
            let offset = fields.cursor();
            return Err(ParseError::new(
                ParseErrorKind::TooManySections,
                offset,
                format!("more than {max_sections} extra sections"),
            ));
        }

        fields.align(4);
        let section = fields.node(NodeKind::ExtraSection, 0, None)?;
        more_sections = fields
            .tree()
            .extra_section(section)
            .is_some_and(|view| view.flags().contains(SectionFlags::MORE_SECTS));
        count += 1;
    }

    Ok(())
}

/// Decodes a small or fat extra section header and its data.
pub(crate) fn parse_extra_section(tree: &mut Tree<'_>, id: NodeId) -> Result<(), ParseError> {
    let start = tree.node(id).start();

    let mut fields = tree.fields(id);
    let flags = SectionFlags::from_bits_retain(fields.u8("Flags")?);
    fields.label_last(format!("Flags: {:#04x}", flags.bits()));

    let (format, data_length) = if flags.contains(SectionFlags::FAT_FORMAT) {
        let size = fields.u24("DataSize")?;
        ("fat", i64::from(size) - SECTION_HEADER_SIZE as i64)
    } else {
        let count = fields.u8("Count")?;
        fields.u16("Reserved")?;
        ("small", i64::from(count) * 4 - SECTION_HEADER_SIZE as i64)
    };

    if data_length <= 0 {
        return Err(ParseError::new(
            ParseErrorKind::InvalidSectionLength,
            start,
            format!("{format} section has {data_length} bytes of data"),
        ));
    }
    fields.bytes("Data", data_length as usize)?;

    let label = match flags.contains(SectionFlags::EH_TABLE) {
        true => format!("ExtraSection: {format} exception handling table"),
        false => format!("ExtraSection: {format}"),
    };
    tree.set_label(id, label);

    Ok(())
}

/// Field accessors for a [`FatMethod`](NodeKind::FatMethod) node.
///
/// Returned by [`Tree::fat_method`].
#[derive(Clone, Copy, Debug)]
pub struct FatMethodView<'t, 'data> {
    tree: &'t Tree<'data>,
    id: NodeId,
}

impl<'t, 'data> FatMethodView<'t, 'data> {
    fn header(&self) -> &'t [u8] {
        self.tree.bytes(self.id)
    }

    /// The flags of the method header, without the format bits and the header size.
    pub fn flags(&self) -> MethodFlags {
        MethodFlags::from_bits_retain(le_u16(self.header(), 0) & FLAGS_MASK)
    }

    /// The size of the method header in 4-byte units.
    pub fn header_size(&self) -> u16 {
        le_u16(self.header(), 0) >> 12
    }

    /// The maximum number of items on the operand stack.
    pub fn max_stack(&self) -> u16 {
        le_u16(self.header(), 2)
    }

    /// The size of the IL code in bytes.
    pub fn code_size(&self) -> u32 {
        le_u32(self.header(), 4)
    }

    /// The metadata token of the local variable signature, or `0`.
    pub fn local_var_sig_tok(&self) -> u32 {
        le_u32(self.header(), 8)
    }

    /// The IL code of the method.
    pub fn code(&self) -> &'t [u8] {
        let start = FAT_HEADER_SIZE;
        let end = start + self.code_size() as usize;
        self.header().get(start..end).unwrap_or_default()
    }

    /// Iterates the extra sections following the IL code, in order.
    pub fn extra_sections(&self) -> impl Iterator<Item = ExtraSectionView<'t>> + 't {
        let tree = self.tree;
        tree.children(self.id)
            .iter()
            .filter_map(move |child| tree.extra_section(*child))
    }
}

/// Field accessors for an [`ExtraSection`](NodeKind::ExtraSection) node.
///
/// Returned by [`Tree::extra_section`].
#[derive(Clone, Copy, Debug)]
pub struct ExtraSectionView<'t> {
    bytes: &'t [u8],
}

impl<'t> ExtraSectionView<'t> {
    /// The flags of the section header.
    pub fn flags(&self) -> SectionFlags {
        SectionFlags::from_bits_retain(self.bytes[0])
    }

    /// Returns `true` if the section header uses the fat format.
    pub fn is_fat(&self) -> bool {
        self.flags().contains(SectionFlags::FAT_FORMAT)
    }

    /// The section data following the 4-byte header.
    pub fn data(&self) -> &'t [u8] {
        &self.bytes[SECTION_HEADER_SIZE..]
    }
}

impl<'data> Tree<'data> {
    /// Returns field accessors if `id` is a [`FatMethod`](NodeKind::FatMethod).
    pub fn fat_method(&self, id: NodeId) -> Option<FatMethodView<'_, 'data>> {
        if self.node(id).kind() != NodeKind::FatMethod || self.bytes(id).len() < FAT_HEADER_SIZE {
            return None;
        }

        Some(FatMethodView { tree: self, id })
    }

    /// Returns field accessors if `id` is an [`ExtraSection`](NodeKind::ExtraSection).
    pub fn extra_section(&self, id: NodeId) -> Option<ExtraSectionView<'_>> {
        if self.node(id).kind() != NodeKind::ExtraSection {
            return None;
        }

        let bytes = self.bytes(id);
        (bytes.len() >= SECTION_HEADER_SIZE).then_some(ExtraSectionView { bytes })
    }

    /// Adds the method body starting at `placement` below `parent`.
    ///
    /// The low two bits of the first byte select the format: `0b10` is a tiny header whose
    /// upper six bits hold the code size, `0b11` is a fat header. Any other value is rejected.
    pub fn add_method_body(
        &mut self,
        parent: NodeId,
        placement: Placement,
    ) -> Result<NodeId, ParseError> {
        let offset = match placement {
            Placement::At(offset) => offset,
            Placement::Sequential => self.cursor(parent),
        };
        let buffer = self.node(parent).buffer();
        let header = self
            .buffer(buffer)
            .read_u8(offset)
            .map_err(|err| ParseError::new(ParseErrorKind::Truncated, err.offset, err))?;

        let kind = match header & FORMAT_MASK {
            TINY_FORMAT => NodeKind::TinyMethod {
                code_size: usize::from(header >> 2),
            },
            FAT_FORMAT => NodeKind::FatMethod,
            _ => {
                return Err(ParseError::new(
                    ParseErrorKind::BadMagic,
                    offset,
                    format!("method header {header:#04x} is neither tiny nor fat"),
                ))
            }
        };

        self.add(parent, placement, 0, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use binstruct_common::ByteView;

    fn method_tree(data: &[u8]) -> Result<(Tree<'_>, NodeId), ParseError> {
        let mut tree = Tree::parse(ByteView::from_slice(data), 0..data.len(), NodeKind::Generic)?;
        let root = tree.root();
        let method = tree.add_method_body(root, Placement::At(0))?;
        Ok((tree, method))
    }

    #[test]
    fn test_tiny_method() {
        let data = [0x0e, 0x00, 0x2a, 0xff];
        let (tree, method) = method_tree(&data).unwrap();

        assert_eq!(
            tree.node(method).kind(),
            NodeKind::TinyMethod { code_size: 3 }
        );
        assert_eq!(tree.node(method).span(), 0..4);
        assert_eq!(tree.bytes(tree.children(method)[1]), &[0x00, 0x2a, 0xff]);
    }

    #[test]
    fn test_invalid_method_header() {
        let err = method_tree(&[0x01, 0x00]).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::BadMagic);
        assert_eq!(err.offset(), 0);
    }

    #[test]
    fn test_fat_flags_exclude_format_bits() {
        #[rustfmt::skip]
        let data = [
            0x13, 0x30, 0x01, 0x00, // fat format, init locals, max stack
            0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x2a,
        ];
        let (tree, method) = method_tree(&data).unwrap();

        let view = tree.fat_method(method).unwrap();
        assert_eq!(view.flags(), MethodFlags::INIT_LOCALS);
        assert!(!view.flags().contains(MethodFlags::MORE_SECTS));
        assert_eq!(view.header_size(), 3);
    }

    #[test]
    fn test_empty_small_section() {
        #[rustfmt::skip]
        let data = [
            0x0b, 0x30, 0x08, 0x00, // flags, max stack
            0x01, 0x00, 0x00, 0x00, // code size
            0x00, 0x00, 0x00, 0x00, // local var sig
            0x2a, 0x00, 0x00, 0x00, // code, alignment
            0x01, 0x01, 0x00, 0x00, // small section with count 1
        ];

        let err = method_tree(&data).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::InvalidSectionLength);
        assert_eq!(err.offset(), 16);
    }

    #[test]
    fn test_section_limit() {
        #[rustfmt::skip]
        let mut data = vec![
            0x0b, 0x30, 0x08, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ];
        for _ in 0..3 {
            data.extend_from_slice(&[0x81, 0x02, 0x00, 0x00, 0xaa, 0xbb, 0xcc, 0xdd]);
        }

        let options = crate::ParseOptions::default().max_extra_sections(2);
        let mut tree = Tree::parse_with_options(
            ByteView::from_slice(&data),
            0..data.len(),
            NodeKind::Generic,
            options,
        )
        .unwrap();
        let root = tree.root();

        let err = tree.add_method_body(root, Placement::At(0)).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::TooManySections);
        assert_eq!(err.offset(), 28);
        assert!(tree.children(root).is_empty());
    }
}

use uuid::Uuid;

use crate::error::ParseError;
use crate::fields::read_guid;
use crate::kind::NodeKind;
use crate::tree::{NodeId, Tree};

use super::{le_u32, le_u64};

/// Size of the fixed part of the `#Pdb` stream: id, age, entry point and table mask.
pub const PDB_STREAM_HEADER_SIZE: usize = 32;

/// Returns the name of the metadata table with the given index.
///
/// Covers the ECMA-335 tables and the Portable PDB extension tables starting at `0x30`.
pub fn table_name(index: usize) -> Option<&'static str> {
    let name = match index {
        0x00 => "Module",
        0x01 => "TypeRef",
        0x02 => "TypeDef",
        0x04 => "Field",
        0x06 => "MethodDef",
        0x08 => "Param",
        0x09 => "InterfaceImpl",
        0x0A => "MemberRef",
        0x0B => "Constant",
        0x0C => "CustomAttribute",
        0x0D => "FieldMarshal",
        0x0E => "DeclSecurity",
        0x0F => "ClassLayout",
        0x10 => "FieldLayout",
        0x11 => "StandAloneSig",
        0x12 => "EventMap",
        0x14 => "Event",
        0x15 => "PropertyMap",
        0x17 => "Property",
        0x18 => "MethodSemantics",
        0x19 => "MethodImpl",
        0x1A => "ModuleRef",
        0x1B => "TypeSpec",
        0x1C => "ImplMap",
        0x1D => "FieldRVA",
        0x20 => "Assembly",
        0x21 => "AssemblyProcessor",
        0x22 => "AssemblyOs",
        0x23 => "AssemblyRef",
        0x24 => "AssemblyRefProcessor",
        0x25 => "AssemblyRefOs",
        0x26 => "File",
        0x27 => "ExportedType",
        0x28 => "ManifestResource",
        0x29 => "NestedClass",
        0x2A => "GenericParam",
        0x2B => "MethodSpec",
        0x2C => "GenericParamConstraint",
        // portable pdb extension starts here
        0x30 => "Document",
        0x31 => "MethodDebugInformation",
        0x32 => "LocalScope",
        0x33 => "LocalVariable",
        0x34 => "LocalConstant",
        0x35 => "ImportScope",
        0x36 => "StateMachineMethod",
        0x37 => "CustomDebugInformation",
        _ => return None,
    };
    Some(name)
}

/// Decodes the `#Pdb` stream.
///
/// After the fixed header follows one `u32` row count for every bit set in
/// `ReferencedTypeSystemTables`, in ascending bit order.
#[tracing::instrument(level = "trace", name = "PdbStream::parse", skip_all)]
pub(crate) fn parse_pdb_stream(tree: &mut Tree<'_>, id: NodeId) -> Result<(), ParseError> {
    let mut fields = tree.fields(id);
    fields.guid("Id")?;
    fields.u32("Age")?;
    fields.u32("EntryPoint")?;
    let mask = fields.u64("ReferencedTypeSystemTables")?;
    fields.label_last(format!("ReferencedTypeSystemTables: {mask:#018x}"));

    for index in (0..64).filter(|i| mask & (1u64 << i) != 0) {
        let rows = fields.u32("Rows")?;
        let name = table_name(index).unwrap_or("Unknown");
        fields.label_last(format!("{name} (0x{index:02x}) rows: {rows}"));
    }

    Ok(())
}

/// Field accessors for a [`PdbStream`](NodeKind::PdbStream) node.
///
/// Returned by [`Tree::pdb_stream`].
#[derive(Clone, Copy, Debug)]
pub struct PdbStreamView<'t> {
    bytes: &'t [u8],
}

impl PdbStreamView<'_> {
    /// The GUID part of the PDB id.
    pub fn id(&self) -> Uuid {
        read_guid(self.bytes).unwrap_or_default()
    }

    /// The age part of the PDB id.
    pub fn age(&self) -> u32 {
        le_u32(self.bytes, 16)
    }

    /// The metadata token of the entry point method, or `0`.
    pub fn entry_point(&self) -> u32 {
        le_u32(self.bytes, 20)
    }

    /// Bit mask of the type system tables whose row counts follow the header.
    pub fn referenced_type_system_tables(&self) -> u64 {
        le_u64(self.bytes, 24)
    }

    /// Returns the row counts of the referenced type system tables, indexed by table.
    ///
    /// Tables that are not referenced have zero rows.
    pub fn referenced_table_rows(&self) -> [u32; 64] {
        let mask = self.referenced_type_system_tables();
        let mut rows = [0; 64];
        let mut offset = PDB_STREAM_HEADER_SIZE;

        for (index, slot) in rows.iter_mut().enumerate() {
            if mask & (1u64 << index) == 0 {
                continue;
            }
            if offset + 4 > self.bytes.len() {
                break;
            }
            *slot = le_u32(self.bytes, offset);
            offset += 4;
        }

        rows
    }
}

impl<'data> Tree<'data> {
    /// Returns field accessors if `id` is a [`PdbStream`](NodeKind::PdbStream).
    pub fn pdb_stream(&self, id: NodeId) -> Option<PdbStreamView<'_>> {
        if self.node(id).kind() != NodeKind::PdbStream {
            return None;
        }

        let bytes = self.bytes(id);
        (bytes.len() >= PDB_STREAM_HEADER_SIZE).then_some(PdbStreamView { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        assert_eq!(table_name(0x00), Some("Module"));
        assert_eq!(table_name(0x2C), Some("GenericParamConstraint"));
        assert_eq!(table_name(0x37), Some("CustomDebugInformation"));
        assert_eq!(table_name(0x03), None);
        assert_eq!(table_name(0x3F), None);
    }
}

use std::fmt;

use crate::error::{ParseError, ParseErrorKind};
use crate::kind::NodeKind;
use crate::tree::{NodeId, Placement, Tree};

use super::{le_u16, le_u32};

/// The size of an `IMAGE_DEBUG_DIRECTORY` entry.
pub const DEBUG_DIRECTORY_SIZE: usize = 28;

/// The type of data a debug directory entry points to (`IMAGE_DEBUG_TYPE_*`).
///
/// Values without a dedicated variant are preserved in [`Other`](Self::Other).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DebugDirectoryType {
    /// `IMAGE_DEBUG_TYPE_UNKNOWN`.
    Unknown,
    /// COFF debug information.
    Coff,
    /// CodeView debug information, usually an `RSDS` record naming the PDB.
    CodeView,
    /// Frame pointer omission information.
    Fpo,
    /// The location of a `.dbg` file.
    Misc,
    /// A copy of the `.pdata` section.
    Exception,
    /// Reserved.
    Fixup,
    /// Reserved for Borland.
    Borland,
    /// Marks a deterministic build; the timestamp is a hash of the content.
    Reproducible,
    /// A DEFLATE-compressed Portable PDB.
    EmbeddedPortablePdb,
    /// A checksum of the associated PDB.
    PdbChecksum,
    /// Any other value.
    Other(u32),
}

impl DebugDirectoryType {
    /// Classifies a raw `Type` field.
    pub fn from_raw(value: u32) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::Coff,
            2 => Self::CodeView,
            3 => Self::Fpo,
            4 => Self::Misc,
            5 => Self::Exception,
            6 => Self::Fixup,
            9 => Self::Borland,
            16 => Self::Reproducible,
            17 => Self::EmbeddedPortablePdb,
            19 => Self::PdbChecksum,
            other => Self::Other(other),
        }
    }

    /// Returns the raw `Type` field.
    pub fn raw(self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::Coff => 1,
            Self::CodeView => 2,
            Self::Fpo => 3,
            Self::Misc => 4,
            Self::Exception => 5,
            Self::Fixup => 6,
            Self::Borland => 9,
            Self::Reproducible => 16,
            Self::EmbeddedPortablePdb => 17,
            Self::PdbChecksum => 19,
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for DebugDirectoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Coff => "Coff",
            Self::CodeView => "CodeView",
            Self::Fpo => "Fpo",
            Self::Misc => "Misc",
            Self::Exception => "Exception",
            Self::Fixup => "Fixup",
            Self::Borland => "Borland",
            Self::Reproducible => "Reproducible",
            Self::EmbeddedPortablePdb => "EmbeddedPortablePdb",
            Self::PdbChecksum => "PdbChecksum",
            Self::Other(_) => "Other",
        };
        write!(f, "{name} ({})", self.raw())
    }
}

#[tracing::instrument(level = "trace", name = "DebugDirectories::parse", skip_all)]
pub(crate) fn parse_directories(tree: &mut Tree<'_>, id: NodeId) -> Result<(), ParseError> {
    let node = tree.node(id);
    let length = node.length();
    if length % DEBUG_DIRECTORY_SIZE != 0 {
        return Err(ParseError::new(
            ParseErrorKind::InvalidLength,
            node.start(),
            format!("{length} bytes are not a multiple of {DEBUG_DIRECTORY_SIZE}"),
        ));
    }

    let mut fields = tree.fields(id);
    for _ in 0..length / DEBUG_DIRECTORY_SIZE {
        fields.node(NodeKind::DebugDirectory, DEBUG_DIRECTORY_SIZE, None)?;
    }

    Ok(())
}

pub(crate) fn parse_directory(tree: &mut Tree<'_>, id: NodeId) -> Result<(), ParseError> {
    let mut fields = tree.fields(id);
    fields.u32("Characteristics")?;
    fields.u32("TimeDateStamp")?;
    fields.u16("MajorVersion")?;
    fields.u16("MinorVersion")?;
    let ty = DebugDirectoryType::from_raw(fields.u32("Type")?);
    fields.label_last(format!("Type: {ty}"));
    fields.u32("SizeOfData")?;
    fields.u32("AddressOfRawData")?;
    fields.u32("PointerToRawData")?;

    tree.set_label(id, format!("DebugDirectory: {ty}"));
    Ok(())
}

/// Field accessors for a [`DebugDirectory`](NodeKind::DebugDirectory) node.
///
/// Returned by [`Tree::debug_directory`].
#[derive(Clone, Copy, Debug)]
pub struct DebugDirectoryView<'t> {
    bytes: &'t [u8],
}

impl DebugDirectoryView<'_> {
    /// Reserved, should be zero.
    pub fn characteristics(&self) -> u32 {
        le_u32(self.bytes, 0)
    }

    /// The time and date the debug data was created.
    pub fn time_date_stamp(&self) -> u32 {
        le_u32(self.bytes, 4)
    }

    /// The major version of the debug data format.
    pub fn major_version(&self) -> u16 {
        le_u16(self.bytes, 8)
    }

    /// The minor version of the debug data format.
    pub fn minor_version(&self) -> u16 {
        le_u16(self.bytes, 10)
    }

    /// The format of the debug data.
    pub fn debug_type(&self) -> DebugDirectoryType {
        DebugDirectoryType::from_raw(le_u32(self.bytes, 12))
    }

    /// The size of the debug data, excluding this entry.
    pub fn size_of_data(&self) -> u32 {
        le_u32(self.bytes, 16)
    }

    /// The address of the debug data when the image is loaded.
    pub fn address_of_raw_data(&self) -> u32 {
        le_u32(self.bytes, 20)
    }

    /// The file offset of the debug data.
    pub fn pointer_to_raw_data(&self) -> u32 {
        le_u32(self.bytes, 24)
    }
}

impl<'data> Tree<'data> {
    /// Returns field accessors if `id` is a [`DebugDirectory`](NodeKind::DebugDirectory).
    pub fn debug_directory(&self, id: NodeId) -> Option<DebugDirectoryView<'_>> {
        if self.node(id).kind() != NodeKind::DebugDirectory {
            return None;
        }

        let bytes = self.bytes(id);
        (bytes.len() >= DEBUG_DIRECTORY_SIZE).then_some(DebugDirectoryView { bytes })
    }

    /// Decodes the data a debug directory entry points to and adds it below `parent`.
    ///
    /// The data is placed at the entry's `PointerToRawData` and spans `SizeOfData` bytes, so
    /// `parent` should cover the whole file. Embedded Portable PDBs, CodeView records and PDB
    /// checksums are decoded; other data is added as an opaque span.
    ///
    /// Returns `None` if `entry` is not a debug directory or does not point to any data.
    pub fn add_debug_data(
        &mut self,
        parent: NodeId,
        entry: NodeId,
    ) -> Result<Option<NodeId>, ParseError> {
        let Some(directory) = self.debug_directory(entry) else {
            return Ok(None);
        };

        let pointer = directory.pointer_to_raw_data() as usize;
        let size = directory.size_of_data() as usize;
        let ty = directory.debug_type();
        if pointer == 0 || size == 0 {
            return Ok(None);
        }

        let placement = Placement::At(pointer);
        let id = match ty {
            DebugDirectoryType::EmbeddedPortablePdb => {
                self.add(parent, placement, size, NodeKind::EmbeddedPdb)?
            }
            DebugDirectoryType::CodeView => self.add(parent, placement, size, NodeKind::CodeView)?,
            DebugDirectoryType::PdbChecksum => {
                self.add(parent, placement, size, NodeKind::PdbChecksum)?
            }
            _ => self.add_labeled(parent, placement, size, NodeKind::Generic, format!("{ty} data"))?,
        };

        Ok(Some(id))
    }
}

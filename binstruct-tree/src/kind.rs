use std::fmt;

/// The width of a [`Scalar`](NodeKind::Scalar) node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    /// A single byte.
    U8,
    /// A little-endian 16-bit integer.
    U16,
    /// A little-endian 24-bit integer.
    U24,
    /// A little-endian 32-bit integer.
    U32,
    /// A little-endian 64-bit integer.
    U64,
}

impl Width {
    /// The number of bytes covered by a scalar of this width.
    pub fn size(self) -> usize {
        match self {
            Width::U8 => 1,
            Width::U16 => 2,
            Width::U24 => 3,
            Width::U32 => 4,
            Width::U64 => 8,
        }
    }
}

/// The closed set of node variants.
///
/// The variant decides how a node populates its children once it is added to a
/// [`Tree`](crate::Tree). Leaf variants (`Generic`, `Scalar`, `Guid`, `Padding`, `Unknown`) have
/// no decoder; all other variants decode the structure named after them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum NodeKind {
    /// An opaque span, or a container whose children are added by the caller.
    Generic,
    /// A little-endian unsigned integer.
    Scalar(Width),
    /// A 16-byte GUID in the mixed-endian Microsoft layout.
    Guid,
    /// A gap whose bytes are all zero.
    Padding,
    /// A gap containing undecoded, non-zero bytes.
    Unknown,
    /// A table of PE debug directory entries.
    DebugDirectories,
    /// A single 28-byte PE debug directory entry.
    DebugDirectory,
    /// A CodeView `RSDS` record pointed to by a debug directory entry.
    CodeView,
    /// A PDB checksum record pointed to by a debug directory entry.
    PdbChecksum,
    /// An `MPDB` blob holding a DEFLATE-compressed Portable PDB.
    EmbeddedPdb,
    /// The DEFLATE stream inside an [`EmbeddedPdb`](NodeKind::EmbeddedPdb).
    CompressedDeflateStream {
        /// The size the stream must inflate to.
        decompressed_size: usize,
    },
    /// An ECMA-335 metadata root (`BSJB`) including its streams.
    Metadata,
    /// A stream header within a metadata root.
    StreamHeader,
    /// The Portable PDB `#Pdb` stream.
    PdbStream,
    /// A tiny IL method body.
    TinyMethod {
        /// The number of IL bytes following the one-byte header.
        code_size: usize,
    },
    /// A fat IL method body, including its extra sections.
    FatMethod,
    /// An extra data section following a fat method body.
    ExtraSection,
}

impl NodeKind {
    /// Returns a short, human readable name of this variant.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Generic => "Generic",
            NodeKind::Scalar(Width::U8) => "U8",
            NodeKind::Scalar(Width::U16) => "U16",
            NodeKind::Scalar(Width::U24) => "U24",
            NodeKind::Scalar(Width::U32) => "U32",
            NodeKind::Scalar(Width::U64) => "U64",
            NodeKind::Guid => "Guid",
            NodeKind::Padding => "Padding",
            NodeKind::Unknown => "Unknown",
            NodeKind::DebugDirectories => "DebugDirectories",
            NodeKind::DebugDirectory => "DebugDirectory",
            NodeKind::CodeView => "CodeView",
            NodeKind::PdbChecksum => "PdbChecksum",
            NodeKind::EmbeddedPdb => "EmbeddedPdb",
            NodeKind::CompressedDeflateStream { .. } => "CompressedDeflateStream",
            NodeKind::Metadata => "Metadata",
            NodeKind::StreamHeader => "StreamHeader",
            NodeKind::PdbStream => "PdbStream",
            NodeKind::TinyMethod { .. } => "TinyMethod",
            NodeKind::FatMethod => "FatMethod",
            NodeKind::ExtraSection => "ExtraSection",
        }
    }

    /// Returns `true` for variants that do not decode any children themselves.
    pub fn is_opaque(&self) -> bool {
        matches!(
            self,
            NodeKind::Generic
                | NodeKind::Scalar(_)
                | NodeKind::Guid
                | NodeKind::Padding
                | NodeKind::Unknown
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

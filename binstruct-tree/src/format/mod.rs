//! Decoders for the structures a [`Tree`](crate::Tree) knows about.
//!
//! Each decoder appends the fields of its structure to the node being added, strictly in the
//! order they appear in the file. Typed views re-read field values from the buffer.

pub(crate) mod codeview;
pub(crate) mod debug_directory;
pub(crate) mod embedded_pdb;
pub(crate) mod metadata;
pub(crate) mod method;
pub(crate) mod pdb_stream;

pub use codeview::CODEVIEW_SIGNATURE;
pub use debug_directory::{DebugDirectoryType, DebugDirectoryView, DEBUG_DIRECTORY_SIZE};
pub use embedded_pdb::{EmbeddedPdbView, EMBEDDED_PDB_SIGNATURE};
pub use metadata::{StreamHeaderView, METADATA_SIGNATURE};
pub use method::{ExtraSectionView, FatMethodView, MethodFlags, SectionFlags};
pub use pdb_stream::{table_name, PdbStreamView, PDB_STREAM_HEADER_SIZE};

/// Reads a little-endian `u16` from a slice whose length has already been checked.
fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Reads a little-endian `u32` from a slice whose length has already been checked.
fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Reads a little-endian `u64` from a slice whose length has already been checked.
fn le_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from(le_u32(bytes, offset)) | u64::from(le_u32(bytes, offset + 4)) << 32
}

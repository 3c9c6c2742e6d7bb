//! Test helpers for `binstruct`.
//!
//! Instead of checked-in binaries, fixtures are assembled from their parts so that tests can
//! state the exact values they expect to see decoded.
#![warn(missing_docs)]

use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::Compression;

/// The `IMAGE_DEBUG_TYPE_CODEVIEW` debug directory type.
pub const DEBUG_TYPE_CODEVIEW: u32 = 2;
/// The `IMAGE_DEBUG_TYPE_REPRODUCIBLE` debug directory type.
pub const DEBUG_TYPE_REPRODUCIBLE: u32 = 16;
/// The `IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB` debug directory type.
pub const DEBUG_TYPE_EMBEDDED_PORTABLE_PDB: u32 = 17;
/// The `IMAGE_DEBUG_TYPE_PDBCHECKSUM` debug directory type.
pub const DEBUG_TYPE_PDB_CHECKSUM: u32 = 19;

/// A PE debug directory entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct DebugDirectoryEntry {
    /// Reserved.
    pub characteristics: u32,
    /// Creation time of the debug data.
    pub time_date_stamp: u32,
    /// Major version of the debug data.
    pub major_version: u16,
    /// Minor version of the debug data.
    pub minor_version: u16,
    /// One of the `DEBUG_TYPE_*` values.
    pub ty: u32,
    /// Size of the debug data.
    pub size_of_data: u32,
    /// Address of the debug data when loaded.
    pub address_of_raw_data: u32,
    /// File offset of the debug data.
    pub pointer_to_raw_data: u32,
}

impl DebugDirectoryEntry {
    /// Serializes the entry into its 28-byte file representation.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(28);
        bytes.extend_from_slice(&self.characteristics.to_le_bytes());
        bytes.extend_from_slice(&self.time_date_stamp.to_le_bytes());
        bytes.extend_from_slice(&self.major_version.to_le_bytes());
        bytes.extend_from_slice(&self.minor_version.to_le_bytes());
        bytes.extend_from_slice(&self.ty.to_le_bytes());
        bytes.extend_from_slice(&self.size_of_data.to_le_bytes());
        bytes.extend_from_slice(&self.address_of_raw_data.to_le_bytes());
        bytes.extend_from_slice(&self.pointer_to_raw_data.to_le_bytes());
        bytes
    }
}

/// Builds a CodeView `RSDS` record.
pub fn codeview(guid: [u8; 16], age: u32, path: &str) -> Vec<u8> {
    let mut bytes = b"RSDS".to_vec();
    bytes.extend_from_slice(&guid);
    bytes.extend_from_slice(&age.to_le_bytes());
    bytes.extend_from_slice(path.as_bytes());
    bytes.push(0);
    bytes
}

/// Builds a `#Pdb` stream.
///
/// `rows` lists `(table index, row count)` pairs in any order; the referenced tables mask is
/// derived from the indices.
pub fn pdb_stream(id: [u8; 16], age: u32, entry_point: u32, rows: &[(usize, u32)]) -> Vec<u8> {
    let mut rows = rows.to_vec();
    rows.sort_by_key(|(index, _)| *index);
    let mask = rows
        .iter()
        .fold(0u64, |mask, (index, _)| mask | (1u64 << index));

    let mut bytes = id.to_vec();
    bytes.extend_from_slice(&age.to_le_bytes());
    bytes.extend_from_slice(&entry_point.to_le_bytes());
    bytes.extend_from_slice(&mask.to_le_bytes());
    for (_, count) in rows {
        bytes.extend_from_slice(&count.to_le_bytes());
    }
    bytes
}

/// Builds an ECMA-335 metadata root containing the given streams.
///
/// Streams are stored in order after the headers, each aligned to four bytes.
pub fn metadata_root(version: &str, streams: &[(&str, &[u8])]) -> Vec<u8> {
    let mut version = version.as_bytes().to_vec();
    version.push(0);
    pad_to_4(&mut version);

    let mut bytes = b"BSJB".to_vec();
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&(version.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&version);
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&(streams.len() as u16).to_le_bytes());

    let headers_size: usize = streams
        .iter()
        .map(|(name, _)| 8 + (name.len() + 1).next_multiple_of(4))
        .sum();
    let data_start = bytes.len() + headers_size;

    let mut data = Vec::new();
    for (name, stream) in streams {
        let offset = data_start + data.len();
        bytes.extend_from_slice(&(offset as u32).to_le_bytes());
        bytes.extend_from_slice(&(stream.len() as u32).to_le_bytes());
        let mut name = name.as_bytes().to_vec();
        name.push(0);
        pad_to_4(&mut name);
        bytes.extend_from_slice(&name);

        data.extend_from_slice(stream);
        pad_to_4(&mut data);
    }

    bytes.extend_from_slice(&data);
    bytes
}

/// Compresses `data` with raw DEFLATE.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Wraps a Portable PDB into an `MPDB` blob as stored in a PE debug directory.
pub fn embedded_pdb(portable_pdb: &[u8]) -> Vec<u8> {
    let mut bytes = b"MPDB".to_vec();
    bytes.extend_from_slice(&(portable_pdb.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&deflate(portable_pdb));
    bytes
}

/// Builds a tiny method body. The code must be shorter than 64 bytes.
pub fn tiny_method(code: &[u8]) -> Vec<u8> {
    assert!(code.len() < 64, "tiny methods hold at most 63 bytes of code");
    let mut bytes = vec![((code.len() as u8) << 2) | 0b10];
    bytes.extend_from_slice(code);
    bytes
}

/// An extra section following a fat method body.
#[derive(Clone, Debug)]
pub enum Section {
    /// A section with a one-byte item count. The data length must be a multiple of four.
    Small {
        /// Section flags without the format and continuation bits.
        flags: u8,
        /// Section data.
        data: Vec<u8>,
    },
    /// A section with a 24-bit data size.
    Fat {
        /// Section flags without the format and continuation bits.
        flags: u8,
        /// Section data.
        data: Vec<u8>,
    },
}

/// Builds a fat method body followed by the given extra sections.
///
/// The format and continuation bits of the method and of every section are derived from the
/// position of the section in the chain.
pub fn fat_method(
    max_stack: u16,
    local_var_sig_tok: u32,
    code: &[u8],
    sections: &[Section],
) -> Vec<u8> {
    let mut flags: u16 = 0x3003;
    if !sections.is_empty() {
        flags |= 0x8;
    }

    let mut bytes = flags.to_le_bytes().to_vec();
    bytes.extend_from_slice(&max_stack.to_le_bytes());
    bytes.extend_from_slice(&(code.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&local_var_sig_tok.to_le_bytes());
    bytes.extend_from_slice(code);

    for (index, section) in sections.iter().enumerate() {
        pad_to_4(&mut bytes);
        let more = if index + 1 < sections.len() { 0x80 } else { 0 };
        match section {
            Section::Small { flags, data } => {
                assert!(data.len() % 4 == 0, "small section data must be a multiple of 4");
                bytes.push((flags & 0x3f) | more);
                bytes.push((data.len() / 4 + 1) as u8);
                bytes.extend_from_slice(&[0, 0]);
                bytes.extend_from_slice(data);
            }
            Section::Fat { flags, data } => {
                bytes.push((flags & 0x3f) | 0x40 | more);
                bytes.extend_from_slice(&(data.len() as u32 + 4).to_le_bytes()[..3]);
                bytes.extend_from_slice(data);
            }
        }
    }

    bytes
}

fn pad_to_4(bytes: &mut Vec<u8>) {
    bytes.resize(bytes.len().next_multiple_of(4), 0);
}

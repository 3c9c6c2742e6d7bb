use std::collections::BTreeMap;

use binstruct_common::ByteView;
use binstruct_testutils::{deflate, embedded_pdb, metadata_root, pdb_stream};
use binstruct_tree::{
    NodeKind, ParseErrorKind, ParseOptions, Placement, Tree, EMBEDDED_PDB_SIGNATURE,
    PDB_STREAM_HEADER_SIZE,
};
use proptest::prelude::*;
use similar_asserts::assert_eq;
use uuid::Uuid;

const GUID: [u8; 16] = [
    0x36, 0xb7, 0x5f, 0x4b, 0x2a, 0x1f, 0x2c, 0x47, 0x9c, 0x2c, 0x0c, 0x5a, 0x82, 0x1e, 0x3d, 0x77,
];

fn sample_pdb() -> Vec<u8> {
    let pdb = pdb_stream(GUID, 1, 0x0600_0001, &[(0x06, 2), (0x01, 7)]);
    let strings: &[u8] = b"\0Main\0Program\0";
    metadata_root("PDB v1.0", &[("#Pdb", pdb.as_slice()), ("#Strings", strings)])
}

fn parse(data: &[u8]) -> Result<Tree<'_>, binstruct_tree::ParseError> {
    Tree::parse(ByteView::from_slice(data), 0..data.len(), NodeKind::EmbeddedPdb)
}

#[test]
fn test_embedded_pdb() {
    let portable_pdb = sample_pdb();
    let blob = embedded_pdb(&portable_pdb);
    let tree = parse(&blob).unwrap();

    let view = tree.embedded_pdb(tree.root()).unwrap();
    assert_eq!(view.decompressed_size() as usize, portable_pdb.len());
    assert_eq!(view.decompressed(), Some(portable_pdb.as_slice()));

    let stream = view.compressed_stream().unwrap();
    assert_eq!(tree.node(stream).span(), 8..blob.len());
    assert!(tree.children(stream).is_empty());

    let metadata = view.metadata().unwrap();
    let node = tree.node(metadata);
    assert_eq!(node.kind(), NodeKind::Metadata);
    assert_eq!(node.span(), 0..portable_pdb.len());
    assert_eq!(node.parent(), Some(stream));
    assert_ne!(node.buffer(), tree.node(tree.root()).buffer());

    let strings = tree.metadata_stream(metadata, "#Strings").unwrap();
    assert_eq!(tree.bytes(strings), b"\0Main\0Program\0");

    let pdb = tree.metadata_stream(metadata, "#Pdb").unwrap();
    let pdb = tree.pdb_stream(pdb).unwrap();
    assert_eq!(pdb.id(), Uuid::from_bytes_le(GUID));
    assert_eq!(pdb.age(), 1);
    assert_eq!(pdb.entry_point(), 0x0600_0001);
    assert_eq!(pdb.referenced_type_system_tables(), 0b100_0010);

    let rows = pdb.referenced_table_rows();
    assert_eq!(rows[0x01], 7);
    assert_eq!(rows[0x06], 2);
    assert_eq!(rows.iter().filter(|rows| **rows != 0).count(), 2);
}

#[test]
fn test_embedded_pdb_is_deterministic() {
    let blob = embedded_pdb(&sample_pdb());

    let first = parse(&blob).unwrap();
    let second = parse(&blob).unwrap();

    assert_eq!(first.len(), second.len());
    assert_eq!(
        first.display(first.root()).to_string(),
        second.display(second.root()).to_string()
    );
}

#[test]
fn test_bad_signature() {
    let blob = embedded_pdb(&sample_pdb());
    assert_eq!(&blob[..4], &EMBEDDED_PDB_SIGNATURE.to_le_bytes());

    for index in 0..4 {
        let mut blob = blob.clone();
        blob[index] ^= 0x20;

        let err = parse(&blob).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::BadMagic);
        assert_eq!(err.offset(), 0);
    }
}

#[test]
fn test_decompressed_size_mismatch() {
    let portable_pdb = sample_pdb();

    for declared in [portable_pdb.len() - 1, portable_pdb.len() + 1] {
        let mut blob = embedded_pdb(&portable_pdb);
        blob[4..8].copy_from_slice(&(declared as u32).to_le_bytes());

        let err = parse(&blob).unwrap_err();
        assert_eq!(err.kind(), ParseErrorKind::Decompression);
        assert_eq!(err.offset(), 8);
    }
}

#[test]
fn test_corrupt_stream() {
    let mut blob = b"MPDB\x10\x00\x00\x00".to_vec();
    // a block with the reserved block type 3
    blob.extend_from_slice(&[0xff; 12]);

    let err = parse(&blob).unwrap_err();
    assert_eq!(err.kind(), ParseErrorKind::Decompression);
}

#[test]
fn test_decompressed_size_limit() {
    let blob = embedded_pdb(&sample_pdb());
    let options = ParseOptions::default().max_decompressed_size(64);

    let err = Tree::parse_with_options(
        ByteView::from_slice(&blob),
        0..blob.len(),
        NodeKind::EmbeddedPdb,
        options,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ParseErrorKind::Decompression);
}

#[test]
fn test_declared_length_shorter_than_header() {
    let blob = embedded_pdb(&sample_pdb());
    let mut tree = Tree::parse(ByteView::from_slice(&blob), 0..blob.len(), NodeKind::Generic).unwrap();
    let root = tree.root();

    let err = tree
        .add(root, Placement::At(0), 6, NodeKind::EmbeddedPdb)
        .unwrap_err();
    assert_eq!(err.kind(), ParseErrorKind::Truncated);
    assert_eq!(err.offset(), 4);
    assert!(tree.children(root).is_empty());
}

#[test]
fn test_bad_metadata_signature() {
    let mut portable_pdb = sample_pdb();
    portable_pdb[..4].copy_from_slice(b"BSJX");

    let mut blob = b"MPDB".to_vec();
    blob.extend_from_slice(&(portable_pdb.len() as u32).to_le_bytes());
    blob.extend_from_slice(&deflate(&portable_pdb));

    let err = parse(&blob).unwrap_err();
    assert_eq!(err.kind(), ParseErrorKind::BadMagic);
    assert_eq!(err.offset(), 0);
}

#[test]
fn test_metadata_display() {
    let pdb = pdb_stream(GUID, 1, 0x0600_0001, &[(0x06, 2)]);
    let portable_pdb = metadata_root("PDB v1.0", &[("#Pdb", pdb.as_slice())]);
    let blob = embedded_pdb(&portable_pdb);

    let mut tree = parse(&blob).unwrap();
    let root = tree.root();
    tree.fill_with_padding(root).unwrap();

    let metadata = tree.embedded_pdb(root).unwrap().metadata().unwrap();
    insta::assert_snapshot!(tree.display(metadata).to_string(), @r###"
    0x0..0x54 Metadata
      0x0..0x4 Signature: BSJB
      0x4..0x6 MajorVersion: 1
      0x6..0x8 MinorVersion: 1
      0x8..0xc Reserved: 0
      0xc..0x10 VersionLength: 12
      0x10..0x1c Version: PDB v1.0
      0x1c..0x1e Flags: 0
      0x1e..0x20 Streams: 1
      0x20..0x30 StreamHeader: #Pdb
        0x20..0x24 Offset: 48
        0x24..0x28 Size: 36
        0x28..0x2d Name: #Pdb
        0x2d..0x30 Padding 00 00 00
      0x30..0x54 #Pdb
        0x30..0x40 Id: 4b5fb736-1f2a-472c-9c2c-0c5a821e3d77
        0x40..0x44 Age: 1
        0x44..0x48 EntryPoint: 100663297
        0x48..0x50 ReferencedTypeSystemTables: 0x0000000000000040
        0x50..0x54 MethodDef (0x06) rows: 2
    "###);
}

#[test]
fn test_empty_table_mask() {
    let data = pdb_stream(GUID, 5, 0, &[]);
    assert_eq!(data.len(), PDB_STREAM_HEADER_SIZE);

    let tree = Tree::parse(ByteView::from_slice(&data), 0..data.len(), NodeKind::PdbStream).unwrap();
    let root = tree.root();
    assert_eq!(tree.children(root).len(), 4);
    assert_eq!(tree.node(root).span(), 0..PDB_STREAM_HEADER_SIZE);
    assert!(tree.is_fully_covered(root));
    assert_eq!(tree.pdb_stream(root).unwrap().referenced_table_rows(), [0; 64]);
}

proptest! {
    #[test]
    fn proptest_table_mask(rows in prop::collection::btree_map(0usize..64, any::<u32>(), 0..64)) {
        let rows: BTreeMap<usize, u32> = rows;
        let pairs: Vec<_> = rows.iter().map(|(index, count)| (*index, *count)).collect();
        let data = pdb_stream(GUID, 1, 0, &pairs);

        let tree = Tree::parse(ByteView::from_slice(&data), 0..data.len(), NodeKind::PdbStream).unwrap();
        let root = tree.root();
        let children = tree.children(root);
        prop_assert_eq!(children.len(), 4 + rows.len());
        prop_assert_eq!(tree.node(root).length(), PDB_STREAM_HEADER_SIZE + 4 * rows.len());

        for (child, (index, count)) in children[4..].iter().zip(&rows) {
            prop_assert_eq!(tree.value(*child), Some(u64::from(*count)));
            let label = tree.text(*child);
            let expected_index = format!("(0x{index:02x}) rows: {count}");
            prop_assert!(label.ends_with(&expected_index));
        }

        let table_rows = tree.pdb_stream(root).unwrap().referenced_table_rows();
        for (index, count) in table_rows.iter().enumerate() {
            prop_assert_eq!(*count, rows.get(&index).copied().unwrap_or(0));
        }
    }

    #[test]
    fn proptest_embedded_pdb_coverage(
        rows in prop::collection::btree_map(0usize..64, any::<u32>(), 0..16),
        strings in prop::collection::vec(any::<u8>(), 0..64),
        age in any::<u32>(),
    ) {
        let pairs: Vec<_> = rows.iter().map(|(index, count)| (*index, *count)).collect();
        let pdb = pdb_stream(GUID, age, 0, &pairs);
        let portable_pdb = metadata_root(
            "PDB v1.0",
            &[("#Pdb", pdb.as_slice()), ("#Strings", strings.as_slice())],
        );
        let blob = embedded_pdb(&portable_pdb);

        let mut tree = parse(&blob).unwrap();
        let root = tree.root();
        tree.fill_with_padding(root).unwrap();
        prop_assert!(tree.is_fully_covered(root));

        let metadata = tree.embedded_pdb(root).unwrap().metadata().unwrap();
        let pdb = tree.metadata_stream(metadata, "#Pdb").unwrap();
        prop_assert_eq!(tree.pdb_stream(pdb).unwrap().age(), age);
    }
}

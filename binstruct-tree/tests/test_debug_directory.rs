use binstruct_common::ByteView;
use binstruct_testutils::{
    codeview, DebugDirectoryEntry, DEBUG_TYPE_CODEVIEW, DEBUG_TYPE_PDB_CHECKSUM,
    DEBUG_TYPE_REPRODUCIBLE,
};
use binstruct_tree::{
    DebugDirectoryType, NodeKind, ParseErrorKind, Placement, Tree, DEBUG_DIRECTORY_SIZE,
};
use similar_asserts::assert_eq;
use uuid::Uuid;

const GUID: [u8; 16] = [
    0x36, 0xb7, 0x5f, 0x4b, 0x2a, 0x1f, 0x2c, 0x47, 0x9c, 0x2c, 0x0c, 0x5a, 0x82, 0x1e, 0x3d, 0x77,
];

#[test]
fn test_directory_fields() {
    let entry = DebugDirectoryEntry {
        characteristics: 0,
        time_date_stamp: 0xdead_beef,
        major_version: 0x0100,
        minor_version: 0x504d,
        ty: 17,
        size_of_data: 0x1234,
        address_of_raw_data: 0x0002_1000,
        pointer_to_raw_data: 0x0001_f000,
    };
    let data = entry.to_bytes();

    let tree = Tree::parse(ByteView::from_slice(&data), 0..28, NodeKind::DebugDirectories).unwrap();
    let directories = tree.children(tree.root());
    assert_eq!(directories.len(), 1);

    let view = tree.debug_directory(directories[0]).unwrap();
    assert_eq!(view.characteristics(), 0);
    assert_eq!(view.time_date_stamp(), 0xdead_beef);
    assert_eq!(view.major_version(), 0x0100);
    assert_eq!(view.minor_version(), 0x504d);
    assert_eq!(view.debug_type(), DebugDirectoryType::EmbeddedPortablePdb);
    assert_eq!(view.size_of_data(), 0x1234);
    assert_eq!(view.address_of_raw_data(), 0x0002_1000);
    assert_eq!(view.pointer_to_raw_data(), 0x0001_f000);

    let fields = tree.children(directories[0]);
    assert_eq!(fields.len(), 8);
    assert_eq!(tree.text(fields[4]), "Type: EmbeddedPortablePdb (17)");
    assert!(tree.is_fully_covered(tree.root()));
}

#[test]
fn test_directory_count() {
    let mut data = Vec::new();
    for ty in [DEBUG_TYPE_CODEVIEW, 20, DEBUG_TYPE_REPRODUCIBLE] {
        let entry = DebugDirectoryEntry {
            ty,
            ..Default::default()
        };
        data.extend_from_slice(&entry.to_bytes());
    }

    let tree = Tree::parse(
        ByteView::from_slice(&data),
        0..data.len(),
        NodeKind::DebugDirectories,
    )
    .unwrap();

    let types: Vec<_> = tree
        .children(tree.root())
        .iter()
        .map(|id| tree.debug_directory(*id).unwrap().debug_type())
        .collect();
    assert_eq!(
        types,
        vec![
            DebugDirectoryType::CodeView,
            DebugDirectoryType::Other(20),
            DebugDirectoryType::Reproducible,
        ]
    );

    for (index, id) in tree.children(tree.root()).iter().enumerate() {
        assert_eq!(tree.node(*id).span(), index * DEBUG_DIRECTORY_SIZE..(index + 1) * 28);
    }
}

#[test]
fn test_invalid_directories_length() {
    let data = [0u8; 30];
    let err = Tree::parse(ByteView::from_slice(&data), 0..30, NodeKind::DebugDirectories).unwrap_err();
    assert_eq!(err.kind(), ParseErrorKind::InvalidLength);
    assert_eq!(err.offset(), 0);
}

#[test]
fn test_truncated_directory() {
    let data = DebugDirectoryEntry::default().to_bytes();
    let err = Tree::parse(ByteView::from_slice(&data[..20]), 0..28, NodeKind::DebugDirectories)
        .unwrap_err();
    assert_eq!(err.kind(), ParseErrorKind::Truncated);
    assert_eq!(err.offset(), 0);
}

#[test]
fn test_debug_data() {
    let record = codeview(GUID, 3, "C:\\build\\Sample.pdb");
    let mut checksum = b"SHA256\0".to_vec();
    checksum.extend_from_slice(&[0x11; 32]);

    let entries = [
        DebugDirectoryEntry {
            ty: DEBUG_TYPE_CODEVIEW,
            size_of_data: record.len() as u32,
            pointer_to_raw_data: 84,
            ..Default::default()
        },
        DebugDirectoryEntry {
            ty: DEBUG_TYPE_PDB_CHECKSUM,
            size_of_data: checksum.len() as u32,
            pointer_to_raw_data: 84 + record.len() as u32,
            ..Default::default()
        },
        DebugDirectoryEntry {
            ty: DEBUG_TYPE_REPRODUCIBLE,
            ..Default::default()
        },
    ];

    let mut data: Vec<u8> = entries.iter().flat_map(|entry| entry.to_bytes()).collect();
    data.extend_from_slice(&record);
    data.extend_from_slice(&checksum);

    let mut tree = Tree::parse(ByteView::from_slice(&data), 0..data.len(), NodeKind::Generic).unwrap();
    let root = tree.root();
    let directories = tree
        .add(root, Placement::At(0), 84, NodeKind::DebugDirectories)
        .unwrap();

    let mut payloads = Vec::new();
    for entry in tree.children(directories).to_vec() {
        payloads.push(tree.add_debug_data(root, entry).unwrap());
    }
    assert!(payloads[2].is_none());

    let codeview = payloads[0].unwrap();
    assert_eq!(tree.node(codeview).kind(), NodeKind::CodeView);
    assert_eq!(tree.node(codeview).span(), 84..84 + record.len());
    assert_eq!(
        tree.text(codeview),
        format!(
            "CodeView: C:\\build\\Sample.pdb ({}, age 3)",
            Uuid::from_bytes_le(GUID)
        )
    );

    let checksum_node = payloads[1].unwrap();
    assert_eq!(tree.text(checksum_node), "PdbChecksum: SHA256");
    let fields = tree.children(checksum_node);
    assert_eq!(tree.bytes(fields[1]), &[0x11; 32]);

    assert!(tree.is_fully_covered(root));
}

#[test]
fn test_codeview_path_cut_short() {
    let record = codeview(GUID, 1, "a.pdb");
    let entry = DebugDirectoryEntry {
        ty: DEBUG_TYPE_CODEVIEW,
        // ends in the middle of the path, before its terminator
        size_of_data: record.len() as u32 - 3,
        pointer_to_raw_data: 28,
        ..Default::default()
    };

    let mut data = entry.to_bytes();
    data.extend_from_slice(&record);

    let mut tree = Tree::parse(ByteView::from_slice(&data), 0..data.len(), NodeKind::Generic).unwrap();
    let root = tree.root();
    let directories = tree
        .add(root, Placement::At(0), 28, NodeKind::DebugDirectories)
        .unwrap();
    let entry = tree.children(directories)[0];

    let err = tree.add_debug_data(root, entry).unwrap_err();
    assert_eq!(err.kind(), ParseErrorKind::InvalidString);
    assert_eq!(err.offset(), 28 + 24);
    assert_eq!(tree.children(root), &[directories]);
}

#[test]
fn test_codeview_bad_signature() {
    let mut record = codeview(GUID, 1, "a.pdb");
    record[0] = b'N';

    let err = Tree::parse(ByteView::from_slice(&record), 0..record.len(), NodeKind::CodeView)
        .unwrap_err();
    assert_eq!(err.kind(), ParseErrorKind::BadMagic);
    assert_eq!(err.offset(), 0);
}

#[test]
fn test_failed_entry_keeps_siblings() {
    let record = codeview(GUID, 1, "a.pdb");
    let entries = [
        DebugDirectoryEntry {
            ty: DEBUG_TYPE_CODEVIEW,
            size_of_data: 0x100,
            pointer_to_raw_data: 56,
            ..Default::default()
        },
        DebugDirectoryEntry {
            ty: DEBUG_TYPE_CODEVIEW,
            size_of_data: record.len() as u32,
            pointer_to_raw_data: 56,
            ..Default::default()
        },
    ];

    let mut data: Vec<u8> = entries.iter().flat_map(|entry| entry.to_bytes()).collect();
    data.extend_from_slice(&record);

    let mut tree = Tree::parse(ByteView::from_slice(&data), 0..data.len(), NodeKind::Generic).unwrap();
    let root = tree.root();
    let directories = tree
        .add(root, Placement::At(0), 56, NodeKind::DebugDirectories)
        .unwrap();
    let entries = tree.children(directories).to_vec();
    let len = tree.len();

    let err = tree.add_debug_data(root, entries[0]).unwrap_err();
    assert_eq!(err.kind(), ParseErrorKind::Truncated);
    assert_eq!(err.offset(), 56);
    assert_eq!(tree.len(), len);
    assert_eq!(tree.children(root), &[directories]);

    let codeview = tree.add_debug_data(root, entries[1]).unwrap().unwrap();
    assert_eq!(tree.children(root), &[directories, codeview]);
}

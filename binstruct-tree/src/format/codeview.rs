use crate::error::{ParseError, ParseErrorKind};
use crate::tree::{NodeId, Tree};

/// Signature of a CodeView PDB 7.0 record, `RSDS` in little-endian byte order.
pub const CODEVIEW_SIGNATURE: u32 = 0x5344_5352;

/// Upper bound for the PDB path, including the NUL terminator.
const MAX_PATH_LENGTH: usize = 4096;

/// Upper bound for the hash algorithm name of a PDB checksum, including the NUL terminator.
const MAX_ALGORITHM_LENGTH: usize = 64;

#[tracing::instrument(level = "trace", name = "CodeView::parse", skip_all)]
pub(crate) fn parse_codeview(tree: &mut Tree<'_>, id: NodeId) -> Result<(), ParseError> {
    let start = tree.node(id).start();

    let mut fields = tree.fields(id);
    let signature = fields.u32("Signature")?;
    if signature != CODEVIEW_SIGNATURE {
        return Err(ParseError::new(
            ParseErrorKind::BadMagic,
            start,
            format!("expected RSDS signature, found {signature:#010x}"),
        ));
    }
    fields.label_last("Signature: RSDS");

    let guid = fields.guid("Guid")?;
    let age = fields.u32("Age")?;
    let path = fields.c_string("Path", MAX_PATH_LENGTH)?;

    tree.set_label(id, format!("CodeView: {path} ({guid}, age {age})"));
    Ok(())
}

/// Decodes a PDB checksum record: the hash algorithm name followed by the checksum.
pub(crate) fn parse_pdb_checksum(tree: &mut Tree<'_>, id: NodeId) -> Result<(), ParseError> {
    let end = tree.node(id).end();

    let mut fields = tree.fields(id);
    let algorithm = fields.c_string("Algorithm", MAX_ALGORITHM_LENGTH)?;
    let checksum_length = end.saturating_sub(fields.cursor());
    fields.bytes("Checksum", checksum_length)?;

    tree.set_label(id, format!("PdbChecksum: {algorithm}"));
    Ok(())
}

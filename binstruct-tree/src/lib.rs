//! Decodes PE debug data and .NET method bodies into trees of labelled byte spans.
//!
//! Every structure is represented as a [`Tree`] of [`Node`]s. A node covers a span of a buffer
//! and is decoded according to its [`NodeKind`]: the decoder appends the fields of the structure
//! as child nodes, in the order they appear in the file. The result can be inspected node by
//! node, searched by offset with [`Tree::find`], or rendered with [`Tree::display`].
//!
//! # Functionality
//!
//! * Decode a table of PE debug directory entries with [`NodeKind::DebugDirectories`], and the
//!   data an entry points to with [`Tree::add_debug_data`].
//! * Inflate embedded Portable PDBs ([`NodeKind::EmbeddedPdb`]). The inflated data lives in a
//!   separate buffer and is decoded as a nested [`Metadata`](NodeKind::Metadata) tree, including
//!   the `#Pdb` stream.
//! * Decode tiny and fat IL method bodies, including extra sections, with
//!   [`Tree::add_method_body`].
//! * Find bytes that no decoder accounted for with [`Tree::uncovered_spans`], and cover them
//!   with [`Tree::fill_with_padding`].
//!
//! ## Example
//!
//! ```
//! use binstruct_common::ByteView;
//! use binstruct_tree::{NodeKind, Tree};
//!
//! let mut entry = [0u8; 28];
//! entry[12] = 16; // IMAGE_DEBUG_TYPE_REPRODUCIBLE
//!
//! let tree = Tree::parse(ByteView::from_slice(&entry), 0..28, NodeKind::DebugDirectories).unwrap();
//! let directory = tree.children(tree.root())[0];
//! assert_eq!(tree.text(directory), "DebugDirectory: Reproducible (16)");
//! ```
//!
//! # Structure of an embedded Portable PDB
//!
//! An `IMAGE_DEBUG_TYPE_EMBEDDED_PORTABLE_PDB` entry points to
//! * the signature `MPDB`,
//! * the size of the Portable PDB after decompression,
//! * the Portable PDB compressed with raw DEFLATE.
//!
//! The Portable PDB itself is an ECMA-335 metadata root. Its `#Pdb` stream carries the PDB id,
//! the entry point, and the row counts of the type system tables it refers to.

#![warn(missing_docs)]

mod error;
mod fields;
mod format;
mod gaps;
mod kind;
mod options;
mod text;
mod tree;

pub use error::{ParseError, ParseErrorKind};
pub use fields::Fields;
pub use format::*;
pub use gaps::Gap;
pub use kind::{NodeKind, Width};
pub use options::{GapPolicy, ParseOptions};
pub use text::{HexFormat, TreeDisplay};
pub use tree::{Ancestors, BufferId, Node, NodeId, Placement, Tree};

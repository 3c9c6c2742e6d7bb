use std::ops::Range;

use crate::error::ParseError;
use crate::kind::NodeKind;
use crate::options::GapPolicy;
use crate::tree::{NodeId, Placement, Tree};

/// A range of bytes within a node that is not covered by any of its children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gap {
    /// The node whose children leave the range uncovered.
    pub parent: NodeId,
    /// The uncovered bytes, as absolute offsets into the parent's buffer.
    pub range: Range<usize>,
}

impl<'data> Tree<'data> {
    /// Lists all gaps below `id`.
    ///
    /// For every node that has children, this yields the bytes before its first child, between
    /// consecutive children, and after its last child up to its own end. Nodes without children
    /// are considered fully covered by themselves. Nested trees are visited as well.
    pub fn uncovered_spans(&self, id: NodeId) -> Vec<Gap> {
        let mut gaps = Vec::new();
        self.collect_gaps(id, &mut gaps);
        gaps
    }

    fn collect_gaps(&self, id: NodeId, gaps: &mut Vec<Gap>) {
        let node = self.node(id);

        if !node.children().is_empty() {
            let mut cursor = node.start();
            for child in node.children() {
                let child_node = self.node(*child);
                if child_node.start() > cursor {
                    gaps.push(Gap {
                        parent: id,
                        range: cursor..child_node.start(),
                    });
                }
                self.collect_gaps(*child, gaps);
                cursor = cursor.max(child_node.end());
            }

            if node.end() > cursor {
                gaps.push(Gap {
                    parent: id,
                    range: cursor..node.end(),
                });
            }
        }

        if let Some(nested) = node.nested() {
            self.collect_gaps(nested, gaps);
        }
    }

    /// Covers the gaps below `id` according to the configured [`GapPolicy`].
    ///
    /// Gaps consisting only of zero bytes become [`Padding`](NodeKind::Padding). With
    /// [`GapPolicy::MarkUnknown`], all other gaps become [`Unknown`](NodeKind::Unknown) nodes;
    /// otherwise they are left uncovered. Returns the number of nodes added.
    pub fn fill_with_padding(&mut self, id: NodeId) -> Result<usize, ParseError> {
        let policy = self.options().gap_policy;
        let mut added = 0;

        for gap in self.uncovered_spans(id) {
            let buffer = self.node(gap.parent).buffer();
            let is_zero = self
                .buffer(buffer)
                .get(gap.range.clone())
                .is_some_and(|bytes| bytes.iter().all(|b| *b == 0));

            let kind = match (is_zero, policy) {
                (true, _) => NodeKind::Padding,
                (false, GapPolicy::MarkUnknown) => NodeKind::Unknown,
                (false, GapPolicy::PaddingOnly) => {
                    tracing::trace!(start = gap.range.start, end = gap.range.end, "leaving gap");
                    continue;
                }
            };

            tracing::debug!(
                kind = kind.name(),
                start = gap.range.start,
                end = gap.range.end,
                "filling gap"
            );
            self.add(
                gap.parent,
                Placement::At(gap.range.start),
                gap.range.len(),
                kind,
            )?;
            added += 1;
        }

        Ok(added)
    }

    /// Returns `true` if the children of every node below `id` cover their parent completely.
    pub fn is_fully_covered(&self, id: NodeId) -> bool {
        self.uncovered_spans(id).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use binstruct_common::ByteView;
    use proptest::prelude::*;
    use similar_asserts::assert_eq;

    use crate::{ParseOptions, Width};

    fn generic_tree(data: &[u8]) -> Tree<'_> {
        Tree::parse(ByteView::from_slice(data), 0..data.len(), NodeKind::Generic).unwrap()
    }

    #[test]
    fn test_leaf_has_no_gaps() {
        let tree = generic_tree(&[1, 2, 3]);
        assert_eq!(tree.uncovered_spans(tree.root()), vec![]);
    }

    #[test]
    fn test_leading_inner_and_trailing_gaps() {
        let data = [0u8; 12];
        let mut tree = generic_tree(&data);
        let root = tree.root();

        let first = tree
            .add(root, Placement::At(2), 2, NodeKind::Scalar(Width::U16))
            .unwrap();
        tree.add(root, Placement::At(6), 4, NodeKind::Scalar(Width::U32))
            .unwrap();

        let gaps = tree.uncovered_spans(root);
        assert_eq!(
            gaps,
            vec![
                Gap {
                    parent: root,
                    range: 0..2
                },
                Gap {
                    parent: root,
                    range: 4..6
                },
                Gap {
                    parent: root,
                    range: 10..12
                },
            ]
        );

        assert_eq!(tree.find(root, 3), Some(first));
        assert_eq!(tree.find(root, 5), None);
    }

    #[test]
    fn test_non_zero_gaps_stay_uncovered() {
        let data = [0, 0, 0xaa, 0, 0, 0, 0];
        let mut tree = generic_tree(&data);
        let root = tree.root();

        tree.add(root, Placement::At(0), 1, NodeKind::Scalar(Width::U8))
            .unwrap();
        tree.add(root, Placement::At(4), 1, NodeKind::Scalar(Width::U8))
            .unwrap();

        assert_eq!(tree.fill_with_padding(root).unwrap(), 1);
        assert_eq!(
            tree.uncovered_spans(root),
            vec![Gap {
                parent: root,
                range: 1..4
            }]
        );

        let padding = tree.children(root)[2];
        assert_eq!(tree.node(padding).kind(), NodeKind::Padding);
        assert_eq!(tree.node(padding).span(), 5..7);
    }

    #[test]
    fn test_mark_unknown_gaps() {
        let data = [0, 0xaa, 0, 0];
        let options = ParseOptions::default().gap_policy(GapPolicy::MarkUnknown);
        let mut tree =
            Tree::parse_with_options(ByteView::from_slice(&data), 0..4, NodeKind::Generic, options)
                .unwrap();
        let root = tree.root();

        tree.add(root, Placement::At(3), 1, NodeKind::Scalar(Width::U8))
            .unwrap();
        assert_eq!(tree.fill_with_padding(root).unwrap(), 1);

        let unknown = tree.children(root)[0];
        assert_eq!(tree.node(unknown).kind(), NodeKind::Unknown);
        assert_eq!(tree.node(unknown).span(), 0..3);
        assert!(tree.is_fully_covered(root));
    }

    /// Generates field sizes and zero-filled gaps preceding each field.
    fn arb_layout() -> impl Strategy<Value = Vec<(usize, usize)>> {
        prop::collection::vec((0usize..6, prop::sample::select(vec![1usize, 2, 3, 4, 8])), 0..24)
    }

    proptest! {
        #[test]
        fn proptest_padding_completes_coverage(layout in arb_layout(), trailing in 0usize..5) {
            let total = layout.iter().map(|(gap, size)| gap + size).sum::<usize>() + trailing;
            let mut data = vec![0u8; total];

            let mut offset = 0;
            let mut fields = Vec::new();
            for (gap, size) in &layout {
                offset += gap;
                for byte in &mut data[offset..offset + size] {
                    *byte = 0xff;
                }
                fields.push((offset, *size));
                offset += size;
            }

            let mut tree = generic_tree(&data);
            let root = tree.root();
            for (start, size) in fields.iter().rev() {
                tree.add(root, Placement::At(*start), *size, NodeKind::Generic).unwrap();
            }
            tree.fill_with_padding(root).unwrap();

            prop_assert!(tree.is_fully_covered(root));

            let mut cursor = 0;
            for child in tree.children(root) {
                let node = tree.node(*child);
                prop_assert_eq!(node.start(), cursor);
                cursor = node.end();
            }
            if !fields.is_empty() {
                prop_assert_eq!(cursor, total);
            }
        }
    }
}

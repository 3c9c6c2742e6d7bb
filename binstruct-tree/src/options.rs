/// Controls what [`Tree::fill_with_padding`](crate::Tree::fill_with_padding) does with gaps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GapPolicy {
    /// Zero-filled gaps become [`Padding`](crate::NodeKind::Padding) nodes, all other gaps stay
    /// uncovered.
    #[default]
    PaddingOnly,
    /// Like `PaddingOnly`, but gaps containing non-zero bytes become
    /// [`Unknown`](crate::NodeKind::Unknown) nodes so that every byte ends up covered.
    MarkUnknown,
}

/// Settings applied while a [`Tree`](crate::Tree) is built.
///
/// # Example
///
/// ```
/// use binstruct_tree::{GapPolicy, ParseOptions};
///
/// let options = ParseOptions::default()
///     .gap_policy(GapPolicy::MarkUnknown)
///     .max_extra_sections(8);
/// assert_eq!(options.max_extra_sections, 8);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    /// How uncovered gaps are materialized.
    pub gap_policy: GapPolicy,
    /// The maximum number of chained extra sections after a fat method body.
    pub max_extra_sections: usize,
    /// The largest declared decompressed size of an embedded Portable PDB that is inflated.
    pub max_decompressed_size: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            gap_policy: GapPolicy::default(),
            max_extra_sections: 64,
            max_decompressed_size: 256 * 1024 * 1024,
        }
    }
}

impl ParseOptions {
    /// Sets the [`GapPolicy`].
    pub fn gap_policy(mut self, gap_policy: GapPolicy) -> Self {
        self.gap_policy = gap_policy;
        self
    }

    /// Sets the maximum number of chained extra sections after a fat method body.
    pub fn max_extra_sections(mut self, max_extra_sections: usize) -> Self {
        self.max_extra_sections = max_extra_sections;
        self
    }

    /// Sets the largest declared decompressed size of an embedded Portable PDB.
    pub fn max_decompressed_size(mut self, max_decompressed_size: usize) -> Self {
        self.max_decompressed_size = max_decompressed_size;
        self
    }
}

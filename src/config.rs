//! Engine configuration options.
//!
//! [`Options`] controls the page size and the node fill policy. The split
//! trigger is a byte fraction of the page (variable-length keys and values
//! make item counts a poor proxy for disk usage), while the underflow floor
//! is a fixed item count. Both are configurable rather than hard-coded.

/// Default page size in bytes, matching the common host page size.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default fraction of the page a node's serialized form may occupy before
/// it is split.
pub const DEFAULT_SPLIT_FILL: f64 = 0.9;

/// Default minimum number of items a non-root node must hold.
pub const DEFAULT_MIN_ITEMS: usize = 2;

/// Configuration options for an engine instance.
///
/// The page size is fixed at engine-creation time and persisted in the
/// metadata page; reopening a file with a different page size is rejected.
///
/// # Example
///
/// ```rust
/// use tenebra::Options;
///
/// let mut options = Options::default();
/// options.max_items = Some(3); // force small fanout, e.g. for tests
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    /// Size in bytes of every page of the backing medium.
    pub page_size: usize,

    /// A node is split once its serialized size meets or exceeds this
    /// fraction of the page size. Must sit in `(0, 1]`.
    pub split_fill: f64,

    /// Optional hard cap on items per node, checked in addition to
    /// `split_fill`. `None` leaves fanout bounded by page capacity alone.
    /// Must be at least 2 so a split always has a median to promote.
    pub max_items: Option<usize>,

    /// A non-root node holding fewer items than this is rebalanced after a
    /// deletion. Never applied to the root, and must be at least 1.
    pub min_items: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            split_fill: DEFAULT_SPLIT_FILL,
            max_items: None,
            min_items: DEFAULT_MIN_ITEMS,
        }
    }
}

impl Options {
    /// Options with a hard per-node item cap and an underflow floor derived
    /// from it (`floor(max / 2) - 1`, clamped to at least one item).
    pub fn with_max_items(max_items: usize) -> Self {
        Self {
            max_items: Some(max_items),
            min_items: (max_items / 2).saturating_sub(1).max(1),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_use_page_fraction_policy() {
        let options = Options::default();
        assert_eq!(options.page_size, DEFAULT_PAGE_SIZE);
        assert!(options.max_items.is_none());
        assert!(options.split_fill > 0.0 && options.split_fill < 1.0);
    }

    #[test]
    fn max_items_derives_underflow_floor() {
        let options = Options::with_max_items(8);
        assert_eq!(options.max_items, Some(8));
        assert_eq!(options.min_items, 3);
        // Small caps still keep a floor of one item.
        assert_eq!(Options::with_max_items(3).min_items, 1);
    }
}

//! One B-tree node and its binary page layout.
//!
//! A node serializes into exactly one page. Fixed-size structural fields
//! (leaf flag, parent id, item count, child ids, payload offsets) grow
//! forward from the head of the page while variable-length key/value
//! payloads grow backward from the tail, meeting in the middle:
//!
//! ```text
//! byte   0       : leaf flag (0 = internal, 1 = leaf)
//! bytes  1..9    : parent page id (u64 LE)
//! bytes  9..11   : item count N (u16 LE)
//! repeated N times, head-growing:
//!   [internal only] child page id (u64 LE)
//!   payload offset (u16 LE), pointing at a tail-growing record:
//!     key length (u8), key bytes, value length (u8), value bytes
//! [internal only] final child page id (u64 LE)
//! ```

use crate::config::Options;
use crate::error::{EngineError, Result};
use crate::pager::{read_u16, read_u64, read_u8, write_u16, write_u64, PageCodec, PageId};

/// Fixed per-node byte cost: leaf flag, parent id, item count.
const NODE_HEADER_SIZE: usize = 11;

/// Largest key or value the u8 length prefixes can describe.
pub const MAX_KEY_SIZE: usize = u8::MAX as usize;
pub const MAX_VALUE_SIZE: usize = u8::MAX as usize;

/// A key/value byte-string pair stored in a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Item {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One B-tree page's logical content: ordered items and, for internal
/// nodes, `items + 1` child page ids.
///
/// Nodes are transient in-memory reconstructions materialized on demand
/// from a page and discarded after use. The `id` is where the node was
/// read from; it is not part of the serialized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: PageId,
    pub parent: PageId,
    pub items: Vec<Item>,
    pub children: Vec<PageId>,
}

impl Node {
    pub fn new_leaf() -> Self {
        Self {
            id: PageId(0),
            parent: PageId(0),
            items: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Looks up `key` among this node's items: `Ok(index)` on an exact
    /// match, `Err(index)` with the descent/insertion index otherwise.
    pub fn search(&self, key: &[u8]) -> std::result::Result<usize, usize> {
        self.items
            .binary_search_by(|item| item.key.as_slice().cmp(key))
    }

    /// Returns the child page id to descend into when looking for `key`.
    pub fn child_for(&self, key: &[u8]) -> PageId {
        match self.search(key) {
            Ok(i) => self.children[i + 1],
            Err(i) => self.children[i],
        }
    }

    /// Inserts `item` in sorted position and returns the insertion index.
    /// The key is assumed to be absent; callers validate beforehand.
    pub fn insert(&mut self, item: Item) -> usize {
        let at = match self.search(&item.key) {
            Ok(i) | Err(i) => i,
        };
        self.items.insert(at, item);
        at
    }

    /// Sets `children[index]` to `id`, appending when `index` is one past
    /// the end. An index further out is a programmer error.
    pub fn add_child(&mut self, index: usize, id: PageId) {
        assert!(
            index <= self.children.len(),
            "child index {index} past end of {} children",
            self.children.len()
        );
        if index == self.children.len() {
            self.children.push(id);
        } else {
            self.children[index] = id;
        }
    }

    /// Inserts a child pointer at `index`, shifting the rest right.
    pub fn insert_child(&mut self, index: usize, id: PageId) {
        self.children.insert(index, id);
    }

    /// Index of `id` among this node's children, if present.
    pub fn child_index(&self, id: PageId) -> Option<usize> {
        self.children.iter().position(|&c| c == id)
    }

    /// Actual byte cost of the serialized node.
    pub fn serialized_size(&self) -> usize {
        let mut size = NODE_HEADER_SIZE;
        for item in &self.items {
            // offset slot + length prefixes + payload, plus a child id for
            // internal nodes.
            size += 2 + 2 + item.key.len() + item.value.len();
            if !self.is_leaf() {
                size += 8;
            }
        }
        if !self.is_leaf() {
            size += 8;
        }
        size
    }

    /// True when the node's serialized size meets or exceeds the configured
    /// fraction of the page, or its item count exceeds the optional hard
    /// cap. This is the split trigger. A node with fewer than three items
    /// never reports overpopulated: a split promotes the median and must
    /// leave both halves non-empty.
    pub fn is_overpopulated(&self, options: &Options) -> bool {
        if self.items.len() < 3 {
            return false;
        }
        if let Some(max_items) = options.max_items {
            if self.items.len() > max_items {
                return true;
            }
        }
        self.serialized_size() as f64 >= options.page_size as f64 * options.split_fill
    }

    /// True when the item count has dropped below the minimum fill
    /// threshold. Never applied to the root; the caller exempts it.
    pub fn is_underpopulated(&self, options: &Options) -> bool {
        self.items.len() < options.min_items
    }

    /// Splits the node at the median item, which is promoted to the caller
    /// rather than kept in either half. Internal nodes split their children
    /// at `round(len / 2)` so both halves keep `items + 1` children.
    /// Requires at least three items so neither half comes out empty.
    pub fn split(mut self) -> (Node, Node, Item) {
        debug_assert!(
            self.items.len() >= 3,
            "split of a {}-item node cannot fill both halves",
            self.items.len()
        );
        let mid = self.items.len() / 2;
        let mut right_items = self.items.split_off(mid);
        let promoted = right_items.remove(0);

        let mut left = Node::new_leaf();
        left.items = self.items;
        let mut right = Node::new_leaf();
        right.items = right_items;

        if !self.children.is_empty() {
            let point = (self.children.len() + 1) / 2;
            right.children = self.children.split_off(point);
            left.children = self.children;
        }
        (left, right, promoted)
    }
}

impl PageCodec for Node {
    fn encode(&self, buf: &mut [u8]) -> Result<()> {
        if self.serialized_size() > buf.len() {
            return Err(EngineError::InvalidArgument(format!(
                "serialized node ({} bytes) exceeds the page size ({})",
                self.serialized_size(),
                buf.len()
            )));
        }
        if !self.is_leaf() && self.children.len() != self.items.len() + 1 {
            return Err(EngineError::InvalidArgument(format!(
                "internal node with {} items has {} children",
                self.items.len(),
                self.children.len()
            )));
        }

        buf[0] = u8::from(self.is_leaf());
        write_u64(buf, 1, self.parent.0)?;
        write_u16(buf, 9, self.items.len() as u16)?;

        let mut head = NODE_HEADER_SIZE;
        let mut tail = buf.len();
        for (i, item) in self.items.iter().enumerate() {
            if item.key.len() > MAX_KEY_SIZE || item.value.len() > MAX_VALUE_SIZE {
                return Err(EngineError::InvalidArgument(
                    "key or value exceeds the u8 length prefix".into(),
                ));
            }
            if !self.is_leaf() {
                write_u64(buf, head, self.children[i].0)?;
                head += 8;
            }

            tail -= 2 + item.key.len() + item.value.len();
            write_u16(buf, head, tail as u16)?;
            head += 2;

            let mut at = tail;
            buf[at] = item.key.len() as u8;
            at += 1;
            buf[at..at + item.key.len()].copy_from_slice(&item.key);
            at += item.key.len();
            buf[at] = item.value.len() as u8;
            at += 1;
            buf[at..at + item.value.len()].copy_from_slice(&item.value);
        }
        if !self.is_leaf() {
            write_u64(buf, head, self.children[self.items.len()].0)?;
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let leaf = match read_u8(buf, 0)? {
            0 => false,
            1 => true,
            other => {
                return Err(EngineError::CorruptPage(format!(
                    "node leaf flag has invalid value {other}"
                )))
            }
        };
        let parent = PageId(read_u64(buf, 1)?);
        let count = read_u16(buf, 9)? as usize;

        let mut head = NODE_HEADER_SIZE;
        let mut items = Vec::with_capacity(count);
        let mut children = Vec::with_capacity(if leaf { 0 } else { count + 1 });
        for _ in 0..count {
            if !leaf {
                children.push(PageId(read_u64(buf, head)?));
                head += 8;
            }
            let offset = read_u16(buf, head)? as usize;
            head += 2;

            let key_len = read_u8(buf, offset)? as usize;
            let key = buf
                .get(offset + 1..offset + 1 + key_len)
                .ok_or_else(|| EngineError::CorruptPage("item key reads past page".into()))?;
            let value_at = offset + 1 + key_len;
            let value_len = read_u8(buf, value_at)? as usize;
            let value = buf
                .get(value_at + 1..value_at + 1 + value_len)
                .ok_or_else(|| EngineError::CorruptPage("item value reads past page".into()))?;
            items.push(Item::new(key, value));
        }
        if !leaf {
            children.push(PageId(read_u64(buf, head)?));
        }

        Ok(Self {
            id: PageId(0),
            parent,
            items,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(keys: &[&str]) -> Node {
        let mut node = Node::new_leaf();
        for key in keys {
            node.items.push(Item::new(*key, format!("v-{key}")));
        }
        node
    }

    fn options(page_size: usize) -> Options {
        Options {
            page_size,
            ..Options::default()
        }
    }

    #[test]
    fn leaf_codec_round_trips() {
        let mut node = leaf(&["alpha", "beta", "gamma"]);
        node.parent = PageId(12);

        let mut buf = vec![0u8; 256];
        node.encode(&mut buf).expect("encode");
        let decoded = Node::decode(&buf).expect("decode");
        assert_eq!(decoded.parent, node.parent);
        assert_eq!(decoded.items, node.items);
        assert!(decoded.children.is_empty());
    }

    #[test]
    fn internal_codec_round_trips() {
        let mut node = leaf(&["m", "t"]);
        node.parent = PageId(3);
        node.children = vec![PageId(7), PageId(8), PageId(9)];

        let mut buf = vec![0u8; 256];
        node.encode(&mut buf).expect("encode");
        let decoded = Node::decode(&buf).expect("decode");
        assert_eq!(decoded.items, node.items);
        assert_eq!(decoded.children, node.children);
    }

    #[test]
    fn empty_value_round_trips() {
        let mut node = Node::new_leaf();
        node.items.push(Item::new("key", ""));
        let mut buf = vec![0u8; 64];
        node.encode(&mut buf).expect("encode");
        let decoded = Node::decode(&buf).expect("decode");
        assert_eq!(decoded.items[0].value, b"");
    }

    #[test]
    fn decode_rejects_offset_past_page() {
        let node = leaf(&["k"]);
        let mut buf = vec![0u8; 64];
        node.encode(&mut buf).expect("encode");
        // Point the first item's payload offset past the page end.
        buf[11..13].copy_from_slice(&1000u16.to_le_bytes());
        let err = Node::decode(&buf).unwrap_err();
        assert!(matches!(err, EngineError::CorruptPage(_)));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let node = leaf(&["long-enough-key"]);
        let mut buf = vec![0u8; 64];
        node.encode(&mut buf).expect("encode");
        let offset = u16::from_le_bytes([buf[11], buf[12]]) as usize;
        // Inflate the key length so it runs off the end of the page.
        buf[offset] = u8::MAX;
        let err = Node::decode(&buf).unwrap_err();
        assert!(matches!(err, EngineError::CorruptPage(_)));
    }

    #[test]
    fn decode_rejects_bad_leaf_flag() {
        let mut buf = vec![0u8; 64];
        buf[0] = 7;
        let err = Node::decode(&buf).unwrap_err();
        assert!(matches!(err, EngineError::CorruptPage(_)));
    }

    #[test]
    fn encode_rejects_node_larger_than_page() {
        let node = leaf(&["aaaaaaaaaa", "bbbbbbbbbb", "cccccccccc"]);
        let mut buf = vec![0u8; 32];
        let err = node.encode(&mut buf).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn insert_keeps_items_sorted() {
        let mut node = Node::new_leaf();
        for key in ["delta", "alpha", "charlie", "bravo"] {
            node.insert(Item::new(key, "v"));
        }
        let keys: Vec<_> = node.items.iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec![b"alpha".to_vec(), b"bravo".to_vec(), b"charlie".to_vec(), b"delta".to_vec()]);
        assert_eq!(node.insert(Item::new("echo", "v")), 4);
    }

    #[test]
    fn child_for_picks_the_covering_subtree() {
        let mut node = leaf(&["g", "p"]);
        node.children = vec![PageId(1), PageId(2), PageId(3)];
        assert_eq!(node.child_for(b"a"), PageId(1));
        assert_eq!(node.child_for(b"k"), PageId(2));
        assert_eq!(node.child_for(b"z"), PageId(3));
        // A key equal to a separator descends right of it.
        assert_eq!(node.child_for(b"g"), PageId(2));
    }

    #[test]
    fn add_child_appends_or_overwrites() {
        let mut node = Node::new_leaf();
        node.add_child(0, PageId(5));
        node.add_child(1, PageId(6));
        node.add_child(0, PageId(7));
        assert_eq!(node.children, vec![PageId(7), PageId(6)]);
    }

    #[test]
    #[should_panic(expected = "past end")]
    fn add_child_past_end_panics() {
        let mut node = Node::new_leaf();
        node.add_child(2, PageId(5));
    }

    #[test]
    fn split_promotes_the_median() {
        let node = leaf(&["a", "b", "c", "d", "e"]);
        let (left, right, promoted) = node.split();
        assert_eq!(promoted.key, b"c");
        let left_keys: Vec<_> = left.items.iter().map(|i| i.key.as_slice()).collect();
        let right_keys: Vec<_> = right.items.iter().map(|i| i.key.as_slice()).collect();
        assert_eq!(left_keys, vec![b"a".as_slice(), b"b".as_slice()]);
        assert_eq!(right_keys, vec![b"d".as_slice(), b"e".as_slice()]);
    }

    #[test]
    fn split_distributes_children_evenly() {
        let mut node = leaf(&["b", "d", "f"]);
        node.children = (1..=4).map(PageId).collect();
        let (left, right, promoted) = node.split();
        assert_eq!(promoted.key, b"d");
        assert_eq!(left.children.len(), left.items.len() + 1);
        assert_eq!(right.children.len(), right.items.len() + 1);
        assert_eq!(left.children, vec![PageId(1), PageId(2)]);
        assert_eq!(right.children, vec![PageId(3), PageId(4)]);
    }

    #[test]
    fn split_reconstructs_the_original_sequence() {
        let node = leaf(&["a", "b", "c", "d", "e", "f", "g"]);
        let original: Vec<_> = node.items.clone();
        let (left, right, promoted) = node.split();
        let mut rebuilt = left.items.clone();
        rebuilt.push(promoted);
        rebuilt.extend(right.items.clone());
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn overpopulation_tracks_serialized_bytes() {
        let mut node = Node::new_leaf();
        let opts = options(128);
        while !node.is_overpopulated(&opts) {
            let key = format!("key-{:04}", node.items.len());
            node.insert(Item::new(key, "value"));
        }
        assert!(node.serialized_size() as f64 >= 128.0 * opts.split_fill);
        // One fewer item fits comfortably.
        node.items.pop();
        assert!(!node.is_overpopulated(&opts));
    }

    #[test]
    fn nodes_below_split_arity_are_never_overpopulated() {
        let opts = options(64);
        let mut node = Node::new_leaf();
        node.items.push(Item::new(vec![b'k'; 40], vec![b'v'; 40]));
        // Far past the byte trigger, but a split needs three items to
        // promote a median and leave both halves non-empty.
        assert!(node.serialized_size() as f64 >= 64.0 * opts.split_fill);
        assert!(!node.is_overpopulated(&opts));
        node.items.push(Item::new("z", "v"));
        assert!(!node.is_overpopulated(&opts));
    }

    #[test]
    fn overpopulation_honors_the_item_cap() {
        let opts = Options::with_max_items(3);
        let node = leaf(&["a", "b", "c"]);
        assert!(!node.is_overpopulated(&opts));
        let node = leaf(&["a", "b", "c", "d"]);
        assert!(node.is_overpopulated(&opts));
    }

    #[test]
    fn underpopulation_tracks_the_item_floor() {
        let opts = Options {
            min_items: 2,
            ..Options::default()
        };
        assert!(leaf(&["a"]).is_underpopulated(&opts));
        assert!(!leaf(&["a", "b"]).is_underpopulated(&opts));
    }
}

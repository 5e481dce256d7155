//! One named B-tree sharing the engine's page store.
//!
//! A collection is addressed by a caller-assigned page id holding its
//! header (`root: u64 LE, name_len: u16 LE, name bytes`). The collection
//! borrows the engine for its lifetime; it owns no pages itself, only the
//! identifiers naming them. Tree descent materializes nodes on demand and
//! tracks the ancestor id path explicitly, which is what keeps parent
//! relationships consistent on every node a split or rebalance touches.

use std::io::{Read, Seek, Write};
use std::mem;

use tracing::{debug, trace};

use crate::config::Options;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::pager::{read_u16, read_u64, write_u16, write_u64, PageCodec, PageId};
use crate::tree::node::{Item, Node, MAX_KEY_SIZE, MAX_VALUE_SIZE};

/// Persisted collection header: the root page id and the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHeader {
    pub root: PageId,
    pub name: String,
}

impl PageCodec for CollectionHeader {
    fn encode(&self, buf: &mut [u8]) -> Result<()> {
        let name = self.name.as_bytes();
        if name.len() > u16::MAX as usize || 10 + name.len() > buf.len() {
            return Err(EngineError::InvalidArgument(format!(
                "collection name of {} bytes does not fit in one page",
                name.len()
            )));
        }
        write_u64(buf, 0, self.root.0)?;
        write_u16(buf, 8, name.len() as u16)?;
        buf[10..10 + name.len()].copy_from_slice(name);
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let root = PageId(read_u64(buf, 0).map_err(corrupt_header)?);
        let name_len = read_u16(buf, 8).map_err(corrupt_header)? as usize;
        let name = buf.get(10..10 + name_len).ok_or_else(|| {
            EngineError::CorruptCollection("name length reads past the page".into())
        })?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|_| EngineError::CorruptCollection("name is not valid UTF-8".into()))?;
        if root.0 == 0 {
            return Err(EngineError::CorruptCollection(
                "root points at the metadata page".into(),
            ));
        }
        Ok(Self { root, name })
    }
}

fn corrupt_header(err: EngineError) -> EngineError {
    EngineError::CorruptCollection(err.to_string())
}

/// One independently named B-tree bound to an engine.
#[derive(Debug)]
pub struct Collection<'e, D> {
    id: PageId,
    name: String,
    root: PageId,
    engine: &'e mut Engine<D>,
}

impl<'e, D: Read + Write + Seek> Collection<'e, D> {
    /// Creates a new empty collection whose header lives at `id`: allocates
    /// a root leaf page and persists both.
    pub fn create(engine: &'e mut Engine<D>, id: PageId, name: &str) -> Result<Self> {
        let root = engine.allocate_page();
        let mut root_node = Node::new_leaf();
        root_node.id = root;
        engine.put_page(root, &root_node)?;

        let mut collection = Self {
            id,
            name: name.to_string(),
            root,
            engine,
        };
        collection.save_header()?;
        debug!(name, %root, "collection created");
        Ok(collection)
    }

    /// Opens the collection whose header lives at `id`.
    pub fn open(engine: &'e mut Engine<D>, id: PageId) -> Result<Self> {
        let header: CollectionHeader = engine.get_page(id)?;
        Ok(Self {
            id,
            name: header.name,
            root: header.root,
            engine,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    /// Looks up `key`, returning its value. The match may sit at any depth;
    /// descent stops early when an internal node holds the key.
    pub fn find(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        let (node, index, _) = self.locate(key)?;
        Ok(node.items[index].value.clone())
    }

    /// Inserts a new key/value pair. Fails with
    /// [`EngineError::DuplicateKey`] when the key already exists.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.validate_item(key, value)?;

        let mut path = Vec::new();
        let mut id = self.root;
        let mut leaf = loop {
            let node = self.node(id)?;
            match node.search(key) {
                Ok(_) => return Err(EngineError::DuplicateKey),
                Err(at) => {
                    if node.is_leaf() {
                        break node;
                    }
                    path.push(id);
                    id = node.children[at];
                }
            }
        };

        leaf.parent = path.last().copied().unwrap_or(PageId(0));
        leaf.insert(Item::new(key, value));
        if leaf.is_overpopulated(&self.options()) {
            self.split(leaf, &mut path)
        } else {
            self.engine.put_page(leaf.id, &leaf)
        }
    }

    /// Deletes `key`. Internal-node hits are reduced to a leaf deletion by
    /// pulling up the in-order predecessor; an underpopulated leaf is then
    /// rebalanced by rotation or merge, recursively up to the root.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        let (mut node, index, mut path) = self.locate(key)?;

        if node.is_leaf() {
            node.items.remove(index);
            self.engine.put_page(node.id, &node)?;
            return self.rebalance(node, path);
        }

        // Delete by replacement: swap in the rightmost item of the left
        // subtree, then treat this as a deletion from that leaf.
        path.push(node.id);
        let mut child_id = node.children[index];
        let mut leaf = loop {
            let child = self.node(child_id)?;
            if child.is_leaf() {
                break child;
            }
            path.push(child_id);
            child_id = child.children.last().copied().ok_or_else(|| {
                EngineError::CorruptPage("internal node without children".into())
            })?;
        };
        let predecessor = leaf.items.pop().ok_or_else(|| {
            EngineError::CorruptPage("empty leaf on the predecessor chain".into())
        })?;
        node.items[index] = predecessor;
        self.engine.put_page(node.id, &node)?;
        self.engine.put_page(leaf.id, &leaf)?;
        self.rebalance(leaf, path)
    }

    /// In-order traversal of every item in the collection.
    pub fn scan(&mut self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, cursor)) = stack.pop() {
            let node = self.node(id)?;
            if node.is_leaf() {
                items.extend(node.items);
                continue;
            }
            // Internal node: emit children interleaved with items.
            if cursor <= node.items.len() {
                if cursor > 0 {
                    items.push(node.items[cursor - 1].clone());
                }
                stack.push((id, cursor + 1));
                stack.push((node.children[cursor], 0));
            }
        }
        Ok(items)
    }

    fn locate(&mut self, key: &[u8]) -> Result<(Node, usize, Vec<PageId>)> {
        let mut path = Vec::new();
        let mut id = self.root;
        loop {
            let node = self.node(id)?;
            match node.search(key) {
                Ok(index) => return Ok((node, index, path)),
                Err(at) => {
                    if node.is_leaf() {
                        return Err(EngineError::KeyNotFound);
                    }
                    path.push(id);
                    id = node.children[at];
                }
            }
        }
    }

    /// Splits an overpopulated node, promoting its median into the parent,
    /// and recurses upward while the parent overflows in turn. The split
    /// node's page is released; the halves get fresh pages.
    fn split(&mut self, node: Node, path: &mut Vec<PageId>) -> Result<()> {
        let old_id = node.id;
        let mut parent = match path.pop() {
            Some(parent_id) => self.node(parent_id)?,
            None => {
                // Splitting the root: a new root takes its place.
                let mut new_root = Node::new_leaf();
                new_root.id = self.engine.allocate_page();
                self.root = new_root.id;
                self.save_header()?;
                new_root
            }
        };

        let (mut left, mut right, promoted) = node.split();
        self.engine.release_page(old_id);
        left.id = self.engine.allocate_page();
        right.id = self.engine.allocate_page();
        left.parent = parent.id;
        right.parent = parent.id;

        let at = parent.insert(promoted);
        if parent.children.is_empty() {
            parent.add_child(0, left.id);
            parent.add_child(1, right.id);
        } else {
            // The halves replace the single former child slot.
            debug_assert_eq!(parent.children[at], old_id);
            parent.add_child(at, left.id);
            parent.insert_child(at + 1, right.id);
        }

        debug!(
            split = %old_id,
            left = %left.id,
            right = %right.id,
            parent = %parent.id,
            "node split"
        );
        self.engine.put_page(left.id, &left)?;
        self.engine.put_page(right.id, &right)?;
        if parent.is_overpopulated(&self.options()) {
            self.split(parent, path)
        } else {
            self.engine.put_page(parent.id, &parent)
        }
    }

    /// Restores the minimum fill after a deletion, walking the ancestor
    /// path upward: rotate from a sibling that can spare an item, otherwise
    /// merge with one, and collapse the root when a merge empties it. A
    /// merge whose result would not stay under the split trigger is
    /// skipped, leaving the node under-filled.
    fn rebalance(&mut self, mut node: Node, mut path: Vec<PageId>) -> Result<()> {
        let options = self.options();
        loop {
            if node.id == self.root {
                if node.items.is_empty() && node.children.len() == 1 {
                    return self.collapse_root(node);
                }
                return Ok(());
            }
            if !node.is_underpopulated(&options) {
                return Ok(());
            }

            let parent_id = path.pop().ok_or_else(|| {
                EngineError::CorruptPage("non-root node with an empty ancestor path".into())
            })?;
            let mut parent = self.node(parent_id)?;
            let index = parent.child_index(node.id).ok_or_else(|| {
                EngineError::CorruptPage("node id missing from its parent's children".into())
            })?;

            if index > 0 {
                let left = self.node(parent.children[index - 1])?;
                if left.items.len() > options.min_items {
                    return self.rotate_right(parent, left, node, index);
                }
            }
            if index + 1 < parent.children.len() {
                let right = self.node(parent.children[index + 1])?;
                if right.items.len() > options.min_items {
                    return self.rotate_left(parent, node, right, index);
                }
            }

            // Neither sibling can spare an item: merge with one, provided
            // the combined node stays under the split trigger, then
            // re-examine the parent at the next level up. A merge that
            // would overflow is skipped and the node runs under-filled
            // until later traffic reshapes this region. The superseded
            // page is released only after its replacement persists.
            if index > 0 {
                let mut left = self.node(parent.children[index - 1])?;
                left.items.push(parent.items[index - 1].clone());
                left.items.append(&mut node.items);
                left.children.append(&mut node.children);
                if left.is_overpopulated(&options) {
                    trace!(node = %node.id, sibling = %left.id, "merge skipped, would overflow");
                    return Ok(());
                }
                parent.items.remove(index - 1);
                parent.children.remove(index);
                self.engine.put_page(left.id, &left)?;
                self.engine.put_page(parent.id, &parent)?;
                self.engine.release_page(node.id);
                trace!(merged = %node.id, into = %left.id, "merged into left sibling");
            } else {
                let right_id = parent.children[index + 1];
                let mut right = self.node(right_id)?;
                node.items.push(parent.items[index].clone());
                node.items.append(&mut right.items);
                node.children.append(&mut right.children);
                if node.is_overpopulated(&options) {
                    trace!(node = %node.id, sibling = %right_id, "merge skipped, would overflow");
                    return Ok(());
                }
                parent.items.remove(index);
                parent.children.remove(index + 1);
                self.engine.put_page(node.id, &node)?;
                self.engine.put_page(parent.id, &parent)?;
                self.engine.release_page(right_id);
                trace!(merged = %right_id, into = %node.id, "merged right sibling");
            }
            node = parent;
        }
    }

    /// Moves the left sibling's last item up through the parent and the
    /// separating key down into the deficient node.
    fn rotate_right(
        &mut self,
        mut parent: Node,
        mut left: Node,
        mut node: Node,
        index: usize,
    ) -> Result<()> {
        let spare = left.items.remove(left.items.len() - 1);
        let separator = mem::replace(&mut parent.items[index - 1], spare);
        node.items.insert(0, separator);
        if !node.is_leaf() {
            let shifted = left.children.pop().ok_or_else(|| {
                EngineError::CorruptPage("internal sibling without children".into())
            })?;
            node.children.insert(0, shifted);
        }
        trace!(from = %left.id, to = %node.id, "rotated right");
        self.engine.put_page(left.id, &left)?;
        self.engine.put_page(node.id, &node)?;
        self.engine.put_page(parent.id, &parent)
    }

    /// Mirror of [`rotate_right`] borrowing from the right sibling.
    ///
    /// [`rotate_right`]: Collection::rotate_right
    fn rotate_left(
        &mut self,
        mut parent: Node,
        mut node: Node,
        mut right: Node,
        index: usize,
    ) -> Result<()> {
        let spare = right.items.remove(0);
        let separator = mem::replace(&mut parent.items[index], spare);
        node.items.push(separator);
        if !node.is_leaf() {
            if right.children.is_empty() {
                return Err(EngineError::CorruptPage(
                    "internal sibling without children".into(),
                ));
            }
            node.children.push(right.children.remove(0));
        }
        trace!(from = %right.id, to = %node.id, "rotated left");
        self.engine.put_page(right.id, &right)?;
        self.engine.put_page(node.id, &node)?;
        self.engine.put_page(parent.id, &parent)
    }

    /// An empty root with a single child hands the tree over to that child.
    fn collapse_root(&mut self, root: Node) -> Result<()> {
        let child_id = root.children[0];
        self.engine.release_page(root.id);
        self.root = child_id;
        self.save_header()?;
        let mut child = self.node(child_id)?;
        child.parent = PageId(0);
        self.engine.put_page(child_id, &child)?;
        debug!(old = %root.id, new = %child_id, "root collapsed");
        Ok(())
    }

    fn node(&mut self, id: PageId) -> Result<Node> {
        let mut node: Node = self.engine.get_page(id)?;
        node.id = id;
        Ok(node)
    }

    fn save_header(&mut self) -> Result<()> {
        let header = CollectionHeader {
            root: self.root,
            name: self.name.clone(),
        };
        self.engine.put_page(self.id, &header)
    }

    fn options(&self) -> Options {
        self.engine.options().clone()
    }

    fn validate_item(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(EngineError::InvalidArgument("key must not be empty".into()));
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(EngineError::InvalidArgument(format!(
                "key of {} bytes exceeds the maximum of {MAX_KEY_SIZE}",
                key.len()
            )));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(EngineError::InvalidArgument(format!(
                "value of {} bytes exceeds the maximum of {MAX_VALUE_SIZE}",
                value.len()
            )));
        }
        // An internal node holding two worst-case copies of this item must
        // still sit under the split trigger: a node that crosses the
        // trigger with fewer than three items has no way to split into two
        // non-empty halves.
        let options = self.engine.options();
        let worst_pair = 11 + 8 + 2 * (8 + 2 + 2 + key.len() + value.len());
        if worst_pair as f64 >= options.page_size as f64 * options.split_fill {
            return Err(EngineError::InvalidArgument(format!(
                "item of {} bytes is too large for the {}-byte page and its split policy",
                key.len() + value.len(),
                options.page_size
            )));
        }
        Ok(())
    }
}

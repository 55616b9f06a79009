use crate::node::{NodeHandle, NODE_HDR};
use crate::{KeyDef, IX_BASE};
use common::ids::{ContainerId, Iid, PageId, Rid, NO_PAGE, RID_SIZE};
use common::{DataType, QuarryError, PAGE_SIZE};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, RwLock};

use heapstore::buffer_pool::BufferPool;

/// The header page of an index file.
#[derive(Debug, Clone)]
pub struct IndexFileHdr {
    pub root: PageId,
    pub first_leaf: PageId,
    pub last_leaf: PageId,
    pub num_pages: PageId,
    pub keydef: KeyDef,
}

impl IndexFileHdr {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.root.to_le_bytes());
        buf.extend_from_slice(&self.first_leaf.to_le_bytes());
        buf.extend_from_slice(&self.last_leaf.to_le_bytes());
        buf.extend_from_slice(&self.num_pages.to_le_bytes());
        buf.extend_from_slice(&(self.keydef.key_len as u16).to_le_bytes());
        buf.extend_from_slice(&(self.keydef.cols.len() as u16).to_le_bytes());
        for (dtype, len) in &self.keydef.cols {
            let tag: u8 = match dtype {
                DataType::Int => 0,
                DataType::Float => 1,
                DataType::Char(_) => 2,
            };
            buf.push(tag);
            buf.extend_from_slice(&(*len as u16).to_le_bytes());
        }
        buf
    }

    fn from_bytes(data: &[u8]) -> Result<Self, QuarryError> {
        let u16_at = |off: usize| u16::from_le_bytes([data[off], data[off + 1]]);
        let num_cols = u16_at(10) as usize;
        let mut cols = Vec::with_capacity(num_cols);
        let mut pos = 12;
        for _ in 0..num_cols {
            let tag = data[pos];
            let len = u16::from_le_bytes([data[pos + 1], data[pos + 2]]) as usize;
            let dtype = match tag {
                0 => DataType::Int,
                1 => DataType::Float,
                2 => DataType::Char(len as u16),
                _ => {
                    return Err(QuarryError::InternalError(format!(
                        "Corrupt index header: column tag {}",
                        tag
                    )))
                }
            };
            cols.push((dtype, len));
            pos += 3;
        }
        let keydef = KeyDef::new(cols);
        if keydef.key_len != u16_at(8) as usize {
            return Err(QuarryError::InternalError(String::from(
                "Corrupt index header: key length mismatch",
            )));
        }
        Ok(IndexFileHdr {
            root: u16_at(0),
            first_leaf: u16_at(2),
            last_leaf: u16_at(4),
            num_pages: u16_at(6),
            keydef,
        })
    }
}

/// A handle to one open B+-tree index.
///
/// All page access is pinned through the buffer pool and unpinned with the
/// right dirty bit on every path. Structural mutations serialize on the
/// root latch, which protects the root identity; readers only take the
/// header lock.
pub struct IndexHandle {
    pub container_id: ContainerId,
    bp: Arc<BufferPool>,
    hdr: RwLock<IndexFileHdr>,
    max_size: usize,
    root_latch: Mutex<()>,
}

fn node_capacity(key_len: usize) -> usize {
    (PAGE_SIZE - IX_BASE - NODE_HDR) / (key_len + RID_SIZE)
}

impl IndexHandle {
    /// Initialize a fresh index file: header page plus an empty leaf root.
    pub fn create(
        container_id: ContainerId,
        bp: Arc<BufferPool>,
        keydef: KeyDef,
    ) -> Result<Self, QuarryError> {
        let max_size = node_capacity(keydef.key_len);
        if max_size < 4 {
            return Err(QuarryError::ValidationError(format!(
                "Index key of {} bytes is too long",
                keydef.key_len
            )));
        }
        let (hdr_pid, _hdr_frame) = bp.new_page(container_id)?;
        if hdr_pid != 0 {
            bp.unpin(container_id, hdr_pid, false)?;
            return Err(QuarryError::InternalError(String::from(
                "Index file is not empty",
            )));
        }
        bp.unpin(container_id, hdr_pid, true)?;

        let handle = IndexHandle {
            container_id,
            bp,
            hdr: RwLock::new(IndexFileHdr {
                root: NO_PAGE,
                first_leaf: NO_PAGE,
                last_leaf: NO_PAGE,
                num_pages: 1,
                keydef,
            }),
            max_size,
            root_latch: Mutex::new(()),
        };
        let root = handle.create_node()?;
        root.init(true, NO_PAGE);
        {
            let mut hdr = handle.hdr.write().unwrap();
            hdr.root = root.pid;
            hdr.first_leaf = root.pid;
            hdr.last_leaf = root.pid;
        }
        handle.unpin_node(&root, true)?;
        handle.write_header()?;
        Ok(handle)
    }

    /// Open an existing index file by reading its header page.
    pub fn open(container_id: ContainerId, bp: Arc<BufferPool>) -> Result<Self, QuarryError> {
        let frame = bp.fetch_page(container_id, 0)?;
        let hdr = {
            let page = frame.read().unwrap();
            IndexFileHdr::from_bytes(&page.data[IX_BASE..])
        };
        bp.unpin(container_id, 0, false)?;
        let hdr = hdr?;
        let max_size = node_capacity(hdr.keydef.key_len);
        Ok(IndexHandle {
            container_id,
            bp,
            hdr: RwLock::new(hdr),
            max_size,
            root_latch: Mutex::new(()),
        })
    }

    pub fn keydef(&self) -> KeyDef {
        self.hdr.read().unwrap().keydef.clone()
    }

    /// Persist the header page and flush all dirty index pages.
    pub fn flush(&self) -> Result<(), QuarryError> {
        self.write_header()?;
        self.bp.flush_all(self.container_id)
    }

    fn write_header(&self) -> Result<(), QuarryError> {
        let bytes = self.hdr.read().unwrap().to_bytes();
        let frame = self.bp.fetch_page(self.container_id, 0)?;
        {
            let mut page = frame.write().unwrap();
            page.data[IX_BASE..IX_BASE + bytes.len()].copy_from_slice(&bytes);
        }
        self.bp.unpin(self.container_id, 0, true)
    }

    fn fetch_node(&self, pid: PageId) -> Result<NodeHandle, QuarryError> {
        let frame = self.bp.fetch_page(self.container_id, pid)?;
        let key_len = self.hdr.read().unwrap().keydef.key_len;
        Ok(NodeHandle::new(pid, frame, key_len, self.max_size))
    }

    fn create_node(&self) -> Result<NodeHandle, QuarryError> {
        let (pid, frame) = self.bp.new_page(self.container_id)?;
        let mut hdr = self.hdr.write().unwrap();
        hdr.num_pages += 1;
        Ok(NodeHandle::new(
            pid,
            frame,
            hdr.keydef.key_len,
            self.max_size,
        ))
    }

    fn unpin_node(&self, node: &NodeHandle, dirty: bool) -> Result<(), QuarryError> {
        self.bp.unpin(self.container_id, node.pid, dirty)
    }

    /// Drop a node removed from the tree. The caller's pin is consumed by
    /// the buffer pool; this is the only release path for dead pages.
    fn release_node(&self, node: NodeHandle) -> Result<(), QuarryError> {
        self.hdr.write().unwrap().num_pages -= 1;
        self.bp.delete_page(self.container_id, node.pid)
    }

    /// Descend from the root to the leaf that may hold `key`. Interior
    /// nodes are unpinned as soon as the next level is pinned; the returned
    /// leaf is pinned.
    fn find_leaf(&self, key: &[u8]) -> Result<NodeHandle, QuarryError> {
        let (root, keydef) = {
            let hdr = self.hdr.read().unwrap();
            (hdr.root, hdr.keydef.clone())
        };
        let mut node = self.fetch_node(root)?;
        while !node.is_leaf() {
            let child_pid = node.internal_lookup(&keydef, key);
            let child = self.fetch_node(child_pid)?;
            self.unpin_node(&node, false)?;
            node = child;
        }
        Ok(node)
    }

    /// Point lookup.
    pub fn get(&self, key: &[u8]) -> Result<Option<Rid>, QuarryError> {
        let keydef = self.keydef();
        let leaf = self.find_leaf(key)?;
        let pos = leaf.lower_bound(&keydef, key);
        let result = if pos < leaf.num_keys()
            && keydef.compare(key, &leaf.get_key(pos)) == Ordering::Equal
        {
            Some(leaf.get_rid(pos))
        } else {
            None
        };
        self.unpin_node(&leaf, false)?;
        Ok(result)
    }

    /// Insert a key. Returns the page the entry landed on, or None when the
    /// key already exists (keys are unique).
    pub fn insert(&self, key: &[u8], rid: Rid) -> Result<Option<PageId>, QuarryError> {
        let _guard = self.root_latch.lock().unwrap();
        let keydef = self.keydef();
        let leaf = self.find_leaf(key)?;
        let pos = leaf.lower_bound(&keydef, key);
        if pos < leaf.num_keys() && keydef.compare(key, &leaf.get_key(pos)) == Ordering::Equal {
            self.unpin_node(&leaf, false)?;
            return Ok(None);
        }
        leaf.insert_pair(pos, key, rid)?;
        // Only an insert at the head can invalidate ancestor separators.
        if pos == 0 {
            self.maintain_parent(leaf.pid)?;
        }

        if leaf.num_keys() == self.max_size {
            let sibling = self.split_node(&leaf)?;
            if leaf.pid == self.hdr.read().unwrap().last_leaf {
                self.hdr.write().unwrap().last_leaf = sibling.pid;
            }
            let sep = sibling.get_key(0);
            self.insert_into_parent(&leaf, &sep, &sibling)?;
            let landed = if keydef.compare(key, &sep) != Ordering::Less {
                sibling.pid
            } else {
                leaf.pid
            };
            self.unpin_node(&sibling, true)?;
            self.unpin_node(&leaf, true)?;
            return Ok(Some(landed));
        }

        let pid = leaf.pid;
        self.unpin_node(&leaf, true)?;
        Ok(Some(pid))
    }

    /// Split a full node: a new right sibling takes the upper half.
    /// Both nodes stay pinned for the caller.
    fn split_node(&self, node: &NodeHandle) -> Result<NodeHandle, QuarryError> {
        let sibling = self.create_node()?;
        sibling.init(node.is_leaf(), node.parent());
        if node.is_leaf() {
            sibling.set_prev_leaf(node.pid);
            sibling.set_next_leaf(node.next_leaf());
            node.set_next_leaf(sibling.pid);
            if sibling.next_leaf() != NO_PAGE {
                let next = self.fetch_node(sibling.next_leaf())?;
                next.set_prev_leaf(sibling.pid);
                self.unpin_node(&next, true)?;
            }
        }
        let split_point = self.max_size / 2;
        let moved = node.num_keys() - split_point;
        let keys = node.keys_from(split_point);
        let rids = node.rids_from(split_point);
        sibling.insert_pairs(0, &keys, &rids, moved)?;
        node.set_num_keys(split_point);
        if !sibling.is_leaf() {
            for i in 0..sibling.num_keys() {
                self.maintain_child(&sibling, i)?;
            }
        }
        Ok(sibling)
    }

    /// Hook a freshly split sibling into the parent, growing a new root if
    /// the split reached the top.
    fn insert_into_parent(
        &self,
        old: &NodeHandle,
        key: &[u8],
        new: &NodeHandle,
    ) -> Result<(), QuarryError> {
        if old.pid == self.hdr.read().unwrap().root {
            let root = self.create_node()?;
            root.init(false, NO_PAGE);
            root.insert_pair(0, &old.get_key(0), Rid::new(old.pid, 0))?;
            root.insert_pair(1, key, Rid::new(new.pid, 0))?;
            old.set_parent(root.pid);
            new.set_parent(root.pid);
            self.hdr.write().unwrap().root = root.pid;
            self.unpin_node(&root, true)?;
            return Ok(());
        }
        let parent = self.fetch_node(old.parent())?;
        let idx = parent.find_child(old.pid)?;
        parent.insert_pair(idx + 1, key, Rid::new(new.pid, 0))?;
        new.set_parent(parent.pid);
        if parent.num_keys() == self.max_size {
            let sibling = self.split_node(&parent)?;
            let sep = sibling.get_key(0);
            self.insert_into_parent(&parent, &sep, &sibling)?;
            self.unpin_node(&sibling, true)?;
        }
        self.unpin_node(&parent, true)
    }

    /// Rewrite stale separators from `pid` toward the root, stopping at the
    /// first ancestor whose separator already matches.
    fn maintain_parent(&self, mut pid: PageId) -> Result<(), QuarryError> {
        loop {
            let node = self.fetch_node(pid)?;
            let parent_pid = node.parent();
            let first_key = node.get_key(0);
            self.unpin_node(&node, false)?;
            if parent_pid == NO_PAGE {
                return Ok(());
            }
            let parent = self.fetch_node(parent_pid)?;
            let rank = parent.find_child(pid)?;
            if parent.get_key(rank) == first_key {
                self.unpin_node(&parent, false)?;
                return Ok(());
            }
            parent.set_key(rank, &first_key);
            self.unpin_node(&parent, true)?;
            pid = parent_pid;
        }
    }

    /// Point the parent link of the child in slot `i` back at `node`.
    fn maintain_child(&self, node: &NodeHandle, i: usize) -> Result<(), QuarryError> {
        if node.is_leaf() {
            return Ok(());
        }
        let child = self.fetch_node(node.child_at(i))?;
        child.set_parent(node.pid);
        self.unpin_node(&child, true)
    }

    /// Remove a key. Returns false when the key was absent.
    pub fn erase(&self, key: &[u8]) -> Result<bool, QuarryError> {
        let _guard = self.root_latch.lock().unwrap();
        let keydef = self.keydef();
        let leaf = self.find_leaf(key)?;
        let pos = leaf.lower_bound(&keydef, key);
        if pos == leaf.num_keys() || keydef.compare(key, &leaf.get_key(pos)) != Ordering::Equal {
            self.unpin_node(&leaf, false)?;
            return Ok(false);
        }
        leaf.erase_pair(pos)?;
        if pos == 0 && leaf.num_keys() > 0 {
            self.maintain_parent(leaf.pid)?;
        }
        self.coalesce_or_redistribute(leaf)?;
        Ok(true)
    }

    /// Rebalance after a removal. Consumes the node handle: the node is
    /// unpinned, or deleted when it merges away.
    fn coalesce_or_redistribute(&self, node: NodeHandle) -> Result<(), QuarryError> {
        if node.pid == self.hdr.read().unwrap().root {
            return self.adjust_root(node);
        }
        if node.num_keys() >= self.max_size / 2 {
            return self.unpin_node(&node, true);
        }
        let parent = self.fetch_node(node.parent())?;
        let node_idx = parent.find_child(node.pid)?;

        // Prefer the left sibling; the leftmost child pairs with its right
        // neighbor instead. Normalize so `left` precedes `right`.
        let (left, right, right_idx) = if node_idx > 0 {
            let neighbor = self.fetch_node(parent.child_at(node_idx - 1))?;
            (neighbor, node, node_idx)
        } else {
            let neighbor = self.fetch_node(parent.child_at(1))?;
            (node, neighbor, 1)
        };

        if left.num_keys() + right.num_keys() >= self.max_size {
            self.redistribute(&left, &right, &parent, right_idx, node_idx == 0)?;
            self.unpin_node(&left, true)?;
            self.unpin_node(&right, true)?;
            self.unpin_node(&parent, true)
        } else {
            self.coalesce(&left, right, &parent, right_idx)?;
            self.unpin_node(&left, true)?;
            // The parent lost an entry; rebalance it in turn.
            self.coalesce_or_redistribute(parent)
        }
    }

    /// Move one entry across the separator between two siblings and rewrite
    /// the parent separator. `node_is_left` says which side came up short.
    fn redistribute(
        &self,
        left: &NodeHandle,
        right: &NodeHandle,
        parent: &NodeHandle,
        right_idx: usize,
        node_is_left: bool,
    ) -> Result<(), QuarryError> {
        if node_is_left {
            // Shift the right sibling's first entry onto the left's tail.
            let key = right.get_key(0);
            let rid = right.get_rid(0);
            left.insert_pair(left.num_keys(), &key, rid)?;
            right.erase_pair(0)?;
            if !left.is_leaf() {
                self.maintain_child(left, left.num_keys() - 1)?;
            }
        } else {
            // Shift the left sibling's last entry onto the right's head.
            let last = left.num_keys() - 1;
            let key = left.get_key(last);
            let rid = left.get_rid(last);
            right.insert_pair(0, &key, rid)?;
            left.set_num_keys(last);
            if !right.is_leaf() {
                self.maintain_child(right, 0)?;
            }
        }
        parent.set_key(right_idx, &right.get_key(0));
        Ok(())
    }

    /// Merge `right` into `left` and delete `right`'s page. The parent
    /// entry for `right` is removed; the caller rebalances the parent.
    fn coalesce(
        &self,
        left: &NodeHandle,
        right: NodeHandle,
        parent: &NodeHandle,
        right_idx: usize,
    ) -> Result<(), QuarryError> {
        let start = left.num_keys();
        let moved = right.num_keys();
        let keys = right.keys_from(0);
        let rids = right.rids_from(0);
        left.insert_pairs(start, &keys, &rids, moved)?;
        if !left.is_leaf() {
            for i in start..left.num_keys() {
                self.maintain_child(left, i)?;
            }
        } else {
            left.set_next_leaf(right.next_leaf());
            if right.next_leaf() != NO_PAGE {
                let next = self.fetch_node(right.next_leaf())?;
                next.set_prev_leaf(left.pid);
                self.unpin_node(&next, true)?;
            } else {
                self.hdr.write().unwrap().last_leaf = left.pid;
            }
        }
        parent.erase_pair(right_idx)?;
        self.release_node(right)
    }

    /// Root-specific shrink rules. Consumes the root handle.
    fn adjust_root(&self, root: NodeHandle) -> Result<(), QuarryError> {
        if !root.is_leaf() && root.num_keys() == 1 {
            // An internal root of one child is replaced by that child.
            let child = self.fetch_node(root.child_at(0))?;
            child.set_parent(NO_PAGE);
            self.hdr.write().unwrap().root = child.pid;
            self.unpin_node(&child, true)?;
            return self.release_node(root);
        }
        if root.is_leaf() && root.num_keys() == 0 {
            // Empty tree again: the root leaf is the whole chain.
            let mut hdr = self.hdr.write().unwrap();
            hdr.first_leaf = root.pid;
            hdr.last_leaf = root.pid;
        }
        self.unpin_node(&root, true)
    }

    /// First position whose key is >= `key`.
    pub fn lower_bound(&self, key: &[u8]) -> Result<Iid, QuarryError> {
        let keydef = self.keydef();
        let leaf = self.find_leaf(key)?;
        let pos = leaf.lower_bound(&keydef, key);
        let iid = self.leaf_pos_to_iid(&leaf, pos)?;
        self.unpin_node(&leaf, false)?;
        Ok(iid)
    }

    /// First position whose key is > `key`.
    pub fn upper_bound(&self, key: &[u8]) -> Result<Iid, QuarryError> {
        let keydef = self.keydef();
        let leaf = self.find_leaf(key)?;
        let pos = leaf.upper_bound_from(&keydef, key, 0);
        let iid = self.leaf_pos_to_iid(&leaf, pos)?;
        self.unpin_node(&leaf, false)?;
        Ok(iid)
    }

    /// A position one past a non-last leaf's keys names the next leaf's
    /// first slot.
    fn leaf_pos_to_iid(&self, leaf: &NodeHandle, pos: usize) -> Result<Iid, QuarryError> {
        if pos == leaf.num_keys() && leaf.pid != self.hdr.read().unwrap().last_leaf {
            Ok(Iid::new(leaf.next_leaf(), 0))
        } else {
            Ok(Iid::new(leaf.pid, pos as u16))
        }
    }

    /// Position of the first entry in the tree.
    pub fn leaf_begin(&self) -> Result<Iid, QuarryError> {
        Ok(Iid::new(self.hdr.read().unwrap().first_leaf, 0))
    }

    /// Position one past the last entry in the tree.
    pub fn leaf_end(&self) -> Result<Iid, QuarryError> {
        let last = self.hdr.read().unwrap().last_leaf;
        let node = self.fetch_node(last)?;
        let iid = Iid::new(last, node.num_keys_slot());
        self.unpin_node(&node, false)?;
        Ok(iid)
    }

    /// The rid stored at an index position.
    pub fn get_rid(&self, iid: Iid) -> Result<Rid, QuarryError> {
        let node = self.fetch_node(iid.page_id)?;
        if iid.slot_id as usize >= node.num_keys() {
            self.unpin_node(&node, false)?;
            return Err(QuarryError::InternalError(format!(
                "Index slot {} out of range on page {}",
                iid.slot_id, iid.page_id
            )));
        }
        let rid = node.get_rid(iid.slot_id as usize);
        self.unpin_node(&node, false)?;
        Ok(rid)
    }

    /// Advance an Iid by one position, hopping leaves over the chain.
    pub fn next_iid(&self, iid: Iid) -> Result<Iid, QuarryError> {
        let node = self.fetch_node(iid.page_id)?;
        let mut next = Iid::new(iid.page_id, iid.slot_id + 1);
        if next.slot_id as usize >= node.num_keys()
            && iid.page_id != self.hdr.read().unwrap().last_leaf
        {
            next = Iid::new(node.next_leaf(), 0);
        }
        self.unpin_node(&node, false)?;
        Ok(next)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::testutil::init;
    use heapstore::heapfile::HeapFile;
    use std::collections::HashSet;
    use temp_testdir::TempDir;

    fn int_keydef() -> KeyDef {
        KeyDef::new(vec![(DataType::Int, 4)])
    }

    fn int_key(v: i32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    fn new_index(keydef: KeyDef) -> (TempDir, IndexHandle) {
        init();
        let tdir = TempDir::new(common::testutil::gen_random_dir(), true);
        let mut path = tdir.to_path_buf();
        path.push("t_a.idx");
        let bp = Arc::new(BufferPool::new());
        bp.register_file(Arc::new(HeapFile::new(path, 9).unwrap()));
        let ih = IndexHandle::create(9, bp, keydef).unwrap();
        (tdir, ih)
    }

    /// Walk the whole tree checking the structural invariants: occupancy,
    /// separator = child minimum, parent links, and the leaf chain.
    fn validate(ih: &IndexHandle) {
        let hdr = ih.hdr.read().unwrap().clone();
        let keydef = hdr.keydef.clone();
        let mut leaves_seen = Vec::new();
        let mut stack = vec![hdr.root];
        let mut visited = HashSet::new();
        while let Some(pid) = stack.pop() {
            assert!(visited.insert(pid), "cycle at page {}", pid);
            let node = ih.fetch_node(pid).unwrap();
            let n = node.num_keys();
            if pid != hdr.root {
                assert!(n >= ih.max_size / 2, "underfull node {}", pid);
            }
            assert!(n <= ih.max_size, "overfull node {}", pid);
            for i in 1..n {
                assert_eq!(
                    Ordering::Less,
                    keydef.compare(&node.get_key(i - 1), &node.get_key(i)),
                    "unsorted keys in node {}",
                    pid
                );
            }
            if node.is_leaf() {
                leaves_seen.push(pid);
            } else {
                assert!(n >= 2 || pid != hdr.root, "internal root below 2 children");
                for i in 0..n {
                    let child = ih.fetch_node(node.child_at(i)).unwrap();
                    assert_eq!(pid, child.parent(), "bad parent link");
                    assert_eq!(
                        node.get_key(i),
                        child.get_key(0),
                        "separator is not child minimum"
                    );
                    stack.push(child.pid);
                    ih.unpin_node(&child, false).unwrap();
                }
            }
            ih.unpin_node(&node, false).unwrap();
        }
        // The chain visits exactly the reachable leaves, in order.
        let mut chain = Vec::new();
        let mut pid = hdr.first_leaf;
        loop {
            chain.push(pid);
            let node = ih.fetch_node(pid).unwrap();
            assert!(node.is_leaf(), "chain reaches a non-leaf");
            let next = node.next_leaf();
            ih.unpin_node(&node, false).unwrap();
            if pid == hdr.last_leaf {
                break;
            }
            pid = next;
        }
        let chain_set: HashSet<PageId> = chain.iter().copied().collect();
        let leaves_set: HashSet<PageId> = leaves_seen.iter().copied().collect();
        assert_eq!(chain_set, leaves_set, "leaf chain misses leaves");
        assert_eq!(chain.len(), chain_set.len(), "leaf chain has a cycle");
    }

    #[test]
    fn test_insert_get_simple() {
        let (_t, ih) = new_index(int_keydef());
        assert!(ih.insert(&int_key(5), Rid::new(1, 1)).unwrap().is_some());
        assert!(ih.insert(&int_key(3), Rid::new(1, 2)).unwrap().is_some());
        assert_eq!(Some(Rid::new(1, 1)), ih.get(&int_key(5)).unwrap());
        assert_eq!(Some(Rid::new(1, 2)), ih.get(&int_key(3)).unwrap());
        assert_eq!(None, ih.get(&int_key(4)).unwrap());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (_t, ih) = new_index(int_keydef());
        assert!(ih.insert(&int_key(1), Rid::new(1, 1)).unwrap().is_some());
        assert!(ih.insert(&int_key(1), Rid::new(1, 2)).unwrap().is_none());
        assert_eq!(Some(Rid::new(1, 1)), ih.get(&int_key(1)).unwrap());
    }

    #[test]
    fn test_many_inserts_split_and_lookup() {
        let (_t, ih) = new_index(int_keydef());
        // Enough keys to force several levels of splits.
        let n = 5000;
        for i in 0..n {
            // Insert in a scattered order.
            let v = (i * 37) % n;
            assert!(
                ih.insert(&int_key(v), Rid::new((v / 100) as u16, (v % 100) as u16))
                    .unwrap()
                    .is_some(),
                "insert of {} failed",
                v
            );
        }
        validate(&ih);
        for v in 0..n {
            assert_eq!(
                Some(Rid::new((v / 100) as u16, (v % 100) as u16)),
                ih.get(&int_key(v)).unwrap(),
                "lookup of {} failed",
                v
            );
        }
    }

    #[test]
    fn test_bounds_and_scan_order() {
        let (_t, ih) = new_index(int_keydef());
        for v in (0..1000).step_by(2) {
            ih.insert(&int_key(v), Rid::new(0, v as u16)).unwrap();
        }
        // lower_bound of a present key lands on it; of an absent key on the
        // next larger one.
        let lb = ih.lower_bound(&int_key(10)).unwrap();
        assert_eq!(Rid::new(0, 10), ih.get_rid(lb).unwrap());
        let lb = ih.lower_bound(&int_key(11)).unwrap();
        assert_eq!(Rid::new(0, 12), ih.get_rid(lb).unwrap());
        // upper_bound is strictly past equal keys.
        let ub = ih.upper_bound(&int_key(10)).unwrap();
        assert_eq!(Rid::new(0, 12), ih.get_rid(ub).unwrap());
        // Full scan is ordered and complete.
        let mut iid = ih.leaf_begin().unwrap();
        let end = ih.leaf_end().unwrap();
        let mut expect = 0u16;
        while iid != end {
            assert_eq!(Rid::new(0, expect), ih.get_rid(iid).unwrap());
            expect += 2;
            iid = ih.next_iid(iid).unwrap();
        }
        assert_eq!(1000, expect);
    }

    #[test]
    fn test_lower_upper_interval_is_equal_range() {
        let (_t, ih) = new_index(int_keydef());
        for v in 0..500 {
            ih.insert(&int_key(v), Rid::new(0, v as u16)).unwrap();
        }
        let lo = ih.lower_bound(&int_key(123)).unwrap();
        let hi = ih.upper_bound(&int_key(123)).unwrap();
        // Exactly one entry equals the key.
        assert_eq!(hi, ih.next_iid(lo).unwrap());
        assert_eq!(Rid::new(0, 123), ih.get_rid(lo).unwrap());
    }

    #[test]
    fn test_erase_and_rebalance() {
        let (_t, ih) = new_index(int_keydef());
        let n = 3000;
        for v in 0..n {
            ih.insert(&int_key(v), Rid::new(0, (v % 1000) as u16)).unwrap();
        }
        // Remove a stretch in the middle and every third key elsewhere.
        for v in 1000..2000 {
            assert!(ih.erase(&int_key(v)).unwrap(), "erase of {} failed", v);
        }
        for v in (0..1000).step_by(3) {
            assert!(ih.erase(&int_key(v)).unwrap());
        }
        validate(&ih);
        assert!(!ih.erase(&int_key(1500)).unwrap());
        for v in 1000..2000 {
            assert_eq!(None, ih.get(&int_key(v)).unwrap());
        }
        for v in 2000..n {
            assert_eq!(Some(Rid::new(0, (v % 1000) as u16)), ih.get(&int_key(v)).unwrap());
        }
    }

    #[test]
    fn test_erase_to_empty_and_reuse() {
        let (_t, ih) = new_index(int_keydef());
        for v in 0..2000 {
            ih.insert(&int_key(v), Rid::new(0, (v % 1000) as u16)).unwrap();
        }
        for v in 0..2000 {
            assert!(ih.erase(&int_key(v)).unwrap());
        }
        for v in 0..2000 {
            assert_eq!(None, ih.get(&int_key(v)).unwrap());
        }
        // The emptied tree accepts inserts again.
        assert_eq!(ih.leaf_begin().unwrap(), ih.leaf_end().unwrap());
        ih.insert(&int_key(42), Rid::new(3, 4)).unwrap();
        assert_eq!(Some(Rid::new(3, 4)), ih.get(&int_key(42)).unwrap());
        validate(&ih);
    }

    #[test]
    fn test_composite_key_ordering() {
        let keydef = KeyDef::new(vec![(DataType::Int, 4), (DataType::Char(4), 4)]);
        let (_t, ih) = new_index(keydef);
        let key = |a: i32, b: &str| {
            let mut k = a.to_le_bytes().to_vec();
            let mut s = b.as_bytes().to_vec();
            s.resize(4, 0);
            k.extend(s);
            k
        };
        ih.insert(&key(1, "a"), Rid::new(0, 0)).unwrap();
        ih.insert(&key(1, "b"), Rid::new(0, 1)).unwrap();
        ih.insert(&key(2, "a"), Rid::new(0, 2)).unwrap();
        // Range over the (1, *) prefix.
        let mut lo_key = 1i32.to_le_bytes().to_vec();
        lo_key.extend(vec![0x00; 4]);
        let mut hi_key = 1i32.to_le_bytes().to_vec();
        hi_key.extend(vec![0xff; 4]);
        let mut iid = ih.lower_bound(&lo_key).unwrap();
        let end = ih.upper_bound(&hi_key).unwrap();
        let mut seen = Vec::new();
        while iid != end {
            seen.push(ih.get_rid(iid).unwrap());
            iid = ih.next_iid(iid).unwrap();
        }
        assert_eq!(vec![Rid::new(0, 0), Rid::new(0, 1)], seen);
    }

    #[test]
    fn test_persist_and_reopen() {
        init();
        let tdir = TempDir::new(common::testutil::gen_random_dir(), true);
        let mut path = tdir.to_path_buf();
        path.push("t_a.idx");
        let bp = Arc::new(BufferPool::new());
        bp.register_file(Arc::new(HeapFile::new(path.clone(), 9).unwrap()));
        {
            let ih = IndexHandle::create(9, bp.clone(), int_keydef()).unwrap();
            for v in 0..800 {
                ih.insert(&int_key(v), Rid::new(0, (v % 500) as u16)).unwrap();
            }
            ih.flush().unwrap();
        }
        bp.reset();
        let ih = IndexHandle::open(9, bp).unwrap();
        for v in 0..800 {
            assert_eq!(Some(Rid::new(0, (v % 500) as u16)), ih.get(&int_key(v)).unwrap());
        }
    }
}

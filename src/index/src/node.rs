use crate::{KeyDef, IX_BASE};
use common::ids::{PageId, Rid, SlotId, NO_PAGE, RID_SIZE};
use common::QuarryError;
use heapstore::page::Page;
use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

/// Node header bytes after IX_BASE: parent (2), num_keys (2), is_leaf (2),
/// prev_leaf (2), next_leaf (2).
pub(crate) const NODE_HDR: usize = 10;

const OFF_PARENT: usize = IX_BASE;
const OFF_NUM_KEYS: usize = IX_BASE + 2;
const OFF_IS_LEAF: usize = IX_BASE + 4;
const OFF_PREV_LEAF: usize = IX_BASE + 6;
const OFF_NEXT_LEAF: usize = IX_BASE + 8;

/// A pinned view of one tree node.
///
/// The frame stays pinned for the lifetime of the handle; the index handle
/// is responsible for the matching unpin (or delete) on every path. Field
/// access locks the frame per call, which is safe because the tree has a
/// single writer at a time.
pub struct NodeHandle {
    pub pid: PageId,
    pub frame: Arc<RwLock<Page>>,
    pub key_len: usize,
    /// Maximum number of keys a node can hold.
    pub max_size: usize,
}

impl NodeHandle {
    pub fn new(pid: PageId, frame: Arc<RwLock<Page>>, key_len: usize, max_size: usize) -> Self {
        NodeHandle {
            pid,
            frame,
            key_len,
            max_size,
        }
    }

    fn read_u16(&self, off: usize) -> u16 {
        let page = self.frame.read().unwrap();
        u16::from_le_bytes([page.data[off], page.data[off + 1]])
    }

    fn write_u16(&self, off: usize, val: u16) {
        let mut page = self.frame.write().unwrap();
        page.data[off..off + 2].copy_from_slice(&val.to_le_bytes());
    }

    pub fn parent(&self) -> PageId {
        self.read_u16(OFF_PARENT)
    }

    pub fn set_parent(&self, pid: PageId) {
        self.write_u16(OFF_PARENT, pid);
    }

    pub fn num_keys(&self) -> usize {
        self.read_u16(OFF_NUM_KEYS) as usize
    }

    pub fn set_num_keys(&self, n: usize) {
        self.write_u16(OFF_NUM_KEYS, n as u16);
    }

    pub fn is_leaf(&self) -> bool {
        self.read_u16(OFF_IS_LEAF) != 0
    }

    pub fn set_is_leaf(&self, leaf: bool) {
        self.write_u16(OFF_IS_LEAF, leaf as u16);
    }

    pub fn prev_leaf(&self) -> PageId {
        self.read_u16(OFF_PREV_LEAF)
    }

    pub fn set_prev_leaf(&self, pid: PageId) {
        self.write_u16(OFF_PREV_LEAF, pid);
    }

    pub fn next_leaf(&self) -> PageId {
        self.read_u16(OFF_NEXT_LEAF)
    }

    pub fn set_next_leaf(&self, pid: PageId) {
        self.write_u16(OFF_NEXT_LEAF, pid);
    }

    /// Initialize a fresh node.
    pub fn init(&self, is_leaf: bool, parent: PageId) {
        self.set_parent(parent);
        self.set_num_keys(0);
        self.set_is_leaf(is_leaf);
        self.set_prev_leaf(NO_PAGE);
        self.set_next_leaf(NO_PAGE);
    }

    fn key_off(&self, i: usize) -> usize {
        IX_BASE + NODE_HDR + i * self.key_len
    }

    fn rid_off(&self, i: usize) -> usize {
        IX_BASE + NODE_HDR + self.max_size * self.key_len + i * RID_SIZE
    }

    pub fn get_key(&self, i: usize) -> Vec<u8> {
        let off = self.key_off(i);
        let page = self.frame.read().unwrap();
        page.data[off..off + self.key_len].to_vec()
    }

    pub fn set_key(&self, i: usize, key: &[u8]) {
        let off = self.key_off(i);
        let mut page = self.frame.write().unwrap();
        page.data[off..off + self.key_len].copy_from_slice(key);
    }

    pub fn get_rid(&self, i: usize) -> Rid {
        let off = self.rid_off(i);
        let page = self.frame.read().unwrap();
        Rid::from_bytes(&page.data[off..off + RID_SIZE])
    }

    pub fn set_rid(&self, i: usize, rid: Rid) {
        let off = self.rid_off(i);
        let mut page = self.frame.write().unwrap();
        page.data[off..off + RID_SIZE].copy_from_slice(&rid.to_bytes());
    }

    /// For internal nodes the rid slot stores the child page number.
    pub fn child_at(&self, i: usize) -> PageId {
        self.get_rid(i).page_id
    }

    /// Position of the child page inside this internal node.
    pub fn find_child(&self, child_pid: PageId) -> Result<usize, QuarryError> {
        for i in 0..self.num_keys() {
            if self.child_at(i) == child_pid {
                return Ok(i);
            }
        }
        Err(QuarryError::InternalError(format!(
            "Child page {} not found in node {}",
            child_pid, self.pid
        )))
    }

    /// First position whose key is >= target. Used on leaves and for
    /// separator maintenance.
    pub fn lower_bound(&self, keydef: &KeyDef, target: &[u8]) -> usize {
        let (mut l, mut r) = (0, self.num_keys());
        while l < r {
            let mid = (l + r) / 2;
            if keydef.compare(target, &self.get_key(mid)) != Ordering::Greater {
                r = mid;
            } else {
                l = mid + 1;
            }
        }
        l
    }

    /// First position whose key is > target, searching from `from`.
    ///
    /// Internal lookups start at 1 because key 0 mirrors the minimum of the
    /// leftmost subtree; leaves search from 0.
    pub fn upper_bound_from(&self, keydef: &KeyDef, target: &[u8], from: usize) -> usize {
        let (mut l, mut r) = (from, self.num_keys());
        while l < r {
            let mid = (l + r) / 2;
            if keydef.compare(target, &self.get_key(mid)) == Ordering::Less {
                r = mid;
            } else {
                l = mid + 1;
            }
        }
        l
    }

    /// Child subtree that may contain the target key.
    pub fn internal_lookup(&self, keydef: &KeyDef, target: &[u8]) -> PageId {
        let pos = self.upper_bound_from(keydef, target, 1);
        self.child_at(pos - 1)
    }

    /// Insert `n` consecutive (key, rid) pairs at `pos`, shifting the tail.
    pub fn insert_pairs(
        &self,
        pos: usize,
        keys: &[u8],
        rids: &[Rid],
        n: usize,
    ) -> Result<(), QuarryError> {
        let num = self.num_keys();
        if pos > num || num + n > self.max_size {
            return Err(QuarryError::InternalError(format!(
                "insert_pairs out of range: pos {} n {} in node of {}",
                pos, n, num
            )));
        }
        let key_len = self.key_len;
        {
            let mut page = self.frame.write().unwrap();
            // Shift keys.
            let src = self.key_off(pos);
            let dst = self.key_off(pos + n);
            if pos < num {
                page.data.copy_within(src..src + (num - pos) * key_len, dst);
            }
            page.data[src..src + n * key_len].copy_from_slice(&keys[..n * key_len]);
            // Shift rids.
            let src = self.rid_off(pos);
            let dst = self.rid_off(pos + n);
            if pos < num {
                page.data.copy_within(src..src + (num - pos) * RID_SIZE, dst);
            }
            for (i, rid) in rids.iter().take(n).enumerate() {
                let off = src + i * RID_SIZE;
                page.data[off..off + RID_SIZE].copy_from_slice(&rid.to_bytes());
            }
        }
        self.set_num_keys(num + n);
        Ok(())
    }

    /// Insert a single pair at `pos`.
    pub fn insert_pair(&self, pos: usize, key: &[u8], rid: Rid) -> Result<(), QuarryError> {
        self.insert_pairs(pos, key, &[rid], 1)
    }

    /// Remove the pair at `pos`, shifting the tail down.
    pub fn erase_pair(&self, pos: usize) -> Result<(), QuarryError> {
        let num = self.num_keys();
        if pos >= num {
            return Err(QuarryError::InternalError(format!(
                "erase_pair out of range: pos {} in node of {}",
                pos, num
            )));
        }
        let key_len = self.key_len;
        {
            let mut page = self.frame.write().unwrap();
            let src = self.key_off(pos + 1);
            let dst = self.key_off(pos);
            page.data
                .copy_within(src..src + (num - pos - 1) * key_len, dst);
            let src = self.rid_off(pos + 1);
            let dst = self.rid_off(pos);
            page.data
                .copy_within(src..src + (num - pos - 1) * RID_SIZE, dst);
        }
        self.set_num_keys(num - 1);
        Ok(())
    }

    /// All keys as one contiguous buffer, for bulk moves during splits and
    /// merges.
    pub fn keys_from(&self, start: usize) -> Vec<u8> {
        let num = self.num_keys();
        let lo = self.key_off(start);
        let hi = self.key_off(num);
        let page = self.frame.read().unwrap();
        page.data[lo..hi].to_vec()
    }

    pub fn rids_from(&self, start: usize) -> Vec<Rid> {
        (start..self.num_keys()).map(|i| self.get_rid(i)).collect()
    }

    /// Convenience for past-the-end Iid slots.
    pub fn num_keys_slot(&self) -> SlotId {
        self.num_keys() as SlotId
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::DataType;

    fn node(key_len: usize, max: usize) -> NodeHandle {
        let frame = Arc::new(RwLock::new(Page::new(1)));
        let n = NodeHandle::new(1, frame, key_len, max);
        n.init(true, NO_PAGE);
        n
    }

    fn int_key(v: i32) -> Vec<u8> {
        v.to_le_bytes().to_vec()
    }

    #[test]
    fn test_insert_sorted_and_bounds() {
        let kd = KeyDef::new(vec![(DataType::Int, 4)]);
        let n = node(4, 16);
        for (i, v) in [10, 20, 30, 40].iter().enumerate() {
            n.insert_pair(i, &int_key(*v), Rid::new(0, i as u16)).unwrap();
        }
        assert_eq!(4, n.num_keys());
        assert_eq!(0, n.lower_bound(&kd, &int_key(5)));
        assert_eq!(1, n.lower_bound(&kd, &int_key(20)));
        assert_eq!(2, n.upper_bound_from(&kd, &int_key(20), 0));
        assert_eq!(4, n.lower_bound(&kd, &int_key(50)));
    }

    #[test]
    fn test_insert_shift_erase() {
        let n = node(4, 16);
        n.insert_pair(0, &int_key(10), Rid::new(0, 0)).unwrap();
        n.insert_pair(1, &int_key(30), Rid::new(0, 2)).unwrap();
        n.insert_pair(1, &int_key(20), Rid::new(0, 1)).unwrap();
        assert_eq!(int_key(20), n.get_key(1));
        assert_eq!(Rid::new(0, 1), n.get_rid(1));
        assert_eq!(int_key(30), n.get_key(2));
        n.erase_pair(1).unwrap();
        assert_eq!(2, n.num_keys());
        assert_eq!(int_key(30), n.get_key(1));
        assert_eq!(Rid::new(0, 2), n.get_rid(1));
    }

    #[test]
    fn test_bulk_move() {
        let n = node(4, 16);
        for (i, v) in [1, 2, 3, 4, 5, 6].iter().enumerate() {
            n.insert_pair(i, &int_key(*v), Rid::new(0, i as u16)).unwrap();
        }
        let keys = n.keys_from(3);
        let rids = n.rids_from(3);
        let dst = node(4, 16);
        dst.insert_pairs(0, &keys, &rids, 3).unwrap();
        assert_eq!(3, dst.num_keys());
        assert_eq!(int_key(4), dst.get_key(0));
        assert_eq!(Rid::new(0, 5), dst.get_rid(2));
    }
}

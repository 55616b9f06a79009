use crate::heapfile::HeapFile;
use crate::page::Page;
use common::ids::{ContainerId, PageId};
use common::{QuarryError, PAGE_SLOTS};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, RwLock};

type FrameKey = (ContainerId, PageId);

/// Frame bookkeeping. Guarded by one mutex; page contents live behind
/// per-frame RwLocks so readers of different pages do not serialize.
struct PoolState {
    frames: HashMap<FrameKey, Arc<RwLock<Page>>>,
    pins: HashMap<FrameKey, usize>,
    dirty: HashSet<FrameKey>,
    last_used: HashMap<FrameKey, u64>,
    tick: u64,
    /// Next page id to allocate per container.
    next_page: HashMap<ContainerId, PageId>,
}

impl PoolState {
    fn touch(&mut self, key: FrameKey) {
        self.tick += 1;
        self.last_used.insert(key, self.tick);
    }
}

/// The buffer pool: at most PAGE_SLOTS resident page frames shared by every
/// heap and index file of a database.
///
/// Frames are pinned by `fetch_page`/`new_page` and must be unpinned on
/// every exit path, dirty iff the page was mutated. Eviction is LRU over
/// unpinned frames and writes back dirty victims.
pub struct BufferPool {
    files: RwLock<HashMap<ContainerId, Arc<HeapFile>>>,
    inner: Mutex<PoolState>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        BufferPool {
            files: RwLock::new(HashMap::new()),
            inner: Mutex::new(PoolState {
                frames: HashMap::new(),
                pins: HashMap::new(),
                dirty: HashSet::new(),
                last_used: HashMap::new(),
                tick: 0,
                next_page: HashMap::new(),
            }),
        }
    }

    /// Make a container's file known to the pool.
    pub fn register_file(&self, hf: Arc<HeapFile>) {
        let cid = hf.container_id;
        let num_pages = hf.num_pages();
        self.files.write().unwrap().insert(cid, hf);
        self.inner.lock().unwrap().next_page.insert(cid, num_pages);
    }

    /// Drop a container: flush or discard its frames and forget the file.
    pub fn unregister_file(&self, cid: ContainerId, flush: bool) -> Result<(), QuarryError> {
        if flush {
            self.flush_all(cid)?;
        }
        let mut state = self.inner.lock().unwrap();
        state.frames.retain(|k, _| k.0 != cid);
        state.pins.retain(|k, _| k.0 != cid);
        state.dirty.retain(|k| k.0 != cid);
        state.last_used.retain(|k, _| k.0 != cid);
        state.next_page.remove(&cid);
        self.files.write().unwrap().remove(&cid);
        Ok(())
    }

    pub fn is_registered(&self, cid: ContainerId) -> bool {
        self.files.read().unwrap().contains_key(&cid)
    }

    fn get_file(&self, cid: ContainerId) -> Result<Arc<HeapFile>, QuarryError> {
        self.files
            .read()
            .unwrap()
            .get(&cid)
            .cloned()
            .ok_or_else(|| {
                QuarryError::InternalError(format!("Container {} is not registered", cid))
            })
    }

    /// Number of pages in a container, counting unflushed new pages.
    pub fn num_pages(&self, cid: ContainerId) -> Result<PageId, QuarryError> {
        let state = self.inner.lock().unwrap();
        state.next_page.get(&cid).copied().ok_or_else(|| {
            QuarryError::InternalError(format!("Container {} is not registered", cid))
        })
    }

    /// Evict one unpinned frame when the pool is at capacity.
    fn make_room(&self, state: &mut PoolState) -> Result<(), QuarryError> {
        if state.frames.len() < PAGE_SLOTS {
            return Ok(());
        }
        let victim = state
            .frames
            .keys()
            .filter(|k| state.pins.get(k).copied().unwrap_or(0) == 0)
            .min_by_key(|k| state.last_used.get(k).copied().unwrap_or(0))
            .copied();
        match victim {
            Some(key) => {
                if state.dirty.remove(&key) {
                    let file = self.get_file(key.0)?;
                    let frame = state.frames.get(&key).unwrap();
                    file.write_page_to_file(&frame.read().unwrap())?;
                }
                state.frames.remove(&key);
                state.pins.remove(&key);
                state.last_used.remove(&key);
                Ok(())
            }
            None => Err(QuarryError::ExecutionError(String::from(
                "Buffer pool full of pinned pages",
            ))),
        }
    }

    /// Fetch and pin a page. The caller owes exactly one `unpin`.
    pub fn fetch_page(
        &self,
        cid: ContainerId,
        pid: PageId,
    ) -> Result<Arc<RwLock<Page>>, QuarryError> {
        let mut state = self.inner.lock().unwrap();
        let key = (cid, pid);
        if let Some(frame) = state.frames.get(&key).cloned() {
            *state.pins.entry(key).or_insert(0) += 1;
            state.touch(key);
            return Ok(frame);
        }
        self.make_room(&mut state)?;
        let file = self.get_file(cid)?;
        let page = file.read_page_from_file(pid)?;
        let frame = Arc::new(RwLock::new(page));
        state.frames.insert(key, frame.clone());
        state.pins.insert(key, 1);
        state.touch(key);
        Ok(frame)
    }

    /// Allocate and pin a fresh page at the end of a container. The page is
    /// written through immediately so the file length stays authoritative.
    pub fn new_page(
        &self,
        cid: ContainerId,
    ) -> Result<(PageId, Arc<RwLock<Page>>), QuarryError> {
        let mut state = self.inner.lock().unwrap();
        self.make_room(&mut state)?;
        let pid = *state.next_page.get(&cid).ok_or_else(|| {
            QuarryError::InternalError(format!("Container {} is not registered", cid))
        })?;
        state.next_page.insert(cid, pid + 1);
        let page = Page::new(pid);
        let file = self.get_file(cid)?;
        file.write_page_to_file(&page)?;
        let key = (cid, pid);
        let frame = Arc::new(RwLock::new(page));
        state.frames.insert(key, frame.clone());
        state.pins.insert(key, 1);
        state.touch(key);
        Ok((pid, frame))
    }

    /// Release one pin, recording whether the holder mutated the page.
    pub fn unpin(&self, cid: ContainerId, pid: PageId, dirty: bool) -> Result<(), QuarryError> {
        let mut state = self.inner.lock().unwrap();
        let key = (cid, pid);
        let pins = state.pins.get_mut(&key).ok_or_else(|| {
            QuarryError::InternalError(format!("Unpin of unknown page {}:{}", cid, pid))
        })?;
        if *pins == 0 {
            return Err(QuarryError::InternalError(format!(
                "Unpin of unpinned page {}:{}",
                cid, pid
            )));
        }
        *pins -= 1;
        if dirty {
            state.dirty.insert(key);
        }
        Ok(())
    }

    /// Drop a page the caller has pinned, without writing it back. The
    /// caller's pin is consumed; this is the only release path for deleted
    /// pages.
    pub fn delete_page(&self, cid: ContainerId, pid: PageId) -> Result<(), QuarryError> {
        let mut state = self.inner.lock().unwrap();
        let key = (cid, pid);
        match state.pins.get(&key).copied() {
            Some(1) => {
                state.frames.remove(&key);
                state.pins.remove(&key);
                state.dirty.remove(&key);
                state.last_used.remove(&key);
                Ok(())
            }
            Some(n) => Err(QuarryError::InternalError(format!(
                "delete_page of {}:{} with {} pins",
                cid, pid, n
            ))),
            None => Err(QuarryError::InternalError(format!(
                "delete_page of unpinned page {}:{}",
                cid, pid
            ))),
        }
    }

    /// Write every dirty page of a container back to its file.
    pub fn flush_all(&self, cid: ContainerId) -> Result<(), QuarryError> {
        let mut state = self.inner.lock().unwrap();
        let file = self.get_file(cid)?;
        let keys: Vec<FrameKey> = state.dirty.iter().filter(|k| k.0 == cid).copied().collect();
        for key in keys {
            if let Some(frame) = state.frames.get(&key) {
                file.write_page_to_file(&frame.read().unwrap())?;
            }
            state.dirty.remove(&key);
        }
        file.sync()?;
        Ok(())
    }

    /// Disk reads and writes served for a container. (0, 0) for unknown
    /// containers.
    pub fn get_rw_count(&self, cid: ContainerId) -> (u16, u16) {
        match self.files.read().unwrap().get(&cid) {
            Some(hf) => (
                hf.read_count.load(Ordering::Relaxed),
                hf.write_count.load(Ordering::Relaxed),
            ),
            None => {
                debug!("container {} not found for rw count", cid);
                (0, 0)
            }
        }
    }

    /// Number of frames currently pinned. A well-behaved statement leaves
    /// this at zero.
    pub fn pinned_frames(&self) -> usize {
        let state = self.inner.lock().unwrap();
        state.pins.values().filter(|p| **p > 0).count()
    }

    /// Testing utility: forget all cached frames without flushing.
    pub fn reset(&self) {
        let mut state = self.inner.lock().unwrap();
        state.frames.clear();
        state.pins.clear();
        state.dirty.clear();
        state.last_used.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::testutil::*;
    use common::PAGE_SLOTS;
    use temp_testdir::TempDir;

    fn setup(cid: ContainerId) -> (TempDir, Arc<BufferPool>) {
        init();
        let tdir = TempDir::new(gen_random_dir(), true);
        let mut path = tdir.to_path_buf();
        path.push(format!("{}.hf", cid));
        let bp = Arc::new(BufferPool::new());
        bp.register_file(Arc::new(HeapFile::new(path, cid).unwrap()));
        (tdir, bp)
    }

    #[test]
    fn test_bp_cached_fetch() {
        let (_tdir, bp) = setup(1);
        let (pid, frame) = bp.new_page(1).unwrap();
        frame.write().unwrap().add_value(&get_random_byte_vec(40));
        bp.unpin(1, pid, true).unwrap();

        let f1 = bp.fetch_page(1, pid).unwrap();
        bp.unpin(1, pid, false).unwrap();
        let f2 = bp.fetch_page(1, pid).unwrap();
        bp.unpin(1, pid, false).unwrap();
        assert!(Arc::ptr_eq(&f1, &f2));
        // One write-through create; zero reads because the frame stayed hot.
        let (rc, _wc) = bp.get_rw_count(1);
        assert_eq!(0, rc);

        bp.flush_all(1).unwrap();
        bp.reset();
        bp.fetch_page(1, pid).unwrap();
        bp.unpin(1, pid, false).unwrap();
        let (rc, _wc) = bp.get_rw_count(1);
        assert_eq!(1, rc);
    }

    #[test]
    fn test_bp_evict() {
        let (_tdir, bp) = setup(1);
        let to_fill = PAGE_SLOTS + 1;
        for _ in 0..to_fill {
            let (pid, frame) = bp.new_page(1).unwrap();
            frame.write().unwrap().add_value(&get_random_byte_vec(100));
            bp.unpin(1, pid, true).unwrap();
        }
        // Filling past capacity forced at least one eviction, so page 0 is
        // no longer resident and refetching it reads from disk.
        let (rc_before, _) = bp.get_rw_count(1);
        bp.fetch_page(1, 0).unwrap();
        bp.unpin(1, 0, false).unwrap();
        let (rc_after, _) = bp.get_rw_count(1);
        assert_eq!(rc_before + 1, rc_after);
        // And the evicted dirty page kept its contents.
        let frame = bp.fetch_page(1, 0).unwrap();
        assert_eq!(1, frame.read().unwrap().header.slots.len());
        bp.unpin(1, 0, false).unwrap();
    }

    #[test]
    fn test_bp_pinned_pages_not_evicted() {
        let (_tdir, bp) = setup(1);
        let mut held = Vec::new();
        for _ in 0..PAGE_SLOTS {
            let (pid, frame) = bp.new_page(1).unwrap();
            held.push((pid, frame));
        }
        // All frames pinned: the pool must refuse rather than evict.
        assert!(bp.new_page(1).is_err());
        for (pid, _) in &held {
            bp.unpin(1, *pid, false).unwrap();
        }
        assert!(bp.new_page(1).is_ok());
    }

    #[test]
    fn test_bp_write_back() {
        let (_tdir, bp) = setup(1);
        let (pid, frame) = bp.new_page(1).unwrap();
        let bytes = get_random_byte_vec(40);
        frame.write().unwrap().add_value(&bytes);
        bp.unpin(1, pid, true).unwrap();
        bp.flush_all(1).unwrap();
        bp.reset();
        let frame = bp.fetch_page(1, pid).unwrap();
        assert_eq!(Some(bytes), frame.read().unwrap().get_value(0));
        bp.unpin(1, pid, false).unwrap();
    }

    #[test]
    fn test_bp_unpin_balance_enforced() {
        let (_tdir, bp) = setup(1);
        let (pid, _frame) = bp.new_page(1).unwrap();
        bp.unpin(1, pid, false).unwrap();
        assert!(bp.unpin(1, pid, false).is_err());
    }
}

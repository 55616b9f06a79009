use crate::buffer_pool::BufferPool;
use crate::heapfile::HeapFile;
use crate::heapfileiter::HeapFileIterator;
use common::ids::{ContainerId, Rid, TransactionId};
use common::testutil::gen_random_dir;
use common::{QuarryError, PAGE_SIZE};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Record-oriented storage: heap files of byte records addressed by
/// `(page, slot)` rids, with every page access going through the shared
/// buffer pool.
pub struct StorageManager {
    bp: Arc<BufferPool>,
    pub storage_path: PathBuf,
    /// Testing flag: a temp SM removes its directory on drop.
    is_temp: bool,
}

impl StorageManager {
    /// Create a storage manager persisting containers under `storage_path`,
    /// sharing the given buffer pool.
    pub fn new(storage_path: PathBuf, bp: Arc<BufferPool>) -> Result<Self, QuarryError> {
        fs::create_dir_all(&storage_path)?;
        Ok(StorageManager {
            bp,
            storage_path,
            is_temp: false,
        })
    }

    /// Create a storage manager for testing backed by a temp directory.
    pub fn new_test_sm() -> Self {
        let storage_path = gen_random_dir();
        debug!("Making new temp storage_manager {:?}", storage_path);
        fs::create_dir_all(&storage_path).unwrap();
        StorageManager {
            bp: Arc::new(BufferPool::new()),
            storage_path,
            is_temp: true,
        }
    }

    /// The shared buffer pool (index files register here too).
    pub fn buffer_pool(&self) -> Arc<BufferPool> {
        self.bp.clone()
    }

    fn container_path(&self, file_name: &str) -> PathBuf {
        self.storage_path.join(file_name)
    }

    /// Create a new container backed by `file_name` in the storage dir.
    pub fn create_container(
        &self,
        container_id: ContainerId,
        file_name: &str,
    ) -> Result<(), QuarryError> {
        if self.bp.is_registered(container_id) {
            debug!("create_container: container {} already exists", container_id);
            return Ok(());
        }
        let hf = HeapFile::new(self.container_path(file_name), container_id)?;
        self.bp.register_file(Arc::new(hf));
        Ok(())
    }

    /// Open an existing container file.
    pub fn open_container(
        &self,
        container_id: ContainerId,
        file_name: &str,
    ) -> Result<(), QuarryError> {
        self.create_container(container_id, file_name)
    }

    /// Close a container, flushing its dirty pages.
    pub fn close_container(&self, container_id: ContainerId) -> Result<(), QuarryError> {
        self.bp.unregister_file(container_id, true)
    }

    /// Remove a container and its underlying file.
    pub fn remove_container(
        &self,
        container_id: ContainerId,
        file_name: &str,
    ) -> Result<(), QuarryError> {
        self.bp.unregister_file(container_id, false)?;
        let path = self.container_path(file_name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Insert some bytes into a container, returning the rid of the stored
    /// record. Scans for the first page with room, extending the file when
    /// none has any.
    pub fn insert_value(
        &self,
        container_id: ContainerId,
        value: Vec<u8>,
        _tid: TransactionId,
    ) -> Result<Rid, QuarryError> {
        if value.len() > PAGE_SIZE {
            return Err(QuarryError::ExecutionError(String::from(
                "Cannot insert a value larger than the page size",
            )));
        }
        let num_pages = self.bp.num_pages(container_id)?;
        for pid in 0..num_pages {
            let frame = self.bp.fetch_page(container_id, pid)?;
            let slot = frame.write().unwrap().add_value(&value);
            match slot {
                Some(slot_id) => {
                    self.bp.unpin(container_id, pid, true)?;
                    return Ok(Rid::new(pid, slot_id));
                }
                None => {
                    self.bp.unpin(container_id, pid, false)?;
                }
            }
        }
        let (pid, frame) = self.bp.new_page(container_id)?;
        let slot = frame.write().unwrap().add_value(&value);
        match slot {
            Some(slot_id) => {
                self.bp.unpin(container_id, pid, true)?;
                Ok(Rid::new(pid, slot_id))
            }
            None => {
                self.bp.unpin(container_id, pid, false)?;
                Err(QuarryError::InternalError(String::from(
                    "Value does not fit in an empty page",
                )))
            }
        }
    }

    /// Re-insert a record at an exact rid. Only valid when the slot is
    /// free; transaction undo uses this to restore deleted records at
    /// their original address.
    pub fn insert_value_at(
        &self,
        container_id: ContainerId,
        rid: Rid,
        value: Vec<u8>,
        _tid: TransactionId,
    ) -> Result<(), QuarryError> {
        let frame = self.bp.fetch_page(container_id, rid.page_id)?;
        let res = frame.write().unwrap().add_value_with_id(rid.slot_id, &value);
        match res {
            Some(()) => {
                self.bp.unpin(container_id, rid.page_id, true)?;
                Ok(())
            }
            None => {
                self.bp.unpin(container_id, rid.page_id, false)?;
                Err(QuarryError::ExecutionError(format!(
                    "Cannot restore record at ({}, {})",
                    rid.page_id, rid.slot_id
                )))
            }
        }
    }

    /// Get the bytes for a rid.
    pub fn get_value(
        &self,
        container_id: ContainerId,
        rid: Rid,
        _tid: TransactionId,
    ) -> Result<Vec<u8>, QuarryError> {
        let frame = self.bp.fetch_page(container_id, rid.page_id)?;
        let value = frame.read().unwrap().get_value(rid.slot_id);
        self.bp.unpin(container_id, rid.page_id, false)?;
        value.ok_or_else(|| {
            QuarryError::ExecutionError(format!(
                "Record ({}, {}) not found",
                rid.page_id, rid.slot_id
            ))
        })
    }

    /// Overwrite the record at a rid. The rid is stable: records never
    /// move, so the replacement must have the record's width.
    pub fn update_value(
        &self,
        container_id: ContainerId,
        rid: Rid,
        value: Vec<u8>,
        _tid: TransactionId,
    ) -> Result<(), QuarryError> {
        let frame = self.bp.fetch_page(container_id, rid.page_id)?;
        let res = frame.write().unwrap().update_value(rid.slot_id, &value);
        match res {
            Some(()) => {
                self.bp.unpin(container_id, rid.page_id, true)?;
                Ok(())
            }
            None => {
                self.bp.unpin(container_id, rid.page_id, false)?;
                Err(QuarryError::ExecutionError(format!(
                    "Cannot update record ({}, {})",
                    rid.page_id, rid.slot_id
                )))
            }
        }
    }

    /// Delete the record at a rid. Unknown rids are a no-op.
    pub fn delete_value(
        &self,
        container_id: ContainerId,
        rid: Rid,
        _tid: TransactionId,
    ) -> Result<(), QuarryError> {
        let frame = self.bp.fetch_page(container_id, rid.page_id)?;
        let res = frame.write().unwrap().delete_value(rid.slot_id);
        self.bp.unpin(container_id, rid.page_id, res.is_some())?;
        Ok(())
    }

    /// Rid-ordered iterator over all records of a container.
    pub fn get_iterator(&self, container_id: ContainerId, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator::new(container_id, tid, self.bp.clone())
    }

    /// Number of records in a container. Exact; scans every page.
    pub fn count_records(&self, container_id: ContainerId) -> Result<usize, QuarryError> {
        let tid = TransactionId::new();
        Ok(self.get_iterator(container_id, tid).count())
    }

    /// Flush a container's dirty pages.
    pub fn flush_container(&self, container_id: ContainerId) -> Result<(), QuarryError> {
        self.bp.flush_all(container_id)
    }

    /// Testing utility: drop all cached state.
    pub fn reset(&self) {
        self.bp.reset();
    }
}

impl Drop for StorageManager {
    fn drop(&mut self) {
        if self.is_temp {
            let _ = fs::remove_dir_all(&self.storage_path);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::testutil::*;

    fn test_sm_with_container(cid: ContainerId) -> StorageManager {
        init();
        let sm = StorageManager::new_test_sm();
        sm.create_container(cid, "test.tbl").unwrap();
        sm
    }

    #[test]
    fn hs_sm_insert_get() {
        let sm = test_sm_with_container(1);
        let tid = TransactionId::new();
        let bytes = get_random_byte_vec(40);
        let rid = sm.insert_value(1, bytes.clone(), tid).unwrap();
        assert_eq!(0, rid.page_id);
        assert_eq!(0, rid.slot_id);
        assert_eq!(bytes, sm.get_value(1, rid, tid).unwrap());

        let bytes2 = get_random_byte_vec(40);
        let rid2 = sm.insert_value(1, bytes2.clone(), tid).unwrap();
        assert_eq!(0, rid2.page_id);
        assert_eq!(1, rid2.slot_id);
        assert_eq!(bytes2, sm.get_value(1, rid2, tid).unwrap());
    }

    #[test]
    fn hs_sm_delete_and_reuse() {
        let sm = test_sm_with_container(1);
        let tid = TransactionId::new();
        let b1 = get_random_byte_vec(40);
        let b2 = get_random_byte_vec(40);
        let rid1 = sm.insert_value(1, b1, tid).unwrap();
        let rid2 = sm.insert_value(1, b2.clone(), tid).unwrap();
        sm.delete_value(1, rid1, tid).unwrap();
        assert!(sm.get_value(1, rid1, tid).is_err());
        assert_eq!(b2, sm.get_value(1, rid2, tid).unwrap());
        // The freed slot is reused by the next insert.
        let b3 = get_random_byte_vec(40);
        let rid3 = sm.insert_value(1, b3.clone(), tid).unwrap();
        assert_eq!(rid1, rid3);
        assert_eq!(b3, sm.get_value(1, rid3, tid).unwrap());
    }

    #[test]
    fn hs_sm_update() {
        let sm = test_sm_with_container(1);
        let tid = TransactionId::new();
        let rid = sm.insert_value(1, get_random_byte_vec(40), tid).unwrap();
        let replacement = get_random_byte_vec(40);
        sm.update_value(1, rid, replacement.clone(), tid).unwrap();
        assert_eq!(replacement, sm.get_value(1, rid, tid).unwrap());
    }

    #[test]
    fn hs_sm_iter_small() {
        let sm = test_sm_with_container(1);
        let tid = TransactionId::new();

        let mut byte_vec: Vec<Vec<u8>> = vec![
            get_random_byte_vec(400),
            get_random_byte_vec(400),
            get_random_byte_vec(400),
        ];
        for val in &byte_vec {
            sm.insert_value(1, val.clone(), tid).unwrap();
        }
        for (i, (_rid, x)) in sm.get_iterator(1, tid).enumerate() {
            assert_eq!(byte_vec[i], x);
        }

        // Push the container over multiple pages.
        let mut byte_vec2: Vec<Vec<u8>> = Vec::new();
        for _ in 0..30 {
            byte_vec2.push(get_random_byte_vec(400));
        }
        for val in &byte_vec2 {
            sm.insert_value(1, val.clone(), tid).unwrap();
        }
        byte_vec.append(&mut byte_vec2);

        assert!(sm.bp.num_pages(1).unwrap() > 1);
        for (i, (_rid, x)) in sm.get_iterator(1, tid).enumerate() {
            assert_eq!(byte_vec[i], x);
        }
        assert_eq!(byte_vec.len(), sm.count_records(1).unwrap());
    }

    #[test]
    fn hs_sm_persists_after_flush() {
        init();
        let sm = StorageManager::new_test_sm();
        sm.create_container(1, "persist.tbl").unwrap();
        let tid = TransactionId::new();
        let bytes = get_random_byte_vec(64);
        let rid = sm.insert_value(1, bytes.clone(), tid).unwrap();
        sm.flush_container(1).unwrap();
        sm.reset();
        assert_eq!(bytes, sm.get_value(1, rid, tid).unwrap());
    }
}

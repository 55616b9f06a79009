use crate::handle::IndexHandle;
use crate::KeyDef;
use common::ids::ContainerId;
use common::table::IndexMeta;
use common::QuarryError;
use heapstore::buffer_pool::BufferPool;
use heapstore::heapfile::HeapFile;
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// Lifecycle manager for the index files of one database: creates, opens,
/// flushes, and destroys index files, and hands out shared handles.
pub struct IndexManager {
    bp: Arc<BufferPool>,
    storage_path: PathBuf,
    handles: RwLock<HashMap<String, Arc<IndexHandle>>>,
}

impl IndexManager {
    pub fn new(storage_path: PathBuf, bp: Arc<BufferPool>) -> Self {
        IndexManager {
            bp,
            storage_path,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Deterministic file name for an index.
    pub fn index_file_name(index_name: &str) -> String {
        format!("{}.idx", index_name)
    }

    fn index_path(&self, index_name: &str) -> PathBuf {
        self.storage_path.join(Self::index_file_name(index_name))
    }

    pub fn is_index_file(&self, index_name: &str) -> bool {
        self.index_path(index_name).exists()
    }

    /// Create a new empty index file and register its handle.
    pub fn create_index(&self, meta: &IndexMeta) -> Result<Arc<IndexHandle>, QuarryError> {
        if self.is_index_file(&meta.name) {
            return Err(QuarryError::ValidationError(format!(
                "Index {} already exists",
                meta.name
            )));
        }
        debug!("Creating index file {:?}", self.index_path(&meta.name));
        let hf = HeapFile::new(self.index_path(&meta.name), meta.container_id)?;
        self.bp.register_file(Arc::new(hf));
        let handle = Arc::new(IndexHandle::create(
            meta.container_id,
            self.bp.clone(),
            KeyDef::from_meta(meta),
        )?);
        self.handles
            .write()
            .unwrap()
            .insert(meta.name.clone(), handle.clone());
        Ok(handle)
    }

    /// Open an existing index file and register its handle.
    pub fn open_index(&self, meta: &IndexMeta) -> Result<Arc<IndexHandle>, QuarryError> {
        if let Some(handle) = self.get_index(&meta.name) {
            return Ok(handle);
        }
        let hf = HeapFile::new(self.index_path(&meta.name), meta.container_id)?;
        self.bp.register_file(Arc::new(hf));
        let handle = Arc::new(IndexHandle::open(meta.container_id, self.bp.clone())?);
        self.handles
            .write()
            .unwrap()
            .insert(meta.name.clone(), handle.clone());
        Ok(handle)
    }

    /// Shared handle for an open index.
    pub fn get_index(&self, index_name: &str) -> Option<Arc<IndexHandle>> {
        self.handles.read().unwrap().get(index_name).cloned()
    }

    /// Persist an open index to disk.
    pub fn flush_index(&self, index_name: &str) -> Result<(), QuarryError> {
        match self.get_index(index_name) {
            Some(handle) => handle.flush(),
            None => Err(QuarryError::InternalError(format!(
                "Flush of unopened index {}",
                index_name
            ))),
        }
    }

    /// Flush and forget an open index.
    pub fn close_index(&self, index_name: &str) -> Result<(), QuarryError> {
        let handle = self.handles.write().unwrap().remove(index_name);
        if let Some(handle) = handle {
            handle.flush()?;
            self.bp.unregister_file(handle.container_id, true)?;
        }
        Ok(())
    }

    /// Remove an index and its file.
    pub fn destroy_index(
        &self,
        index_name: &str,
        container_id: ContainerId,
    ) -> Result<(), QuarryError> {
        self.handles.write().unwrap().remove(index_name);
        if self.bp.is_registered(container_id) {
            self.bp.unregister_file(container_id, false)?;
        }
        let path = self.index_path(index_name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

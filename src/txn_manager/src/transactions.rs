use crate::log_manager::{LogManager, LogRecordKind};
use common::catalog::Catalog;
use common::ids::{ContainerId, Lsn, Rid, TransactionId, INVALID_LSN};
use common::QuarryError;
use heapstore::StorageManager;
use index::{make_key, IndexManager};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// One heap mutation performed by a transaction, with enough captured
/// state to undo it.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub table: String,
    pub container_id: ContainerId,
    pub kind: WriteKind,
}

#[derive(Debug, Clone)]
pub enum WriteKind {
    Insert { rid: Rid, bytes: Vec<u8> },
    Delete { rid: Rid, bytes: Vec<u8> },
    Update { rid: Rid, old_bytes: Vec<u8>, new_bytes: Vec<u8> },
}

/// A transaction handle. One per client session; DML executors append
/// write records as they mutate the heap.
pub struct Transaction {
    tid: TransactionId,
    /// True after an explicit BEGIN; implicit transactions commit per
    /// statement.
    explicit_mode: bool,
    prev_lsn: Lsn,
    write_set: Vec<WriteRecord>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            tid: TransactionId::new(),
            explicit_mode: false,
            prev_lsn: INVALID_LSN,
            write_set: Vec::new(),
        }
    }

    pub fn tid(&self) -> TransactionId {
        self.tid
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit_mode
    }

    pub fn set_explicit(&mut self, explicit: bool) {
        self.explicit_mode = explicit;
    }

    pub fn prev_lsn(&self) -> Lsn {
        self.prev_lsn
    }

    pub fn set_prev_lsn(&mut self, lsn: Lsn) {
        self.prev_lsn = lsn;
    }

    pub fn append_write(&mut self, record: WriteRecord) {
        self.write_set.push(record);
    }

    pub fn write_set_len(&self) -> usize {
        self.write_set.len()
    }

    fn take_write_set(&mut self) -> Vec<WriteRecord> {
        std::mem::take(&mut self.write_set)
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction::new()
    }
}

/// Begin/commit/abort over session transactions. Abort replays the undo
/// list (the write set, reversed) against the heap and every index of the
/// touched tables.
pub struct TransactionManager {
    sm: Arc<StorageManager>,
    im: Arc<IndexManager>,
    active: RwLock<HashMap<u64, Arc<Mutex<Transaction>>>>,
}

impl TransactionManager {
    pub fn new(sm: Arc<StorageManager>, im: Arc<IndexManager>) -> Self {
        TransactionManager {
            sm,
            im,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Start a transaction and register it as active.
    pub fn begin(&self, log: &LogManager) -> Arc<Mutex<Transaction>> {
        let txn = Transaction::new();
        let tid = txn.tid();
        let lsn = log.add_log_to_buffer(tid.id(), INVALID_LSN, LogRecordKind::Begin);
        let txn = Arc::new(Mutex::new(txn));
        txn.lock().unwrap().set_prev_lsn(lsn);
        self.active.write().unwrap().insert(tid.id(), txn.clone());
        txn
    }

    pub fn get_transaction(&self, id: u64) -> Option<Arc<Mutex<Transaction>>> {
        self.active.read().unwrap().get(&id).cloned()
    }

    /// Commit: log, flush, and discard the undo list.
    pub fn commit(
        &self,
        txn: &Arc<Mutex<Transaction>>,
        log: &LogManager,
    ) -> Result<(), QuarryError> {
        let (tid, prev) = {
            let mut t = txn.lock().unwrap();
            t.take_write_set();
            (t.tid(), t.prev_lsn())
        };
        let lsn = log.add_log_to_buffer(tid.id(), prev, LogRecordKind::Commit);
        txn.lock().unwrap().set_prev_lsn(lsn);
        log.flush_log_to_disk()?;
        self.active.write().unwrap().remove(&tid.id());
        Ok(())
    }

    /// Abort: undo the write set newest-first, then log and flush.
    pub fn abort(
        &self,
        txn: &Arc<Mutex<Transaction>>,
        log: &LogManager,
        catalog: &dyn Catalog,
    ) -> Result<(), QuarryError> {
        let (tid, prev, writes) = {
            let mut t = txn.lock().unwrap();
            (t.tid(), t.prev_lsn(), t.take_write_set())
        };
        for record in writes.iter().rev() {
            self.undo(record, tid, catalog)?;
        }
        let lsn = log.add_log_to_buffer(tid.id(), prev, LogRecordKind::Abort);
        txn.lock().unwrap().set_prev_lsn(lsn);
        log.flush_log_to_disk()?;
        self.active.write().unwrap().remove(&tid.id());
        Ok(())
    }

    fn undo(
        &self,
        record: &WriteRecord,
        tid: TransactionId,
        catalog: &dyn Catalog,
    ) -> Result<(), QuarryError> {
        let indexes = catalog.get_table_indexes(&record.table)?;
        match &record.kind {
            WriteKind::Insert { rid, bytes } => {
                debug!("undo insert {:?} in {}", rid, record.table);
                self.sm.delete_value(record.container_id, *rid, tid)?;
                for meta in &indexes {
                    if let Some(ih) = self.im.get_index(&meta.name) {
                        ih.erase(&make_key(meta, bytes))?;
                    }
                }
            }
            WriteKind::Delete { rid, bytes } => {
                debug!("undo delete {:?} in {}", rid, record.table);
                self.sm
                    .insert_value_at(record.container_id, *rid, bytes.clone(), tid)?;
                for meta in &indexes {
                    if let Some(ih) = self.im.get_index(&meta.name) {
                        ih.insert(&make_key(meta, bytes), *rid)?;
                    }
                }
            }
            WriteKind::Update {
                rid,
                old_bytes,
                new_bytes,
            } => {
                debug!("undo update {:?} in {}", rid, record.table);
                self.sm
                    .update_value(record.container_id, *rid, old_bytes.clone(), tid)?;
                for meta in &indexes {
                    let old_key = make_key(meta, old_bytes);
                    let new_key = make_key(meta, new_bytes);
                    if old_key == new_key {
                        continue;
                    }
                    if let Some(ih) = self.im.get_index(&meta.name) {
                        ih.erase(&new_key)?;
                        ih.insert(&old_key, *rid)?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::database::Database;
    use common::table::Table;
    use common::testutil::init;
    use common::{Attribute, DataType, TableSchema};
    use index::IndexManager;
    use std::sync::RwLock;

    struct Fixture {
        sm: Arc<StorageManager>,
        tm: TransactionManager,
        log: LogManager,
        db: Database,
    }

    /// A one-table database t(a INT) with container 1.
    fn setup() -> Fixture {
        init();
        let sm = Arc::new(StorageManager::new_test_sm());
        sm.create_container(1, "t.tbl").unwrap();
        let im = Arc::new(IndexManager::new(sm.storage_path.clone(), sm.buffer_pool()));
        let tm = TransactionManager::new(sm.clone(), im);
        let log = LogManager::new(sm.storage_path.join("db.log")).unwrap();
        let db = Database::new(String::from("txns"));
        let schema = TableSchema::new(vec![Attribute::new("t", "a", DataType::Int)]);
        db.tables.write().unwrap().insert(
            String::from("t"),
            Arc::new(RwLock::new(Table::new(String::from("t"), 1, schema))),
        );
        Fixture { sm, tm, log, db }
    }

    #[test]
    fn test_begin_tracks_active_transactions() {
        let fix = setup();
        let txn = fix.tm.begin(&fix.log);
        let tid = txn.lock().unwrap().tid();
        assert!(fix.tm.get_transaction(tid.id()).is_some());
        fix.tm.commit(&txn, &fix.log).unwrap();
        assert!(fix.tm.get_transaction(tid.id()).is_none());
    }

    #[test]
    fn test_abort_undoes_writes_in_reverse() {
        let fix = setup();
        let txn = fix.tm.begin(&fix.log);
        let tid = txn.lock().unwrap().tid();

        // Simulate an insert followed by an update of the same record.
        let original = 1i32.to_le_bytes().to_vec();
        let updated = 2i32.to_le_bytes().to_vec();
        let rid = fix.sm.insert_value(1, original.clone(), tid).unwrap();
        txn.lock().unwrap().append_write(WriteRecord {
            table: String::from("t"),
            container_id: 1,
            kind: WriteKind::Insert {
                rid,
                bytes: original.clone(),
            },
        });
        fix.sm.update_value(1, rid, updated.clone(), tid).unwrap();
        txn.lock().unwrap().append_write(WriteRecord {
            table: String::from("t"),
            container_id: 1,
            kind: WriteKind::Update {
                rid,
                old_bytes: original.clone(),
                new_bytes: updated,
            },
        });
        assert_eq!(2, txn.lock().unwrap().write_set_len());

        fix.tm.abort(&txn, &fix.log, &fix.db).unwrap();
        // The update was rolled back first, then the insert removed.
        assert!(fix.sm.get_value(1, rid, tid).is_err());
    }

    #[test]
    fn test_commit_clears_write_set() {
        let fix = setup();
        let txn = fix.tm.begin(&fix.log);
        let tid = txn.lock().unwrap().tid();
        let bytes = 7i32.to_le_bytes().to_vec();
        let rid = fix.sm.insert_value(1, bytes.clone(), tid).unwrap();
        txn.lock().unwrap().append_write(WriteRecord {
            table: String::from("t"),
            container_id: 1,
            kind: WriteKind::Insert { rid, bytes: bytes.clone() },
        });
        fix.tm.commit(&txn, &fix.log).unwrap();
        assert_eq!(0, txn.lock().unwrap().write_set_len());
        assert_eq!(bytes, fix.sm.get_value(1, rid, tid).unwrap());
    }
}

use super::OpIterator;
use common::ids::ContainerId;
use common::table::IndexMeta;
use common::{QuarryError, TableSchema, Tuple};
use heapstore::StorageManager;
use index::{make_key, IndexHandle};
use std::sync::{Arc, Mutex};
use txn_manager::log_manager::{LogManager, LogRecordKind};
use txn_manager::transactions::{Transaction, WriteKind, WriteRecord};

/// Deletes every row its child scan produces, removing the heap record and
/// every index entry. The affected rows are collected first so the scan is
/// not disturbed by its own deletions.
pub struct DeleteExec {
    child: Box<dyn OpIterator>,
    sm: Arc<StorageManager>,
    table: String,
    container_id: ContainerId,
    schema: TableSchema,
    indexes: Vec<(IndexMeta, Arc<IndexHandle>)>,
    txn: Arc<Mutex<Transaction>>,
    log: Arc<LogManager>,
    out_schema: TableSchema,
    done: bool,
}

impl DeleteExec {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        child: Box<dyn OpIterator>,
        sm: Arc<StorageManager>,
        table: String,
        container_id: ContainerId,
        schema: TableSchema,
        indexes: Vec<(IndexMeta, Arc<IndexHandle>)>,
        txn: Arc<Mutex<Transaction>>,
        log: Arc<LogManager>,
    ) -> Self {
        DeleteExec {
            child,
            sm,
            table,
            container_id,
            schema,
            indexes,
            txn,
            log,
            out_schema: TableSchema::new(vec![]),
            done: false,
        }
    }

    fn do_delete(&mut self) -> Result<usize, QuarryError> {
        self.child.open()?;
        let mut victims = Vec::new();
        while let Some(tuple) = self.child.next()? {
            let bytes = tuple.to_bytes(&self.schema)?;
            victims.push((tuple.rid, bytes));
        }
        self.child.close()?;

        let tid = self.txn.lock().unwrap().tid();
        for (rid, bytes) in &victims {
            for (meta, ih) in &self.indexes {
                ih.erase(&make_key(meta, bytes))?;
            }
            self.sm.delete_value(self.container_id, *rid, tid)?;
            let mut txn = self.txn.lock().unwrap();
            let lsn = self.log.add_log_to_buffer(
                tid.id(),
                txn.prev_lsn(),
                LogRecordKind::Delete {
                    container_id: self.container_id,
                    rid: *rid,
                    bytes: bytes.clone(),
                },
            );
            txn.set_prev_lsn(lsn);
            txn.append_write(WriteRecord {
                table: self.table.clone(),
                container_id: self.container_id,
                kind: WriteKind::Delete {
                    rid: *rid,
                    bytes: bytes.clone(),
                },
            });
        }
        Ok(victims.len())
    }
}

impl OpIterator for DeleteExec {
    fn open(&mut self) -> Result<(), QuarryError> {
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let n = self.do_delete()?;
        debug!("deleted {} row(s) from {}", n, self.table);
        Ok(None)
    }

    fn close(&mut self) -> Result<(), QuarryError> {
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), QuarryError> {
        Err(QuarryError::InternalError(String::from(
            "Delete cannot rewind",
        )))
    }

    fn get_schema(&self) -> &TableSchema {
        &self.out_schema
    }
}

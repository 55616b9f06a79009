use super::OpIterator;
use common::ids::ContainerId;
use common::table::IndexMeta;
use common::{Field, QuarryError, TableSchema, Tuple};
use heapstore::StorageManager;
use index::{make_key, IndexHandle};
use std::sync::{Arc, Mutex};
use txn_manager::log_manager::{LogManager, LogRecordKind};
use txn_manager::transactions::{Transaction, WriteKind, WriteRecord};

/// Inserts one row: materializes the record, appends it to the heap, and
/// feeds every index on the table. A duplicate key fails the statement with
/// the table unchanged.
pub struct InsertExec {
    sm: Arc<StorageManager>,
    table: String,
    container_id: ContainerId,
    schema: TableSchema,
    indexes: Vec<(IndexMeta, Arc<IndexHandle>)>,
    values: Vec<Field>,
    txn: Arc<Mutex<Transaction>>,
    log: Arc<LogManager>,
    out_schema: TableSchema,
    done: bool,
}

impl InsertExec {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sm: Arc<StorageManager>,
        table: String,
        container_id: ContainerId,
        schema: TableSchema,
        indexes: Vec<(IndexMeta, Arc<IndexHandle>)>,
        values: Vec<Field>,
        txn: Arc<Mutex<Transaction>>,
        log: Arc<LogManager>,
    ) -> Self {
        InsertExec {
            sm,
            table,
            container_id,
            schema,
            indexes,
            values,
            txn,
            log,
            out_schema: TableSchema::new(vec![]),
            done: false,
        }
    }

    fn do_insert(&mut self) -> Result<(), QuarryError> {
        if self.values.len() != self.schema.size() {
            return Err(QuarryError::ValidationError(format!(
                "Table {} expects {} values, got {}",
                self.table,
                self.schema.size(),
                self.values.len()
            )));
        }
        let mut fields = Vec::with_capacity(self.values.len());
        for (value, attr) in self.values.iter().zip(self.schema.attributes()) {
            fields.push(value.coerce_to(attr.dtype())?);
        }
        let tuple = Tuple::new(fields);
        let bytes = tuple.to_bytes(&self.schema)?;

        // Check uniqueness on every index before touching anything, so a
        // duplicate key leaves the table unchanged.
        for (meta, ih) in &self.indexes {
            let key = make_key(meta, &bytes);
            if ih.get(&key)?.is_some() {
                return Err(QuarryError::DuplicateKeyError(format!(
                    "Duplicate key for index {}",
                    meta.name
                )));
            }
        }

        let tid = self.txn.lock().unwrap().tid();
        let rid = self.sm.insert_value(self.container_id, bytes.clone(), tid)?;
        let mut inserted: Vec<(Arc<IndexHandle>, Vec<u8>)> = Vec::new();
        for (meta, ih) in &self.indexes {
            let key = make_key(meta, &bytes);
            match ih.insert(&key, rid)? {
                Some(_) => inserted.push((ih.clone(), key)),
                None => {
                    // Lost a race with another writer: undo this statement.
                    for (undo_ih, undo_key) in &inserted {
                        undo_ih.erase(undo_key)?;
                    }
                    self.sm.delete_value(self.container_id, rid, tid)?;
                    return Err(QuarryError::DuplicateKeyError(format!(
                        "Duplicate key for index {}",
                        meta.name
                    )));
                }
            }
        }

        let mut txn = self.txn.lock().unwrap();
        let lsn = self.log.add_log_to_buffer(
            tid.id(),
            txn.prev_lsn(),
            LogRecordKind::Insert {
                container_id: self.container_id,
                rid,
                bytes: bytes.clone(),
            },
        );
        txn.set_prev_lsn(lsn);
        txn.append_write(WriteRecord {
            table: self.table.clone(),
            container_id: self.container_id,
            kind: WriteKind::Insert { rid, bytes },
        });
        Ok(())
    }
}

impl OpIterator for InsertExec {
    fn open(&mut self) -> Result<(), QuarryError> {
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        self.do_insert()?;
        Ok(None)
    }

    fn close(&mut self) -> Result<(), QuarryError> {
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), QuarryError> {
        Err(QuarryError::InternalError(String::from(
            "Insert cannot rewind",
        )))
    }

    fn get_schema(&self) -> &TableSchema {
        &self.out_schema
    }
}

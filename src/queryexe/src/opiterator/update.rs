use super::OpIterator;
use common::ids::ContainerId;
use common::physical_plan::SetClause;
use common::table::IndexMeta;
use common::{QuarryError, TableSchema, Tuple};
use heapstore::StorageManager;
use index::{make_key, IndexHandle};
use std::sync::{Arc, Mutex};
use txn_manager::log_manager::{LogManager, LogRecordKind};
use txn_manager::transactions::{Transaction, WriteKind, WriteRecord};

/// Rewrites every row its child scan produces, applying the SET clauses and
/// maintaining the indexes: old keys come out, new keys go in, unchanged
/// keys are left alone.
pub struct UpdateExec {
    child: Box<dyn OpIterator>,
    sm: Arc<StorageManager>,
    table: String,
    container_id: ContainerId,
    schema: TableSchema,
    indexes: Vec<(IndexMeta, Arc<IndexHandle>)>,
    assignments: Vec<SetClause>,
    txn: Arc<Mutex<Transaction>>,
    log: Arc<LogManager>,
    out_schema: TableSchema,
    done: bool,
}

impl UpdateExec {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        child: Box<dyn OpIterator>,
        sm: Arc<StorageManager>,
        table: String,
        container_id: ContainerId,
        schema: TableSchema,
        indexes: Vec<(IndexMeta, Arc<IndexHandle>)>,
        assignments: Vec<SetClause>,
        txn: Arc<Mutex<Transaction>>,
        log: Arc<LogManager>,
    ) -> Self {
        UpdateExec {
            child,
            sm,
            table,
            container_id,
            schema,
            indexes,
            assignments,
            txn,
            log,
            out_schema: TableSchema::new(vec![]),
            done: false,
        }
    }

    /// Apply the SET clauses to one row.
    fn rewrite(&self, tuple: &Tuple) -> Result<Tuple, QuarryError> {
        let mut out = tuple.clone();
        for clause in &self.assignments {
            let idx = self
                .schema
                .find_column(&common::ColumnRef::new("", &clause.column))?;
            let dtype = self.schema.get_attribute(idx).unwrap().dtype();
            out.set_field(idx, clause.value.coerce_to(dtype)?);
        }
        Ok(out)
    }

    fn do_update(&mut self) -> Result<usize, QuarryError> {
        self.child.open()?;
        let mut rows = Vec::new();
        while let Some(tuple) = self.child.next()? {
            rows.push(tuple);
        }
        self.child.close()?;

        let tid = self.txn.lock().unwrap().tid();
        let mut updated = 0;
        for old_tuple in rows {
            let rid = old_tuple.rid;
            let new_tuple = self.rewrite(&old_tuple)?;
            let old_bytes = old_tuple.to_bytes(&self.schema)?;
            let new_bytes = new_tuple.to_bytes(&self.schema)?;
            if old_bytes == new_bytes {
                continue;
            }

            // Which indexes change key, and would any new key collide?
            let mut moves = Vec::new();
            for (meta, ih) in &self.indexes {
                let old_key = make_key(meta, &old_bytes);
                let new_key = make_key(meta, &new_bytes);
                if old_key == new_key {
                    continue;
                }
                if ih.get(&new_key)?.is_some() {
                    return Err(QuarryError::DuplicateKeyError(format!(
                        "Duplicate key for index {}",
                        meta.name
                    )));
                }
                moves.push((ih.clone(), old_key, new_key));
            }
            for (ih, old_key, new_key) in moves {
                ih.erase(&old_key)?;
                ih.insert(&new_key, rid)?;
            }
            self.sm
                .update_value(self.container_id, rid, new_bytes.clone(), tid)?;

            let mut txn = self.txn.lock().unwrap();
            let lsn = self.log.add_log_to_buffer(
                tid.id(),
                txn.prev_lsn(),
                LogRecordKind::Update {
                    container_id: self.container_id,
                    rid,
                    old_bytes: old_bytes.clone(),
                    new_bytes: new_bytes.clone(),
                },
            );
            txn.set_prev_lsn(lsn);
            txn.append_write(WriteRecord {
                table: self.table.clone(),
                container_id: self.container_id,
                kind: WriteKind::Update {
                    rid,
                    old_bytes,
                    new_bytes,
                },
            });
            updated += 1;
        }
        Ok(updated)
    }
}

impl OpIterator for UpdateExec {
    fn open(&mut self) -> Result<(), QuarryError> {
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;
        let n = self.do_update()?;
        debug!("updated {} row(s) in {}", n, self.table);
        Ok(None)
    }

    fn close(&mut self) -> Result<(), QuarryError> {
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), QuarryError> {
        Err(QuarryError::InternalError(String::from(
            "Update cannot rewind",
        )))
    }

    fn get_schema(&self) -> &TableSchema {
        &self.out_schema
    }
}

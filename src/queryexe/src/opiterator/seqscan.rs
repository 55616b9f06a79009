use super::{eval_conditions, OpIterator};
use common::ids::{ContainerId, TransactionId};
use common::{Condition, QuarryError, TableSchema, Tuple};
use heapstore::heapfileiter::HeapFileIterator;
use heapstore::StorageManager;
use std::sync::Arc;

/// Full scan of a heap file, applying its conditions to every record.
pub struct SeqScanExec {
    sm: Arc<StorageManager>,
    container_id: ContainerId,
    schema: TableSchema,
    conditions: Vec<Condition>,
    tid: TransactionId,
    iter: Option<HeapFileIterator>,
}

impl SeqScanExec {
    pub fn new(
        sm: Arc<StorageManager>,
        container_id: ContainerId,
        schema: TableSchema,
        conditions: Vec<Condition>,
        tid: TransactionId,
    ) -> Self {
        SeqScanExec {
            sm,
            container_id,
            schema,
            conditions,
            tid,
            iter: None,
        }
    }
}

impl OpIterator for SeqScanExec {
    fn open(&mut self) -> Result<(), QuarryError> {
        self.iter = Some(self.sm.get_iterator(self.container_id, self.tid));
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        let iter = self.iter.as_mut().ok_or_else(|| {
            QuarryError::InternalError(String::from("SeqScan next before open"))
        })?;
        for (rid, bytes) in iter.by_ref() {
            let mut tuple = Tuple::from_bytes(&self.schema, &bytes)?;
            tuple.rid = rid;
            if eval_conditions(&self.schema, &tuple, &self.conditions)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<(), QuarryError> {
        self.iter = None;
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), QuarryError> {
        self.open()
    }

    fn get_schema(&self) -> &TableSchema {
        &self.schema
    }
}

use super::{eval_conditions, OpIterator};
use common::ids::{ContainerId, TransactionId};
use common::table::IndexMeta;
use common::{CompOp, Condition, QuarryError, TableSchema, Tuple};
use heapstore::StorageManager;
use index::{encode_key_field, max_value_bytes, min_value_bytes, IndexHandle, IxScan};
use std::sync::Arc;

/// Range scan over a B+-tree index.
///
/// The condition list arrives pre-sorted by the planner: conditions on the
/// index columns first, in index order, then everything else. The scan
/// derives [lower, upper) from the equality prefix and at most one range
/// condition, then re-checks every candidate record against the full list
/// because the index alone cannot evaluate residual columns.
pub struct IndexScanExec {
    sm: Arc<StorageManager>,
    handle: Arc<IndexHandle>,
    container_id: ContainerId,
    schema: TableSchema,
    meta: IndexMeta,
    conditions: Vec<Condition>,
    tid: TransactionId,
    scan: Option<IxScan>,
}

impl IndexScanExec {
    pub fn new(
        sm: Arc<StorageManager>,
        handle: Arc<IndexHandle>,
        container_id: ContainerId,
        schema: TableSchema,
        meta: IndexMeta,
        conditions: Vec<Condition>,
        tid: TransactionId,
    ) -> Self {
        IndexScanExec {
            sm,
            handle,
            container_id,
            schema,
            meta,
            conditions,
            tid,
            scan: None,
        }
    }

    /// Compute the scan interval from the condition prefix.
    fn plan_range(&self) -> Result<(common::ids::Iid, common::ids::Iid), QuarryError> {
        let mut lower = self.handle.leaf_begin()?;
        let mut upper = self.handle.leaf_end()?;

        // Assemble the equality prefix.
        let mut prefix = Vec::new();
        let mut eq_count = 0;
        for (cond, col) in self.conditions.iter().zip(self.meta.cols.iter()) {
            if cond.lhs.column != col.name || cond.op != CompOp::Equals {
                break;
            }
            let value = match cond.rhs.value() {
                Some(v) => v,
                None => break,
            };
            prefix.extend(encode_key_field(&value.coerce_to(col.dtype)?, col.len)?);
            eq_count += 1;
        }

        // At most one range condition on the next index column refines the
        // bound.
        let mut has_range = false;
        if eq_count < self.meta.cols.len() {
            if let Some(cond) = self.conditions.get(eq_count) {
                let col = &self.meta.cols[eq_count];
                if cond.lhs.column == col.name && cond.op.is_range() {
                    if let Some(value) = cond.rhs.value() {
                        let mut bound = prefix.clone();
                        bound.extend(encode_key_field(&value.coerce_to(col.dtype)?, col.len)?);
                        match cond.op {
                            CompOp::GreaterThan => {
                                pad_bound(&mut bound, &self.meta, eq_count + 1, true);
                                lower = self.handle.upper_bound(&bound)?;
                            }
                            CompOp::GreaterThanOrEq => {
                                pad_bound(&mut bound, &self.meta, eq_count + 1, false);
                                lower = self.handle.lower_bound(&bound)?;
                            }
                            CompOp::LessThan => {
                                pad_bound(&mut bound, &self.meta, eq_count + 1, false);
                                upper = self.handle.lower_bound(&bound)?;
                            }
                            CompOp::LessThanOrEq => {
                                pad_bound(&mut bound, &self.meta, eq_count + 1, true);
                                upper = self.handle.upper_bound(&bound)?;
                            }
                            _ => {}
                        }
                        has_range = true;
                    }
                }
            }
        }

        if !has_range && eq_count > 0 {
            // Pure equality prefix: pad the rest down for the lower bound
            // and up for the upper bound.
            let mut lower_key = prefix.clone();
            let mut upper_key = prefix;
            pad_bound(&mut lower_key, &self.meta, eq_count, false);
            pad_bound(&mut upper_key, &self.meta, eq_count, true);
            lower = self.handle.lower_bound(&lower_key)?;
            upper = self.handle.upper_bound(&upper_key)?;
        }
        Ok((lower, upper))
    }
}

/// Pad the trailing columns of a partial key with per-type extremes.
fn pad_bound(key: &mut Vec<u8>, meta: &IndexMeta, from_col: usize, max: bool) {
    for col in &meta.cols[from_col..] {
        if max {
            key.extend(max_value_bytes(col.dtype));
        } else {
            key.extend(min_value_bytes(col.dtype));
        }
    }
}

impl OpIterator for IndexScanExec {
    fn open(&mut self) -> Result<(), QuarryError> {
        let (lower, upper) = self.plan_range()?;
        self.scan = Some(IxScan::new(self.handle.clone(), lower, upper));
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        let scan = self.scan.as_mut().ok_or_else(|| {
            QuarryError::InternalError(String::from("IndexScan next before open"))
        })?;
        while !scan.is_end() {
            let rid = scan.rid()?;
            scan.next()?;
            let bytes = self.sm.get_value(self.container_id, rid, self.tid)?;
            let mut tuple = Tuple::from_bytes(&self.schema, &bytes)?;
            tuple.rid = rid;
            if eval_conditions(&self.schema, &tuple, &self.conditions)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<(), QuarryError> {
        self.scan = None;
        Ok(())
    }

    fn rewind(&mut self) -> Result<(), QuarryError> {
        self.open()
    }

    fn get_schema(&self) -> &TableSchema {
        &self.schema
    }
}

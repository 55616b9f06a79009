use crate::opiterator::*;
use common::catalog::Catalog;
use common::ids::TransactionId;
use common::physical_plan::{DmlKind, DmlPlan, JoinKind, PhysicalPlan, ScanKind};
use common::table::IndexMeta;
use common::{QuarryError, TableSchema, Tuple};
use heapstore::StorageManager;
use index::{IndexHandle, IndexManager};
use std::sync::{Arc, Mutex};
use txn_manager::log_manager::LogManager;
use txn_manager::transactions::Transaction;

/// Manages the execution of queries: converts a PhysicalPlan into a tree of
/// OpIterators and drives it.
pub struct Executor {
    /// Executor state
    pub plan: Option<Box<dyn OpIterator>>,
}

impl Executor {
    /// Initializes an executor with no plan configured.
    pub fn new_ref() -> Self {
        Self { plan: None }
    }

    /// Install the iterator tree for the next statement.
    pub fn configure_query(&mut self, physical_plan: Box<dyn OpIterator>) {
        self.plan = Some(physical_plan);
    }

    fn plan_mut(&mut self) -> Result<&mut Box<dyn OpIterator>, QuarryError> {
        self.plan
            .as_mut()
            .ok_or_else(|| QuarryError::InternalError(String::from("Executor has no plan")))
    }

    /// Open the iterator tree to begin execution.
    pub fn start(&mut self) -> Result<(), QuarryError> {
        self.plan_mut()?.open()
    }

    /// Returns the next tuple or None if there is no such tuple.
    pub fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        self.plan_mut()?.next()
    }

    /// Closes the iterator tree.
    pub fn close(&mut self) -> Result<(), QuarryError> {
        self.plan_mut()?.close()
    }

    /// Schema of the configured plan's output.
    pub fn schema(&self) -> Result<&TableSchema, QuarryError> {
        self.plan
            .as_ref()
            .map(|p| p.get_schema())
            .ok_or_else(|| QuarryError::InternalError(String::from("Executor has no plan")))
    }

    /// Converts a physical plan to a tree of op iterators.
    pub fn physical_plan_to_op_iterator<T: Catalog>(
        catalog: &T,
        sm: &Arc<StorageManager>,
        im: &Arc<IndexManager>,
        plan: &PhysicalPlan,
        tid: TransactionId,
    ) -> Result<Box<dyn OpIterator>, QuarryError> {
        match plan {
            PhysicalPlan::Scan(scan) => {
                let table_ptr = catalog.get_table_ptr(&scan.table)?;
                let (container_id, schema) = {
                    let table = table_ptr.read().unwrap();
                    (table.container_id, table.schema.clone())
                };
                match scan.kind {
                    ScanKind::SeqScan => Ok(Box::new(SeqScanExec::new(
                        sm.clone(),
                        container_id,
                        schema,
                        scan.conditions.clone(),
                        tid,
                    ))),
                    ScanKind::IndexScan => {
                        let meta = {
                            let table = table_ptr.read().unwrap();
                            table.get_index_meta(&scan.index_cols).cloned()
                        }
                        .ok_or_else(|| {
                            QuarryError::InternalError(format!(
                                "Plan names a missing index on {}",
                                scan.table
                            ))
                        })?;
                        let handle = im.get_index(&meta.name).ok_or_else(|| {
                            QuarryError::InternalError(format!(
                                "Index {} is not open",
                                meta.name
                            ))
                        })?;
                        Ok(Box::new(IndexScanExec::new(
                            sm.clone(),
                            handle,
                            container_id,
                            schema,
                            meta,
                            scan.conditions.clone(),
                            tid,
                        )))
                    }
                }
            }
            PhysicalPlan::Join(join) => {
                let left =
                    Self::physical_plan_to_op_iterator(catalog, sm, im, &join.left, tid)?;
                let right =
                    Self::physical_plan_to_op_iterator(catalog, sm, im, &join.right, tid)?;
                match join.kind {
                    JoinKind::NestedLoop => Ok(Box::new(NestedLoopJoinExec::new(
                        left,
                        right,
                        join.conditions.clone(),
                    ))),
                    JoinKind::SortMerge => Ok(Box::new(SortMergeJoinExec::new(
                        left,
                        right,
                        join.conditions.clone(),
                    )?)),
                }
            }
            PhysicalPlan::Filter(filter) => {
                let child =
                    Self::physical_plan_to_op_iterator(catalog, sm, im, &filter.child, tid)?;
                Ok(Box::new(FilterExec::new(child, filter.conditions.clone())))
            }
            PhysicalPlan::Project(project) => {
                let child =
                    Self::physical_plan_to_op_iterator(catalog, sm, im, &project.child, tid)?;
                Ok(Box::new(ProjectExec::new(child, &project.columns)?))
            }
            PhysicalPlan::Sort(sort) => {
                let child =
                    Self::physical_plan_to_op_iterator(catalog, sm, im, &sort.child, tid)?;
                Ok(Box::new(SortExec::new(child, &sort.col, sort.descending)?))
            }
        }
    }

    /// Converts a DML plan to its executor. SELECT lowers to the plain
    /// iterator tree; INSERT/UPDATE/DELETE wrap their child scan in a
    /// side-effecting executor driven once.
    pub fn dml_plan_to_op_iterator<T: Catalog>(
        catalog: &T,
        sm: &Arc<StorageManager>,
        im: &Arc<IndexManager>,
        dml: &DmlPlan,
        txn: &Arc<Mutex<Transaction>>,
        log: &Arc<LogManager>,
    ) -> Result<Box<dyn OpIterator>, QuarryError> {
        let tid = txn.lock().unwrap().tid();
        if dml.kind == DmlKind::Select {
            let child = dml.child.as_ref().ok_or_else(|| {
                QuarryError::InternalError(String::from("Select plan has no child"))
            })?;
            return Self::physical_plan_to_op_iterator(catalog, sm, im, child, tid);
        }

        let table_ptr = catalog.get_table_ptr(&dml.table)?;
        let (container_id, schema, index_metas) = {
            let table = table_ptr.read().unwrap();
            (
                table.container_id,
                table.schema.clone(),
                table.indexes.values().cloned().collect::<Vec<IndexMeta>>(),
            )
        };
        let mut indexes: Vec<(IndexMeta, Arc<IndexHandle>)> = Vec::new();
        for meta in index_metas {
            let handle = im.get_index(&meta.name).ok_or_else(|| {
                QuarryError::InternalError(format!("Index {} is not open", meta.name))
            })?;
            indexes.push((meta, handle));
        }

        match dml.kind {
            DmlKind::Insert => Ok(Box::new(InsertExec::new(
                sm.clone(),
                dml.table.clone(),
                container_id,
                schema,
                indexes,
                dml.values.clone(),
                txn.clone(),
                log.clone(),
            ))),
            DmlKind::Delete => {
                let child_plan = dml.child.as_ref().ok_or_else(|| {
                    QuarryError::InternalError(String::from("Delete plan has no child"))
                })?;
                let child =
                    Self::physical_plan_to_op_iterator(catalog, sm, im, child_plan, tid)?;
                Ok(Box::new(DeleteExec::new(
                    child,
                    sm.clone(),
                    dml.table.clone(),
                    container_id,
                    schema,
                    indexes,
                    txn.clone(),
                    log.clone(),
                )))
            }
            DmlKind::Update => {
                let child_plan = dml.child.as_ref().ok_or_else(|| {
                    QuarryError::InternalError(String::from("Update plan has no child"))
                })?;
                let child =
                    Self::physical_plan_to_op_iterator(catalog, sm, im, child_plan, tid)?;
                Ok(Box::new(UpdateExec::new(
                    child,
                    sm.clone(),
                    dml.table.clone(),
                    container_id,
                    schema,
                    indexes,
                    dml.assignments.clone(),
                    txn.clone(),
                    log.clone(),
                )))
            }
            DmlKind::Select => unreachable!(),
        }
    }
}

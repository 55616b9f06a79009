use super::{eval_conditions, OpIterator};
use common::{Condition, QuarryError, TableSchema, Tuple};

/// Applies conditions to an arbitrary upstream; same semantics as the
/// sequential scan filter.
pub struct FilterExec {
    child: Box<dyn OpIterator>,
    conditions: Vec<Condition>,
    schema: TableSchema,
}

impl FilterExec {
    pub fn new(child: Box<dyn OpIterator>, conditions: Vec<Condition>) -> Self {
        let schema = child.get_schema().clone();
        FilterExec {
            child,
            conditions,
            schema,
        }
    }
}

impl OpIterator for FilterExec {
    fn open(&mut self) -> Result<(), QuarryError> {
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        while let Some(tuple) = self.child.next()? {
            if eval_conditions(&self.schema, &tuple, &self.conditions)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn close(&mut self) -> Result<(), QuarryError> {
        self.child.close()
    }

    fn rewind(&mut self) -> Result<(), QuarryError> {
        self.child.rewind()
    }

    fn get_schema(&self) -> &TableSchema {
        &self.schema
    }
}

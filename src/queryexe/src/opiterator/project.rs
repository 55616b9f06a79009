use super::OpIterator;
use common::{ColumnRef, QuarryError, TableSchema, Tuple};

/// Copies the requested columns out of the child's tuples; the output
/// layout is the projection column order.
pub struct ProjectExec {
    child: Box<dyn OpIterator>,
    indices: Vec<usize>,
    schema: TableSchema,
}

impl ProjectExec {
    pub fn new(child: Box<dyn OpIterator>, columns: &[ColumnRef]) -> Result<Self, QuarryError> {
        let child_schema = child.get_schema();
        let mut indices = Vec::with_capacity(columns.len());
        let mut attrs = Vec::with_capacity(columns.len());
        for col in columns {
            let idx = child_schema.find_column(col)?;
            indices.push(idx);
            attrs.push(child_schema.get_attribute(idx).unwrap().clone());
        }
        Ok(ProjectExec {
            child,
            indices,
            schema: TableSchema::new(attrs),
        })
    }
}

impl OpIterator for ProjectExec {
    fn open(&mut self) -> Result<(), QuarryError> {
        self.child.open()
    }

    fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        match self.child.next()? {
            Some(tuple) => {
                let fields = self
                    .indices
                    .iter()
                    .map(|i| tuple.get_field(*i).unwrap().clone())
                    .collect();
                Ok(Some(Tuple::with_rid(fields, tuple.rid)))
            }
            None => Ok(None),
        }
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

use super::OpIterator;
use common::{ColumnRef, QuarryError, TableSchema, Tuple};
use std::cmp::Ordering;

/// Materializes its child and re-emits the tuples ordered by one key
/// column. Ties keep their first-produced order (the sort is stable).
pub struct SortExec {
    child: Box<dyn OpIterator>,
    key_idx: usize,
    descending: bool,
    schema: TableSchema,
    buffer: Vec<Tuple>,
    pos: usize,
    materialized: bool,
}

impl SortExec {
    pub fn new(
        child: Box<dyn OpIterator>,
        col: &ColumnRef,
        descending: bool,
    ) -> Result<Self, QuarryError> {
        let schema = child.get_schema().clone();
        let key_idx = schema.find_column(col)?;
        Ok(SortExec {
            child,
            key_idx,
            descending,
            schema,
            buffer: Vec::new(),
            pos: 0,
            materialized: false,
        })
    }

    fn materialize(&mut self) -> Result<(), QuarryError> {
        self.buffer.clear();
        while let Some(t) = self.child.next()? {
            self.buffer.push(t);
        }
        let idx = self.key_idx;
        let descending = self.descending;
        // Both sides come from the same column, so the compare cannot fail
        // on types.
        self.buffer.sort_by(|a, b| {
            let ord = a
                .get_field(idx)
                .unwrap()
                .compare(b.get_field(idx).unwrap())
                .unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
        self.pos = 0;
        self.materialized = true;
        Ok(())
    }
}

impl OpIterator for SortExec {
    fn open(&mut self) -> Result<(), QuarryError> {
        self.child.open()?;
        self.materialize()
    }

    fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        if !self.materialized {
            return Err(QuarryError::InternalError(String::from(
                "Sort next before open",
            )));
        }
        let item = self.buffer.get(self.pos).cloned();
        self.pos += 1;
        Ok(item)
    }

    fn close(&mut self) -> Result<(), QuarryError> {
        self.buffer.clear();
        self.materialized = false;
        self.child.close()
    }

    fn rewind(&mut self) -> Result<(), QuarryError> {
        self.pos = 0;
        Ok(())
    }

    fn get_schema(&self) -> &TableSchema {
        &self.schema
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::opiterator::test_support::VecIterator;
    use common::testutil::*;
    use common::ColumnRef;

    fn sorted(rows: Vec<Vec<i32>>, descending: bool) -> Vec<(i32, i32)> {
        let child = VecIterator::new(get_int_table_schema("t", 2), create_tuple_list(rows));
        let mut sort =
            SortExec::new(Box::new(child), &ColumnRef::new("t", "c0"), descending).unwrap();
        sort.open().unwrap();
        let mut out = Vec::new();
        while let Some(t) = sort.next().unwrap() {
            out.push((
                t.get_field(0).unwrap().unwrap_int_field(),
                t.get_field(1).unwrap().unwrap_int_field(),
            ));
        }
        out
    }

    #[test]
    fn test_sort_asc_desc() {
        let rows = vec![vec![3, 0], vec![1, 1], vec![2, 2]];
        assert_eq!(vec![(1, 1), (2, 2), (3, 0)], sorted(rows.clone(), false));
        assert_eq!(vec![(3, 0), (2, 2), (1, 1)], sorted(rows, true));
    }

    #[test]
    fn test_sort_is_stable() {
        // Equal keys keep their first-produced order.
        let rows = vec![vec![1, 10], vec![1, 11], vec![0, 12], vec![1, 13]];
        assert_eq!(
            vec![(0, 12), (1, 10), (1, 11), (1, 13)],
            sorted(rows, false)
        );
    }

    #[test]
    fn test_sort_rewind() {
        let child = VecIterator::new(
            get_int_table_schema("t", 1),
            create_tuple_list(vec![vec![2], vec![1]]),
        );
        let mut sort =
            SortExec::new(Box::new(child), &ColumnRef::new("t", "c0"), false).unwrap();
        sort.open().unwrap();
        assert_eq!(1, sort.next().unwrap().unwrap().get_field(0).unwrap().unwrap_int_field());
        sort.rewind().unwrap();
        assert_eq!(1, sort.next().unwrap().unwrap().get_field(0).unwrap().unwrap_int_field());
    }
}

use super::{eval_conditions, OpIterator};
use common::{Condition, QuarryError, TableSchema, Tuple};

/// Nested-loop join: left is outer, right is inner.
///
/// The output schema is the merge of both children, which shifts the right
/// side's column offsets by the left tuple length; join conditions then
/// resolve against the merged layout.
pub struct NestedLoopJoinExec {
    left: Box<dyn OpIterator>,
    right: Box<dyn OpIterator>,
    conditions: Vec<Condition>,
    schema: TableSchema,
    left_tuple: Option<Tuple>,
}

impl NestedLoopJoinExec {
    pub fn new(
        left: Box<dyn OpIterator>,
        right: Box<dyn OpIterator>,
        conditions: Vec<Condition>,
    ) -> Self {
        let schema = left.get_schema().merge(right.get_schema());
        NestedLoopJoinExec {
            left,
            right,
            conditions,
            schema,
            left_tuple: None,
        }
    }
}

impl OpIterator for NestedLoopJoinExec {
    fn open(&mut self) -> Result<(), QuarryError> {
        self.left.open()?;
        self.right.open()?;
        self.left_tuple = self.left.next()?;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        loop {
            let lt = match &self.left_tuple {
                Some(t) => t.clone(),
                None => return Ok(None),
            };
            while let Some(rt) = self.right.next()? {
                let joined = lt.merge(&rt);
                if eval_conditions(&self.schema, &joined, &self.conditions)? {
                    return Ok(Some(joined));
                }
            }
            // Right side exhausted: advance the outer row and re-begin the
            // inner side.
            self.left_tuple = self.left.next()?;
            if self.left_tuple.is_some() {
                self.right.rewind()?;
            }
        }
    }

    fn close(&mut self) -> Result<(), QuarryError> {
        self.left_tuple = None;
        self.left.close()?;
        self.right.close()
    }

    fn rewind(&mut self) -> Result<(), QuarryError> {
        self.left.rewind()?;
        self.right.rewind()?;
        self.left_tuple = self.left.next()?;
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
    use common::{ColumnRef, CompOp, CondRhs};

    fn join_cond() -> Condition {
        Condition::new(
            ColumnRef::new("l", "c0"),
            CompOp::Equals,
            CondRhs::Column(ColumnRef::new("r", "c0")),
        )
    }

    #[test]
    fn test_equi_join() {
        let left = VecIterator::new(
            get_int_table_schema("l", 2),
            create_tuple_list(vec![vec![1, 10], vec![2, 20], vec![3, 30]]),
        );
        let right = VecIterator::new(
            get_int_table_schema("r", 2),
            create_tuple_list(vec![vec![2, 200], vec![3, 300], vec![3, 301]]),
        );
        let mut join =
            NestedLoopJoinExec::new(Box::new(left), Box::new(right), vec![join_cond()]);
        join.open().unwrap();
        let mut rows = Vec::new();
        while let Some(t) = join.next().unwrap() {
            assert_eq!(4, t.size());
            rows.push((
                t.get_field(0).unwrap().unwrap_int_field(),
                t.get_field(3).unwrap().unwrap_int_field(),
            ));
        }
        assert_eq!(vec![(2, 200), (3, 300), (3, 301)], rows);
    }

    #[test]
    fn test_cartesian_product() {
        let left = VecIterator::new(
            get_int_table_schema("l", 1),
            create_tuple_list(vec![vec![1], vec![2]]),
        );
        let right = VecIterator::new(
            get_int_table_schema("r", 1),
            create_tuple_list(vec![vec![7], vec![8]]),
        );
        let mut join = NestedLoopJoinExec::new(Box::new(left), Box::new(right), vec![]);
        join.open().unwrap();
        let mut count = 0;
        while join.next().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(4, count);
    }

    #[test]
    fn test_empty_inner() {
        let left = VecIterator::new(
            get_int_table_schema("l", 1),
            create_tuple_list(vec![vec![1], vec![2]]),
        );
        let right = VecIterator::new(get_int_table_schema("r", 1), vec![]);
        let mut join = NestedLoopJoinExec::new(Box::new(left), Box::new(right), vec![]);
        join.open().unwrap();
        assert!(join.next().unwrap().is_none());
    }

    #[test]
    fn test_rewind() {
        let left = VecIterator::new(
            get_int_table_schema("l", 1),
            create_tuple_list(vec![vec![1]]),
        );
        let right = VecIterator::new(
            get_int_table_schema("r", 1),
            create_tuple_list(vec![vec![1], vec![1]]),
        );
        let mut join = NestedLoopJoinExec::new(Box::new(left), Box::new(right), vec![join_cond()]);
        join.open().unwrap();
        assert!(join.next().unwrap().is_some());
        assert!(join.next().unwrap().is_some());
        assert!(join.next().unwrap().is_none());
        join.rewind().unwrap();
        let mut count = 0;
        while join.next().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(2, count);
    }
}

use super::{eval_conditions, OpIterator};
use common::{CompOp, CondRhs, Condition, Field, QuarryError, TableSchema, Tuple};
use std::cmp::Ordering;

/// Sort-merge join: both children are materialized and sorted on the
/// equi-join key, then merged in one pass. Runs of equal right keys are
/// revisited for each matching left row.
pub struct SortMergeJoinExec {
    left: Box<dyn OpIterator>,
    right: Box<dyn OpIterator>,
    conditions: Vec<Condition>,
    schema: TableSchema,
    left_key: usize,
    right_key: usize,
    lrows: Vec<Tuple>,
    rrows: Vec<Tuple>,
    li: usize,
    rj: usize,
    /// Start of the current run of equal right keys.
    group_start: usize,
    /// Whether the cursor is inside a matched run.
    in_run: bool,
    materialized: bool,
}

impl SortMergeJoinExec {
    pub fn new(
        left: Box<dyn OpIterator>,
        right: Box<dyn OpIterator>,
        conditions: Vec<Condition>,
    ) -> Result<Self, QuarryError> {
        let schema = left.get_schema().merge(right.get_schema());
        // The merge key is the first column-column equality; remaining
        // conditions are re-checked per joined pair.
        let equi = conditions
            .iter()
            .find(|c| c.op == CompOp::Equals && matches!(c.rhs, CondRhs::Column(_)))
            .ok_or_else(|| {
                QuarryError::ExecutionError(String::from(
                    "Sort-merge join requires an equality join condition",
                ))
            })?;
        let left_key = left.get_schema().find_column(&equi.lhs)?;
        let right_key = match &equi.rhs {
            CondRhs::Column(c) => right.get_schema().find_column(c)?,
            CondRhs::Value(_) => unreachable!(),
        };
        Ok(SortMergeJoinExec {
            left,
            right,
            conditions,
            schema,
            left_key,
            right_key,
            lrows: Vec::new(),
            rrows: Vec::new(),
            li: 0,
            rj: 0,
            group_start: 0,
            in_run: false,
            materialized: false,
        })
    }

    fn materialize(&mut self) -> Result<(), QuarryError> {
        self.lrows.clear();
        self.rrows.clear();
        while let Some(t) = self.left.next()? {
            self.lrows.push(t);
        }
        while let Some(t) = self.right.next()? {
            self.rrows.push(t);
        }
        let lk = self.left_key;
        self.lrows.sort_by(|a, b| cmp_fields(a.get_field(lk), b.get_field(lk)));
        let rk = self.right_key;
        self.rrows.sort_by(|a, b| cmp_fields(a.get_field(rk), b.get_field(rk)));
        self.li = 0;
        self.rj = 0;
        self.group_start = 0;
        self.in_run = false;
        self.materialized = true;
        Ok(())
    }

    fn lkey(&self, i: usize) -> &Field {
        self.lrows[i].get_field(self.left_key).unwrap()
    }

    fn rkey(&self, j: usize) -> &Field {
        self.rrows[j].get_field(self.right_key).unwrap()
    }
}

fn cmp_fields(a: Option<&Field>, b: Option<&Field>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

impl OpIterator for SortMergeJoinExec {
    fn open(&mut self) -> Result<(), QuarryError> {
        self.left.open()?;
        self.right.open()?;
        self.materialize()
    }

    fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
        if !self.materialized {
            return Err(QuarryError::InternalError(String::from(
                "SortMergeJoin next before open",
            )));
        }
        loop {
            if self.li >= self.lrows.len() {
                return Ok(None);
            }
            if self.rj >= self.rrows.len() {
                // Right side exhausted. The next left row can only match if
                // it repeats the current run's key.
                self.li += 1;
                if self.li < self.lrows.len()
                    && self.in_run
                    && self.lkey(self.li).compare(self.rkey(self.group_start))?
                        == Ordering::Equal
                {
                    self.rj = self.group_start;
                    continue;
                }
                return Ok(None);
            }
            match self.lkey(self.li).compare(self.rkey(self.rj))? {
                Ordering::Less => {
                    self.li += 1;
                    // A repeated left key re-scans the matched run.
                    if self.li < self.lrows.len()
                        && self.in_run
                        && self.lkey(self.li).compare(self.rkey(self.group_start))?
                            == Ordering::Equal
                    {
                        self.rj = self.group_start;
                    } else {
                        self.in_run = false;
                    }
                }
                Ordering::Greater => {
                    self.rj += 1;
                    self.in_run = false;
                }
                Ordering::Equal => {
                    if !self.in_run {
                        self.group_start = self.rj;
                        self.in_run = true;
                    }
                    let joined = self.lrows[self.li].merge(&self.rrows[self.rj]);
                    self.rj += 1;
                    if eval_conditions(&self.schema, &joined, &self.conditions)? {
                        return Ok(Some(joined));
                    }
                }
            }
        }
    }

    fn close(&mut self) -> Result<(), QuarryError> {
        self.lrows.clear();
        self.rrows.clear();
        self.materialized = false;
        self.left.close()?;
        self.right.close()
    }

    fn rewind(&mut self) -> Result<(), QuarryError> {
        self.li = 0;
        self.rj = 0;
        self.group_start = 0;
        self.in_run = false;
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

    fn join_cond() -> Condition {
        Condition::new(
            ColumnRef::new("l", "c0"),
            CompOp::Equals,
            CondRhs::Column(ColumnRef::new("r", "c0")),
        )
    }

    fn run(left: Vec<Vec<i32>>, right: Vec<Vec<i32>>) -> Vec<(i32, i32, i32, i32)> {
        let left = VecIterator::new(get_int_table_schema("l", 2), create_tuple_list(left));
        let right = VecIterator::new(get_int_table_schema("r", 2), create_tuple_list(right));
        let mut join =
            SortMergeJoinExec::new(Box::new(left), Box::new(right), vec![join_cond()]).unwrap();
        join.open().unwrap();
        let mut rows = Vec::new();
        while let Some(t) = join.next().unwrap() {
            rows.push((
                t.get_field(0).unwrap().unwrap_int_field(),
                t.get_field(1).unwrap().unwrap_int_field(),
                t.get_field(2).unwrap().unwrap_int_field(),
                t.get_field(3).unwrap().unwrap_int_field(),
            ));
        }
        rows
    }

    #[test]
    fn test_merge_basic() {
        let rows = run(
            vec![vec![3, 30], vec![1, 10], vec![2, 20]],
            vec![vec![2, 200], vec![4, 400], vec![1, 100]],
        );
        assert_eq!(vec![(1, 10, 1, 100), (2, 20, 2, 200)], rows);
    }

    #[test]
    fn test_merge_duplicate_groups() {
        // Two left rows with key 1 each match two right rows with key 1.
        let rows = run(
            vec![vec![1, 10], vec![1, 11]],
            vec![vec![1, 100], vec![1, 101]],
        );
        assert_eq!(4, rows.len());
        assert_eq!(
            vec![
                (1, 10, 1, 100),
                (1, 10, 1, 101),
                (1, 11, 1, 100),
                (1, 11, 1, 101)
            ],
            rows
        );
    }

    #[test]
    fn test_merge_no_matches() {
        let rows = run(vec![vec![1, 10]], vec![vec![2, 200]]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_merge_requires_equality() {
        let left = VecIterator::new(get_int_table_schema("l", 1), vec![]);
        let right = VecIterator::new(get_int_table_schema("r", 1), vec![]);
        assert!(SortMergeJoinExec::new(Box::new(left), Box::new(right), vec![]).is_err());
    }
}

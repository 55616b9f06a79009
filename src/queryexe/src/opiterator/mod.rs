use common::{CondRhs, Condition, QuarryError, TableSchema, Tuple};

mod delete;
mod filter;
mod indexscan;
mod insert;
mod nested_loop_join;
mod project;
mod seqscan;
mod sort;
mod sort_merge_join;
mod update;

pub use delete::DeleteExec;
pub use filter::FilterExec;
pub use indexscan::IndexScanExec;
pub use insert::InsertExec;
pub use nested_loop_join::NestedLoopJoinExec;
pub use project::ProjectExec;
pub use seqscan::SeqScanExec;
pub use sort::SortExec;
pub use sort_merge_join::SortMergeJoinExec;
pub use update::UpdateExec;

/// The pull protocol every executor speaks.
///
/// `open` positions the iterator before the first qualifying tuple; `next`
/// produces the next tuple or None at end of stream. Tuples carry the rid
/// they were read from (when they came from a base table) and are owned by
/// the caller once returned. `rewind` restarts the stream; the nested-loop
/// join re-begins its inner side through it.
pub trait OpIterator {
    fn open(&mut self) -> Result<(), QuarryError>;
    fn next(&mut self) -> Result<Option<Tuple>, QuarryError>;
    fn close(&mut self) -> Result<(), QuarryError>;
    fn rewind(&mut self) -> Result<(), QuarryError>;
    /// The schema of produced tuples. `byte_size()` is the tuple length.
    fn get_schema(&self) -> &TableSchema;
}

/// Evaluate one condition against a tuple. Operands resolve through the
/// schema; int and float cross-compare by promotion, any other type mix is
/// a type error.
pub fn eval_condition(
    schema: &TableSchema,
    tuple: &Tuple,
    cond: &Condition,
) -> Result<bool, QuarryError> {
    let lhs_idx = schema.find_column(&cond.lhs)?;
    let lhs = tuple.get_field(lhs_idx).ok_or_else(|| {
        QuarryError::InternalError(format!("Tuple missing field {}", lhs_idx))
    })?;
    let ord = match &cond.rhs {
        CondRhs::Value(v) => lhs.compare(v)?,
        CondRhs::Column(c) => {
            let rhs_idx = schema.find_column(c)?;
            let rhs = tuple.get_field(rhs_idx).ok_or_else(|| {
                QuarryError::InternalError(format!("Tuple missing field {}", rhs_idx))
            })?;
            lhs.compare(rhs)?
        }
    };
    Ok(cond.op.compare(ord))
}

/// Evaluate a condition list, short-circuiting on the first failure.
pub fn eval_conditions(
    schema: &TableSchema,
    tuple: &Tuple,
    conds: &[Condition],
) -> Result<bool, QuarryError> {
    for cond in conds {
        if !eval_condition(schema, tuple, cond)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::OpIterator;
    use common::{QuarryError, TableSchema, Tuple};

    /// An iterator over a fixed tuple list, for exercising operators
    /// without storage.
    pub struct VecIterator {
        schema: TableSchema,
        tuples: Vec<Tuple>,
        pos: usize,
    }

    impl VecIterator {
        pub fn new(schema: TableSchema, tuples: Vec<Tuple>) -> Self {
            VecIterator {
                schema,
                tuples,
                pos: 0,
            }
        }
    }

    impl OpIterator for VecIterator {
        fn open(&mut self) -> Result<(), QuarryError> {
            self.pos = 0;
            Ok(())
        }

        fn next(&mut self) -> Result<Option<Tuple>, QuarryError> {
            let t = self.tuples.get(self.pos).cloned();
            self.pos += 1;
            Ok(t)
        }

        fn close(&mut self) -> Result<(), QuarryError> {
            Ok(())
        }

        fn rewind(&mut self) -> Result<(), QuarryError> {
            self.pos = 0;
            Ok(())
        }

        fn get_schema(&self) -> &TableSchema {
            &self.schema
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::{Attribute, ColumnRef, CompOp, DataType, Field};

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Attribute::new("t", "a", DataType::Int),
            Attribute::new("t", "b", DataType::Float),
            Attribute::new("t", "c", DataType::Char(4)),
        ])
    }

    fn tuple() -> Tuple {
        Tuple::new(vec![
            Field::IntField(5),
            Field::FloatField(1.5),
            Field::StringField(String::from("hi")),
        ])
    }

    fn cond(col: &str, op: CompOp, rhs: Field) -> Condition {
        Condition::new(ColumnRef::new("t", col), op, CondRhs::Value(rhs))
    }

    #[test]
    fn test_eval_value_conditions() {
        let s = schema();
        let t = tuple();
        assert!(eval_condition(&s, &t, &cond("a", CompOp::Equals, Field::IntField(5))).unwrap());
        assert!(!eval_condition(&s, &t, &cond("a", CompOp::LessThan, Field::IntField(5))).unwrap());
        // Int column against float literal promotes.
        assert!(
            eval_condition(&s, &t, &cond("a", CompOp::GreaterThan, Field::FloatField(4.5)))
                .unwrap()
        );
        assert!(eval_condition(
            &s,
            &t,
            &cond("c", CompOp::Equals, Field::StringField(String::from("hi")))
        )
        .unwrap());
    }

    #[test]
    fn test_eval_column_condition() {
        let s = schema();
        let t = tuple();
        let c = Condition::new(
            ColumnRef::new("t", "a"),
            CompOp::GreaterThan,
            CondRhs::Column(ColumnRef::new("t", "b")),
        );
        assert!(eval_condition(&s, &t, &c).unwrap());
    }

    #[test]
    fn test_eval_type_error() {
        let s = schema();
        let t = tuple();
        assert!(
            eval_condition(&s, &t, &cond("c", CompOp::Equals, Field::IntField(1))).is_err()
        );
    }

    #[test]
    fn test_eval_short_circuit() {
        let s = schema();
        let t = tuple();
        // The failing first condition hides the type error in the second.
        let conds = vec![
            cond("a", CompOp::Equals, Field::IntField(99)),
            cond("c", CompOp::Equals, Field::IntField(1)),
        ];
        assert!(!eval_conditions(&s, &t, &conds).unwrap());
    }
}

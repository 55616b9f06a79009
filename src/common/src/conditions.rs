use crate::Field;
use std::cmp::Ordering;
use std::fmt;

/// A reference to a table column as written in a statement.
///
/// `table` holds the real table name after analysis; `alias` keeps the name
/// the user wrote (if any) for display purposes.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// The name of the table that the column is present in. Empty when the
    /// reference was unqualified and not yet resolved.
    pub table: String,
    /// The name of the column being referenced.
    pub column: String,
    /// The alias the reference was written with.
    pub alias: Option<String>,
}

impl ColumnRef {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            alias: None,
        }
    }

    pub fn with_alias(table: &str, column: &str, alias: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    /// The prefix used for display: the alias when present, else the table.
    pub fn prefix(&self) -> &str {
        match &self.alias {
            Some(a) => a,
            None => &self.table,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.prefix();
        if prefix.is_empty() {
            write!(f, "{}", self.column)
        } else {
            write!(f, "{}.{}", prefix, self.column)
        }
    }
}

/// Predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Equals,
    NotEq,
    LessThan,
    GreaterThan,
    LessThanOrEq,
    GreaterThanOrEq,
}

impl CompOp {
    /// Interpret a comparison outcome under this operator.
    pub fn compare(&self, ord: Ordering) -> bool {
        match self {
            CompOp::Equals => ord == Ordering::Equal,
            CompOp::NotEq => ord != Ordering::Equal,
            CompOp::LessThan => ord == Ordering::Less,
            CompOp::GreaterThan => ord == Ordering::Greater,
            CompOp::LessThanOrEq => ord != Ordering::Greater,
            CompOp::GreaterThanOrEq => ord != Ordering::Less,
        }
    }

    /// The operator that holds when the operands are swapped.
    pub fn flip(&self) -> Self {
        match self {
            CompOp::GreaterThan => CompOp::LessThan,
            CompOp::LessThan => CompOp::GreaterThan,
            CompOp::LessThanOrEq => CompOp::GreaterThanOrEq,
            CompOp::GreaterThanOrEq => CompOp::LessThanOrEq,
            op => *op,
        }
    }

    /// True for <, >, <=, >=.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            CompOp::LessThan | CompOp::GreaterThan | CompOp::LessThanOrEq | CompOp::GreaterThanOrEq
        )
    }
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op_str = match self {
            CompOp::Equals => "=",
            CompOp::NotEq => "<>",
            CompOp::LessThan => "<",
            CompOp::GreaterThan => ">",
            CompOp::LessThanOrEq => "<=",
            CompOp::GreaterThanOrEq => ">=",
        };
        write!(f, "{}", op_str)
    }
}

/// The right-hand side of a condition: a literal value or another column.
#[derive(Debug, Clone, PartialEq)]
pub enum CondRhs {
    Value(Field),
    Column(ColumnRef),
}

impl CondRhs {
    pub fn column(&self) -> Option<&ColumnRef> {
        match self {
            CondRhs::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&Field> {
        match self {
            CondRhs::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A single comparison consumed by scans, filters, and joins.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub lhs: ColumnRef,
    pub op: CompOp,
    pub rhs: CondRhs,
}

impl Condition {
    pub fn new(lhs: ColumnRef, op: CompOp, rhs: CondRhs) -> Self {
        Self { lhs, op, rhs }
    }

    /// Swap the two column sides, flipping the operator. Only meaningful for
    /// column-column conditions.
    pub fn flip(&self) -> Condition {
        match &self.rhs {
            CondRhs::Column(rhs_col) => Condition {
                lhs: rhs_col.clone(),
                op: self.op.flip(),
                rhs: CondRhs::Column(self.lhs.clone()),
            },
            CondRhs::Value(_) => self.clone(),
        }
    }
}

/// The string form of a condition is produced here and nowhere else; it is
/// only consumed by EXPLAIN output.
impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.lhs, self.op)?;
        match &self.rhs {
            CondRhs::Column(c) => write!(f, "{}", c),
            CondRhs::Value(v) => match v {
                Field::IntField(x) => write!(f, "{}", x),
                Field::FloatField(x) => {
                    if x.fract() == 0.0 {
                        write!(f, "{:.1}", x)
                    } else {
                        write!(f, "{}", x)
                    }
                }
                Field::StringField(s) => write!(f, "'{}'", s),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_compare_ops() {
        assert!(CompOp::Equals.compare(Ordering::Equal));
        assert!(!CompOp::Equals.compare(Ordering::Less));
        assert!(CompOp::LessThanOrEq.compare(Ordering::Equal));
        assert!(CompOp::LessThanOrEq.compare(Ordering::Less));
        assert!(CompOp::NotEq.compare(Ordering::Greater));
        assert!(!CompOp::GreaterThanOrEq.compare(Ordering::Less));
    }

    #[test]
    fn test_flip() {
        assert_eq!(CompOp::LessThan, CompOp::GreaterThan.flip());
        assert_eq!(CompOp::GreaterThanOrEq, CompOp::LessThanOrEq.flip());
        assert_eq!(CompOp::Equals, CompOp::Equals.flip());
    }

    #[test]
    fn test_condition_display() {
        let cond = Condition::new(
            ColumnRef::new("t", "a"),
            CompOp::GreaterThanOrEq,
            CondRhs::Value(Field::IntField(18)),
        );
        assert_eq!("t.a>=18", cond.to_string());

        let cond = Condition::new(
            ColumnRef::new("t", "b"),
            CompOp::Equals,
            CondRhs::Value(Field::StringField(String::from("hi"))),
        );
        assert_eq!("t.b='hi'", cond.to_string());

        let cond = Condition::new(
            ColumnRef::new("t", "c"),
            CompOp::LessThan,
            CondRhs::Value(Field::FloatField(2.0)),
        );
        assert_eq!("t.c<2.0", cond.to_string());

        let cond = Condition::new(
            ColumnRef::new("u", "id"),
            CompOp::Equals,
            CondRhs::Column(ColumnRef::new("o", "uid")),
        );
        assert_eq!("u.id=o.uid", cond.to_string());
    }

    #[test]
    fn test_condition_flip_swaps_columns() {
        let cond = Condition::new(
            ColumnRef::new("u", "id"),
            CompOp::LessThan,
            CondRhs::Column(ColumnRef::new("o", "uid")),
        );
        let flipped = cond.flip();
        assert_eq!("o.uid>u.id", flipped.to_string());
    }
}

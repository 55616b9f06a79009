use crate::{ColumnRef, Condition};
use std::fmt;

/// A relational plan tree with unique ownership: every node owns its
/// children, and the optimizer rewrites by moving subtrees.
///
/// The tree is also the source of EXPLAIN output via `Display`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    Scan(ScanNode),
    Filter(FilterNode),
    Project(ProjectNode),
    Join(JoinNode),
}

/// Scan node.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanNode {
    /// Table being scanned.
    pub table: String,
}

/// Filter node.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub child: Box<PlanNode>,
    /// Conditions, all of which must hold.
    pub conditions: Vec<Condition>,
}

/// Projection node.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectNode {
    pub child: Box<PlanNode>,
    /// Columns to keep, in output order.
    pub columns: Vec<ColumnRef>,
    /// True for `SELECT *`.
    pub select_all: bool,
}

/// Join node. Children are ordered as built (left-deep); EXPLAIN reorders
/// for display only.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub conditions: Vec<Condition>,
}

impl PlanNode {
    /// The multiset of base tables this node outputs.
    pub fn output_tables(&self) -> Vec<String> {
        match self {
            PlanNode::Scan(s) => vec![s.table.clone()],
            PlanNode::Filter(f) => f.child.output_tables(),
            PlanNode::Project(p) => p.child.output_tables(),
            PlanNode::Join(j) => {
                let mut tables = j.left.output_tables();
                tables.extend(j.right.output_tables());
                tables
            }
        }
    }

    /// Display rank: Filter < Join < Project < Scan.
    fn type_rank(&self) -> u8 {
        match self {
            PlanNode::Filter(_) => 0,
            PlanNode::Join(_) => 1,
            PlanNode::Project(_) => 2,
            PlanNode::Scan(_) => 3,
        }
    }

    /// Tie-break key within one node type: first sorted condition, column,
    /// or table name.
    fn sort_key(&self) -> String {
        match self {
            PlanNode::Filter(f) => {
                let mut conds: Vec<String> =
                    f.conditions.iter().map(|c| c.to_string()).collect();
                conds.sort();
                conds.into_iter().next().unwrap_or_default()
            }
            PlanNode::Project(p) => {
                let mut cols: Vec<String> = p.columns.iter().map(|c| c.to_string()).collect();
                cols.sort();
                cols.into_iter().next().unwrap_or_default()
            }
            PlanNode::Scan(s) => s.table.clone(),
            PlanNode::Join(_) => {
                let mut tables = self.output_tables();
                tables.sort();
                tables.into_iter().next().unwrap_or_default()
            }
        }
    }

    fn format(&self, indent: usize) -> String {
        let spaces = "\t".repeat(indent);
        match self {
            PlanNode::Scan(s) => format!("{}Scan(table={})", spaces, s.table),
            PlanNode::Filter(f) => {
                let mut conds: Vec<String> =
                    f.conditions.iter().map(|c| c.to_string()).collect();
                conds.sort();
                format!(
                    "{}Filter(condition=[{}])\n{}",
                    spaces,
                    conds.join(","),
                    f.child.format(indent + 1)
                )
            }
            PlanNode::Project(p) => {
                let cols = if p.select_all {
                    String::from("*")
                } else {
                    let mut cols: Vec<String> =
                        p.columns.iter().map(|c| c.to_string()).collect();
                    cols.sort();
                    cols.join(",")
                };
                format!(
                    "{}Project(columns=[{}])\n{}",
                    spaces,
                    cols,
                    p.child.format(indent + 1)
                )
            }
            PlanNode::Join(j) => {
                let mut tables = self.output_tables();
                tables.sort();
                let mut conds: Vec<String> =
                    j.conditions.iter().map(|c| c.to_string()).collect();
                conds.sort();
                let (first, second) = if j.left_first() {
                    (&j.left, &j.right)
                } else {
                    (&j.right, &j.left)
                };
                format!(
                    "{}Join(tables=[{}],condition=[{}])\n{}\n{}",
                    spaces,
                    tables.join(","),
                    conds.join(","),
                    first.format(indent + 1),
                    second.format(indent + 1)
                )
            }
        }
    }
}

impl JoinNode {
    /// Child display order: by node-type rank, then by sort key.
    fn left_first(&self) -> bool {
        let lrank = self.left.type_rank();
        let rrank = self.right.type_rank();
        if lrank != rrank {
            return lrank < rrank;
        }
        self.left.sort_key() <= self.right.sort_key()
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(0))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ColumnRef, CompOp, CondRhs, Field};

    fn scan(table: &str) -> PlanNode {
        PlanNode::Scan(ScanNode {
            table: table.to_string(),
        })
    }

    fn val_cond(table: &str, col: &str, op: CompOp, v: i32) -> Condition {
        Condition::new(
            ColumnRef::new(table, col),
            op,
            CondRhs::Value(Field::IntField(v)),
        )
    }

    #[test]
    fn test_scan_format() {
        assert_eq!("Scan(table=t)", scan("t").to_string());
    }

    #[test]
    fn test_filter_sorted_conditions() {
        let plan = PlanNode::Filter(FilterNode {
            child: Box::new(scan("t")),
            conditions: vec![
                val_cond("t", "b", CompOp::LessThan, 5),
                val_cond("t", "a", CompOp::GreaterThanOrEq, 1),
            ],
        });
        assert_eq!(
            "Filter(condition=[t.a>=1,t.b<5])\n\tScan(table=t)",
            plan.to_string()
        );
    }

    #[test]
    fn test_join_child_ordering() {
        // Scan children of the same type order by table name.
        let join = PlanNode::Join(JoinNode {
            left: Box::new(scan("zeta")),
            right: Box::new(scan("alpha")),
            conditions: vec![Condition::new(
                ColumnRef::new("zeta", "id"),
                CompOp::Equals,
                CondRhs::Column(ColumnRef::new("alpha", "id")),
            )],
        });
        let out = join.to_string();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            "Join(tables=[alpha,zeta],condition=[zeta.id=alpha.id])",
            lines[0]
        );
        assert_eq!("\tScan(table=alpha)", lines[1]);
        assert_eq!("\tScan(table=zeta)", lines[2]);
    }

    #[test]
    fn test_filter_before_scan_under_join() {
        let join = PlanNode::Join(JoinNode {
            left: Box::new(scan("a")),
            right: Box::new(PlanNode::Filter(FilterNode {
                child: Box::new(scan("b")),
                conditions: vec![val_cond("b", "x", CompOp::Equals, 1)],
            })),
            conditions: vec![],
        });
        let out = join.to_string();
        let lines: Vec<&str> = out.lines().collect();
        // Filter ranks before Scan regardless of build order.
        assert_eq!("\tFilter(condition=[b.x=1])", lines[1]);
        assert_eq!("\t\tScan(table=b)", lines[2]);
        assert_eq!("\tScan(table=a)", lines[3]);
    }

    #[test]
    fn test_project_select_all() {
        let plan = PlanNode::Project(ProjectNode {
            child: Box::new(scan("t")),
            columns: vec![],
            select_all: true,
        });
        assert_eq!("Project(columns=[*])\n\tScan(table=t)", plan.to_string());
    }

    #[test]
    fn test_output_tables_multiset() {
        let join = PlanNode::Join(JoinNode {
            left: Box::new(scan("a")),
            right: Box::new(scan("b")),
            conditions: vec![],
        });
        assert_eq!(vec!["a".to_string(), "b".to_string()], join.output_tables());
    }
}

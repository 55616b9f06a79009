use crate::{ColumnRef, Condition, DataType, Field};

/// How a base table is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    SeqScan,
    IndexScan,
}

/// Which join algorithm executes a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    NestedLoop,
    SortMerge,
}

/// An executable plan produced by lowering the optimized plan tree. Unlike
/// the logical tree it names physical operators and carries everything an
/// executor needs to construct itself.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalPlan {
    Scan(ScanPlan),
    Join(JoinPlanNode),
    Filter(FilterPlanNode),
    Project(ProjectPlanNode),
    Sort(SortPlanNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    pub kind: ScanKind,
    pub table: String,
    /// For an index scan the conditions are pre-sorted: equality prefix
    /// first, then at most one range condition, then residuals.
    pub conditions: Vec<Condition>,
    /// All columns of the chosen index, in index order. Empty for seq scans.
    pub index_cols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinPlanNode {
    pub kind: JoinKind,
    pub left: Box<PhysicalPlan>,
    pub right: Box<PhysicalPlan>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterPlanNode {
    pub child: Box<PhysicalPlan>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectPlanNode {
    pub child: Box<PhysicalPlan>,
    /// Columns to keep, in output order.
    pub columns: Vec<ColumnRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortPlanNode {
    pub child: Box<PhysicalPlan>,
    pub col: ColumnRef,
    pub descending: bool,
}

/// One `SET col = value` clause of an UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct SetClause {
    pub column: String,
    pub value: Field,
}

/// The kind of statement a DML plan executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
    Select,
}

/// Top-level DML plan: a statement kind plus the child plan that produces
/// the affected rows (absent for INSERT).
#[derive(Debug, Clone, PartialEq)]
pub struct DmlPlan {
    pub kind: DmlKind,
    pub child: Option<PhysicalPlan>,
    pub table: String,
    pub values: Vec<Field>,
    pub conditions: Vec<Condition>,
    pub assignments: Vec<SetClause>,
}

/// The kind of statement a DDL plan executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlKind {
    CreateTable,
    DropTable,
    CreateIndex,
    DropIndex,
}

/// Top-level DDL plan.
#[derive(Debug, Clone, PartialEq)]
pub struct DdlPlan {
    pub kind: DdlKind,
    pub table: String,
    /// Index column list for index DDL.
    pub index_cols: Vec<String>,
    /// Column definitions for CREATE TABLE.
    pub col_defs: Vec<(String, DataType)>,
}

use crate::statistics::Statistics;
use common::catalog::Catalog;
use common::logical_plan::{FilterNode, JoinNode, PlanNode, ProjectNode, ScanNode};
use common::physical_plan::{
    FilterPlanNode, JoinKind, JoinPlanNode, PhysicalPlan, ProjectPlanNode, ScanKind, ScanPlan,
    SortPlanNode,
};
use common::{ColumnRef, CompOp, CondRhs, Condition, DataType, QuarryError};
use log::debug;
use queryexe::query::QueryInfo;
use std::collections::HashMap;

/// Runtime planner switches, set through `SET`.
#[derive(Debug, Clone, Copy)]
pub struct Knobs {
    /// Append result rows to output.txt in the database directory.
    pub enable_output_file: bool,
    pub enable_nestloop: bool,
    pub enable_sortmerge: bool,
}

impl Default for Knobs {
    fn default() -> Self {
        Knobs {
            enable_output_file: false,
            enable_nestloop: true,
            enable_sortmerge: false,
        }
    }
}

/// Rewrites the initial plan tree into an equivalent one of lower expected
/// cost, then lowers it to a physical plan.
///
/// Phases: initial build, cost-based join ordering, predicate pushdown,
/// projection pushdown, lowering with index selection.
pub struct Optimizer;

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Optimizer
    }

    /// Build and rewrite the plan tree for an analyzed SELECT. The result
    /// is also what EXPLAIN prints.
    pub fn optimize<T: Catalog>(
        &self,
        catalog: &T,
        stats: &dyn Statistics,
        query: &QueryInfo,
    ) -> Result<PlanNode, QuarryError> {
        let mut residual = query.conds.clone();
        let plan = if query.tables.len() == 1 {
            PlanNode::Scan(ScanNode {
                table: query.tables[0].clone(),
            })
        } else if !query.join_conds.is_empty() {
            // Explicit ON conditions drive join construction; any that
            // cannot attach fall through to the filter phase.
            let mut pool = query.join_conds.clone();
            let plan = self.build_join_order(&query.tables, &mut pool, stats);
            residual.extend(pool);
            plan
        } else {
            // Comma list: join conditions are mined out of the WHERE
            // clause; what is left is a Cartesian product.
            self.build_join_order(&query.tables, &mut residual, stats)
        };

        let plan = self.predicate_pushdown(catalog, plan, residual);
        let plan = if query.select_all {
            plan
        } else {
            self.push_projections_down(catalog, plan, query.cols.clone(), true)?
        };

        Ok(PlanNode::Project(ProjectNode {
            child: Box::new(plan),
            columns: query.cols.clone(),
            select_all: query.select_all,
        }))
    }

    /// Greedy left-deep join ordering by ascending exact cardinality.
    ///
    /// When the next table in cardinality order shares no join condition
    /// with the joined set, a connectable candidate further down the order
    /// is swapped into its place.
    fn build_join_order(
        &self,
        tables: &[String],
        conds: &mut Vec<Condition>,
        stats: &dyn Statistics,
    ) -> PlanNode {
        if tables.len() == 1 {
            return PlanNode::Scan(ScanNode {
                table: tables[0].clone(),
            });
        }
        let cardinalities: HashMap<&String, usize> = tables
            .iter()
            .map(|t| (t, stats.table_cardinality(t)))
            .collect();
        let mut sorted_tables = tables.to_vec();
        sorted_tables.sort_by_key(|t| cardinalities[t]);
        debug!("join order by cardinality: {:?}", sorted_tables);

        let mut result = PlanNode::Scan(ScanNode {
            table: sorted_tables[0].clone(),
        });
        let mut joined = vec![sorted_tables[0].clone()];
        let mut i = 1;
        while i < sorted_tables.len() {
            let mut join_conds = extract_join_conditions(conds, &joined, &sorted_tables[i]);
            if join_conds.is_empty() && i < sorted_tables.len() - 1 {
                let mut j = i + 1;
                while j < sorted_tables.len() {
                    let candidate = extract_join_conditions(conds, &joined, &sorted_tables[j]);
                    if !candidate.is_empty() {
                        sorted_tables.swap(i, j);
                        join_conds = candidate;
                        break;
                    }
                    j += 1;
                }
            }
            let next = sorted_tables[i].clone();
            result = PlanNode::Join(JoinNode {
                left: Box::new(result),
                right: Box::new(PlanNode::Scan(ScanNode {
                    table: next.clone(),
                })),
                conditions: join_conds,
            });
            joined.push(next);
            i += 1;
        }
        result
    }

    /// Push single-side conditions below joins; whatever survives wraps the
    /// tree in one Filter at the outermost covering position.
    fn predicate_pushdown<T: Catalog>(
        &self,
        catalog: &T,
        plan: PlanNode,
        conds: Vec<Condition>,
    ) -> PlanNode {
        let mut remaining = conds;
        let plan = self.push_predicates_down(catalog, plan, &mut remaining);
        if remaining.is_empty() {
            plan
        } else {
            PlanNode::Filter(FilterNode {
                child: Box::new(plan),
                conditions: remaining,
            })
        }
    }

    fn push_predicates_down<T: Catalog>(
        &self,
        catalog: &T,
        node: PlanNode,
        remaining: &mut Vec<Condition>,
    ) -> PlanNode {
        match node {
            PlanNode::Join(join) => {
                let left_tables = join.left.output_tables();
                let right_tables = join.right.output_tables();
                let mut left_conds = Vec::new();
                let mut right_conds = Vec::new();
                let mut keep = Vec::new();
                for cond in remaining.drain(..) {
                    if condition_applies_to(catalog, &cond, &left_tables) {
                        left_conds.push(cond);
                    } else if condition_applies_to(catalog, &cond, &right_tables) {
                        right_conds.push(cond);
                    } else {
                        keep.push(cond);
                    }
                }
                let left = self.push_predicates_down(catalog, *join.left, &mut left_conds);
                let right = self.push_predicates_down(catalog, *join.right, &mut right_conds);
                // Conditions that could not attach below come back up.
                remaining.extend(keep);
                remaining.extend(left_conds);
                remaining.extend(right_conds);
                PlanNode::Join(JoinNode {
                    left: Box::new(left),
                    right: Box::new(right),
                    conditions: join.conditions,
                })
            }
            PlanNode::Scan(scan) => {
                let tables = vec![scan.table.clone()];
                let mut applicable = Vec::new();
                let mut keep = Vec::new();
                for cond in remaining.drain(..) {
                    if condition_applies_to(catalog, &cond, &tables) {
                        applicable.push(cond);
                    } else {
                        keep.push(cond);
                    }
                }
                *remaining = keep;
                if applicable.is_empty() {
                    PlanNode::Scan(scan)
                } else {
                    PlanNode::Filter(FilterNode {
                        child: Box::new(PlanNode::Scan(scan)),
                        conditions: applicable,
                    })
                }
            }
            PlanNode::Filter(filter) => {
                let child = self.push_predicates_down(catalog, *filter.child, remaining);
                PlanNode::Filter(FilterNode {
                    child: Box::new(child),
                    conditions: filter.conditions,
                })
            }
            PlanNode::Project(project) => {
                let child = self.push_predicates_down(catalog, *project.child, remaining);
                PlanNode::Project(ProjectNode {
                    child: Box::new(child),
                    columns: project.columns,
                    select_all: project.select_all,
                })
            }
        }
    }

    /// Narrow the column sets flowing out of scans to what the root and
    /// the surviving conditions need. No Project is placed at the pushdown
    /// root; the user-facing Project is added afterward.
    fn push_projections_down<T: Catalog>(
        &self,
        catalog: &T,
        node: PlanNode,
        required: Vec<ColumnRef>,
        is_root: bool,
    ) -> Result<PlanNode, QuarryError> {
        match node {
            PlanNode::Join(join) => {
                let left_tables = join.left.output_tables();
                let right_tables = join.right.output_tables();
                let mut left_req = Vec::new();
                let mut right_req = Vec::new();
                for col in required {
                    if column_belongs_to(catalog, &col, &left_tables) {
                        push_unique(&mut left_req, col);
                    } else if column_belongs_to(catalog, &col, &right_tables) {
                        push_unique(&mut right_req, col);
                    }
                }
                for cond in &join.conditions {
                    for col in condition_columns(cond) {
                        if column_belongs_to(catalog, &col, &left_tables) {
                            push_unique(&mut left_req, col);
                        } else if column_belongs_to(catalog, &col, &right_tables) {
                            push_unique(&mut right_req, col);
                        }
                    }
                }
                let left = self.push_projections_down(catalog, *join.left, left_req, false)?;
                let right =
                    self.push_projections_down(catalog, *join.right, right_req, false)?;
                Ok(PlanNode::Join(JoinNode {
                    left: Box::new(left),
                    right: Box::new(right),
                    conditions: join.conditions,
                }))
            }
            PlanNode::Scan(scan) => {
                if is_root {
                    return Ok(PlanNode::Scan(scan));
                }
                let cols = table_subset(catalog, &required, &scan.table);
                let total = catalog.get_table_schema(&scan.table)?.size();
                if !cols.is_empty() && cols.len() < total {
                    Ok(PlanNode::Project(ProjectNode {
                        child: Box::new(PlanNode::Scan(scan)),
                        columns: cols,
                        select_all: false,
                    }))
                } else {
                    Ok(PlanNode::Scan(scan))
                }
            }
            PlanNode::Filter(filter) => {
                if let PlanNode::Scan(scan) = filter.child.as_ref() {
                    // Keep the filter directly on its scan so lowering can
                    // choose an index; the projection narrows above it.
                    let table = scan.table.clone();
                    if is_root {
                        return Ok(PlanNode::Filter(filter));
                    }
                    let cols = table_subset(catalog, &required, &table);
                    let total = catalog.get_table_schema(&table)?.size();
                    if !cols.is_empty() && cols.len() < total {
                        return Ok(PlanNode::Project(ProjectNode {
                            child: Box::new(PlanNode::Filter(filter)),
                            columns: cols,
                            select_all: false,
                        }));
                    }
                    return Ok(PlanNode::Filter(filter));
                }
                let mut child_req = required;
                for cond in &filter.conditions {
                    for col in condition_columns(cond) {
                        push_unique(&mut child_req, col);
                    }
                }
                let child =
                    self.push_projections_down(catalog, *filter.child, child_req, false)?;
                Ok(PlanNode::Filter(FilterNode {
                    child: Box::new(child),
                    conditions: filter.conditions,
                }))
            }
            PlanNode::Project(project) => Ok(PlanNode::Project(project)),
        }
    }

    /// Lower the optimized tree to a physical plan, choosing scan and join
    /// operators.
    pub fn lower<T: Catalog>(
        &self,
        catalog: &T,
        plan: &PlanNode,
        knobs: &Knobs,
    ) -> Result<PhysicalPlan, QuarryError> {
        match plan {
            PlanNode::Scan(scan) => self.plan_table_scan(catalog, &scan.table, vec![]),
            PlanNode::Filter(filter) => match filter.child.as_ref() {
                // A filter sitting on its scan is absorbed into the scan,
                // which applies the conditions itself.
                PlanNode::Scan(scan) => {
                    self.plan_table_scan(catalog, &scan.table, filter.conditions.clone())
                }
                _ => Ok(PhysicalPlan::Filter(FilterPlanNode {
                    child: Box::new(self.lower(catalog, &filter.child, knobs)?),
                    conditions: filter.conditions.clone(),
                })),
            },
            PlanNode::Join(join) => {
                let kind = if knobs.enable_nestloop {
                    JoinKind::NestedLoop
                } else if knobs.enable_sortmerge {
                    JoinKind::SortMerge
                } else {
                    return Err(QuarryError::ValidationError(String::from(
                        "No join executor enabled",
                    )));
                };
                Ok(PhysicalPlan::Join(JoinPlanNode {
                    kind,
                    left: Box::new(self.lower(catalog, &join.left, knobs)?),
                    right: Box::new(self.lower(catalog, &join.right, knobs)?),
                    conditions: join.conditions.clone(),
                }))
            }
            PlanNode::Project(project) => {
                let child = self.lower(catalog, &project.child, knobs)?;
                let columns = if project.select_all {
                    let mut all = Vec::new();
                    for table in project.child.output_tables() {
                        let schema = catalog.get_table_schema(&table)?;
                        for attr in schema.attributes() {
                            all.push(ColumnRef::new(&attr.table, &attr.name));
                        }
                    }
                    all
                } else {
                    project.columns.clone()
                };
                Ok(PhysicalPlan::Project(ProjectPlanNode {
                    child: Box::new(child),
                    columns,
                }))
            }
        }
    }

    /// Full planning pipeline for a SELECT: optimize, lower, and add the
    /// ORDER BY sort.
    pub fn plan_select<T: Catalog>(
        &self,
        catalog: &T,
        stats: &dyn Statistics,
        query: &QueryInfo,
        knobs: &Knobs,
    ) -> Result<PhysicalPlan, QuarryError> {
        let tree = self.optimize(catalog, stats, query)?;
        let mut plan = self.lower(catalog, &tree, knobs)?;
        if let Some((col, descending)) = &query.order_by {
            // The sort sits under the output projection so any table
            // column can order the result.
            plan = match plan {
                PhysicalPlan::Project(mut project) => {
                    project.child = Box::new(PhysicalPlan::Sort(SortPlanNode {
                        child: project.child,
                        col: col.clone(),
                        descending: *descending,
                    }));
                    PhysicalPlan::Project(project)
                }
                other => PhysicalPlan::Sort(SortPlanNode {
                    child: Box::new(other),
                    col: col.clone(),
                    descending: *descending,
                }),
            };
        }
        Ok(plan)
    }

    /// Choose how to read one table under a condition list: an index scan
    /// over the best index-compatible prefix, or a sequential scan.
    ///
    /// The best prefix is the longest one whose columns all carry
    /// value conditions, preferring more equalities on ties. The chosen
    /// scan receives the conditions re-sorted: index-column conditions
    /// first in index order, then the rest, then duplicates.
    pub fn plan_table_scan<T: Catalog>(
        &self,
        catalog: &T,
        table: &str,
        conds: Vec<Condition>,
    ) -> Result<PhysicalPlan, QuarryError> {
        let table_ptr = catalog.get_table_ptr(table)?;
        let table_meta = table_ptr.read().unwrap();
        if conds.is_empty() || table_meta.indexes.is_empty() {
            return Ok(PhysicalPlan::Scan(ScanPlan {
                kind: ScanKind::SeqScan,
                table: table.to_string(),
                conditions: conds,
                index_cols: vec![],
            }));
        }

        // First value condition per column; later ones are duplicates that
        // simply re-check.
        let mut conds_map: HashMap<&str, usize> = HashMap::new();
        let mut duplicates: Vec<usize> = Vec::new();
        for (i, cond) in conds.iter().enumerate() {
            let col_idx = table_meta
                .schema
                .find_column(&ColumnRef::new(table, &cond.lhs.column));
            let usable = match (&cond.rhs, col_idx) {
                (CondRhs::Value(v), Ok(idx)) => {
                    let dtype = table_meta.schema.get_attribute(idx).unwrap().dtype();
                    value_matches_column(v.dtype(), dtype)
                }
                _ => false,
            };
            if !usable {
                continue;
            }
            if conds_map.contains_key(cond.lhs.column.as_str()) {
                duplicates.push(i);
            } else {
                conds_map.insert(&cond.lhs.column, i);
            }
        }

        // Indexes in name order so ties break deterministically.
        let mut indexes: Vec<_> = table_meta.indexes.values().collect();
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        let mut best: Option<(&common::table::IndexMeta, usize, usize)> = None;
        for index in indexes {
            let mut len = 0;
            let mut equals = 0;
            for col in &index.cols {
                match conds_map.get(col.name.as_str()) {
                    Some(&ci) => {
                        if conds[ci].op == CompOp::Equals {
                            equals += 1;
                        }
                        len += 1;
                    }
                    None => break,
                }
            }
            if len == 0 || len > conds.len() {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, best_len, best_eq)) => {
                    len > best_len || (len == best_len && equals > best_eq)
                }
            };
            if better {
                best = Some((index, len, equals));
            }
        }

        match best {
            Some((index, len, _)) => {
                debug!(
                    "index scan on {} via {} (prefix {})",
                    table, index.name, len
                );
                let mut taken = vec![false; conds.len()];
                let mut reordered = Vec::with_capacity(conds.len());
                for col in &index.cols {
                    if let Some(&ci) = conds_map.get(col.name.as_str()) {
                        reordered.push(conds[ci].clone());
                        taken[ci] = true;
                    }
                }
                for &ci in &duplicates {
                    taken[ci] = true;
                }
                for (i, cond) in conds.iter().enumerate() {
                    if !taken[i] {
                        reordered.push(cond.clone());
                    }
                }
                for &ci in &duplicates {
                    reordered.push(conds[ci].clone());
                }
                Ok(PhysicalPlan::Scan(ScanPlan {
                    kind: ScanKind::IndexScan,
                    table: table.to_string(),
                    conditions: reordered,
                    index_cols: index.col_names(),
                }))
            }
            None => Ok(PhysicalPlan::Scan(ScanPlan {
                kind: ScanKind::SeqScan,
                table: table.to_string(),
                conditions: conds,
                index_cols: vec![],
            })),
        }
    }
}

/// A literal can feed an index key only when its type matches the column
/// (ints widen to floats).
fn value_matches_column(value: DataType, column: DataType) -> bool {
    matches!(
        (value, column),
        (DataType::Int, DataType::Int)
            | (DataType::Float, DataType::Float)
            | (DataType::Int, DataType::Float)
            | (DataType::Char(_), DataType::Char(_))
    )
}

/// Remove from `conds` every column-column condition connecting the joined
/// set to `right_table`, orienting each so its left side lives in the
/// joined set.
fn extract_join_conditions(
    conds: &mut Vec<Condition>,
    left_tables: &[String],
    right_table: &str,
) -> Vec<Condition> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < conds.len() {
        if let CondRhs::Column(rhs_col) = &conds[i].rhs {
            let lhs_table = conds[i].lhs.table.clone();
            let rhs_table = rhs_col.table.clone();
            if left_tables.contains(&lhs_table) && rhs_table == right_table {
                out.push(conds.remove(i));
                continue;
            }
            if lhs_table == right_table && left_tables.contains(&rhs_table) {
                let cond = conds.remove(i);
                out.push(cond.flip());
                continue;
            }
        }
        i += 1;
    }
    out
}

/// A condition applies to a table set when every column it references
/// lives there. Unqualified columns resolve through the catalog.
fn condition_applies_to<T: Catalog>(
    catalog: &T,
    cond: &Condition,
    tables: &[String],
) -> bool {
    let mut cols = vec![&cond.lhs];
    if let CondRhs::Column(c) = &cond.rhs {
        cols.push(c);
    }
    for col in cols {
        if !column_belongs_to(catalog, col, tables) {
            return false;
        }
    }
    true
}

fn column_belongs_to<T: Catalog>(catalog: &T, col: &ColumnRef, tables: &[String]) -> bool {
    if col.table.is_empty() {
        tables
            .iter()
            .any(|t| catalog.is_valid_column(t, &col.column))
    } else {
        tables.contains(&col.table)
    }
}

fn condition_columns(cond: &Condition) -> Vec<ColumnRef> {
    let mut out = vec![cond.lhs.clone()];
    if let CondRhs::Column(c) = &cond.rhs {
        out.push(c.clone());
    }
    out
}

fn push_unique(cols: &mut Vec<ColumnRef>, col: ColumnRef) {
    if !cols
        .iter()
        .any(|c| c.table == col.table && c.column == col.column)
    {
        cols.push(col);
    }
}

fn table_subset<T: Catalog>(
    catalog: &T,
    required: &[ColumnRef],
    table: &str,
) -> Vec<ColumnRef> {
    let tables = vec![table.to_string()];
    let mut out = Vec::new();
    for col in required {
        if column_belongs_to(catalog, col, &tables) {
            push_unique(&mut out, col.clone());
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::statistics::FixedStatistics;
    use common::database::Database;
    use common::table::{IndexColumn, IndexMeta, Table};
    use common::{Attribute, Field, TableSchema};
    use std::collections::HashMap as StdHashMap;
    use std::sync::{Arc, RwLock};

    fn add_table(db: &Database, name: &str, cid: u16, cols: &[(&str, DataType)]) {
        let attrs = cols
            .iter()
            .map(|(c, d)| Attribute::new(name, c, *d))
            .collect();
        db.tables.write().unwrap().insert(
            name.to_string(),
            Arc::new(RwLock::new(Table::new(
                name.to_string(),
                cid,
                TableSchema::new(attrs),
            ))),
        );
    }

    fn catalog() -> Database {
        let db = Database::new(String::from("opt"));
        add_table(
            &db,
            "u",
            1,
            &[
                ("id", DataType::Int),
                ("age", DataType::Int),
                ("n", DataType::Char(8)),
            ],
        );
        add_table(
            &db,
            "o",
            2,
            &[("uid", DataType::Int), ("total", DataType::Float)],
        );
        add_table(&db, "w", 3, &[("oid", DataType::Int)]);
        db
    }

    fn col(table: &str, column: &str) -> ColumnRef {
        ColumnRef::new(table, column)
    }

    fn col_eq_col(lt: &str, lc: &str, rt: &str, rc: &str) -> Condition {
        Condition::new(col(lt, lc), CompOp::Equals, CondRhs::Column(col(rt, rc)))
    }

    fn col_op_val(t: &str, c: &str, op: CompOp, v: Field) -> Condition {
        Condition::new(col(t, c), op, CondRhs::Value(v))
    }

    fn query(tables: Vec<&str>, conds: Vec<Condition>, cols: Vec<ColumnRef>) -> QueryInfo {
        let select_all = cols.is_empty();
        QueryInfo {
            tables: tables.into_iter().map(String::from).collect(),
            aliases: StdHashMap::new(),
            cols,
            select_all,
            conds,
            join_conds: vec![],
            order_by: None,
        }
    }

    /// Collect (depth-first) all conditions attached anywhere in a tree.
    fn collect_conditions(node: &PlanNode, out: &mut Vec<Condition>) {
        match node {
            PlanNode::Scan(_) => {}
            PlanNode::Filter(f) => {
                out.extend(f.conditions.clone());
                collect_conditions(&f.child, out);
            }
            PlanNode::Project(p) => collect_conditions(&p.child, out),
            PlanNode::Join(j) => {
                out.extend(j.conditions.clone());
                collect_conditions(&j.left, out);
                collect_conditions(&j.right, out);
            }
        }
    }

    #[test]
    fn test_join_order_smallest_first() {
        let db = catalog();
        let stats = FixedStatistics::new(vec![("u", 10), ("o", 1000)]);
        let q = query(
            vec!["o", "u"],
            vec![col_eq_col("u", "id", "o", "uid")],
            vec![],
        );
        let plan = Optimizer::new().optimize(&db, &stats, &q).unwrap();
        // Root project over a join whose left child scans the small table.
        let join = match &plan {
            PlanNode::Project(p) => match p.child.as_ref() {
                PlanNode::Join(j) => j.clone(),
                other => panic!("expected join, got {}", other),
            },
            other => panic!("expected project root, got {}", other),
        };
        assert_eq!(vec![String::from("u")], join.left.output_tables());
        assert_eq!(vec![String::from("o")], join.right.output_tables());
        assert_eq!(1, join.conditions.len());
        assert_eq!("u.id=o.uid", join.conditions[0].to_string());
    }

    #[test]
    fn test_join_order_left_deep_increasing() {
        let db = catalog();
        let stats = FixedStatistics::new(vec![("u", 10), ("o", 100), ("w", 1000)]);
        let q = query(
            vec!["w", "o", "u"],
            vec![
                col_eq_col("u", "id", "o", "uid"),
                col_eq_col("o", "uid", "w", "oid"),
            ],
            vec![],
        );
        let plan = Optimizer::new().optimize(&db, &stats, &q).unwrap();
        // (((u ⋈ o) ⋈ w)): strictly left-deep in cardinality order.
        let outer = match &plan {
            PlanNode::Project(p) => match p.child.as_ref() {
                PlanNode::Join(j) => j.clone(),
                other => panic!("expected join, got {}", other),
            },
            other => panic!("expected project root, got {}", other),
        };
        assert_eq!(vec![String::from("w")], outer.right.output_tables());
        let inner = match outer.left.as_ref() {
            PlanNode::Join(j) => j,
            other => panic!("expected inner join, got {}", other),
        };
        assert_eq!(vec![String::from("u")], inner.left.output_tables());
        assert_eq!(vec![String::from("o")], inner.right.output_tables());
    }

    #[test]
    fn test_join_order_swaps_connectable_candidate() {
        let db = catalog();
        // Cardinality order is u < o < w but only w connects to u.
        let stats = FixedStatistics::new(vec![("u", 10), ("o", 100), ("w", 1000)]);
        let q = query(
            vec!["u", "o", "w"],
            vec![col_eq_col("u", "id", "w", "oid")],
            vec![],
        );
        let plan = Optimizer::new().optimize(&db, &stats, &q).unwrap();
        let outer = match &plan {
            PlanNode::Project(p) => match p.child.as_ref() {
                PlanNode::Join(j) => j.clone(),
                other => panic!("expected join, got {}", other),
            },
            other => panic!("expected project root, got {}", other),
        };
        // w was swapped into second position; o joins last by product.
        assert_eq!(vec![String::from("o")], outer.right.output_tables());
        assert!(outer.conditions.is_empty());
        let inner = match outer.left.as_ref() {
            PlanNode::Join(j) => j,
            other => panic!("expected inner join, got {}", other),
        };
        assert_eq!(vec![String::from("u")], inner.left.output_tables());
        assert_eq!(vec![String::from("w")], inner.right.output_tables());
        assert_eq!(1, inner.conditions.len());
    }

    #[test]
    fn test_predicate_pushdown_sides() {
        let db = catalog();
        let stats = FixedStatistics::new(vec![("u", 10), ("o", 1000)]);
        let q = query(
            vec!["u", "o"],
            vec![
                col_eq_col("u", "id", "o", "uid"),
                col_op_val("u", "age", CompOp::GreaterThanOrEq, Field::IntField(18)),
                col_op_val("o", "total", CompOp::LessThan, Field::FloatField(100.0)),
            ],
            vec![col("u", "n")],
        );
        let plan = Optimizer::new().optimize(&db, &stats, &q).unwrap();
        let join = match &plan {
            PlanNode::Project(p) => match p.child.as_ref() {
                PlanNode::Join(j) => j.clone(),
                other => panic!("expected join under root project, got {}", other),
            },
            other => panic!("expected project root, got {}", other),
        };
        // The join keeps only the cross condition.
        assert_eq!(1, join.conditions.len());
        assert_eq!("u.id=o.uid", join.conditions[0].to_string());
        // Each side filter carries its own single-table condition.
        fn find_filter(node: &PlanNode) -> Option<&FilterNode> {
            match node {
                PlanNode::Filter(f) => Some(f),
                PlanNode::Project(p) => find_filter(&p.child),
                _ => None,
            }
        }
        let left_filter = find_filter(&join.left).expect("left side filter");
        assert_eq!("u.age>=18", left_filter.conditions[0].to_string());
        let right_filter = find_filter(&join.right).expect("right side filter");
        assert_eq!("o.total<100.0", right_filter.conditions[0].to_string());
    }

    #[test]
    fn test_pushdown_preserves_condition_multiset() {
        let db = catalog();
        let stats = FixedStatistics::new(vec![("u", 10), ("o", 1000)]);
        let conds = vec![
            col_eq_col("u", "id", "o", "uid"),
            col_op_val("u", "age", CompOp::GreaterThanOrEq, Field::IntField(18)),
            col_op_val("o", "total", CompOp::LessThan, Field::FloatField(100.0)),
            col_op_val("u", "age", CompOp::LessThan, Field::IntField(99)),
        ];
        let q = query(vec!["u", "o"], conds.clone(), vec![]);
        let plan = Optimizer::new().optimize(&db, &stats, &q).unwrap();
        let mut seen = Vec::new();
        collect_conditions(&plan, &mut seen);
        let mut want: Vec<String> = conds.iter().map(|c| c.to_string()).collect();
        let mut got: Vec<String> = seen.iter().map(|c| c.to_string()).collect();
        want.sort();
        got.sort();
        assert_eq!(want, got);
    }

    #[test]
    fn test_projection_pushdown_narrows_scans() {
        let db = catalog();
        let stats = FixedStatistics::new(vec![("u", 10), ("o", 1000)]);
        let q = query(
            vec!["u", "o"],
            vec![col_eq_col("u", "id", "o", "uid")],
            vec![col("u", "n")],
        );
        let plan = Optimizer::new().optimize(&db, &stats, &q).unwrap();
        // u scans through a Project keeping exactly {u.id, u.n}.
        fn find_project_above_scan(node: &PlanNode) -> Vec<Vec<String>> {
            match node {
                PlanNode::Project(p) => {
                    if matches!(p.child.as_ref(), PlanNode::Scan(_) | PlanNode::Filter(_)) {
                        vec![p.columns.iter().map(|c| c.to_string()).collect()]
                    } else {
                        find_project_above_scan(&p.child)
                    }
                }
                PlanNode::Filter(f) => find_project_above_scan(&f.child),
                PlanNode::Join(j) => {
                    let mut out = find_project_above_scan(&j.left);
                    out.extend(find_project_above_scan(&j.right));
                    out
                }
                PlanNode::Scan(_) => vec![],
            }
        }
        let join = match &plan {
            PlanNode::Project(p) => p.child.as_ref(),
            other => panic!("expected project root, got {}", other),
        };
        let mut projected = find_project_above_scan(join);
        projected.iter_mut().for_each(|cols| cols.sort());
        assert!(projected.contains(&vec![String::from("u.id"), String::from("u.n")]));
        // o has 2 columns and needs only uid, so it projects down to one.
        assert!(projected.contains(&vec![String::from("o.uid")]));
    }

    #[test]
    fn test_root_project_matches_user_columns() {
        let db = catalog();
        let stats = FixedStatistics::new(vec![("u", 10)]);
        let q = query(
            vec!["u"],
            vec![col_op_val("u", "age", CompOp::GreaterThan, Field::IntField(1))],
            vec![col("u", "n"), col("u", "id")],
        );
        let plan = Optimizer::new().optimize(&db, &stats, &q).unwrap();
        match &plan {
            PlanNode::Project(p) => {
                assert!(!p.select_all);
                let cols: Vec<String> = p.columns.iter().map(|c| c.to_string()).collect();
                assert_eq!(vec![String::from("u.n"), String::from("u.id")], cols);
            }
            other => panic!("expected project root, got {}", other),
        }
    }

    fn indexed_catalog() -> Database {
        let db = catalog();
        let tables = db.tables.write().unwrap();
        let mut table = tables.get("u").unwrap().write().unwrap();
        table.indexes.insert(
            String::from("u_id"),
            IndexMeta {
                table: String::from("u"),
                name: String::from("u_id"),
                container_id: 10,
                key_len: 4,
                cols: vec![IndexColumn {
                    name: String::from("id"),
                    dtype: DataType::Int,
                    len: 4,
                    offset: 0,
                }],
            },
        );
        table.indexes.insert(
            String::from("u_id_age"),
            IndexMeta {
                table: String::from("u"),
                name: String::from("u_id_age"),
                container_id: 11,
                key_len: 8,
                cols: vec![
                    IndexColumn {
                        name: String::from("id"),
                        dtype: DataType::Int,
                        len: 4,
                        offset: 0,
                    },
                    IndexColumn {
                        name: String::from("age"),
                        dtype: DataType::Int,
                        len: 4,
                        offset: 4,
                    },
                ],
            },
        );
        drop(table);
        drop(tables);
        db
    }

    #[test]
    fn test_index_selection_longest_prefix() {
        let db = indexed_catalog();
        let conds = vec![
            col_op_val("u", "age", CompOp::GreaterThan, Field::IntField(20)),
            col_op_val("u", "id", CompOp::Equals, Field::IntField(5)),
        ];
        let plan = Optimizer::new().plan_table_scan(&db, "u", conds).unwrap();
        match plan {
            PhysicalPlan::Scan(scan) => {
                assert_eq!(ScanKind::IndexScan, scan.kind);
                // Both columns match the two-column index.
                assert_eq!(vec![String::from("id"), String::from("age")], scan.index_cols);
                // Conditions re-sorted into index order.
                assert_eq!("u.id=5", scan.conditions[0].to_string());
                assert_eq!("u.age>20", scan.conditions[1].to_string());
            }
            other => panic!("expected scan plan, got {:?}", other),
        }
    }

    #[test]
    fn test_index_selection_falls_back_to_seq() {
        let db = indexed_catalog();
        // No condition on a leading index column.
        let conds = vec![col_op_val("u", "age", CompOp::Equals, Field::IntField(20))];
        let plan = Optimizer::new()
            .plan_table_scan(&db, "u", conds.clone())
            .unwrap();
        match plan {
            PhysicalPlan::Scan(scan) => {
                assert_eq!(ScanKind::SeqScan, scan.kind);
                assert_eq!(conds, scan.conditions);
            }
            other => panic!("expected scan plan, got {:?}", other),
        }
        // Column-column conditions cannot feed an index prefix.
        let conds = vec![col_eq_col("u", "id", "u", "age")];
        let plan = Optimizer::new().plan_table_scan(&db, "u", conds).unwrap();
        match plan {
            PhysicalPlan::Scan(scan) => assert_eq!(ScanKind::SeqScan, scan.kind),
            other => panic!("expected scan plan, got {:?}", other),
        }
    }

    #[test]
    fn test_lowering_knobs() {
        let db = catalog();
        let stats = FixedStatistics::new(vec![("u", 10), ("o", 100)]);
        let q = query(
            vec!["u", "o"],
            vec![col_eq_col("u", "id", "o", "uid")],
            vec![],
        );
        let opt = Optimizer::new();
        let tree = opt.optimize(&db, &stats, &q).unwrap();

        let knobs = Knobs {
            enable_output_file: false,
            enable_nestloop: false,
            enable_sortmerge: true,
        };
        fn find_join(plan: &PhysicalPlan) -> Option<&JoinPlanNode> {
            match plan {
                PhysicalPlan::Join(j) => Some(j),
                PhysicalPlan::Project(p) => find_join(&p.child),
                PhysicalPlan::Filter(f) => find_join(&f.child),
                PhysicalPlan::Sort(s) => find_join(&s.child),
                PhysicalPlan::Scan(_) => None,
            }
        }
        let phys = opt.lower(&db, &tree, &knobs).unwrap();
        assert_eq!(JoinKind::SortMerge, find_join(&phys).unwrap().kind);

        let knobs = Knobs {
            enable_output_file: false,
            enable_nestloop: false,
            enable_sortmerge: false,
        };
        assert!(opt.lower(&db, &tree, &knobs).is_err());
    }

    #[test]
    fn test_explain_rendering() {
        let db = catalog();
        let stats = FixedStatistics::new(vec![("u", 10), ("o", 1000)]);
        let q = query(
            vec!["u", "o"],
            vec![
                col_eq_col("u", "id", "o", "uid"),
                col_op_val("u", "age", CompOp::GreaterThanOrEq, Field::IntField(18)),
            ],
            vec![],
        );
        let plan = Optimizer::new().optimize(&db, &stats, &q).unwrap();
        let text = plan.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!("Project(columns=[*])", lines[0]);
        assert_eq!("\tJoin(tables=[o,u],condition=[u.id=o.uid])", lines[1]);
        assert_eq!("\t\tFilter(condition=[u.age>=18])", lines[2]);
        assert_eq!("\t\t\tScan(table=u)", lines[3]);
        assert_eq!("\t\tScan(table=o)", lines[4]);
    }
}

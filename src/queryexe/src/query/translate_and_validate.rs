use common::catalog::Catalog;
use common::physical_plan::SetClause;
use common::{ColumnRef, CompOp, CondRhs, Condition, DataType, Field, QuarryError};
use sqlparser::ast::{
    BinaryOperator, Expr, JoinConstraint, JoinOperator, SelectItem, SetExpr, TableFactor,
    UnaryOperator, Value,
};
use std::collections::HashMap;

/// The analyzed form of a SELECT: names bound, aliases resolved, literals
/// coerced. This is what the optimizer consumes.
#[derive(Debug, Clone)]
pub struct QueryInfo {
    /// Base tables in FROM order.
    pub tables: Vec<String>,
    /// Alias to table map for the query.
    pub aliases: HashMap<String, String>,
    /// Output columns in SELECT order; empty for `*`.
    pub cols: Vec<ColumnRef>,
    pub select_all: bool,
    /// WHERE conditions.
    pub conds: Vec<Condition>,
    /// Explicit JOIN ON conditions.
    pub join_conds: Vec<Condition>,
    /// ORDER BY column and direction (true = DESC).
    pub order_by: Option<(ColumnRef, bool)>,
}

/// Translates statements to analyzed queries, validating every table and
/// column reference against the catalog.
pub struct TranslateAndValidate<'a, T: Catalog> {
    catalog: &'a T,
    /// Tables encountered so far; used to disambiguate bare column names.
    tables: Vec<String>,
    aliases: HashMap<String, String>,
}

impl<'a, T: 'a + Catalog> TranslateAndValidate<'a, T> {
    fn new(catalog: &'a T) -> Self {
        Self {
            catalog,
            tables: Vec::new(),
            aliases: HashMap::new(),
        }
    }

    /// Analyze a SELECT query.
    pub fn from_sql(query: &sqlparser::ast::Query, catalog: &'a T) -> Result<QueryInfo, QuarryError> {
        let mut translator = TranslateAndValidate::new(catalog);
        translator.process_query(query)
    }

    /// Analyze the WHERE clause of a single-table statement (UPDATE,
    /// DELETE).
    pub fn conditions_for_table(
        catalog: &'a T,
        table: &str,
        selection: Option<&Expr>,
    ) -> Result<Vec<Condition>, QuarryError> {
        if !catalog.is_valid_table(table) {
            return Err(QuarryError::ValidationError(format!(
                "Table {} not found",
                table
            )));
        }
        let mut translator = TranslateAndValidate::new(catalog);
        translator.tables.push(table.to_string());
        let mut conds = Vec::new();
        if let Some(expr) = selection {
            translator.flatten_condition(expr, &mut conds)?;
        }
        Ok(conds)
    }

    /// Validate and coerce an INSERT row.
    pub fn values_for_table(
        catalog: &'a T,
        table: &str,
        exprs: &[Expr],
    ) -> Result<Vec<Field>, QuarryError> {
        let schema = catalog.get_table_schema(table)?;
        if exprs.len() != schema.size() {
            return Err(QuarryError::ValidationError(format!(
                "Table {} expects {} values, got {}",
                table,
                schema.size(),
                exprs.len()
            )));
        }
        let mut values = Vec::with_capacity(exprs.len());
        for (expr, attr) in exprs.iter().zip(schema.attributes()) {
            let literal = parse_literal(expr)?;
            values.push(literal.coerce_to(attr.dtype())?);
        }
        Ok(values)
    }

    /// Validate the SET clauses of an UPDATE.
    pub fn assignments_for_table(
        catalog: &'a T,
        table: &str,
        assignments: &[sqlparser::ast::Assignment],
    ) -> Result<Vec<SetClause>, QuarryError> {
        let schema = catalog.get_table_schema(table)?;
        let mut clauses = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            if assignment.id.len() != 1 {
                return Err(QuarryError::ValidationError(String::from(
                    "Qualified columns are not supported in SET",
                )));
            }
            let column = assignment.id[0].value.clone();
            let idx = schema.find_column(&ColumnRef::new("", &column))?;
            let dtype = schema.get_attribute(idx).unwrap().dtype();
            let value = parse_literal(&assignment.value)?.coerce_to(dtype)?;
            clauses.push(SetClause { column, value });
        }
        Ok(clauses)
    }

    fn process_query(&mut self, query: &sqlparser::ast::Query) -> Result<QueryInfo, QuarryError> {
        if query.with.is_some() {
            return Err(QuarryError::ValidationError(String::from(
                "WITH is not supported",
            )));
        }
        if query.limit.is_some() || query.offset.is_some() {
            return Err(QuarryError::ValidationError(String::from(
                "LIMIT/OFFSET are not supported",
            )));
        }
        let select = match query.body.as_ref() {
            SetExpr::Select(b) => b,
            _ => {
                return Err(QuarryError::ValidationError(String::from(
                    "Only plain SELECT queries are supported",
                )))
            }
        };
        if select.distinct.is_some() {
            return Err(QuarryError::ValidationError(String::from(
                "DISTINCT is not supported",
            )));
        }
        if select.having.is_some() || !select.group_by.is_empty() {
            return Err(QuarryError::ValidationError(String::from(
                "GROUP BY/HAVING are not supported",
            )));
        }

        // FROM: a comma list of tables, each optionally with JOIN clauses.
        let mut join_conds = Vec::new();
        for table_with_joins in &select.from {
            self.process_table_factor(&table_with_joins.relation)?;
            for join in &table_with_joins.joins {
                self.process_table_factor(&join.relation)?;
                let constraint = match &join.join_operator {
                    JoinOperator::Inner(c) => c,
                    _ => {
                        return Err(QuarryError::ValidationError(String::from(
                            "Only inner joins are supported",
                        )))
                    }
                };
                match constraint {
                    JoinConstraint::On(expr) => {
                        self.flatten_condition(expr, &mut join_conds)?;
                    }
                    JoinConstraint::None => {}
                    _ => {
                        return Err(QuarryError::ValidationError(String::from(
                            "Only ON join constraints are supported",
                        )))
                    }
                }
            }
        }
        if self.tables.is_empty() {
            return Err(QuarryError::ValidationError(String::from(
                "Query has no FROM clause",
            )));
        }

        // WHERE.
        let mut conds = Vec::new();
        if let Some(expr) = &select.selection {
            self.flatten_condition(expr, &mut conds)?;
        }

        // SELECT list.
        let mut cols = Vec::new();
        let mut select_all = false;
        for item in &select.projection {
            match item {
                SelectItem::Wildcard(_) => {
                    if select.projection.len() > 1 {
                        return Err(QuarryError::ValidationError(String::from(
                            "Cannot mix * with other select expressions",
                        )));
                    }
                    select_all = true;
                }
                SelectItem::UnnamedExpr(expr) => {
                    cols.push(self.expr_to_column(expr)?);
                }
                _ => {
                    return Err(QuarryError::ValidationError(String::from(
                        "Unsupported select expression",
                    )))
                }
            }
        }

        // ORDER BY: one column with an optional direction.
        let order_by = match query.order_by.len() {
            0 => None,
            1 => {
                let ob = &query.order_by[0];
                let col = self.expr_to_column(&ob.expr)?;
                Some((col, ob.asc == Some(false)))
            }
            _ => {
                return Err(QuarryError::ValidationError(String::from(
                    "ORDER BY supports a single column",
                )))
            }
        };

        Ok(QueryInfo {
            tables: self.tables.clone(),
            aliases: self.aliases.clone(),
            cols,
            select_all,
            conds,
            join_conds,
            order_by,
        })
    }

    /// Register a FROM-list table and its alias.
    fn process_table_factor(&mut self, tf: &TableFactor) -> Result<(), QuarryError> {
        match tf {
            TableFactor::Table { name, alias, .. } => {
                let name = common::get_name(name)?;
                if !self.catalog.is_valid_table(&name) {
                    return Err(QuarryError::ValidationError(format!(
                        "Table {} not found",
                        name
                    )));
                }
                if let Some(alias) = alias {
                    self.aliases
                        .insert(alias.name.value.clone(), name.clone());
                }
                self.tables.push(name);
                Ok(())
            }
            _ => Err(QuarryError::ValidationError(String::from(
                "Derived tables are not supported",
            ))),
        }
    }

    /// Split a WHERE/ON expression into its AND-ed comparisons.
    fn flatten_condition(
        &self,
        expr: &Expr,
        out: &mut Vec<Condition>,
    ) -> Result<(), QuarryError> {
        match expr {
            Expr::BinaryOp { left, op, right } if *op == BinaryOperator::And => {
                self.flatten_condition(left, out)?;
                self.flatten_condition(right, out)?;
                Ok(())
            }
            Expr::Nested(inner) => self.flatten_condition(inner, out),
            Expr::BinaryOp { left, op, right } => {
                let op = binary_operator_to_comp(op)?;
                let lhs = self.expr_to_operand(left)?;
                let rhs = self.expr_to_operand(right)?;
                let cond = match (lhs, rhs) {
                    (Operand::Col(l), Operand::Val(v)) => {
                        Condition::new(l, op, CondRhs::Value(v))
                    }
                    (Operand::Val(v), Operand::Col(r)) => {
                        // Normalize literals onto the right-hand side.
                        Condition::new(r, op.flip(), CondRhs::Value(v))
                    }
                    (Operand::Col(l), Operand::Col(r)) => {
                        Condition::new(l, op, CondRhs::Column(r))
                    }
                    (Operand::Val(_), Operand::Val(_)) => {
                        return Err(QuarryError::ValidationError(String::from(
                            "Conditions must reference at least one column",
                        )))
                    }
                };
                self.type_check(&cond)?;
                out.push(self.coerce_literal(cond)?);
                Ok(())
            }
            _ => Err(QuarryError::ValidationError(String::from(
                "Unsupported condition expression",
            ))),
        }
    }

    /// Confirm the operand types are comparable, given the catalog.
    fn type_check(&self, cond: &Condition) -> Result<(), QuarryError> {
        let lhs_type = self.column_dtype(&cond.lhs)?;
        let rhs_type = match &cond.rhs {
            CondRhs::Value(v) => v.dtype(),
            CondRhs::Column(c) => self.column_dtype(c)?,
        };
        let compatible = matches!(
            (lhs_type, rhs_type),
            (DataType::Int, DataType::Int)
                | (DataType::Float, DataType::Float)
                | (DataType::Int, DataType::Float)
                | (DataType::Float, DataType::Int)
                | (DataType::Char(_), DataType::Char(_))
        );
        if compatible {
            Ok(())
        } else {
            Err(QuarryError::TypeError(format!(
                "Cannot compare {} and {}",
                lhs_type, rhs_type
            )))
        }
    }

    /// Widen an int literal to float when the column is a float, so the
    /// condition's stored type matches the column from here on.
    fn coerce_literal(&self, mut cond: Condition) -> Result<Condition, QuarryError> {
        if let CondRhs::Value(Field::IntField(x)) = &cond.rhs {
            if self.column_dtype(&cond.lhs)? == DataType::Float {
                cond.rhs = CondRhs::Value(Field::FloatField(*x as f32));
            }
        }
        Ok(cond)
    }

    fn column_dtype(&self, col: &ColumnRef) -> Result<DataType, QuarryError> {
        let schema = self.catalog.get_table_schema(&col.table)?;
        let idx = schema.find_column(&ColumnRef::new(&col.table, &col.column))?;
        Ok(schema.get_attribute(idx).unwrap().dtype())
    }

    fn expr_to_operand(&self, expr: &Expr) -> Result<Operand, QuarryError> {
        match expr {
            Expr::Value(_) | Expr::UnaryOp { .. } => Ok(Operand::Val(parse_literal(expr)?)),
            _ => Ok(Operand::Col(self.expr_to_column(expr)?)),
        }
    }

    fn expr_to_column(&self, expr: &Expr) -> Result<ColumnRef, QuarryError> {
        match expr {
            Expr::Identifier(ident) => self.disambiguate_name(&[ident.value.as_str()]),
            Expr::CompoundIdentifier(parts) => {
                let parts: Vec<&str> = parts.iter().map(|p| p.value.as_str()).collect();
                self.disambiguate_name(&parts)
            }
            _ => Err(QuarryError::ValidationError(String::from(
                "Unsupported expression where a column was expected",
            ))),
        }
    }

    /// Resolve a possibly-qualified column name against the query's tables,
    /// mapping aliases back to their tables and rejecting ambiguity.
    fn disambiguate_name(&self, parts: &[&str]) -> Result<ColumnRef, QuarryError> {
        let orig = parts.join(".");
        if parts.len() > 2 {
            return Err(QuarryError::ValidationError(format!(
                "No schema-qualified names supported in {}",
                orig
            )));
        }
        if parts.len() == 2 {
            let prefix = parts[0];
            let column = parts[1];
            let (table, alias) = match self.aliases.get(prefix) {
                Some(table) => (table.clone(), Some(prefix)),
                None => (prefix.to_string(), None),
            };
            if !self.tables.contains(&table) {
                return Err(QuarryError::ValidationError(format!(
                    "Table {} is not part of the query",
                    prefix
                )));
            }
            if !self.catalog.is_valid_column(&table, column) {
                return Err(QuarryError::ValidationError(format!(
                    "Column {} not found",
                    orig
                )));
            }
            return Ok(match alias {
                Some(a) => ColumnRef::with_alias(&table, column, a),
                None => ColumnRef::new(&table, column),
            });
        }

        let mut found = None;
        for table in &self.tables {
            if self.catalog.is_valid_column(table, &orig) {
                if found.is_some() {
                    return Err(QuarryError::ValidationError(format!(
                        "The column {} could refer to more than one table in the query",
                        orig
                    )));
                }
                found = Some(ColumnRef::new(table, &orig));
            }
        }
        found.ok_or_else(|| {
            QuarryError::ValidationError(format!("Column {} not found", orig))
        })
    }
}

enum Operand {
    Col(ColumnRef),
    Val(Field),
}

/// Parse a literal expression to a field.
pub fn parse_literal(expr: &Expr) -> Result<Field, QuarryError> {
    match expr {
        Expr::Value(value) => match value {
            Value::Number(s, _) => {
                if s.contains('.') || s.contains('e') || s.contains('E') {
                    s.parse::<f32>().map(Field::FloatField).map_err(|_| {
                        QuarryError::SyntaxError(format!("Unsupported literal {}", s))
                    })
                } else {
                    s.parse::<i32>().map(Field::IntField).map_err(|_| {
                        QuarryError::SyntaxError(format!("Unsupported literal {}", s))
                    })
                }
            }
            Value::SingleQuotedString(s) => Ok(Field::StringField(s.clone())),
            _ => Err(QuarryError::SyntaxError(format!(
                "Unsupported literal {}",
                value
            ))),
        },
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match parse_literal(expr)? {
            Field::IntField(x) => Ok(Field::IntField(-x)),
            Field::FloatField(x) => Ok(Field::FloatField(-x)),
            f => Err(QuarryError::SyntaxError(format!(
                "Cannot negate {}",
                f
            ))),
        },
        _ => Err(QuarryError::SyntaxError(String::from(
            "Expected a literal value",
        ))),
    }
}

fn binary_operator_to_comp(op: &BinaryOperator) -> Result<CompOp, QuarryError> {
    match op {
        BinaryOperator::Gt => Ok(CompOp::GreaterThan),
        BinaryOperator::Lt => Ok(CompOp::LessThan),
        BinaryOperator::GtEq => Ok(CompOp::GreaterThanOrEq),
        BinaryOperator::LtEq => Ok(CompOp::LessThanOrEq),
        BinaryOperator::Eq => Ok(CompOp::Equals),
        BinaryOperator::NotEq => Ok(CompOp::NotEq),
        _ => Err(QuarryError::ValidationError(String::from(
            "Unsupported binary operation",
        ))),
    }
}

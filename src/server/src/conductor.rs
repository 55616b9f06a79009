use crate::commands;
use crate::database_state::DatabaseState;
use crate::record_printer::{RecordPrinter, ResponseBuffer};
use crate::server_state::ServerState;
use crate::sql_parser::{ParsedStatement, SQLParser, SpecialStatement};
use common::physical_plan::{DdlKind, DdlPlan, DmlKind, DmlPlan};
use common::{get_attr, get_name, QuarryError, QueryResult};
use optimizer::{HeapStatistics, Optimizer};
use queryexe::query::{Executor, TranslateAndValidate};
use sqlparser::ast::{Expr, ObjectType, SetExpr, Statement, TableFactor, Value};
use std::sync::{Arc, Mutex};
use txn_manager::transactions::Transaction;

const HELP_INFO: &str = "Supported SQL syntax:\n\
  command ;\n\
command:\n\
  CREATE TABLE table_name (column_name type [, column_name type ...])\n\
  DROP TABLE table_name\n\
  CREATE INDEX table_name (column_name [, column_name ...])\n\
  DROP INDEX table_name (column_name [, column_name ...])\n\
  INSERT INTO table_name VALUES (value [, value ...])\n\
  DELETE FROM table_name [WHERE where_clause]\n\
  UPDATE table_name SET column_name = value [, column_name = value ...] [WHERE where_clause]\n\
  SELECT selector FROM table_name [, table_name ...] [WHERE where_clause] [ORDER BY column [ASC|DESC]]\n\
  EXPLAIN select_statement\n\
type:\n\
  {INT | FLOAT | CHAR(n)}\n\
where_clause:\n\
  condition [AND condition ...]\n\
condition:\n\
  column op {column | value}\n\
column:\n\
  [table_name.]column_name\n\
op:\n\
  {= | <> | < | > | <= | >=}\n\
selector:\n\
  {* | column [, column ...]}\n";

/// The query coordinator for one client session: parses requests, drives
/// the analyzer/optimizer/executor pipeline, and owns the session's open
/// transaction.
pub struct Conductor {
    pub parser: SQLParser,
    pub optimizer: Optimizer,
    pub executor: Executor,
    session_txn: Option<Arc<Mutex<Transaction>>>,
}

impl Conductor {
    pub fn new(
        parser: SQLParser,
        optimizer: Optimizer,
        executor: Executor,
    ) -> Result<Self, QuarryError> {
        Ok(Conductor {
            parser,
            optimizer,
            executor,
            session_txn: None,
        })
    }

    /// The session's open transaction, starting an implicit one if needed.
    fn current_txn(&mut self, db_state: &DatabaseState) -> Arc<Mutex<Transaction>> {
        if self.session_txn.is_none() {
            self.session_txn = Some(
                db_state
                    .transaction_manager
                    .begin(&db_state.log_manager),
            );
        }
        self.session_txn.clone().unwrap()
    }

    /// Auto-commit semantics: an implicit transaction commits when its
    /// statement succeeds and aborts (undoing partial effects) when it
    /// fails. An explicit transaction is left untouched either way.
    fn finish_statement(
        &mut self,
        db_state: &DatabaseState,
        result: Result<QueryResult, QuarryError>,
    ) -> Result<QueryResult, QuarryError> {
        if let Some(txn) = self.session_txn.clone() {
            let explicit = txn.lock().unwrap().is_explicit();
            if !explicit {
                let outcome = match &result {
                    Ok(_) => db_state
                        .transaction_manager
                        .commit(&txn, &db_state.log_manager),
                    Err(_) => db_state.transaction_manager.abort(
                        &txn,
                        &db_state.log_manager,
                        &db_state.database,
                    ),
                };
                self.session_txn = None;
                outcome?;
            }
        }
        result
    }

    /// Processes a server command entered by the user.
    pub fn run_command(
        &mut self,
        command: commands::Commands,
        client_id: u64,
        server_state: &Arc<ServerState>,
    ) -> Result<String, QuarryError> {
        match command {
            commands::Commands::Create(name) => {
                info!("Processing COMMAND::Create {:?}", name);
                server_state.create_database(&name)
            }
            commands::Commands::Connect(name) => {
                info!("Processing COMMAND::Connect {:?}", name);
                server_state.connect_to_db(&name, client_id)
            }
            commands::Commands::Import(path_and_name) => {
                info!("Processing COMMAND::Import {:?}", path_and_name);
                let db_state = server_state.get_connected_db(client_id)?;
                let txn = self.current_txn(&db_state);
                let res = crate::csv_utils::import_csv(&db_state, &path_and_name, &txn)
                    .map(|n| QueryResult::new(&format!("Imported {} record(s)", n)));
                self.finish_statement(&db_state, res)
                    .map(|qr| qr.result().to_string())
            }
            commands::Commands::ShowTables => {
                let db_state = server_state.get_connected_db(client_id)?;
                db_state.get_table_names()
            }
            commands::Commands::ShowDatabases => Ok(server_state.database_names().join(",")),
            commands::Commands::Reset => {
                let db_state = server_state.get_connected_db(client_id)?;
                server_state.reset_database(&db_state.name)
            }
        }
    }

    /// Runs one SQL request.
    pub fn run_statement(
        &mut self,
        input: &str,
        db_state: &Arc<DatabaseState>,
    ) -> Result<QueryResult, QuarryError> {
        match self.parser.parse(input)? {
            ParsedStatement::Special(special) => self.run_special(special, db_state),
            ParsedStatement::Sql(statements) => self.run_sql(statements, db_state),
        }
    }

    /// Utility and index-DDL statements.
    fn run_special(
        &mut self,
        statement: SpecialStatement,
        db_state: &Arc<DatabaseState>,
    ) -> Result<QueryResult, QuarryError> {
        match statement {
            SpecialStatement::Help => Ok(QueryResult::new(HELP_INFO)),
            SpecialStatement::ShowTables => db_state.show_tables(),
            SpecialStatement::ShowIndex { table } => db_state.show_indexes(&table),
            SpecialStatement::DescTable { table } => db_state.desc_table(&table),
            SpecialStatement::CreateIndex { table, cols } => {
                info!("Processing CREATE INDEX on {}", table);
                self.run_ddl(
                    &DdlPlan {
                        kind: DdlKind::CreateIndex,
                        table,
                        index_cols: cols,
                        col_defs: vec![],
                    },
                    db_state,
                )
            }
            SpecialStatement::DropIndex { table, cols } => {
                info!("Processing DROP INDEX on {}", table);
                self.run_ddl(
                    &DdlPlan {
                        kind: DdlKind::DropIndex,
                        table,
                        index_cols: cols,
                        col_defs: vec![],
                    },
                    db_state,
                )
            }
            SpecialStatement::Checkpoint => {
                info!("Processing CHECKPOINT");
                let txn = self.current_txn(db_state);
                db_state.checkpoint(&txn)?;
                self.session_txn = None;
                Ok(QueryResult::new("Checkpoint complete"))
            }
        }
    }

    /// Runs SQL statements depending on the first statement.
    pub fn run_sql(
        &mut self,
        cmd: Vec<Statement>,
        db_state: &Arc<DatabaseState>,
    ) -> Result<QueryResult, QuarryError> {
        if cmd.is_empty() {
            return Err(QuarryError::SyntaxError(String::from("Empty SQL command")));
        }
        match cmd.first().unwrap() {
            Statement::CreateTable { name, columns, .. } => {
                info!("Processing CREATE table: {:?}", name);
                let mut col_defs = Vec::with_capacity(columns.len());
                for col in columns {
                    col_defs.push((col.name.value.clone(), get_attr(&col.data_type)?));
                }
                self.run_ddl(
                    &DdlPlan {
                        kind: DdlKind::CreateTable,
                        table: get_name(name)?,
                        index_cols: vec![],
                        col_defs,
                    },
                    db_state,
                )
            }
            Statement::Drop {
                object_type, names, ..
            } => {
                if *object_type != ObjectType::Table {
                    return Err(QuarryError::ValidationError(String::from(
                        "Only DROP TABLE is supported",
                    )));
                }
                let mut last = QueryResult::empty();
                for name in names {
                    last = self.run_ddl(
                        &DdlPlan {
                            kind: DdlKind::DropTable,
                            table: get_name(name)?,
                            index_cols: vec![],
                            col_defs: vec![],
                        },
                        db_state,
                    )?;
                }
                Ok(last)
            }
            Statement::Query(qbox) => {
                info!("Processing SQL Query");
                let txn = self.current_txn(db_state);
                let res = self.run_query(qbox, db_state, &txn);
                self.finish_statement(db_state, res)
            }
            Statement::Insert {
                table_name, source, ..
            } => {
                info!("Processing INSERT");
                let txn = self.current_txn(db_state);
                let res = self.run_insert(table_name, source, db_state, &txn);
                self.finish_statement(db_state, res)
            }
            Statement::Delete {
                from, selection, ..
            } => {
                info!("Processing DELETE");
                let txn = self.current_txn(db_state);
                let res = self.run_delete(from, selection.as_ref(), db_state, &txn);
                self.finish_statement(db_state, res)
            }
            Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => {
                info!("Processing UPDATE");
                let txn = self.current_txn(db_state);
                let res =
                    self.run_update(table, assignments, selection.as_ref(), db_state, &txn);
                self.finish_statement(db_state, res)
            }
            Statement::StartTransaction { .. } => {
                let txn = self.current_txn(db_state);
                txn.lock().unwrap().set_explicit(true);
                Ok(QueryResult::new("BEGIN"))
            }
            Statement::Commit { .. } => {
                match self.session_txn.take() {
                    Some(txn) => {
                        db_state
                            .transaction_manager
                            .commit(&txn, &db_state.log_manager)?;
                        Ok(QueryResult::new("COMMIT"))
                    }
                    None => Ok(QueryResult::new("COMMIT")),
                }
            }
            Statement::Rollback { .. } => {
                match self.session_txn.take() {
                    Some(txn) => {
                        db_state.transaction_manager.abort(
                            &txn,
                            &db_state.log_manager,
                            &db_state.database,
                        )?;
                        Ok(QueryResult::new("ROLLBACK"))
                    }
                    None => Ok(QueryResult::new("ROLLBACK")),
                }
            }
            Statement::SetVariable {
                variable, value, ..
            } => {
                let knob = get_name(variable)?.to_lowercase();
                let flag = parse_bool_value(value)?;
                db_state.set_knob(&knob, flag)?;
                Ok(QueryResult::new(&format!("SET {} = {}", knob, flag)))
            }
            Statement::Explain { statement, .. } => match statement.as_ref() {
                Statement::Query(q) => {
                    let query_info = TranslateAndValidate::from_sql(q, &db_state.database)?;
                    let stats = HeapStatistics::new(
                        db_state.storage_manager.clone(),
                        &db_state.database,
                    );
                    let tree =
                        self.optimizer
                            .optimize(&db_state.database, &stats, &query_info)?;
                    Ok(QueryResult::new(&format!("{}\n", tree)))
                }
                _ => Err(QuarryError::ValidationError(String::from(
                    "EXPLAIN supports SELECT statements",
                ))),
            },
            _ => Err(QuarryError::SyntaxError(String::from(
                "Unsupported statement",
            ))),
        }
    }

    /// DDL: dispatch to the metadata manager, which flushes the descriptor.
    fn run_ddl(
        &mut self,
        ddl: &DdlPlan,
        db_state: &DatabaseState,
    ) -> Result<QueryResult, QuarryError> {
        match ddl.kind {
            DdlKind::CreateTable => db_state.create_table(&ddl.table, &ddl.col_defs),
            DdlKind::DropTable => db_state.drop_table(&ddl.table),
            DdlKind::CreateIndex => db_state.create_index(&ddl.table, &ddl.index_cols),
            DdlKind::DropIndex => db_state.drop_index(&ddl.table, &ddl.index_cols),
        }
    }

    /// SELECT: analyze, plan, lower, pull, format.
    fn run_query(
        &mut self,
        query: &sqlparser::ast::Query,
        db_state: &DatabaseState,
        txn: &Arc<Mutex<Transaction>>,
    ) -> Result<QueryResult, QuarryError> {
        debug!("Obtaining the analyzed query from the AST");
        let query_info = TranslateAndValidate::from_sql(query, &db_state.database)?;
        debug!("Optimizing and lowering");
        let stats = HeapStatistics::new(db_state.storage_manager.clone(), &db_state.database);
        let knobs = db_state.knobs();
        let plan =
            self.optimizer
                .plan_select(&db_state.database, &stats, &query_info, &knobs)?;
        let dml = DmlPlan {
            kind: DmlKind::Select,
            child: Some(plan),
            table: String::new(),
            values: vec![],
            conditions: vec![],
            assignments: vec![],
        };
        debug!("Configuring the executor tree");
        let tree = Executor::dml_plan_to_op_iterator(
            &db_state.database,
            &db_state.storage_manager,
            &db_state.index_manager,
            &dml,
            txn,
            &db_state.log_manager,
        )?;
        self.executor.configure_query(tree);

        debug!("Executing the query");
        self.executor.start()?;
        let captions: Vec<String> = self
            .executor
            .schema()?
            .attributes()
            .map(|a| a.name.clone())
            .collect();
        let printer = RecordPrinter::new(captions.len());
        let mut buf = ResponseBuffer::new();
        printer.print_separator(&mut buf);
        printer.print_record(&captions, &mut buf);
        printer.print_separator(&mut buf);

        let mut outfile = String::new();
        if knobs.enable_output_file {
            outfile.push('|');
            for caption in &captions {
                outfile.push_str(&format!(" {} |", caption));
            }
            outfile.push('\n');
        }

        let mut num_rec = 0;
        loop {
            let tuple = match self.executor.next() {
                Ok(Some(t)) => t,
                Ok(None) => break,
                Err(e) => {
                    self.executor.close()?;
                    return Err(e);
                }
            };
            let columns: Vec<String> =
                tuple.field_vals().map(|f| f.to_string()).collect();
            printer.print_record(&columns, &mut buf);
            if knobs.enable_output_file {
                outfile.push('|');
                for col in &columns {
                    outfile.push_str(&format!(" {} |", col));
                }
                outfile.push('\n');
            }
            num_rec += 1;
        }
        self.executor.close()?;
        printer.print_separator(&mut buf);
        RecordPrinter::print_record_count(num_rec, &mut buf);
        if knobs.enable_output_file {
            db_state.append_output_file(&outfile)?;
        }
        Ok(QueryResult::new(&buf.into_string()))
    }

    fn run_insert(
        &mut self,
        table_name: &sqlparser::ast::ObjectName,
        source: &sqlparser::ast::Query,
        db_state: &DatabaseState,
        txn: &Arc<Mutex<Transaction>>,
    ) -> Result<QueryResult, QuarryError> {
        let table = get_name(table_name)?;
        let rows = match source.body.as_ref() {
            SetExpr::Values(values) => &values.rows,
            _ => {
                return Err(QuarryError::ValidationError(String::from(
                    "INSERT expects a VALUES list",
                )))
            }
        };
        for row in rows {
            let values =
                TranslateAndValidate::values_for_table(&db_state.database, &table, row)?;
            let dml = DmlPlan {
                kind: DmlKind::Insert,
                child: None,
                table: table.clone(),
                values,
                conditions: vec![],
                assignments: vec![],
            };
            self.run_dml(&dml, db_state, txn)?;
        }
        Ok(QueryResult::empty())
    }

    fn run_delete(
        &mut self,
        from: &[sqlparser::ast::TableWithJoins],
        selection: Option<&Expr>,
        db_state: &DatabaseState,
        txn: &Arc<Mutex<Transaction>>,
    ) -> Result<QueryResult, QuarryError> {
        let table = single_table_name(from)?;
        let conds = TranslateAndValidate::conditions_for_table(
            &db_state.database,
            &table,
            selection,
        )?;
        let scan = self
            .optimizer
            .plan_table_scan(&db_state.database, &table, conds.clone())?;
        let dml = DmlPlan {
            kind: DmlKind::Delete,
            child: Some(scan),
            table,
            values: vec![],
            conditions: conds,
            assignments: vec![],
        };
        self.run_dml(&dml, db_state, txn)?;
        Ok(QueryResult::empty())
    }

    fn run_update(
        &mut self,
        table: &sqlparser::ast::TableWithJoins,
        assignments: &[sqlparser::ast::Assignment],
        selection: Option<&Expr>,
        db_state: &DatabaseState,
        txn: &Arc<Mutex<Transaction>>,
    ) -> Result<QueryResult, QuarryError> {
        let table = match &table.relation {
            TableFactor::Table { name, .. } => get_name(name)?,
            _ => {
                return Err(QuarryError::ValidationError(String::from(
                    "UPDATE expects a plain table",
                )))
            }
        };
        let conds = TranslateAndValidate::conditions_for_table(
            &db_state.database,
            &table,
            selection,
        )?;
        let set_clauses = TranslateAndValidate::assignments_for_table(
            &db_state.database,
            &table,
            assignments,
        )?;
        let scan = self
            .optimizer
            .plan_table_scan(&db_state.database, &table, conds.clone())?;
        let dml = DmlPlan {
            kind: DmlKind::Update,
            child: Some(scan),
            table,
            values: vec![],
            conditions: conds,
            assignments: set_clauses,
        };
        self.run_dml(&dml, db_state, txn)?;
        Ok(QueryResult::empty())
    }

    /// Construct the DML executor and drive it once to completion.
    fn run_dml(
        &mut self,
        dml: &DmlPlan,
        db_state: &DatabaseState,
        txn: &Arc<Mutex<Transaction>>,
    ) -> Result<(), QuarryError> {
        let tree = Executor::dml_plan_to_op_iterator(
            &db_state.database,
            &db_state.storage_manager,
            &db_state.index_manager,
            dml,
            txn,
            &db_state.log_manager,
        )?;
        self.executor.configure_query(tree);
        self.executor.start()?;
        let step = self.executor.next();
        self.executor.close()?;
        step?;
        Ok(())
    }
}

fn single_table_name(
    from: &[sqlparser::ast::TableWithJoins],
) -> Result<String, QuarryError> {
    if from.len() != 1 || !from[0].joins.is_empty() {
        return Err(QuarryError::ValidationError(String::from(
            "Expected a single table",
        )));
    }
    match &from[0].relation {
        TableFactor::Table { name, .. } => get_name(name),
        _ => Err(QuarryError::ValidationError(String::from(
            "Expected a plain table",
        ))),
    }
}

/// The value side of `SET knob = ...`.
pub(crate) fn parse_bool_value(value: &[Expr]) -> Result<bool, QuarryError> {
    let expr = value.first().ok_or_else(|| {
        QuarryError::SyntaxError(String::from("SET expects a value"))
    })?;
    match expr {
        Expr::Value(Value::Boolean(b)) => Ok(*b),
        Expr::Value(Value::Number(n, _)) => Ok(n != "0"),
        Expr::Identifier(ident) => match ident.value.to_lowercase().as_str() {
            "true" | "on" => Ok(true),
            "false" | "off" => Ok(false),
            other => Err(QuarryError::SyntaxError(format!(
                "Cannot interpret '{}' as a boolean",
                other
            ))),
        },
        _ => Err(QuarryError::SyntaxError(String::from(
            "SET expects a boolean value",
        ))),
    }
}

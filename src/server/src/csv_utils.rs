use crate::database_state::DatabaseState;
use common::catalog::Catalog;
use common::physical_plan::{DmlKind, DmlPlan};
use common::{DataType, Field, QuarryError};
use queryexe::opiterator::OpIterator;
use queryexe::query::Executor;
use std::fs::File;
use std::sync::{Arc, Mutex};
use txn_manager::transactions::Transaction;

/// Import csv data into an existing table. Rows go through the normal
/// insert executor so every index is maintained and a duplicate key fails
/// the import.
///
/// `path_and_name` is `<path> <table>` as passed to the `\i` command.
pub fn import_csv(
    db_state: &DatabaseState,
    path_and_name: &str,
    txn: &Arc<Mutex<Transaction>>,
) -> Result<usize, QuarryError> {
    let mut parts = path_and_name.split_whitespace();
    let (path, table) = match (parts.next(), parts.next()) {
        (Some(p), Some(t)) => (p, t),
        _ => {
            return Err(QuarryError::SyntaxError(String::from(
                "Import expects: \\i <path> <table>",
            )))
        }
    };
    let schema = db_state.database.get_table_schema(table)?;

    debug!("csv_utils opening file, path: {:?}", path);
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(file);

    let mut inserted_records = 0;
    for result in rdr.records() {
        let rec = result
            .map_err(|e| QuarryError::IOError(format!("Could not read row from CSV: {}", e)))?;
        if rec.len() != schema.size() {
            return Err(QuarryError::ValidationError(format!(
                "CSV row has {} fields, table {} expects {}",
                rec.len(),
                table,
                schema.size()
            )));
        }
        // Build the row and infer types from the schema.
        let mut values = Vec::with_capacity(schema.size());
        for (field, attr) in rec.iter().zip(schema.attributes()) {
            let value = match attr.dtype() {
                DataType::Int => Field::IntField(field.trim().parse::<i32>().map_err(|_| {
                    QuarryError::TypeError(format!("'{}' is not an INT", field))
                })?),
                DataType::Float => {
                    Field::FloatField(field.trim().parse::<f32>().map_err(|_| {
                        QuarryError::TypeError(format!("'{}' is not a FLOAT", field))
                    })?)
                }
                DataType::Char(_) => Field::StringField(field.to_string()),
            };
            values.push(value);
        }
        let dml = DmlPlan {
            kind: DmlKind::Insert,
            child: None,
            table: table.to_string(),
            values,
            conditions: vec![],
            assignments: vec![],
        };
        let mut tree = Executor::dml_plan_to_op_iterator(
            &db_state.database,
            &db_state.storage_manager,
            &db_state.index_manager,
            &dml,
            txn,
            &db_state.log_manager,
        )?;
        tree.open()?;
        tree.next()?;
        tree.close()?;
        inserted_records += 1;
    }
    info!("Num records imported: {:?}", inserted_records);
    Ok(inserted_records)
}

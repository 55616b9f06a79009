use crate::table::{IndexMeta, Table};
use crate::{QuarryError, TableSchema};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Functions needed to implement a catalog. It keeps track of all available
/// tables in the database and their associated schemas and indexes.
pub trait Catalog {
    /// Get tables from catalog, keyed by table name.
    fn get_tables(&self) -> Arc<RwLock<HashMap<String, Arc<RwLock<Table>>>>>;

    /// Get the table pointer for the catalog.
    fn get_table_ptr(&self, table_name: &str) -> Result<Arc<RwLock<Table>>, QuarryError> {
        let tables = self.get_tables();
        let tables_ref = tables.read().unwrap();
        match tables_ref.get(table_name) {
            Some(table_ptr) => Ok(Arc::clone(table_ptr)),
            _ => Err(QuarryError::ValidationError(format!(
                "Table {} not found",
                table_name
            ))),
        }
    }

    /// Checks if the table name is valid in the catalog.
    fn is_valid_table(&self, table_name: &str) -> bool {
        let tables = self.get_tables();
        let tables_ref = tables.read().unwrap();
        tables_ref.contains_key(table_name)
    }

    /// Checks if the column is valid for the given table.
    fn is_valid_column(&self, table_name: &str, col_name: &str) -> bool {
        let tables = self.get_tables();
        let tables_ref = tables.read().unwrap();
        match tables_ref.get(table_name) {
            Some(table_ptr) => {
                let table_ref = table_ptr.read().unwrap();
                table_ref.is_col(col_name)
            }
            _ => false,
        }
    }

    /// Gets the table schema from the catalog.
    fn get_table_schema(&self, table_name: &str) -> Result<TableSchema, QuarryError> {
        let table_ptr = self.get_table_ptr(table_name)?;
        let table = table_ptr.read().unwrap();
        Ok(table.schema.clone())
    }

    /// Gets all index metadata of a table.
    fn get_table_indexes(&self, table_name: &str) -> Result<Vec<IndexMeta>, QuarryError> {
        let table_ptr = self.get_table_ptr(table_name)?;
        let table = table_ptr.read().unwrap();
        Ok(table.indexes.values().cloned().collect())
    }
}

use crate::catalog::Catalog;
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// The catalog of one database: its name and tables. This is the
/// serialized descriptor persisted as the metadata file.
#[derive(Clone, Serialize, Deserialize)]
pub struct Database {
    /// Name of the database.
    pub name: String,
    /// Tables keyed by name.
    #[serde(
        serialize_with = "serialize_tables",
        deserialize_with = "deserialize_tables"
    )]
    pub tables: Arc<RwLock<HashMap<String, Arc<RwLock<Table>>>>>,
}

fn serialize_tables<S>(
    tables: &Arc<RwLock<HashMap<String, Arc<RwLock<Table>>>>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let tables_ref = tables.read().unwrap();
    let plain: HashMap<String, Table> = tables_ref
        .iter()
        .map(|(name, t)| (name.clone(), t.read().unwrap().clone()))
        .collect();
    serde::Serialize::serialize(&plain, serializer)
}

fn deserialize_tables<'de, D>(
    deserializer: D,
) -> Result<Arc<RwLock<HashMap<String, Arc<RwLock<Table>>>>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let plain: HashMap<String, Table> = serde::Deserialize::deserialize(deserializer)?;
    Ok(Arc::new(RwLock::new(
        plain
            .into_iter()
            .map(|(name, t)| (name, Arc::new(RwLock::new(t))))
            .collect(),
    )))
}

impl Database {
    /// Initialize a new database with a given name.
    pub fn new(name: String) -> Self {
        Database {
            name,
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Catalog for Database {
    fn get_tables(&self) -> Arc<RwLock<HashMap<String, Arc<RwLock<Table>>>>> {
        self.tables.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Attribute, DataType, TableSchema};

    #[test]
    fn test_database_descriptor_round_trip() {
        let db = Database::new(String::from("d"));
        let schema = TableSchema::new(vec![Attribute::new("t", "a", DataType::Int)]);
        db.tables.write().unwrap().insert(
            String::from("t"),
            Arc::new(RwLock::new(Table::new(String::from("t"), 1, schema))),
        );
        let json = serde_json::to_string(&db).unwrap();
        let check: Database = serde_json::from_str(&json).unwrap();
        assert_eq!("d", check.name);
        assert!(check.is_valid_table("t"));
        assert!(check.is_valid_column("t", "a"));
        assert_eq!(
            db.get_table_schema("t").unwrap(),
            check.get_table_schema("t").unwrap()
        );
    }
}

use crate::ids::ContainerId;
use crate::{DataType, TableSchema};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A column of an index key: the column descriptor plus its offset inside
/// the base record, copied out of the table schema at index create time.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct IndexColumn {
    pub name: String,
    pub dtype: DataType,
    /// Byte width of this column inside the key.
    pub len: usize,
    /// Byte offset of this column inside the base record.
    pub offset: usize,
}

/// Metadata for one multi-column unique index.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct IndexMeta {
    /// Table the index belongs to.
    pub table: String,
    /// Deterministic index name, also the index file stem.
    pub name: String,
    /// Container holding the index file pages.
    pub container_id: ContainerId,
    /// Total key width in bytes.
    pub key_len: usize,
    /// Indexed columns in declared order.
    pub cols: Vec<IndexColumn>,
}

impl IndexMeta {
    /// Deterministic index name from table and column list.
    pub fn index_name(table: &str, col_names: &[String]) -> String {
        let mut name = table.to_string();
        for col in col_names {
            name.push('_');
            name.push_str(col);
        }
        name
    }

    pub fn col_names(&self) -> Vec<String> {
        self.cols.iter().map(|c| c.name.clone()).collect()
    }
}

/// Table implementation.
#[derive(Serialize, Deserialize, Clone)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Container holding the table's heap file.
    pub container_id: ContainerId,
    /// Table schema.
    pub schema: TableSchema,
    /// Indexes on this table, keyed by index name.
    pub indexes: HashMap<String, IndexMeta>,
}

impl Table {
    /// Creates a new table backed by the given container.
    pub fn new(name: String, container_id: ContainerId, schema: TableSchema) -> Self {
        Table {
            name,
            container_id,
            schema,
            indexes: HashMap::new(),
        }
    }

    /// Whether the table has a column with this name.
    pub fn is_col(&self, name: &str) -> bool {
        self.schema.contains(name)
    }

    /// Whether the column is the leading column of any index.
    pub fn is_col_indexed(&self, name: &str) -> bool {
        self.indexes
            .values()
            .any(|idx| idx.cols.first().map(|c| c.name.as_str()) == Some(name))
    }

    /// Look up the index over exactly this column list.
    pub fn get_index_meta(&self, col_names: &[String]) -> Option<&IndexMeta> {
        let name = IndexMeta::index_name(&self.name, col_names);
        self.indexes.get(&name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Attribute;

    fn table() -> Table {
        let schema = TableSchema::new(vec![
            Attribute::new("t", "a", DataType::Int),
            Attribute::new("t", "b", DataType::Char(4)),
        ]);
        Table::new(String::from("t"), 1, schema)
    }

    #[test]
    fn test_index_name() {
        let cols = vec![String::from("a"), String::from("b")];
        assert_eq!("t_a_b", IndexMeta::index_name("t", &cols));
    }

    #[test]
    fn test_is_col() {
        let t = table();
        assert!(t.is_col("a"));
        assert!(!t.is_col("z"));
    }

    #[test]
    fn test_indexed_flag() {
        let mut t = table();
        assert!(!t.is_col_indexed("a"));
        t.indexes.insert(
            String::from("t_a"),
            IndexMeta {
                table: String::from("t"),
                name: String::from("t_a"),
                container_id: 2,
                key_len: 4,
                cols: vec![IndexColumn {
                    name: String::from("a"),
                    dtype: DataType::Int,
                    len: 4,
                    offset: 0,
                }],
            },
        );
        assert!(t.is_col_indexed("a"));
        assert!(!t.is_col_indexed("b"));
    }
}

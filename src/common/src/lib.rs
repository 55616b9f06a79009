use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use sqlparser::ast;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::io;

pub mod catalog;
pub mod conditions;
pub mod database;
pub mod ids;
pub mod logical_plan;
pub mod physical_plan;
pub mod table;
pub mod testutil;

pub use conditions::{ColumnRef, CompOp, CondRhs, Condition};

/// How big each page is
pub const PAGE_SIZE: usize = 4096;
/// How many pages the buffer pool can hold
pub const PAGE_SLOTS: usize = 50;

/// Custom error type.
#[derive(Debug, Clone, PartialEq)]
pub enum QuarryError {
    /// IO Errors.
    IOError(String),
    /// Unparseable or malformed statements.
    SyntaxError(String),
    /// Schema validation errors (unknown/duplicate tables, columns, indexes).
    ValidationError(String),
    /// Incompatible operand types.
    TypeError(String),
    /// Unique index violations.
    DuplicateKeyError(String),
    /// Errors raised while executing a statement.
    ExecutionError(String),
    /// Broken internal invariants. These are bugs, not user errors.
    InternalError(String),
    /// Transaction aborted.
    TransactionAbortedError,
}

impl fmt::Display for QuarryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                QuarryError::IOError(s) => s.to_string(),
                QuarryError::SyntaxError(s) => format!("Syntax Error: {}", s),
                QuarryError::ValidationError(s) => format!("Validation Error: {}", s),
                QuarryError::TypeError(s) => format!("Type Error: {}", s),
                QuarryError::DuplicateKeyError(s) => format!("Duplicate Key Error: {}", s),
                QuarryError::ExecutionError(s) => format!("Execution Error: {}", s),
                QuarryError::InternalError(s) => format!("Internal Error: {}", s),
                QuarryError::TransactionAbortedError => String::from("Transaction Aborted Error"),
            }
        )
    }
}

impl From<io::Error> for QuarryError {
    fn from(error: io::Error) -> Self {
        QuarryError::IOError(error.to_string())
    }
}

impl Error for QuarryError {}

/// Return type for a query result.
pub struct QueryResult {
    result: String,
}

impl QueryResult {
    /// Return an empty result.
    pub fn empty() -> Self {
        Self {
            result: String::from(""),
        }
    }

    /// Return a result with string.
    pub fn new(result: &str) -> Self {
        Self {
            result: result.to_string(),
        }
    }

    /// Get the result.
    pub fn result(&self) -> &str {
        &self.result
    }
}

/// Enumerate the supported dtypes.
#[derive(PartialEq, Eq, Serialize, Deserialize, Clone, Copy, Debug)]
pub enum DataType {
    Int,
    Float,
    Char(u16),
}

impl DataType {
    /// Returns the on-disk width of a value of this type in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Float => 4,
            DataType::Char(n) => *n as usize,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "INT"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
        }
    }
}

/// For each of the dtypes, make sure that there is a corresponding field type.
#[derive(Debug, PartialEq, Clone)]
pub enum Field {
    IntField(i32),
    FloatField(f32),
    StringField(String),
}

impl Field {
    /// Returns the dtype this field naturally carries. Strings report their
    /// current length; the schema's declared length is authoritative on disk.
    pub fn dtype(&self) -> DataType {
        match self {
            Field::IntField(_) => DataType::Int,
            Field::FloatField(_) => DataType::Float,
            Field::StringField(s) => DataType::Char(s.len() as u16),
        }
    }

    /// Serialize the field into exactly `len` bytes of the record layout.
    ///
    /// Ints and floats are little-endian; strings are zero-padded to the
    /// declared column width.
    pub fn to_bytes(&self, len: usize) -> Result<Vec<u8>, QuarryError> {
        match self {
            Field::IntField(x) => Ok(x.to_le_bytes().to_vec()),
            Field::FloatField(x) => Ok(x.to_le_bytes().to_vec()),
            Field::StringField(s) => {
                if s.len() > len {
                    return Err(QuarryError::TypeError(format!(
                        "String '{}' exceeds column width {}",
                        s, len
                    )));
                }
                let mut bytes = s.clone().into_bytes();
                bytes.resize(len, 0u8);
                Ok(bytes)
            }
        }
    }

    /// Deserialize a field of the given type from a record slice.
    pub fn from_bytes(dtype: DataType, data: &[u8]) -> Result<Field, QuarryError> {
        match dtype {
            DataType::Int => {
                let raw: [u8; 4] = data[..4]
                    .try_into()
                    .map_err(|_| QuarryError::InternalError(String::from("Short int field")))?;
                Ok(Field::IntField(i32::from_le_bytes(raw)))
            }
            DataType::Float => {
                let raw: [u8; 4] = data[..4]
                    .try_into()
                    .map_err(|_| QuarryError::InternalError(String::from("Short float field")))?;
                Ok(Field::FloatField(f32::from_le_bytes(raw)))
            }
            DataType::Char(n) => {
                let end = data[..n as usize]
                    .iter()
                    .position(|b| *b == 0)
                    .unwrap_or(n as usize);
                let s = String::from_utf8_lossy(&data[..end]).to_string();
                Ok(Field::StringField(s))
            }
        }
    }

    /// Compare two fields. Int and float cross-compare by promoting both to
    /// float; any other type mix is a type error.
    pub fn compare(&self, other: &Field) -> Result<Ordering, QuarryError> {
        match (self, other) {
            (Field::IntField(l), Field::IntField(r)) => Ok(l.cmp(r)),
            (Field::FloatField(l), Field::FloatField(r)) => Ok(l.total_cmp(r)),
            (Field::IntField(l), Field::FloatField(r)) => Ok((*l as f32).total_cmp(r)),
            (Field::FloatField(l), Field::IntField(r)) => Ok(l.total_cmp(&(*r as f32))),
            (Field::StringField(l), Field::StringField(r)) => Ok(l.as_bytes().cmp(r.as_bytes())),
            (l, r) => Err(QuarryError::TypeError(format!(
                "Cannot compare {} and {}",
                l.dtype(),
                r.dtype()
            ))),
        }
    }

    /// Coerce this field to a column's dtype where the conversion is exact.
    /// Ints widen to floats; everything else must already match.
    pub fn coerce_to(&self, dtype: DataType) -> Result<Field, QuarryError> {
        match (self, dtype) {
            (Field::IntField(_), DataType::Int) => Ok(self.clone()),
            (Field::FloatField(_), DataType::Float) => Ok(self.clone()),
            (Field::IntField(x), DataType::Float) => Ok(Field::FloatField(*x as f32)),
            (Field::StringField(s), DataType::Char(n)) => {
                if s.len() > n as usize {
                    Err(QuarryError::TypeError(format!(
                        "String '{}' exceeds CHAR({})",
                        s, n
                    )))
                } else {
                    Ok(self.clone())
                }
            }
            (f, t) => Err(QuarryError::TypeError(format!(
                "Cannot store {} into a {} column",
                f.dtype(),
                t
            ))),
        }
    }

    /// Unwraps integer fields.
    pub fn unwrap_int_field(&self) -> i32 {
        match self {
            Field::IntField(i) => *i,
            _ => panic!("Expected i32"),
        }
    }

    /// Unwraps string fields.
    pub fn unwrap_string_field(&self) -> &str {
        match self {
            Field::StringField(s) => s,
            _ => panic!("Expected String"),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::IntField(x) => write!(f, "{}", x),
            Field::FloatField(x) => write!(f, "{:.6}", x),
            Field::StringField(x) => write!(f, "{}", x),
        }
    }
}

/// Handle attributes. Pairs the column name with its table and dtype.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct Attribute {
    /// Name of the table the column belongs to.
    pub table: String,
    /// Attribute name.
    pub name: String,
    /// Attribute dtype.
    pub dtype: DataType,
}

impl Attribute {
    /// Create a new attribute for a table column.
    pub fn new(table: &str, name: &str, dtype: DataType) -> Self {
        Self {
            table: table.to_string(),
            name: name.to_string(),
            dtype,
        }
    }

    /// Returns the name of the attribute.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the dtype of the attribute.
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Returns the length of the dtype in bytes.
    pub fn get_byte_len(&self) -> usize {
        self.dtype.byte_len()
    }
}

/// Handle schemas.
#[derive(PartialEq, Clone, Debug)]
pub struct TableSchema {
    /// Attributes of the schema, in record layout order.
    attributes: Vec<Attribute>,
    /// Byte offset of each attribute within a record.
    offsets: Vec<usize>,
    /// Total record width in bytes.
    width: usize,
}

impl Serialize for TableSchema {
    /// Custom serialize: offsets are derived, only attributes persist.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.attributes.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TableSchema {
    /// Custom deserialize: recompute offsets from the attribute list.
    fn deserialize<D>(deserializer: D) -> Result<TableSchema, D::Error>
    where
        D: Deserializer<'de>,
    {
        let attrs = Vec::deserialize(deserializer)?;
        Ok(TableSchema::new(attrs))
    }
}

impl TableSchema {
    /// Create a new schema. Offsets are the running byte sum of the
    /// attributes in declared order.
    pub fn new(attributes: Vec<Attribute>) -> Self {
        let mut offsets = Vec::with_capacity(attributes.len());
        let mut width = 0;
        for attr in &attributes {
            offsets.push(width);
            width += attr.get_byte_len();
        }
        Self {
            attributes,
            offsets,
            width,
        }
    }

    /// Get the attribute at the given index.
    pub fn get_attribute(&self, i: usize) -> Option<&Attribute> {
        self.attributes.get(i)
    }

    /// Get the byte offset of the attribute at the given index.
    pub fn get_offset(&self, i: usize) -> Option<usize> {
        self.offsets.get(i).copied()
    }

    /// Get an iterator of the attributes.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// Check if a column name (unqualified) exists in the schema.
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    /// Resolve a column reference to an attribute index.
    ///
    /// A qualified reference must match table and column; an unqualified one
    /// matches by column name alone and is rejected if it matches more than
    /// one attribute.
    pub fn find_column(&self, col: &ColumnRef) -> Result<usize, QuarryError> {
        if !col.table.is_empty() {
            for (i, attr) in self.attributes.iter().enumerate() {
                if attr.table == col.table && attr.name == col.column {
                    return Ok(i);
                }
            }
            return Err(QuarryError::ValidationError(format!(
                "Column {}.{} not found",
                col.table, col.column
            )));
        }
        let mut found = None;
        for (i, attr) in self.attributes.iter().enumerate() {
            if attr.name == col.column {
                if found.is_some() {
                    return Err(QuarryError::ValidationError(format!(
                        "Ambiguous column {}",
                        col.column
                    )));
                }
                found = Some(i);
            }
        }
        found
            .ok_or_else(|| QuarryError::ValidationError(format!("Column {} not found", col.column)))
    }

    /// Merge two schemas into one.
    ///
    /// The other schema is appended to the current schema; offsets continue
    /// from this schema's width, which is how join outputs lay out records.
    pub fn merge(&self, other: &Self) -> Self {
        let mut attrs = self.attributes.clone();
        attrs.append(&mut other.attributes.clone());
        Self::new(attrs)
    }

    /// Returns the number of attributes in the schema.
    pub fn size(&self) -> usize {
        self.attributes.len()
    }

    /// Returns the size of a record of this schema in bytes.
    pub fn byte_size(&self) -> usize {
        self.width
    }
}

/// Tuple type.
#[derive(Debug, PartialEq, Clone)]
pub struct Tuple {
    /// Tuple data.
    pub field_vals: Vec<Field>,
    /// Tuple's location, if it was read from a heap file.
    pub rid: ids::Rid,
}

impl Tuple {
    /// Create a new tuple with the given data.
    pub fn new(field_vals: Vec<Field>) -> Self {
        Self {
            field_vals,
            rid: ids::Rid::default(),
        }
    }

    /// Create a tuple carrying the rid it was read from.
    pub fn with_rid(field_vals: Vec<Field>, rid: ids::Rid) -> Self {
        Self { field_vals, rid }
    }

    /// Get the field at index.
    pub fn get_field(&self, i: usize) -> Option<&Field> {
        self.field_vals.get(i)
    }

    /// Update the field at index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out-of-bounds.
    pub fn set_field(&mut self, i: usize, f: Field) {
        self.field_vals[i] = f;
    }

    /// Returns an iterator over the field values.
    pub fn field_vals(&self) -> impl Iterator<Item = &Field> {
        self.field_vals.iter()
    }

    /// Return the number of fields in the tuple.
    pub fn size(&self) -> usize {
        self.field_vals.len()
    }

    /// Append another tuple with self.
    pub fn merge(&self, other: &Self) -> Self {
        let mut fields = self.field_vals.clone();
        fields.append(&mut other.field_vals.clone());
        Self::new(fields)
    }

    /// Serialize into the fixed-width record layout of the schema.
    pub fn to_bytes(&self, schema: &TableSchema) -> Result<Vec<u8>, QuarryError> {
        if self.field_vals.len() != schema.size() {
            return Err(QuarryError::InternalError(format!(
                "Tuple arity {} does not match schema arity {}",
                self.field_vals.len(),
                schema.size()
            )));
        }
        let mut bytes = Vec::with_capacity(schema.byte_size());
        for (field, attr) in self.field_vals.iter().zip(schema.attributes()) {
            bytes.extend(field.to_bytes(attr.get_byte_len())?);
        }
        Ok(bytes)
    }

    /// Deserialize a record produced by `to_bytes`.
    pub fn from_bytes(schema: &TableSchema, data: &[u8]) -> Result<Tuple, QuarryError> {
        if data.len() < schema.byte_size() {
            return Err(QuarryError::InternalError(format!(
                "Record of {} bytes is shorter than schema width {}",
                data.len(),
                schema.byte_size()
            )));
        }
        let mut fields = Vec::with_capacity(schema.size());
        for (i, attr) in schema.attributes().enumerate() {
            let off = schema.get_offset(i).unwrap();
            fields.push(Field::from_bytes(attr.dtype(), &data[off..])?);
        }
        Ok(Tuple::new(fields))
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut res = String::new();
        for field in &self.field_vals {
            res.push_str(&field.to_string());
            res.push('\t');
        }
        write!(f, "{}", res)
    }
}

/// Retrieve the name from the command parser object.
pub fn get_name(name: &ast::ObjectName) -> Result<String, QuarryError> {
    if name.0.len() > 1 {
        Err(QuarryError::SyntaxError(String::from(
            "Error no . names supported",
        )))
    } else {
        Ok(name.0[0].value.clone())
    }
}

/// Retrieve the dtype from the command parser object.
pub fn get_attr(dtype: &ast::DataType) -> Result<DataType, QuarryError> {
    match dtype {
        ast::DataType::Int(_) | ast::DataType::Integer(_) => Ok(DataType::Int),
        ast::DataType::Float(_) | ast::DataType::Real => Ok(DataType::Float),
        ast::DataType::Char(len) | ast::DataType::Character(len) => {
            let n = len.as_ref().map(|l| l.length).unwrap_or(1);
            Ok(DataType::Char(n as u16))
        }
        _ => Err(QuarryError::SyntaxError(format!(
            "Unsupported data type {}",
            dtype
        ))),
    }
}

#[cfg(test)]
mod libtests {
    use super::*;
    use crate::testutil::*;

    fn test_schema() -> TableSchema {
        TableSchema::new(vec![
            Attribute::new("t", "a", DataType::Int),
            Attribute::new("t", "b", DataType::Float),
            Attribute::new("t", "c", DataType::Char(8)),
        ])
    }

    #[test]
    fn test_schema_offsets() {
        let schema = test_schema();
        assert_eq!(16, schema.byte_size());
        assert_eq!(Some(0), schema.get_offset(0));
        assert_eq!(Some(4), schema.get_offset(1));
        assert_eq!(Some(8), schema.get_offset(2));
    }

    #[test]
    fn test_tuple_bytes_round_trip() {
        let schema = test_schema();
        let tuple = Tuple::new(vec![
            Field::IntField(-7),
            Field::FloatField(2.5),
            Field::StringField(String::from("hi")),
        ]);
        let bytes = tuple.to_bytes(&schema).unwrap();
        assert_eq!(schema.byte_size(), bytes.len());
        let check = Tuple::from_bytes(&schema, &bytes).unwrap();
        assert_eq!(tuple, check);
    }

    #[test]
    fn test_field_compare_promotion() {
        let i = Field::IntField(2);
        let f = Field::FloatField(2.0);
        assert_eq!(Ordering::Equal, i.compare(&f).unwrap());
        let f = Field::FloatField(2.5);
        assert_eq!(Ordering::Less, i.compare(&f).unwrap());
        let s = Field::StringField(String::from("2"));
        assert!(i.compare(&s).is_err());
    }

    #[test]
    fn test_char_column_overflow() {
        let f = Field::StringField(String::from("too long"));
        assert!(f.coerce_to(DataType::Char(4)).is_err());
        assert!(f.coerce_to(DataType::Char(8)).is_ok());
    }

    #[test]
    fn test_merge_schema() {
        let left = test_schema();
        let right = TableSchema::new(vec![Attribute::new("u", "a", DataType::Int)]);
        let merged = left.merge(&right);
        assert_eq!(4, merged.size());
        assert_eq!(Some(16), merged.get_offset(3));
        // Unqualified "a" is now ambiguous.
        let unqualified = ColumnRef::new("", "a");
        assert!(merged.find_column(&unqualified).is_err());
        let qualified = ColumnRef::new("u", "a");
        assert_eq!(3, merged.find_column(&qualified).unwrap());
    }

    #[test]
    fn test_int_vec_tuple_helper() {
        let t = int_vec_to_tuple(vec![1, 2, 3]);
        assert_eq!(3, t.size());
        assert_eq!(Some(&Field::IntField(2)), t.get_field(1));
    }
}

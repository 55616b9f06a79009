use crate::{Attribute, DataType, Field, TableSchema, Tuple};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::env;
use std::path::PathBuf;

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Converts an int vector to a Tuple.
pub fn int_vec_to_tuple(data: Vec<i32>) -> Tuple {
    let mut tuple_data = Vec::new();
    for val in data {
        tuple_data.push(Field::IntField(val));
    }
    Tuple::new(tuple_data)
}

/// Creates a Vec of tuples containing IntFields given a 2D Vec of i32's
pub fn create_tuple_list(tuple_data: Vec<Vec<i32>>) -> Vec<Tuple> {
    let mut tuples = Vec::new();
    for item in &tuple_data {
        let fields = item.iter().map(|i| Field::IntField(*i)).collect();
        tuples.push(Tuple::new(fields));
    }
    tuples
}

/// Creates a new schema for a table with width number of int columns.
pub fn get_int_table_schema(table: &str, width: usize) -> TableSchema {
    let mut attrs = Vec::new();
    for i in 0..width {
        attrs.push(Attribute::new(table, &format!("c{}", i), DataType::Int))
    }
    TableSchema::new(attrs)
}

pub fn get_random_byte_vec(n: usize) -> Vec<u8> {
    let random_bytes: Vec<u8> = (0..n).map(|_| rand::random::<u8>()).collect();
    random_bytes
}

pub fn gen_rand_string(n: usize) -> String {
    thread_rng()
        .sample_iter(Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

pub fn gen_random_dir() -> PathBuf {
    init();
    let mut dir = env::temp_dir();
    dir.push(String::from("quarry"));
    let rand_string = gen_rand_string(10);
    dir.push(rand_string);
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_schema() {
        let schema = get_int_table_schema("t", 3);
        assert_eq!(3, schema.size());
        assert_eq!(12, schema.byte_size());
        assert!(schema.contains("c2"));
    }
}

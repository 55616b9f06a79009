use common::catalog::Catalog;
use common::CompOp;
use heapstore::StorageManager;
use std::collections::HashMap;
use std::sync::Arc;

/// Cardinality and selectivity estimates consumed by the optimizer.
///
/// Join ordering uses exact table cardinalities; the ratio-based estimates
/// are a default policy, kept behind this trait so they can be replaced by
/// real histograms without touching the optimizer.
pub trait Statistics {
    /// Exact row count of a table, clamped to at least 1.
    fn table_cardinality(&self, table: &str) -> usize;

    /// Estimated distinct-value count per column.
    fn column_cardinalities(&self, table: &str, num_cols: usize) -> Vec<usize> {
        let rows = self.table_cardinality(table);
        vec![((rows as f64) * 0.7) as usize; num_cols]
    }

    /// Estimated fraction of rows satisfying a condition with this
    /// operator.
    fn selectivity(&self, op: CompOp) -> f64 {
        match op {
            CompOp::Equals => 0.1,
            CompOp::NotEq => 0.9,
            CompOp::LessThan
            | CompOp::LessThanOrEq
            | CompOp::GreaterThan
            | CompOp::GreaterThanOrEq => 0.33,
        }
    }
}

/// Statistics backed by scanning the heap through the storage manager.
pub struct HeapStatistics<'a, T: Catalog> {
    sm: Arc<StorageManager>,
    catalog: &'a T,
}

impl<'a, T: Catalog> HeapStatistics<'a, T> {
    pub fn new(sm: Arc<StorageManager>, catalog: &'a T) -> Self {
        HeapStatistics { sm, catalog }
    }
}

impl<'a, T: Catalog> Statistics for HeapStatistics<'a, T> {
    fn table_cardinality(&self, table: &str) -> usize {
        match self.catalog.get_table_ptr(table) {
            Ok(table_ptr) => {
                let container_id = table_ptr.read().unwrap().container_id;
                match self.sm.count_records(container_id) {
                    Ok(count) => count.max(1),
                    Err(_) => 1,
                }
            }
            // Unknown tables get a medium default so planning can proceed.
            Err(_) => 1000,
        }
    }
}

/// Fixed cardinalities for tests.
pub struct FixedStatistics {
    pub cardinalities: HashMap<String, usize>,
}

impl FixedStatistics {
    pub fn new(entries: Vec<(&str, usize)>) -> Self {
        FixedStatistics {
            cardinalities: entries
                .into_iter()
                .map(|(t, n)| (t.to_string(), n))
                .collect(),
        }
    }
}

impl Statistics for FixedStatistics {
    fn table_cardinality(&self, table: &str) -> usize {
        self.cardinalities.get(table).copied().unwrap_or(1000).max(1)
    }
}

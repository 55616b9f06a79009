#[macro_use]
extern crate log;

pub mod log_manager;
pub mod transactions;

pub use log_manager::{LogManager, LogRecord, LogRecordKind};
pub use transactions::{Transaction, TransactionManager, WriteKind, WriteRecord};

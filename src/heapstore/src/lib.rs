#[macro_use]
extern crate log;

pub mod buffer_pool;
pub mod heapfile;
pub mod heapfileiter;
pub mod page;
pub mod storage_manager;

pub use buffer_pool::BufferPool;
pub use storage_manager::StorageManager;

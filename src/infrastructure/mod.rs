pub mod duckdb_storage;
pub mod memory_store;
pub mod preferences;
pub mod storage;

#[cfg(test)]
pub mod test_utils;

pub use duckdb_storage::*;
pub use memory_store::*;
pub use preferences::*;
pub use storage::*;

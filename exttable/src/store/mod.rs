//! Persistence of table descriptors and staged rows.

pub mod descriptor;
mod pool;
pub mod staging;

pub use pool::create_store_pool;

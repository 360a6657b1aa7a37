mod base;
mod memory;
mod postgres;

pub use base::DescriptorStore;
pub use memory::MemoryDescriptorStore;
pub use postgres::PostgresDescriptorStore;

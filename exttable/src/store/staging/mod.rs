mod base;
mod memory;
mod postgres;

pub use base::{
    STAGING_STORE_PREFIX, StagingStore, UpsertOutcome, key_positions, matching_key, normalized_key,
};
pub use memory::MemoryStagingStore;
pub use postgres::PostgresStagingStore;

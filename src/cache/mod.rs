// Cache module for tracked-repository run snapshots.
// Stores the last fetched runs, their validator and check time per (user, repository).

pub mod paths;
pub mod record;
pub mod store;

pub use record::{CacheKey, CacheRecord};
pub use store::{CacheStore, FileCacheStore, MemoryCacheStore};

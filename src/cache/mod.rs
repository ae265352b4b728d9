//! Cache generation storage
//!
//! Stores request/response pairs grouped into named generations.
//!
//! # Generation States
//!
//! | State | Activatable | Description |
//! |-------|-------------|-------------|
//! | Building | no | Opened by an install that has not committed |
//! | Complete | yes | Every manifest entry stored |
//!
//! A generation only becomes complete through [`CacheStorage::commit`],
//! which stores the manifest entries and flips the state together.
//! Runtime entries added with [`CacheStorage::put`] never change the state.

pub mod disk;
pub mod generation;
pub mod memory;

pub use disk::DiskStorage;
pub use generation::{CacheName, Generation, GenerationState};
pub use memory::MemoryStorage;

use crate::error::OffcacheResult;
use crate::http::{CacheKey, Response};
use async_trait::async_trait;

/// Abstract generation store
///
/// Concurrent reads and writes to distinct keys are safe. Concurrent writes
/// to the same key are last-write-wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a generation, creating it in the building state if absent.
    /// Returns true if this call created it.
    async fn open(&self, name: &str) -> OffcacheResult<bool>;

    /// Look up a generation's record
    async fn generation(&self, name: &str) -> OffcacheResult<Option<Generation>>;

    /// Names of all generations, oldest first
    async fn keys(&self) -> OffcacheResult<Vec<String>>;

    /// Delete a generation and everything in it. Returns false if absent.
    async fn delete(&self, name: &str) -> OffcacheResult<bool>;

    /// Find the stored response for `key` in generation `name`
    async fn lookup(&self, name: &str, key: &CacheKey) -> OffcacheResult<Option<Response>>;

    /// Store one entry, opening the generation if needed
    async fn put(&self, name: &str, key: &CacheKey, response: &Response) -> OffcacheResult<()>;

    /// Store all `entries` and mark the generation complete as one unit
    async fn commit(
        &self,
        name: &str,
        fingerprint: &str,
        entries: Vec<(CacheKey, Response)>,
    ) -> OffcacheResult<()>;

    /// Keys stored in generation `name`
    async fn entry_keys(&self, name: &str) -> OffcacheResult<Vec<CacheKey>>;

    /// Human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

/// Records for every generation in `storage`, oldest first
pub async fn list_generations(storage: &dyn CacheStorage) -> OffcacheResult<Vec<Generation>> {
    let mut generations = Vec::new();
    for name in storage.keys().await? {
        if let Some(generation) = storage.generation(&name).await? {
            generations.push(generation);
        }
    }
    Ok(generations)
}

//! In-memory generation store

use crate::cache::generation::{Generation, GenerationState};
use crate::cache::CacheStorage;
use crate::error::{OffcacheError, OffcacheResult};
use crate::http::{CacheKey, Response};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct MemoryGeneration {
    seq: u64,
    record: Generation,
    entries: HashMap<CacheKey, Response>,
}

#[derive(Default)]
struct Inner {
    next_seq: u64,
    generations: HashMap<String, MemoryGeneration>,
}

impl Inner {
    fn open(&mut self, name: &str) -> bool {
        if self.generations.contains_key(name) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.generations.insert(
            name.to_string(),
            MemoryGeneration {
                seq,
                record: Generation::building(name),
                entries: HashMap::new(),
            },
        );
        true
    }
}

/// Generation store that lives and dies with the process
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> OffcacheResult<bool> {
        Ok(self.inner.write().await.open(name))
    }

    async fn generation(&self, name: &str) -> OffcacheResult<Option<Generation>> {
        let inner = self.inner.read().await;
        Ok(inner.generations.get(name).map(|g| {
            let mut record = g.record.clone();
            record.entries = g.entries.len();
            record
        }))
    }

    async fn keys(&self) -> OffcacheResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut names: Vec<(u64, String)> = inner
            .generations
            .iter()
            .map(|(name, g)| (g.seq, name.clone()))
            .collect();
        names.sort();
        Ok(names.into_iter().map(|(_, name)| name).collect())
    }

    async fn delete(&self, name: &str) -> OffcacheResult<bool> {
        Ok(self.inner.write().await.generations.remove(name).is_some())
    }

    async fn lookup(&self, name: &str, key: &CacheKey) -> OffcacheResult<Option<Response>> {
        let inner = self.inner.read().await;
        Ok(inner
            .generations
            .get(name)
            .and_then(|g| g.entries.get(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: &CacheKey, response: &Response) -> OffcacheResult<()> {
        let mut inner = self.inner.write().await;
        inner.open(name);
        if let Some(generation) = inner.generations.get_mut(name) {
            generation.entries.insert(key.clone(), response.clone());
        }
        Ok(())
    }

    async fn commit(
        &self,
        name: &str,
        fingerprint: &str,
        entries: Vec<(CacheKey, Response)>,
    ) -> OffcacheResult<()> {
        let mut inner = self.inner.write().await;
        inner.open(name);
        let generation = inner
            .generations
            .get_mut(name)
            .ok_or_else(|| OffcacheError::GenerationNotFound(name.to_string()))?;

        generation.entries.extend(entries);
        generation.record.state = GenerationState::Complete;
        generation.record.fingerprint = Some(fingerprint.to_string());
        Ok(())
    }

    async fn entry_keys(&self, name: &str) -> OffcacheResult<Vec<CacheKey>> {
        let inner = self.inner.read().await;
        let generation = inner
            .generations
            .get(name)
            .ok_or_else(|| OffcacheError::GenerationNotFound(name.to_string()))?;
        let mut keys: Vec<CacheKey> = generation.entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

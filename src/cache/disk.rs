//! File-backed generation store
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<generation>/generation.json     name, state, fingerprint, created_at
//! <root>/<generation>/entries/<id>.json   key, status, headers, kind
//! <root>/<generation>/entries/<id>.body   response body
//! <root>/.staging-<uuid>/                 commit in progress
//! ```
//!
//! `<id>` is the SHA256 of the cache key. Every file is written to a
//! temporary name and renamed into place. On commit, `generation.json` is
//! rewritten last, so a generation never reads as complete before all of
//! its manifest entries are on disk.

use crate::cache::generation::{Generation, GenerationState};
use crate::cache::CacheStorage;
use crate::error::{OffcacheError, OffcacheResult};
use crate::http::{CacheKey, Response, ResponseKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const GENERATION_FILE: &str = "generation.json";
const ENTRIES_DIR: &str = "entries";
const STAGING_PREFIX: &str = ".staging-";
const TRASH_PREFIX: &str = ".trash-";

/// Entry metadata stored next to the body
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    key: CacheKey,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    kind: ResponseKind,
    stored_at: DateTime<Utc>,
    size: usize,
}

impl StoredEntry {
    fn new(key: &CacheKey, response: &Response) -> Self {
        Self {
            key: key.clone(),
            url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            kind: response.kind,
            stored_at: Utc::now(),
            size: response.body.len(),
        }
    }

    fn into_response(self, body: Vec<u8>) -> Response {
        Response {
            url: self.url,
            status: self.status,
            headers: self.headers,
            body,
            kind: self.kind,
        }
    }
}

/// Generation store rooted at a directory
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Create a store rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> OffcacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            OffcacheError::io(format!("creating cache directory {}", root.display()), e)
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation_dir(&self, name: &str) -> OffcacheResult<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'));
        if !valid {
            return Err(OffcacheError::Storage(format!(
                "invalid generation name for disk storage: {:?}",
                name
            )));
        }
        Ok(self.root.join(name))
    }

    async fn read_record(&self, dir: &Path) -> OffcacheResult<Option<Generation>> {
        let path = dir.join(GENERATION_FILE);
        match fs::read_to_string(&path).await {
            Ok(content) => {
                let record = serde_json::from_str(&content).map_err(|e| {
                    OffcacheError::CorruptEntry {
                        path: path.clone(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OffcacheError::io(
                format!("reading {}", path.display()),
                e,
            )),
        }
    }

    async fn write_record(&self, dir: &Path, record: &Generation) -> OffcacheResult<()> {
        let content = serde_json::to_vec_pretty(record)?;
        write_atomic(&dir.join(GENERATION_FILE), &content).await
    }

    /// Meta files in an entries directory
    async fn entry_metas(&self, entries_dir: &Path) -> OffcacheResult<Vec<PathBuf>> {
        let mut metas = Vec::new();
        let mut read_dir = match fs::read_dir(entries_dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(metas),
            Err(e) => {
                return Err(OffcacheError::io(
                    format!("listing {}", entries_dir.display()),
                    e,
                ))
            }
        };

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| OffcacheError::io(format!("listing {}", entries_dir.display()), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                metas.push(path);
            }
        }
        Ok(metas)
    }

    async fn write_entry(
        entries_dir: &Path,
        key: &CacheKey,
        response: &Response,
    ) -> OffcacheResult<()> {
        let id = entry_id(key);
        let meta = serde_json::to_vec(&StoredEntry::new(key, response))?;
        write_atomic(&entries_dir.join(format!("{}.body", id)), &response.body).await?;
        write_atomic(&entries_dir.join(format!("{}.json", id)), &meta).await
    }

    /// Move every file from `from` into `to`, replacing existing ones
    async fn move_entries(from: &Path, to: &Path) -> OffcacheResult<()> {
        let mut read_dir = fs::read_dir(from)
            .await
            .map_err(|e| OffcacheError::io(format!("listing {}", from.display()), e))?;

        // Bodies before metadata so a visible meta always has its body
        let mut metas = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| OffcacheError::io(format!("listing {}", from.display()), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                metas.push(path);
            } else {
                rename_into(&path, to).await?;
            }
        }
        for path in metas {
            rename_into(&path, to).await?;
        }
        Ok(())
    }

    async fn commit_staged(
        &self,
        name: &str,
        fingerprint: &str,
        staging: &Path,
        count: usize,
    ) -> OffcacheResult<()> {
        let dir = self.generation_dir(name)?;

        match self.read_record(&dir).await? {
            None => {
                // Fresh generation: the whole directory appears in one rename
                let mut record = Generation::building(name);
                record.state = GenerationState::Complete;
                record.fingerprint = Some(fingerprint.to_string());
                record.entries = count;
                self.write_record(staging, &record).await?;

                // A directory without a record is debris from an interrupted open
                remove_dir_quiet(&dir).await;
                fs::rename(staging, &dir).await.map_err(|e| {
                    OffcacheError::io(format!("publishing generation {}", name), e)
                })?;
            }
            Some(mut record) => {
                let entries_dir = dir.join(ENTRIES_DIR);
                fs::create_dir_all(&entries_dir).await.map_err(|e| {
                    OffcacheError::io(format!("creating {}", entries_dir.display()), e)
                })?;
                Self::move_entries(&staging.join(ENTRIES_DIR), &entries_dir).await?;

                record.state = GenerationState::Complete;
                record.fingerprint = Some(fingerprint.to_string());
                record.entries = self.entry_metas(&entries_dir).await?.len();
                self.write_record(&dir, &record).await?;

                remove_dir_quiet(staging).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> OffcacheResult<bool> {
        let dir = self.generation_dir(name)?;
        if self.read_record(&dir).await?.is_some() {
            return Ok(false);
        }

        let entries_dir = dir.join(ENTRIES_DIR);
        fs::create_dir_all(&entries_dir).await.map_err(|e| {
            OffcacheError::io(format!("creating generation {}", dir.display()), e)
        })?;
        self.write_record(&dir, &Generation::building(name)).await?;

        debug!("Opened generation {} at {}", name, dir.display());
        Ok(true)
    }

    async fn generation(&self, name: &str) -> OffcacheResult<Option<Generation>> {
        let dir = self.generation_dir(name)?;
        let Some(mut record) = self.read_record(&dir).await? else {
            return Ok(None);
        };
        record.entries = self.entry_metas(&dir.join(ENTRIES_DIR)).await?.len();
        Ok(Some(record))
    }

    async fn keys(&self) -> OffcacheResult<Vec<String>> {
        let mut read_dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| OffcacheError::io(format!("listing {}", self.root.display()), e))?;

        let mut found: Vec<(DateTime<Utc>, String)> = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| OffcacheError::io(format!("listing {}", self.root.display()), e))?
        {
            let file_name = entry.file_name();
            let Some(dir_name) = file_name.to_str() else {
                continue;
            };
            if dir_name.starts_with('.') {
                continue;
            }
            match self.read_record(&entry.path()).await {
                Ok(Some(record)) => found.push((record.created_at, record.name)),
                Ok(None) => debug!("Ignoring {} (no generation record)", dir_name),
                Err(e) => warn!("Ignoring unreadable generation {}: {}", dir_name, e),
            }
        }

        found.sort();
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }

    async fn delete(&self, name: &str) -> OffcacheResult<bool> {
        let dir = self.generation_dir(name)?;
        let trash = self.root.join(format!("{}{}", TRASH_PREFIX, Uuid::new_v4()));

        // Rename first so the generation disappears from listings at once
        match fs::rename(&dir, &trash).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(OffcacheError::io(
                    format!("deleting generation {}", name),
                    e,
                ))
            }
        }

        fs::remove_dir_all(&trash).await.map_err(|e| {
            OffcacheError::io(format!("removing {}", trash.display()), e)
        })?;
        Ok(true)
    }

    async fn lookup(&self, name: &str, key: &CacheKey) -> OffcacheResult<Option<Response>> {
        let entries_dir = self.generation_dir(name)?.join(ENTRIES_DIR);
        let id = entry_id(key);
        let meta_path = entries_dir.join(format!("{}.json", id));

        let meta = match fs::read(&meta_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OffcacheError::io(
                    format!("reading {}", meta_path.display()),
                    e,
                ))
            }
        };
        let stored: StoredEntry =
            serde_json::from_slice(&meta).map_err(|e| OffcacheError::CorruptEntry {
                path: meta_path.clone(),
                reason: e.to_string(),
            })?;
        if &stored.key != key {
            warn!("Entry {} holds {}, expected {}", id, stored.key, key);
            return Ok(None);
        }

        let body_path = entries_dir.join(format!("{}.body", id));
        let body = match fs::read(&body_path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Entry {} is missing its body", key);
                return Ok(None);
            }
            Err(e) => {
                return Err(OffcacheError::io(
                    format!("reading {}", body_path.display()),
                    e,
                ))
            }
        };

        Ok(Some(stored.into_response(body)))
    }

    async fn put(&self, name: &str, key: &CacheKey, response: &Response) -> OffcacheResult<()> {
        self.open(name).await?;
        let entries_dir = self.generation_dir(name)?.join(ENTRIES_DIR);
        Self::write_entry(&entries_dir, key, response).await
    }

    async fn commit(
        &self,
        name: &str,
        fingerprint: &str,
        entries: Vec<(CacheKey, Response)>,
    ) -> OffcacheResult<()> {
        // Validate before touching the filesystem
        self.generation_dir(name)?;

        let staging = self
            .root
            .join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        let staged_entries = staging.join(ENTRIES_DIR);
        fs::create_dir_all(&staged_entries).await.map_err(|e| {
            OffcacheError::io(format!("creating {}", staged_entries.display()), e)
        })?;

        let count = entries.len();
        let result = async {
            for (key, response) in &entries {
                Self::write_entry(&staged_entries, key, response).await?;
            }
            self.commit_staged(name, fingerprint, &staging, count).await
        }
        .await;

        if result.is_err() {
            remove_dir_quiet(&staging).await;
        }
        result
    }

    async fn entry_keys(&self, name: &str) -> OffcacheResult<Vec<CacheKey>> {
        let dir = self.generation_dir(name)?;
        if self.read_record(&dir).await?.is_none() {
            return Err(OffcacheError::GenerationNotFound(name.to_string()));
        }

        let mut keys = Vec::new();
        for path in self.entry_metas(&dir.join(ENTRIES_DIR)).await? {
            let content = fs::read(&path)
                .await
                .map_err(|e| OffcacheError::io(format!("reading {}", path.display()), e))?;
            let stored: StoredEntry =
                serde_json::from_slice(&content).map_err(|e| OffcacheError::CorruptEntry {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            keys.push(stored.key);
        }
        keys.sort();
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "disk"
    }
}

/// File name stem for an entry: SHA256 of the key
fn entry_id(key: &CacheKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// Write via a temporary sibling and rename into place
async fn write_atomic(path: &Path, content: &[u8]) -> OffcacheResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("entry");
    let tmp = path.with_file_name(format!(".{}.tmp-{}", file_name, Uuid::new_v4()));

    fs::write(&tmp, content)
        .await
        .map_err(|e| OffcacheError::io(format!("writing {}", tmp.display()), e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| OffcacheError::io(format!("renaming into {}", path.display()), e))
}

async fn rename_into(path: &Path, dir: &Path) -> OffcacheResult<()> {
    let Some(file_name) = path.file_name() else {
        return Ok(());
    };
    fs::rename(path, dir.join(file_name))
        .await
        .map_err(|e| OffcacheError::io(format!("moving {}", path.display()), e))
}

async fn remove_dir_quiet(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", dir.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use tempfile::TempDir;
    use url::Url;

    fn key(path: &str) -> CacheKey {
        let url = Url::parse("https://example.com/").unwrap().join(path).unwrap();
        CacheKey::new(Method::Get, &url)
    }

    fn response(k: &CacheKey, body: &str) -> Response {
        Response::new(k.url(), 200, body).with_header("Content-Type", "text/plain")
    }

    async fn storage() -> (TempDir, DiskStorage) {
        let temp = TempDir::new().unwrap();
        let storage = DiskStorage::new(temp.path().join("caches")).await.unwrap();
        (temp, storage)
    }

    #[tokio::test]
    async fn open_writes_building_record() {
        let (_temp, storage) = storage().await;
        assert!(storage.open("site-v1.0.0").await.unwrap());
        assert!(!storage.open("site-v1.0.0").await.unwrap());

        let generation = storage.generation("site-v1.0.0").await.unwrap().unwrap();
        assert_eq!(generation.state, GenerationState::Building);
        assert_eq!(generation.entries, 0);
        assert!(storage.root().join("site-v1.0.0").join(GENERATION_FILE).exists());
    }

    #[tokio::test]
    async fn put_and_lookup_roundtrip() {
        let (_temp, storage) = storage().await;
        let k = key("/static/css/style.css");
        storage
            .put("site-v1.0.0", &k, &response(&k, "body { color: red }"))
            .await
            .unwrap();

        let found = storage.lookup("site-v1.0.0", &k).await.unwrap().unwrap();
        assert_eq!(found.body, b"body { color: red }");
        assert_eq!(found.status, 200);
        assert_eq!(found.header("content-type"), Some("text/plain"));
        assert!(storage.lookup("site-v1.0.0", &key("/other")).await.unwrap().is_none());
        assert!(storage.lookup("absent-v1.0.0", &k).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_fresh_generation() {
        let (_temp, storage) = storage().await;
        let a = key("/");
        let b = key("/a.css");
        storage
            .commit(
                "site-v1.0.0",
                "fp1",
                vec![(a.clone(), response(&a, "<html>")), (b.clone(), response(&b, "a{}"))],
            )
            .await
            .unwrap();

        let generation = storage.generation("site-v1.0.0").await.unwrap().unwrap();
        assert!(generation.is_complete_for("fp1"));
        assert_eq!(generation.entries, 2);
        assert_eq!(storage.entry_keys("site-v1.0.0").await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn commit_into_opened_generation_keeps_runtime_entries() {
        let (_temp, storage) = storage().await;
        storage.open("site-v1.0.0").await.unwrap();
        let runtime = key("/runtime.png");
        storage
            .put("site-v1.0.0", &runtime, &response(&runtime, "png"))
            .await
            .unwrap();

        let root = key("/");
        storage
            .commit("site-v1.0.0", "fp", vec![(root.clone(), response(&root, "<html>"))])
            .await
            .unwrap();

        let generation = storage.generation("site-v1.0.0").await.unwrap().unwrap();
        assert_eq!(generation.state, GenerationState::Complete);
        assert_eq!(generation.entries, 2);
        assert!(storage.lookup("site-v1.0.0", &root).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn no_staging_left_behind() {
        let (_temp, storage) = storage().await;
        let k = key("/");
        storage
            .commit("site-v1.0.0", "fp", vec![(k.clone(), response(&k, "x"))])
            .await
            .unwrap();

        let mut read_dir = fs::read_dir(storage.root()).await.unwrap();
        while let Some(entry) = read_dir.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(!name.starts_with('.'), "leftover {}", name);
        }
    }

    #[tokio::test]
    async fn keys_skip_hidden_and_sort_by_creation() {
        let (_temp, storage) = storage().await;
        storage.open("zeta-v1.0.0").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        storage.open("alpha-v1.0.0").await.unwrap();
        fs::create_dir_all(storage.root().join(".staging-orphan"))
            .await
            .unwrap();

        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["zeta-v1.0.0", "alpha-v1.0.0"]
        );
    }

    #[tokio::test]
    async fn delete_generation() {
        let (_temp, storage) = storage().await;
        storage.open("old-v1.0.0").await.unwrap();
        storage.open("new-v2.0.0").await.unwrap();

        assert!(storage.delete("old-v1.0.0").await.unwrap());
        assert!(!storage.delete("old-v1.0.0").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["new-v2.0.0"]);
        assert!(!storage.root().join("old-v1.0.0").exists());
    }

    #[tokio::test]
    async fn rejects_path_like_names() {
        let (_temp, storage) = storage().await;
        assert!(storage.open("../escape").await.is_err());
        assert!(storage.open(".hidden").await.is_err());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let (temp, storage) = storage().await;
        let k = key("/");
        storage
            .commit("site-v1.0.0", "fp", vec![(k.clone(), response(&k, "<html>"))])
            .await
            .unwrap();
        drop(storage);

        let reopened = DiskStorage::new(temp.path().join("caches")).await.unwrap();
        let found = reopened.lookup("site-v1.0.0", &k).await.unwrap().unwrap();
        assert_eq!(found.body, b"<html>");
    }
}

//! Builds a worker and its collaborators from configuration

use crate::audit::AuditLog;
use crate::cache::{CacheStorage, DiskStorage};
use crate::config::{schema::Config, ConfigManager};
use crate::error::OffcacheResult;
use crate::network::HttpNetwork;
use crate::reactor::{Reactor, ReactorHandle};
use crate::worker::{LocalHost, Worker, WorkerSettings};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Open the on-disk cache store configured by `config`
pub async fn create_storage(config: &Config) -> OffcacheResult<Arc<dyn CacheStorage>> {
    let dir = ConfigManager::storage_dir(config);
    debug!("Using cache storage at {}", dir.display());
    Ok(Arc::new(DiskStorage::new(dir).await?))
}

/// Build a worker backed by `storage`, the HTTP network and `host`
pub fn create_worker(
    config: &Config,
    storage: Arc<dyn CacheStorage>,
    host: Arc<LocalHost>,
) -> OffcacheResult<Worker> {
    let (settings, manifest) = WorkerSettings::from_config(config)?;
    let network = Arc::new(HttpNetwork::new(&settings.scope, &config.network));
    let audit = Arc::new(AuditLog::new(config));

    Ok(Worker::new(settings, manifest, storage, network, host, audit))
}

/// A started reactor plus the pieces the CLI inspects directly
pub struct Runtime {
    pub handle: ReactorHandle,
    pub task: JoinHandle<()>,
    pub host: Arc<LocalHost>,
    /// Distinct manifest entries an install fetches
    pub assets: usize,
}

impl Runtime {
    /// Settle background work and wait for the reactor to stop
    pub async fn shutdown(self) -> OffcacheResult<()> {
        self.handle.shutdown().await?;
        if let Err(e) = self.task.await {
            debug!("Reactor task ended abnormally: {}", e);
        }
        Ok(())
    }
}

/// Build everything from `config` and start the reactor
pub async fn create_runtime(config: &Config) -> OffcacheResult<Runtime> {
    let storage = create_storage(config).await?;
    let host = Arc::new(LocalHost::new());
    let worker = create_worker(config, storage, host.clone())?;
    let assets = worker.manifest().len();
    let (handle, task) = Reactor::start(worker, host.clone()).await?;

    Ok(Runtime {
        handle,
        task,
        host,
        assets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::site_config;
    use crate::worker::WorkerState;
    use tempfile::TempDir;

    fn disk_config(dir: &TempDir) -> Config {
        let mut config = site_config("1.0.0");
        config.general.audit_log = false;
        config.storage.dir = Some(dir.path().join("caches"));
        config
    }

    #[tokio::test]
    async fn creates_storage_directory() {
        let dir = TempDir::new().unwrap();
        let storage = create_storage(&disk_config(&dir)).await.unwrap();

        assert_eq!(storage.backend_name(), "disk");
        assert!(dir.path().join("caches").is_dir());
    }

    #[tokio::test]
    async fn runtime_starts_parsed_on_empty_store() {
        let dir = TempDir::new().unwrap();
        let runtime = create_runtime(&disk_config(&dir)).await.unwrap();

        assert_eq!(runtime.handle.state().await.unwrap(), WorkerState::Parsed);
        assert_eq!(runtime.assets, 3);
        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_manifest_urls_count_once() {
        let dir = TempDir::new().unwrap();
        let mut config = disk_config(&dir);
        config.manifest.urls.push("/static/css/style.css".to_string());
        config.manifest.urls.push(format!("{}static/js/app.js", crate::testing::SCOPE));

        let runtime = create_runtime(&config).await.unwrap();
        assert_eq!(runtime.assets, 3);
        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_worker_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = disk_config(&dir);
        config.worker.cache_name = "no version here".to_string();

        assert!(create_runtime(&config).await.is_err());
    }
}

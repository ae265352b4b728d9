//! Shared fakes for unit tests

use crate::audit::AuditLog;
use crate::cache::{CacheStorage, MemoryStorage};
use crate::config::schema::Config;
use crate::http::{Request, Response};
use crate::network::{Network, NetworkError};
use crate::worker::{LocalHost, Worker, WorkerSettings};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SCOPE: &str = "https://portfolio.test/";

/// Network that answers from a fixed table of URLs
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Response>>,
    stalled: Mutex<HashSet<String>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a 200 with `body` at `url`
    pub fn serve(&self, url: &str, body: &str) {
        self.respond(url, Response::new(url, 200, body.as_bytes().to_vec()));
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    /// Hold requests for `url` until [`release`](Self::release)
    pub fn stall(&self, url: &str) {
        self.stalled.lock().unwrap().insert(url.to_string());
    }

    pub fn release(&self, url: &str) {
        self.stalled.lock().unwrap().remove(url);
    }

    fn is_stalled(&self, url: &str) -> bool {
        self.stalled.lock().unwrap().contains(url)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` requests have been made
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetworkError::Offline(request.url.to_string()));
        }
        while self.is_stalled(request.url.as_str()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let routes = self.routes.lock().unwrap();
        Ok(routes
            .get(request.url.as_str())
            .cloned()
            .unwrap_or_else(|| Response::new(request.url.as_str(), 404, b"not found".to_vec())))
    }
}

/// Config for a small site under [`SCOPE`]
pub fn site_config(version: &str) -> Config {
    let mut config = Config::default();
    config.worker.cache_name = format!("portfolio-v{}", version);
    config.worker.scope = SCOPE.to_string();
    config.worker.offline_url = "/".to_string();
    config.manifest.urls = vec![
        "/".to_string(),
        "/static/css/style.css".to_string(),
        "/static/js/app.js".to_string(),
    ];
    config
}

/// Network serving every manifest entry of [`site_config`]
pub fn site_network() -> Arc<ScriptedNetwork> {
    let network = ScriptedNetwork::new();
    network.serve(SCOPE, "<html>home</html>");
    network.serve(&format!("{}static/css/style.css", SCOPE), "body {}");
    network.serve(&format!("{}static/js/app.js", SCOPE), "console.log(1)");
    Arc::new(network)
}

/// Everything a worker test needs a handle on
pub struct Harness {
    pub worker: Worker,
    pub storage: Arc<dyn CacheStorage>,
    pub network: Arc<ScriptedNetwork>,
    pub host: Arc<LocalHost>,
}

impl Harness {
    pub fn new(
        config: &Config,
        storage: Arc<dyn CacheStorage>,
        network: Arc<ScriptedNetwork>,
    ) -> Self {
        let host = Arc::new(LocalHost::new());
        let (settings, manifest) = WorkerSettings::from_config(config).unwrap();
        let worker = Worker::new(
            settings,
            manifest,
            storage.clone(),
            network.clone(),
            host.clone(),
            Arc::new(AuditLog::disabled()),
        );
        Self {
            worker,
            storage,
            network,
            host,
        }
    }

    /// Fresh memory storage and a network serving the whole site
    pub fn site(version: &str) -> Self {
        Self::new(
            &site_config(version),
            Arc::new(MemoryStorage::new()),
            site_network(),
        )
    }
}

pub fn url(s: &str) -> url::Url {
    url::Url::parse(s).unwrap()
}

//! The offline cache worker
//!
//! One handler per event kind:
//!
//! - [`Worker::install`]: fetch the manifest and commit it as the current
//!   generation, all or nothing
//! - [`Worker::activate`]: delete every other generation and claim clients
//! - [`Worker::fetch`]: cache-first interception with an offline fallback
//!   for navigations
//! - [`Worker::sync`], [`Worker::push`], [`Worker::notification_click`],
//!   [`Worker::message`]: auxiliary handlers that never fail outward
//!
//! The worker's identity (generation name, scope, manifest) is fixed when
//! it is built and never changes afterwards.

pub mod host;
pub mod message;
pub mod notification;
pub mod wait;

pub use host::{Client, Host, LocalHost};
pub use message::ControlMessage;
pub use notification::{Notification, ACTION_CLOSE, ACTION_EXPLORE};
pub use wait::WaitUntil;

use crate::audit::AuditLog;
use crate::cache::{CacheName, CacheStorage, GenerationState};
use crate::config::schema::{Config, NotificationConfig};
use crate::error::{OffcacheError, OffcacheResult};
use crate::http::{CacheKey, Request, Response};
use crate::manifest::Manifest;
use crate::network::Network;
use futures_util::future::try_join_all;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Built, not yet installed
    Parsed,
    Installing,
    /// Installed and waiting to activate
    Installed,
    Activating,
    /// Serving fetches
    Activated,
    /// Failed install or activation; will never serve
    Redundant,
}

impl WorkerState {
    /// Whether fetch events are routed through the worker
    pub fn intercepts_fetch(&self) -> bool {
        matches!(self, Self::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed => write!(f, "parsed"),
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Activating => write!(f, "activating"),
            Self::Activated => write!(f, "activated"),
            Self::Redundant => write!(f, "redundant"),
        }
    }
}

/// Where an intercepted response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Offline fallback document for a failed navigation
    Fallback,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Network => write!(f, "network"),
            Self::Fallback => write!(f, "offline fallback"),
        }
    }
}

/// Result of intercepting a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The worker does not handle this request; the page fetches it directly
    Passthrough,
    /// The worker answered
    Respond {
        response: Response,
        source: ResponseSource,
    },
}

/// Fixed identity of a worker build
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub cache_name: CacheName,
    pub scope: Url,
    pub offline_url: Url,
    pub sync_tag: String,
    pub notification: NotificationConfig,
}

impl WorkerSettings {
    /// Validate `config` and resolve the settings and manifest it describes
    pub fn from_config(config: &Config) -> OffcacheResult<(Self, Manifest)> {
        let cache_name = CacheName::parse(&config.worker.cache_name)?;

        let scope = Url::parse(&config.worker.scope).map_err(|e| OffcacheError::InvalidUrl {
            url: config.worker.scope.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(scope.scheme(), "http" | "https") {
            return Err(OffcacheError::InvalidUrl {
                url: config.worker.scope.clone(),
                reason: "scope must be an http or https URL".to_string(),
            });
        }

        let offline_url =
            scope
                .join(&config.worker.offline_url)
                .map_err(|e| OffcacheError::InvalidUrl {
                    url: config.worker.offline_url.clone(),
                    reason: e.to_string(),
                })?;

        let manifest = Manifest::resolve(&scope, &config.manifest.urls)?;
        if !manifest.contains(&offline_url) {
            return Err(OffcacheError::InvalidUrl {
                url: offline_url.to_string(),
                reason: "offline fallback must be listed in the manifest".to_string(),
            });
        }

        let settings = Self {
            cache_name,
            scope,
            offline_url,
            sync_tag: config.worker.sync_tag.clone(),
            notification: config.notification.clone(),
        };
        Ok((settings, manifest))
    }
}

/// The offline cache worker
pub struct Worker {
    settings: Arc<WorkerSettings>,
    manifest: Arc<Manifest>,
    fingerprint: String,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    host: Arc<dyn Host>,
    audit: Arc<AuditLog>,
    wait: WaitUntil,
}

impl Worker {
    pub fn new(
        settings: WorkerSettings,
        manifest: Manifest,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        host: Arc<dyn Host>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let fingerprint = manifest.fingerprint(&settings.cache_name);
        Self {
            settings: Arc::new(settings),
            manifest: Arc::new(manifest),
            fingerprint,
            storage,
            network,
            host,
            audit,
            wait: WaitUntil::new(),
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn cache_name(&self) -> &str {
        self.settings.cache_name.as_str()
    }

    /// Version fingerprint (generation name + manifest)
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Keep-alive tracker for background work
    pub fn wait_until(&self) -> &WaitUntil {
        &self.wait
    }

    /// Work out where a previous run left this worker
    ///
    /// A complete generation built by this exact version is either already
    /// active (nothing else is stored) or installed and waiting.
    pub async fn resume_state(&self) -> OffcacheResult<WorkerState> {
        let Some(generation) = self.storage.generation(self.cache_name()).await? else {
            return Ok(WorkerState::Parsed);
        };
        if !generation.is_complete_for(&self.fingerprint) {
            return Ok(WorkerState::Parsed);
        }

        let others = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != self.cache_name())
            .count();
        if others == 0 {
            Ok(WorkerState::Activated)
        } else {
            Ok(WorkerState::Installed)
        }
    }

    /// Install handler
    ///
    /// Fetches every manifest entry and commits them together. Any failure
    /// leaves no activatable generation behind and the previous one in
    /// force. On success, requests skip-waiting.
    pub async fn install(&self) -> OffcacheResult<()> {
        let name = self.cache_name();
        info!(
            "Installing {} version {} ({} manifest entries)",
            self.settings.cache_name.site(),
            self.settings.cache_name.version(),
            self.manifest.len()
        );

        let created = self
            .storage
            .open(name)
            .await
            .map_err(|e| OffcacheError::install(name, e))?;

        let result = match self.fetch_manifest().await {
            Ok(entries) => self
                .storage
                .commit(name, &self.fingerprint, entries)
                .await
                .map_err(|e| OffcacheError::install(name, e)),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            error!("Install of {} failed: {}", name, e);
            if created {
                if let Err(cleanup) = self.storage.delete(name).await {
                    warn!("Failed to discard generation {}: {}", name, cleanup);
                }
            }
            self.audit
                .log(
                    "generation.install_failed",
                    &json!({"name": name, "reason": e.to_string()}),
                )
                .await;
            return Err(e);
        }

        info!("Installed generation {}", name);
        self.audit
            .log(
                "generation.installed",
                &json!({
                    "name": name,
                    "fingerprint": self.fingerprint,
                    "entries": self.manifest.len(),
                }),
            )
            .await;

        self.host
            .skip_waiting()
            .await
            .map_err(|e| OffcacheError::install(name, e))
    }

    /// Fetch every manifest entry concurrently; any failure fails them all
    async fn fetch_manifest(&self) -> OffcacheResult<Vec<(CacheKey, Response)>> {
        let name = self.cache_name();
        let fetches = self.manifest.requests().map(|request| async move {
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|e| OffcacheError::install(name, e))?;
            if !response.is_ok() {
                return Err(OffcacheError::install(
                    name,
                    format!("status {} for {}", response.status, request.url),
                ));
            }
            debug!("Fetched manifest entry {}", request.url);
            Ok((request.cache_key(), response))
        });

        try_join_all(fetches).await
    }

    /// Activate handler
    ///
    /// Requires a complete current generation. Deletes every other
    /// generation, then claims open clients.
    pub async fn activate(&self) -> OffcacheResult<()> {
        let name = self.cache_name();
        info!("Activating generation {}", name);

        let generation = self
            .storage
            .generation(name)
            .await
            .map_err(|e| OffcacheError::activation(name, e))?;
        match generation {
            Some(g) if g.state == GenerationState::Complete => {}
            Some(_) => {
                return Err(self
                    .activation_failed(OffcacheError::activation(name, "generation is incomplete"))
                    .await)
            }
            None => {
                let missing = OffcacheError::activation(name, "generation is not installed");
                return Err(self.activation_failed(missing).await);
            }
        }

        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(e) => {
                return Err(self
                    .activation_failed(OffcacheError::activation(name, e))
                    .await)
            }
        };

        let deletions = names
            .into_iter()
            .filter(|stale| stale != name)
            .map(|stale| async move {
                info!("Deleting stale generation {}", stale);
                self.storage.delete(&stale).await?;
                self.audit
                    .log("generation.deleted", &json!({"name": stale}))
                    .await;
                Ok::<_, OffcacheError>(())
            });
        if let Err(e) = try_join_all(deletions).await {
            return Err(self
                .activation_failed(OffcacheError::activation(name, e))
                .await);
        }

        let claimed = match self.host.claim_clients().await {
            Ok(claimed) => claimed,
            Err(e) => {
                return Err(self
                    .activation_failed(OffcacheError::activation(name, e))
                    .await)
            }
        };

        info!("Activated generation {}", name);
        self.audit
            .log(
                "generation.activated",
                &json!({"name": name, "clients_claimed": claimed}),
            )
            .await;
        Ok(())
    }

    async fn activation_failed(&self, err: OffcacheError) -> OffcacheError {
        error!("{}", err);
        self.audit
            .log(
                "generation.activation_failed",
                &json!({"name": self.cache_name(), "reason": err.to_string()}),
            )
            .await;
        err
    }

    /// Fetch handler: cache first, then network, then offline fallback
    pub async fn fetch(&self, request: Request) -> OffcacheResult<FetchOutcome> {
        if request.method != crate::http::Method::Get || !request.has_fetchable_scheme() {
            debug!("Passing through {} {}", request.method, request.url);
            return Ok(FetchOutcome::Passthrough);
        }

        let name = self.cache_name();
        let key = request.cache_key();

        match self.storage.lookup(name, &key).await {
            Ok(Some(response)) => {
                debug!("Serving from cache: {}", request.url);
                return Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Cache,
                });
            }
            Ok(None) => {}
            Err(e) => warn!("Cache lookup for {} failed, using network: {}", key, e),
        }

        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store_in_background(key, response.clone());
                }
                Ok(FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(err) if request.is_navigation() => {
                warn!(
                    "Network request for {} failed, serving offline page: {}",
                    request.url, err
                );
                let fallback_key = Request::get(self.settings.offline_url.clone()).cache_key();
                match self.storage.lookup(name, &fallback_key).await {
                    Ok(Some(response)) => Ok(FetchOutcome::Respond {
                        response,
                        source: ResponseSource::Fallback,
                    }),
                    Ok(None) => Err(err.into()),
                    Err(e) => {
                        warn!("Offline fallback lookup failed: {}", e);
                        Err(err.into())
                    }
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Store a response copy without holding up the caller
    fn store_in_background(&self, key: CacheKey, response: Response) {
        let storage = Arc::clone(&self.storage);
        let name = self.settings.cache_name.as_str().to_string();
        self.wait.spawn(async move {
            match storage.put(&name, &key, &response).await {
                Ok(()) => debug!("Cached {}", key),
                Err(e) => warn!("Failed to cache {}: {}", key, e),
            }
        });
    }

    /// Background sync handler
    ///
    /// For the configured tag, restores any manifest entry missing from the
    /// current generation. Returns how many were restored. Never fails.
    pub async fn sync(&self, tag: &str) -> usize {
        if tag != self.settings.sync_tag {
            debug!("Ignoring sync tag {}", tag);
            return 0;
        }

        info!("Background sync triggered");
        match self.reconcile().await {
            Ok(restored) => restored,
            Err(e) => {
                warn!("Background sync failed: {}", e);
                0
            }
        }
    }

    async fn reconcile(&self) -> OffcacheResult<usize> {
        let name = self.cache_name();
        let mut restored = 0;

        for request in self.manifest.requests() {
            let key = request.cache_key();
            if self.storage.lookup(name, &key).await?.is_some() {
                continue;
            }
            match self.network.fetch(&request).await {
                Ok(response) if response.is_ok() => {
                    self.storage.put(name, &key, &response).await?;
                    restored += 1;
                }
                Ok(response) => debug!("Still missing {} (status {})", key, response.status),
                Err(e) => debug!("Still missing {}: {}", key, e),
            }
        }

        if restored > 0 {
            info!("Restored {} manifest entries", restored);
        }
        Ok(restored)
    }

    /// Push handler: show a notification built from the payload
    pub async fn push(&self, payload: Option<&str>) -> Notification {
        info!("Push notification received");
        let notification = Notification::from_push(payload, &self.settings.notification);
        if let Err(e) = self.host.show_notification(&notification).await {
            warn!("Failed to show notification: {}", e);
        }
        notification
    }

    /// Notification click handler
    ///
    /// Always closes the notification. The explore action focuses a client
    /// already at the site root, or opens one.
    pub async fn notification_click(&self, notification: &Notification, action: Option<&str>) {
        debug!("Notification clicked: {:?}", action);
        if let Err(e) = self.host.close_notification(notification).await {
            warn!("Failed to close notification: {}", e);
        }

        if action != Some(ACTION_EXPLORE) {
            return;
        }
        if let Err(e) = self.focus_or_open_root().await {
            warn!("Failed to open {}: {}", self.settings.scope, e);
        }
    }

    async fn focus_or_open_root(&self) -> OffcacheResult<()> {
        let root = &self.settings.scope;
        let existing = self
            .host
            .clients()
            .await?
            .into_iter()
            .find(|c| &c.url == root);

        match existing {
            Some(client) => self.host.focus(client.id).await,
            None => self.host.open_window(root).await.map(|_| ()),
        }
    }

    /// Message handler. Returns true if the message was acted on.
    pub async fn message(&self, data: &serde_json::Value) -> bool {
        match ControlMessage::parse(data) {
            Some(ControlMessage::SkipWaiting) => {
                info!("Skip waiting requested by page");
                if let Err(e) = self.host.skip_waiting().await {
                    warn!("Skip waiting failed: {}", e);
                    return false;
                }
                true
            }
            None => {
                debug!("Ignoring message: {}", data);
                false
            }
        }
    }
}

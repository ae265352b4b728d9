//! Event reactor driving the worker
//!
//! A single task owns the worker's lifecycle state and receives events over
//! a bounded channel. Installs run one at a time in arrival order, as
//! background tasks that report back to the loop, so fetches keep being
//! answered while an install waits on the network. Fetch and sync events
//! are answered concurrently. All background work is tracked by the
//! worker's [`WaitUntil`](crate::worker::WaitUntil) so shutdown waits for it.
//!
//! | State        | Fetch        | Next                                  |
//! |--------------|--------------|---------------------------------------|
//! | `Parsed`     | passthrough  | install                               |
//! | `Installed`  | passthrough  | activate, or `SKIP_WAITING`           |
//! | `Activated`  | intercepted  | re-install of the same version        |
//! | `Redundant`  | passthrough  | install again                         |
//!
//! A re-install started while `Activated` leaves the state alone: the
//! serving generation keeps answering fetches until the install settles.

pub mod factory;

use crate::error::{OffcacheError, OffcacheResult};
use crate::http::Request;
use crate::worker::{FetchOutcome, Host, Notification, Worker, WorkerState};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Bounded so a caller flooding events gets backpressure
const EVENT_CAPACITY: usize = 64;

/// Reply channel carried by each event
pub type Reply<T> = oneshot::Sender<T>;

/// Events dispatched to the worker
#[derive(Debug)]
pub enum Event {
    Install(Reply<OffcacheResult<()>>),
    Activate(Reply<OffcacheResult<()>>),
    Fetch(Request, Reply<OffcacheResult<FetchOutcome>>),
    Sync(String, Reply<usize>),
    Push(Option<String>, Reply<Notification>),
    NotificationClick(Notification, Option<String>, Reply<()>),
    Message(serde_json::Value, Reply<bool>),
    State(Reply<WorkerState>),
    /// Settle background work, then stop
    Shutdown(Reply<()>),
}

enum Step {
    Event(Option<Event>),
    Installed(OffcacheResult<()>),
}

/// Owner of the worker and its lifecycle state
pub struct Reactor {
    worker: Arc<Worker>,
    host: Arc<dyn Host>,
    state: WorkerState,
    events: mpsc::Receiver<Event>,
    installed_tx: mpsc::UnboundedSender<OffcacheResult<()>>,
    installed: mpsc::UnboundedReceiver<OffcacheResult<()>>,
    /// Install callers in arrival order; the front one is running
    installs: VecDeque<Reply<OffcacheResult<()>>>,
    /// State to fall back to if the running install fails
    before_install: WorkerState,
    /// Activate requests held back until no install is running
    deferred_activations: Vec<Reply<OffcacheResult<()>>>,
}

impl Reactor {
    /// Resume the worker's state from storage and start the event loop
    pub async fn start(
        worker: Worker,
        host: Arc<dyn Host>,
    ) -> OffcacheResult<(ReactorHandle, JoinHandle<()>)> {
        let state = worker.resume_state().await?;
        info!("Worker for {} starts {}", worker.cache_name(), state);
        debug!("Manifest fingerprint {}", worker.fingerprint());

        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let (installed_tx, installed) = mpsc::unbounded_channel();
        let reactor = Self {
            worker: Arc::new(worker),
            host,
            state,
            events: rx,
            installed_tx,
            installed,
            installs: VecDeque::new(),
            before_install: state,
            deferred_activations: Vec::new(),
        };
        let task = tokio::spawn(reactor.run());

        Ok((ReactorHandle { events: tx }, task))
    }

    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                Some(result) = self.installed.recv() => Step::Installed(result),
                event = self.events.recv() => Step::Event(event),
            };

            match step {
                Step::Installed(result) => self.install_finished(result).await,
                Step::Event(Some(event)) => {
                    if !self.handle(event).await {
                        return;
                    }
                }
                // Every handle dropped
                Step::Event(None) => break,
            }
        }

        self.drain().await;
        debug!("Reactor stopped");
    }

    /// Handle one event. Returns false once the reactor has stopped.
    async fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Install(reply) => {
                self.installs.push_back(reply);
                if self.installs.len() == 1 {
                    self.start_install();
                }
            }
            Event::Activate(reply) => {
                if self.installs.is_empty() {
                    let _ = reply.send(self.activate().await);
                } else {
                    debug!("Activate deferred until the running install settles");
                    self.deferred_activations.push(reply);
                }
            }
            Event::Fetch(request, reply) => self.fetch(request, reply),
            Event::Sync(tag, reply) => {
                let worker = Arc::clone(&self.worker);
                self.worker.wait_until().spawn(async move {
                    let _ = reply.send(worker.sync(&tag).await);
                });
            }
            Event::Push(payload, reply) => {
                let _ = reply.send(self.worker.push(payload.as_deref()).await);
            }
            Event::NotificationClick(notification, action, reply) => {
                self.worker
                    .notification_click(&notification, action.as_deref())
                    .await;
                let _ = reply.send(());
            }
            Event::Message(data, reply) => {
                let handled = self.message(&data).await;
                let _ = reply.send(handled);
            }
            Event::State(reply) => {
                let _ = reply.send(self.state);
            }
            Event::Shutdown(reply) => {
                self.drain().await;
                debug!("Reactor stopped");
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn start_install(&mut self) {
        self.before_install = self.state;
        if self.state == WorkerState::Activated {
            debug!("Re-installing while {} keeps serving", self.worker.cache_name());
        } else {
            self.transition(WorkerState::Installing);
        }

        let worker = Arc::clone(&self.worker);
        let done = self.installed_tx.clone();
        self.worker.wait_until().spawn(async move {
            let _ = done.send(worker.install().await);
        });
    }

    async fn install_finished(&mut self, result: OffcacheResult<()>) {
        let result = match result {
            Ok(()) => {
                self.transition(WorkerState::Installed);
                if self.host.take_skip_waiting() {
                    self.activate().await
                } else {
                    Ok(())
                }
            }
            Err(e) => {
                // A failed re-install leaves the serving generation untouched
                let next = if self.before_install == WorkerState::Activated {
                    WorkerState::Activated
                } else {
                    WorkerState::Redundant
                };
                self.transition(next);
                Err(e)
            }
        };

        if let Some(reply) = self.installs.pop_front() {
            let _ = reply.send(result);
        }

        if self.installs.is_empty() {
            for reply in std::mem::take(&mut self.deferred_activations) {
                let _ = reply.send(self.activate().await);
            }
        } else {
            self.start_install();
        }
    }

    async fn activate(&mut self) -> OffcacheResult<()> {
        self.transition(WorkerState::Activating);
        match self.worker.activate().await {
            Ok(()) => {
                self.transition(WorkerState::Activated);
                Ok(())
            }
            Err(e) => {
                self.transition(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    fn fetch(&self, request: Request, reply: Reply<OffcacheResult<FetchOutcome>>) {
        if !self.state.intercepts_fetch() {
            debug!("Not controlling fetches while {}", self.state);
            let _ = reply.send(Ok(FetchOutcome::Passthrough));
            return;
        }

        let worker = Arc::clone(&self.worker);
        self.worker.wait_until().spawn(async move {
            let result = worker.fetch(request).await;
            let _ = reply.send(result);
        });
    }

    async fn message(&mut self, data: &serde_json::Value) -> bool {
        if !self.worker.message(data).await {
            return false;
        }
        if self.state == WorkerState::Installed && self.host.take_skip_waiting() {
            if let Err(e) = self.activate().await {
                warn!("Activation after skip waiting failed: {}", e);
            }
        }
        true
    }

    /// Settle background work, finishing queued installs as they report in
    async fn drain(&mut self) {
        loop {
            let pending = self.worker.wait_until().pending();
            if pending > 0 {
                debug!("Waiting for {} background task(s)", pending);
            }
            self.worker.wait_until().settle().await;
            match self.installed.try_recv() {
                Ok(result) => self.install_finished(result).await,
                Err(_) => return,
            }
        }
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            debug!("Worker state {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

/// Cloneable handle for dispatching events to a running reactor
#[derive(Clone)]
pub struct ReactorHandle {
    events: mpsc::Sender<Event>,
}

impl ReactorHandle {
    async fn dispatch<T>(&self, event: impl FnOnce(Reply<T>) -> Event) -> OffcacheResult<T> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(event(tx))
            .await
            .map_err(|_| OffcacheError::ReactorStopped)?;
        rx.await.map_err(|_| OffcacheError::ReactorStopped)
    }

    pub async fn install(&self) -> OffcacheResult<()> {
        self.dispatch(Event::Install).await?
    }

    pub async fn activate(&self) -> OffcacheResult<()> {
        self.dispatch(Event::Activate).await?
    }

    /// Intercept one outgoing request
    pub async fn fetch(&self, request: Request) -> OffcacheResult<FetchOutcome> {
        self.dispatch(|reply| Event::Fetch(request, reply)).await?
    }

    /// Fire a background sync event. Returns how many entries were restored.
    pub async fn sync(&self, tag: impl Into<String>) -> OffcacheResult<usize> {
        let tag = tag.into();
        self.dispatch(|reply| Event::Sync(tag, reply)).await
    }

    /// Deliver a push. Returns the notification shown.
    pub async fn push(&self, payload: Option<String>) -> OffcacheResult<Notification> {
        self.dispatch(|reply| Event::Push(payload, reply)).await
    }

    pub async fn notification_click(
        &self,
        notification: Notification,
        action: Option<String>,
    ) -> OffcacheResult<()> {
        self.dispatch(|reply| Event::NotificationClick(notification, action, reply))
            .await
    }

    /// Post a message from a page. Returns true if it was acted on.
    pub async fn message(&self, data: serde_json::Value) -> OffcacheResult<bool> {
        self.dispatch(|reply| Event::Message(data, reply)).await
    }

    pub async fn state(&self) -> OffcacheResult<WorkerState> {
        self.dispatch(Event::State).await
    }

    /// Wait for background work, then stop the reactor
    pub async fn shutdown(&self) -> OffcacheResult<()> {
        self.dispatch(Event::Shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::cache::{CacheStorage, MemoryStorage};
    use crate::testing::{site_config, site_network, url, ScriptedNetwork, SCOPE};
    use crate::worker::{LocalHost, ResponseSource, WorkerSettings};
    use serde_json::json;
    use std::time::Duration;

    async fn start(
        version: &str,
        storage: Arc<dyn CacheStorage>,
        network: Arc<ScriptedNetwork>,
    ) -> (ReactorHandle, JoinHandle<()>, Arc<LocalHost>) {
        let host = Arc::new(LocalHost::new());
        let (settings, manifest) = WorkerSettings::from_config(&site_config(version)).unwrap();
        let worker = Worker::new(
            settings,
            manifest,
            storage,
            network,
            host.clone(),
            Arc::new(AuditLog::disabled()),
        );
        let (handle, task) = Reactor::start(worker, host.clone()).await.unwrap();
        (handle, task, host)
    }

    #[tokio::test]
    async fn install_with_skip_waiting_activates() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let (handle, _task, _host) = start("1.0.0", storage, site_network()).await;

        assert_eq!(handle.state().await.unwrap(), WorkerState::Parsed);
        handle.install().await.unwrap();
        assert_eq!(handle.state().await.unwrap(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn fetch_passes_through_until_activated() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let (handle, _task, _host) = start("1.0.0", storage, site_network()).await;

        let outcome = handle.fetch(Request::navigate(url(SCOPE))).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Passthrough);

        handle.install().await.unwrap();
        let outcome = handle.fetch(Request::navigate(url(SCOPE))).await.unwrap();
        assert!(matches!(
            outcome,
            FetchOutcome::Respond {
                source: ResponseSource::Cache,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_install_is_redundant_and_forced_activate_fails() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = Arc::new(ScriptedNetwork::new());
        network.set_offline(true);
        let (handle, _task, _host) = start("1.0.0", storage, network).await;

        assert!(handle.install().await.is_err());
        assert_eq!(handle.state().await.unwrap(), WorkerState::Redundant);
        assert!(handle.activate().await.is_err());
    }

    #[tokio::test]
    async fn resumes_from_stored_generation() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let (first, _task, _host) = start("1.0.0", storage.clone(), site_network()).await;
        first.install().await.unwrap();
        first.shutdown().await.unwrap();

        let (again, _task, _host) = start("1.0.0", storage.clone(), site_network()).await;
        assert_eq!(again.state().await.unwrap(), WorkerState::Activated);

        let (bumped, _task, _host) = start("1.1.0", storage, site_network()).await;
        assert_eq!(bumped.state().await.unwrap(), WorkerState::Parsed);
    }

    #[tokio::test]
    async fn skip_waiting_message_activates_installed_worker() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let (old, _task, _host) = start("1.0.0", storage.clone(), site_network()).await;
        old.install().await.unwrap();

        // A stored v1 and a complete v2 side by side resume as installed
        let (settings, manifest) = WorkerSettings::from_config(&site_config("2.0.0")).unwrap();
        let v2 = Worker::new(
            settings,
            manifest,
            storage.clone(),
            site_network(),
            Arc::new(LocalHost::new()),
            Arc::new(AuditLog::disabled()),
        );
        v2.install().await.unwrap();

        let (handle, _task, _host) = start("2.0.0", storage.clone(), site_network()).await;
        assert_eq!(handle.state().await.unwrap(), WorkerState::Installed);

        assert!(!handle.message(json!({"type": "PING"})).await.unwrap());
        assert_eq!(handle.state().await.unwrap(), WorkerState::Installed);

        assert!(handle.message(json!({"type": "SKIP_WAITING"})).await.unwrap());
        assert_eq!(handle.state().await.unwrap(), WorkerState::Activated);
        assert_eq!(storage.keys().await.unwrap(), vec!["portfolio-v2.0.0"]);
    }

    #[tokio::test]
    async fn shutdown_settles_runtime_caching() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = site_network();
        let extra = format!("{}static/images/photo.png", SCOPE);
        network.serve(&extra, "png");
        let (handle, task, _host) = start("1.0.0", storage.clone(), network).await;

        handle.install().await.unwrap();
        handle.fetch(Request::parse(&extra).unwrap()).await.unwrap();
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        let keys = storage.entry_keys("portfolio-v1.0.0").await.unwrap();
        assert_eq!(keys.len(), 4);
        assert!(matches!(handle.state().await, Err(OffcacheError::ReactorStopped)));
    }

    #[tokio::test]
    async fn push_and_click_round_trip() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let (handle, _task, host) = start("1.0.0", storage, site_network()).await;

        let notification = handle.push(Some("hello".to_string())).await.unwrap();
        assert_eq!(host.notifications().len(), 1);

        handle
            .notification_click(notification, Some("explore".to_string()))
            .await
            .unwrap();
        assert!(host.notifications().is_empty());
        assert_eq!(host.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn cached_fetches_answer_while_reinstall_hangs() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = site_network();
        let (handle, _task, _host) = start("1.0.0", storage, network.clone()).await;
        handle.install().await.unwrap();
        let installed_calls = network.calls();

        network.stall(&format!("{}static/css/style.css", SCOPE));
        let reinstall = tokio::spawn({
            let handle = handle.clone();
            async move { handle.install().await }
        });
        network.wait_for_calls(installed_calls + 1).await;

        let fetch = handle.fetch(Request::navigate(url(SCOPE)));
        let outcome = tokio::time::timeout(Duration::from_secs(2), fetch)
            .await
            .expect("fetch answered while the install is stuck")
            .unwrap();
        assert!(matches!(
            outcome,
            FetchOutcome::Respond {
                source: ResponseSource::Cache,
                ..
            }
        ));
        assert_eq!(handle.state().await.unwrap(), WorkerState::Activated);
        assert!(!reinstall.is_finished());
        reinstall.abort();
    }

    #[tokio::test]
    async fn activate_waits_for_running_install() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = site_network();
        let style = format!("{}static/css/style.css", SCOPE);
        network.stall(&style);
        let (handle, _task, _host) = start("1.0.0", storage, network.clone()).await;

        let install = tokio::spawn({
            let handle = handle.clone();
            async move { handle.install().await }
        });
        network.wait_for_calls(3).await;
        assert_eq!(handle.state().await.unwrap(), WorkerState::Installing);
        assert_eq!(
            handle.fetch(Request::navigate(url(SCOPE))).await.unwrap(),
            FetchOutcome::Passthrough
        );

        let activate = tokio::spawn({
            let handle = handle.clone();
            async move { handle.activate().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!activate.is_finished());

        network.release(&style);
        install.await.unwrap().unwrap();
        activate.await.unwrap().unwrap();
        assert_eq!(handle.state().await.unwrap(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn installs_run_in_arrival_order() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = site_network();
        let (handle, _task, _host) = start("1.0.0", storage.clone(), network.clone()).await;

        let (first, second) = tokio::join!(handle.install(), handle.install());
        first.unwrap();
        second.unwrap();

        // Two full manifest fetches, never interleaved into one generation
        assert_eq!(network.calls(), 6);
        assert_eq!(handle.state().await.unwrap(), WorkerState::Activated);
        assert_eq!(storage.keys().await.unwrap(), vec!["portfolio-v1.0.0"]);
    }

    #[tokio::test]
    async fn shutdown_finishes_queued_install() {
        let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
        let network = site_network();
        let style = format!("{}static/css/style.css", SCOPE);
        network.stall(&style);
        let (handle, task, _host) = start("1.0.0", storage.clone(), network.clone()).await;

        let install = tokio::spawn({
            let handle = handle.clone();
            async move { handle.install().await }
        });
        network.wait_for_calls(3).await;
        network.release(&style);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        install.await.unwrap().unwrap();

        let generation = storage.generation("portfolio-v1.0.0").await.unwrap().unwrap();
        assert_eq!(generation.entries, 3);
    }
}

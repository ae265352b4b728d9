//! Host abstraction
//!
//! Everything the worker asks of its host environment beyond caching and
//! networking: lifecycle requests (skip waiting, claiming clients), open
//! page clients, and notification display.

use crate::error::{OffcacheError, OffcacheResult};
use crate::worker::notification::Notification;
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

/// An open page within the worker's scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: Uuid,
    pub url: Url,
    /// Whether this worker controls the page's fetches
    pub controlled: bool,
    pub focused: bool,
}

impl Client {
    pub fn new(url: Url) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            controlled: false,
            focused: false,
        }
    }
}

/// Abstract host interface
#[async_trait]
pub trait Host: Send + Sync {
    /// Ask to activate without waiting for old pages to close
    async fn skip_waiting(&self) -> OffcacheResult<()>;

    /// Consume a pending skip-waiting request
    fn take_skip_waiting(&self) -> bool;

    /// Take control of every open client. Returns how many were claimed.
    async fn claim_clients(&self) -> OffcacheResult<usize>;

    /// Open clients in scope
    async fn clients(&self) -> OffcacheResult<Vec<Client>>;

    /// Bring an existing client to the foreground
    async fn focus(&self, client_id: Uuid) -> OffcacheResult<()>;

    /// Open a new window at `url`
    async fn open_window(&self, url: &Url) -> OffcacheResult<Client>;

    async fn show_notification(&self, notification: &Notification) -> OffcacheResult<()>;

    async fn close_notification(&self, notification: &Notification) -> OffcacheResult<()>;
}

#[derive(Default)]
struct LocalHostState {
    skip_waiting: bool,
    clients: Vec<Client>,
    notifications: Vec<Notification>,
}

/// In-process host used by the CLI and tests
///
/// Keeps clients and notifications in memory and records lifecycle
/// requests so the reactor can act on them.
#[derive(Default)]
pub struct LocalHost {
    state: Mutex<LocalHostState>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open page
    pub fn add_client(&self, url: Url) -> Client {
        let client = Client::new(url);
        self.lock().clients.push(client.clone());
        client
    }

    /// Notifications currently displayed
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    /// Snapshot of open clients
    pub fn snapshot(&self) -> Vec<Client> {
        self.lock().clients.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LocalHostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Host for LocalHost {
    async fn skip_waiting(&self) -> OffcacheResult<()> {
        debug!("Skip waiting requested");
        self.lock().skip_waiting = true;
        Ok(())
    }

    fn take_skip_waiting(&self) -> bool {
        std::mem::take(&mut self.lock().skip_waiting)
    }

    async fn claim_clients(&self) -> OffcacheResult<usize> {
        let mut state = self.lock();
        let mut claimed = 0;
        for client in state.clients.iter_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        info!("Claimed {} client(s)", claimed);
        Ok(claimed)
    }

    async fn clients(&self) -> OffcacheResult<Vec<Client>> {
        Ok(self.snapshot())
    }

    async fn focus(&self, client_id: Uuid) -> OffcacheResult<()> {
        let mut state = self.lock();
        if !state.clients.iter().any(|c| c.id == client_id) {
            return Err(OffcacheError::Internal(format!(
                "no client with id {}",
                client_id
            )));
        }
        for client in state.clients.iter_mut() {
            client.focused = client.id == client_id;
        }
        Ok(())
    }

    async fn open_window(&self, url: &Url) -> OffcacheResult<Client> {
        let mut client = Client::new(url.clone());
        client.focused = true;

        let mut state = self.lock();
        for other in state.clients.iter_mut() {
            other.focused = false;
        }
        state.clients.push(client.clone());
        info!("Opened window at {}", url);
        Ok(client)
    }

    async fn show_notification(&self, notification: &Notification) -> OffcacheResult<()> {
        info!("Notification: {}: {}", notification.title, notification.body);
        self.lock().notifications.push(notification.clone());
        Ok(())
    }

    async fn close_notification(&self, notification: &Notification) -> OffcacheResult<()> {
        self.lock().notifications.retain(|n| n != notification);
        Ok(())
    }
}

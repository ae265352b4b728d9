//! Configuration schema for offcache
//!
//! Configuration is stored at `~/.config/offcache/config.toml`

use crate::manifest::DEFAULT_MANIFEST;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Worker identity and routing
    pub worker: WorkerConfig,

    /// Assets every generation must hold
    pub manifest: ManifestConfig,

    /// Network client settings
    pub network: NetworkConfig,

    /// Push notification presentation
    pub notification: NotificationConfig,

    /// Cache storage settings
    pub storage: StorageConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,

    /// Record generation lifecycle events to the audit journal
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Worker configuration, fixed for the lifetime of the process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Current generation name, must end in `-v<semver>`
    pub cache_name: String,

    /// Site origin (and path) the worker controls
    pub scope: String,

    /// Document served when a navigation fails offline
    pub offline_url: String,

    /// Background sync tag that triggers reconciliation
    pub sync_tag: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: "lakshay-portfolio-v1.0.0".to_string(),
            scope: "http://localhost:8000/".to_string(),
            offline_url: "/".to_string(),
            sync_tag: "background-sync".to_string(),
        }
    }
}

/// Manifest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Site-relative paths or absolute URLs, in install order
    pub urls: Vec<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            urls: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Network client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Overall request timeout; unset means wait indefinitely
    pub timeout_secs: Option<u64>,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Largest response body accepted, in bytes
    pub max_body_bytes: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            user_agent: concat!("offcache/", env!("CARGO_PKG_VERSION")).to_string(),
            max_body_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Push notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Notification title
    pub title: String,

    /// Body used when the push carries no payload
    pub default_body: String,

    /// Icon URL (site-relative)
    pub icon: String,

    /// Badge URL (site-relative)
    pub badge: String,

    /// Vibration pattern in milliseconds
    pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "Portfolio Update".to_string(),
            default_body: "New update available!".to_string(),
            icon: "/static/images/icon-192.png".to_string(),
            badge: "/static/images/icon-192.png".to_string(),
            vibrate: vec![100, 50, 100],
        }
    }
}

/// Cache storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding cache generations (defaults to the state dir)
    pub dir: Option<PathBuf>,
}

//! Cache generation identity and state
//!
//! A generation is one versioned snapshot of the site's assets. Its name
//! embeds a semantic version; bumping the version is how a deploy
//! invalidates everything cached before it.

use crate::error::{OffcacheError, OffcacheResult};
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validated generation name of the form `<site>-v<semver>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheName {
    name: String,
    version: Version,
}

impl CacheName {
    /// Parse a generation name, e.g. `lakshay-portfolio-v1.0.0`
    pub fn parse(name: &str) -> OffcacheResult<Self> {
        let invalid = |reason: &str| OffcacheError::InvalidCacheName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("name is empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+'))
        {
            return Err(invalid("only ASCII letters, digits, '-', '_', '.' and '+' are allowed"));
        }

        let (site, version) = name
            .rsplit_once("-v")
            .ok_or_else(|| invalid("missing -v<version> suffix"))?;
        if site.is_empty() {
            return Err(invalid("missing site prefix"));
        }
        let version = Version::parse(version).map_err(|e| invalid(&e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            version,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Site prefix without the version suffix
    pub fn site(&self) -> &str {
        self.name
            .rsplit_once("-v")
            .map(|(site, _)| site)
            .unwrap_or(&self.name)
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// State of a cache generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    /// Opened by an install that has not finished (or crashed)
    Building,
    /// Every manifest entry is stored; may be activated
    Complete,
}

impl GenerationState {
    /// Whether a generation in this state may be promoted by activate
    pub fn is_activatable(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Information about a stored generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// Generation name
    pub name: String,
    /// Install state
    pub state: GenerationState,
    /// Fingerprint of the worker that completed it
    pub fingerprint: Option<String>,
    /// When the generation was opened
    pub created_at: DateTime<Utc>,
    /// Number of stored entries
    #[serde(default)]
    pub entries: usize,
}

impl Generation {
    /// Create a new generation record in the building state
    pub fn building(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: GenerationState::Building,
            fingerprint: None,
            created_at: Utc::now(),
            entries: 0,
        }
    }

    /// Whether this generation was completed by a worker with `fingerprint`
    pub fn is_complete_for(&self, fingerprint: &str) -> bool {
        self.state.is_activatable() && self.fingerprint.as_deref() == Some(fingerprint)
    }
}

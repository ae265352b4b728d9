//! Install manifest
//!
//! The ordered list of URLs a generation must hold before it can be
//! activated. Entries are either site-relative paths, resolved against the
//! worker scope, or absolute URLs (CDN assets).

use crate::cache::CacheName;
use crate::error::{OffcacheError, OffcacheResult};
use crate::http::Request;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

/// Built-in manifest for the portfolio site
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/static/css/style.css",
    "/static/js/script.js",
    "/static/manifest.json",
    "/static/images/Lakshay.jpeg",
    "/static/resume/Lakshay_software_developer.pdf",
    "https://fonts.googleapis.com/css2?family=Fira+Code:wght@300;400;500;600;700&family=Inter:wght@300;400;500;600;700;800;900&display=swap",
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
    "https://cdnjs.cloudflare.com/ajax/libs/three.js/r128/three.min.js",
    "https://cdnjs.cloudflare.com/ajax/libs/gsap/3.12.2/gsap.min.js",
    "https://cdnjs.cloudflare.com/ajax/libs/prism/1.29.0/prism.min.js",
    "https://cdnjs.cloudflare.com/ajax/libs/prism/1.29.0/components/prism-python.min.js",
    "https://cdnjs.cloudflare.com/ajax/libs/prism/1.29.0/components/prism-javascript.min.js",
    "https://cdnjs.cloudflare.com/ajax/libs/prism/1.29.0/themes/prism-tomorrow.min.css",
];

/// Resolved install manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<Url>,
}

impl Manifest {
    /// Resolve raw entries against `scope`
    ///
    /// Order is preserved. A URL listed twice is kept once, at its first
    /// position.
    pub fn resolve<S: AsRef<str>>(scope: &Url, raw: &[S]) -> OffcacheResult<Self> {
        let mut entries: Vec<Url> = Vec::with_capacity(raw.len());

        for entry in raw {
            let entry = entry.as_ref().trim();
            let url = scope.join(entry).map_err(|e| OffcacheError::InvalidUrl {
                url: entry.to_string(),
                reason: e.to_string(),
            })?;

            if entries.contains(&url) {
                debug!("Skipping duplicate manifest entry {}", url);
                continue;
            }
            entries.push(url);
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[Url] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.entries.contains(url)
    }

    /// GET requests for every entry, in manifest order
    pub fn requests(&self) -> impl Iterator<Item = Request> + '_ {
        self.entries.iter().cloned().map(Request::get)
    }

    /// Version fingerprint of a worker built from this manifest
    ///
    /// SHA256 over the generation name and every entry, first 12 hex chars.
    /// Any change to either produces a different fingerprint.
    pub fn fingerprint(&self, cache_name: &CacheName) -> String {
        let mut hasher = Sha256::new();
        hasher.update(cache_name.as_str().as_bytes());
        for entry in &self.entries {
            hasher.update(b"\n");
            hasher.update(entry.as_str().as_bytes());
        }
        let result = hasher.finalize();

        hex::encode(&result[..6])
    }
}

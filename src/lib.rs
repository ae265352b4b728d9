//! Offcache - offline cache manager for a static site
//!
//! Keeps versioned generations of a site's assets, answers requests
//! cache-first with an offline fallback for page loads, and drives the
//! install/activate lifecycle through an event reactor.

pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod manifest;
pub mod network;
pub mod reactor;
pub mod ui;
pub mod worker;

#[cfg(test)]
mod testing;

pub use error::{OffcacheError, OffcacheResult};

//! CLI command implementations

pub mod completions;
pub mod config;
pub mod events;
pub mod fetch;
pub mod generations;
pub mod lifecycle;

pub use completions::execute as completions;
pub use config::execute as config;
pub use events::{click, message, push, sync};
pub use fetch::execute as fetch;
pub use generations::execute as generations;
pub use lifecycle::{activate, install, update};

//! Control messages posted to the worker by pages

use serde::Deserialize;

/// Messages the worker acts on. Anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate a waiting install without waiting for pages to close
    SkipWaiting,
}

impl ControlMessage {
    /// Recognize a control message in arbitrary message data
    pub fn parse(data: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

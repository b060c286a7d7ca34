//! Messages between pages and the worker.
//!
//! Messages travel as JSON objects tagged by `type`, e.g.
//! `{"type":"SKIP_WAITING"}`.

use serde::{Deserialize, Serialize};

/// Messages a page sends to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate a waiting worker now (explicit "update now" action).
    SkipWaiting,
    /// Delete every cache (manual troubleshooting reset).
    ClearCache,
}

/// Messages the worker posts to controlled pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Completion echo of [`WorkerMessage::ClearCache`].
    CacheCleared,
}

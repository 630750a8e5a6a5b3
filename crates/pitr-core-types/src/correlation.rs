//! Correlation ids
//!
//! A rollback submitted to the worker crosses a thread boundary. The id
//! minted at submission travels with the job so the caller-side and
//! worker-side log lines can be joined on `request_id`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one submitted unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Fresh UUIDv7 id
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

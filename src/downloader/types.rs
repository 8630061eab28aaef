//! JSON-RPC envelope and aria2 status vocabulary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    pub jsonrpc: &'a str,
    pub id: &'a str,
    pub method: &'a str,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonRpcError {
    #[allow(dead_code)]
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonRpcResponse<T> {
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// Mirrors aria2's `tellStatus` status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aria2Status {
    Active,
    Waiting,
    Paused,
    Error,
    Complete,
    /// Not a real aria2 status: a JSON-RPC error response is treated as the gid having
    /// been purged from aria2's history.
    Removed,
}

impl Aria2Status {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Aria2Status::Active),
            "waiting" => Some(Aria2Status::Waiting),
            "paused" => Some(Aria2Status::Paused),
            "error" => Some(Aria2Status::Error),
            "complete" => Some(Aria2Status::Complete),
            "removed" => Some(Aria2Status::Removed),
            _ => None,
        }
    }
}

//! VFS node: a tagged directory/file variant keyed by the remote drive's opaque id.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// A single entry in the in-memory node graph.
#[derive(Debug, Clone)]
pub enum Node {
    Directory {
        id: String,
        name: String,
        father_id: Option<String>,
        children_ids: Vec<String>,
        last_refresh: Option<SystemTime>,
    },
    File {
        id: String,
        name: String,
        father_id: Option<String>,
        download_url: Option<String>,
        last_refresh: Option<SystemTime>,
    },
}

impl Node {
    pub fn root() -> Self {
        Node::Directory {
            id: String::new(),
            name: String::new(),
            father_id: None,
            children_ids: Vec::new(),
            last_refresh: None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Directory { name, .. } => name,
            Node::File { name, .. } => name,
        }
    }

    pub fn father_id(&self) -> Option<&str> {
        match self {
            Node::Directory { father_id, .. } => father_id.as_deref(),
            Node::File { father_id, .. } => father_id.as_deref(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }

    pub fn is_stale(&self) -> bool {
        match self {
            Node::Directory { last_refresh, .. } => last_refresh.is_none(),
            Node::File { last_refresh, .. } => last_refresh.is_none(),
        }
    }

    pub fn children_ids(&self) -> &[String] {
        match self {
            Node::Directory { children_ids, .. } => children_ids,
            Node::File { .. } => &[],
        }
    }

    pub fn rename_and_reparent(&mut self, name: String, father_id: Option<String>) {
        match self {
            Node::Directory {
                name: n,
                father_id: f,
                ..
            } => {
                *n = name;
                *f = father_id;
            }
            Node::File {
                name: n,
                father_id: f,
                ..
            } => {
                *n = name;
                *f = father_id;
            }
        }
    }

    pub fn invalidate(&mut self) {
        match self {
            Node::Directory { last_refresh, .. } => *last_refresh = None,
            Node::File { last_refresh, .. } => *last_refresh = None,
        }
    }
}

/// On-disk shape of a node reference within a parent's child list; nodes themselves are not
/// currently persisted (only task state is, per C9) but this mirrors the wire "kind" tag used
/// by the remote gateway to decide which [`Node`] variant to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Directory,
    File,
}

impl NodeKind {
    pub fn from_remote_kind(kind: &str) -> Self {
        if kind.ends_with("folder") {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }
}

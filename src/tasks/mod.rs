//! Task model (C5): the sum type of TorrentTask and FileDownloadTask plus their
//! common scheduling header.

pub mod file_download;
pub mod scheduler;
pub mod torrent;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Torrent,
    FileDownload,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Torrent => "TORRENT",
            Tag::FileDownload => "FILE_DOWNLOAD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Error,
    Paused,
}

impl TaskStatus {
    pub fn from_query_filter(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "done" => Some(TaskStatus::Done),
            "error" => Some(TaskStatus::Error),
            "paused" => Some(TaskStatus::Paused),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHeader {
    pub id: String,
    pub tag: Tag,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TorrentSubState {
    Pending,
    RemoteDownloading,
    LocalDownloading,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentTask {
    pub header: TaskHeader,
    pub torrent_status: TorrentSubState,
    /// Source magnet/torrent/URL string; empty for a "pull" of an already-materialized node.
    pub torrent: String,
    pub remote_base_path: String,
    pub node_id: Option<String>,
    pub remote_task_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub info: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileSubState {
    Pending,
    Downloading,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDownloadTask {
    pub header: TaskHeader,
    pub file_status: FileSubState,
    pub node_id: String,
    pub remote_path: String,
    pub owner_id: String,
    pub gid: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Task {
    Torrent(TorrentTask),
    FileDownload(FileDownloadTask),
}

impl Task {
    pub fn header(&self) -> &TaskHeader {
        match self {
            Task::Torrent(t) => &t.header,
            Task::FileDownload(t) => &t.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut TaskHeader {
        match self {
            Task::Torrent(t) => &mut t.header,
            Task::FileDownload(t) => &mut t.header,
        }
    }

    pub fn id(&self) -> &str {
        &self.header().id
    }

    pub fn tag(&self) -> Tag {
        self.header().tag
    }

    pub fn status(&self) -> TaskStatus {
        self.header().status
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.header_mut().status = status;
    }

    /// Coerces a RUNNING status to PENDING and clears transient progress fields, per the
    /// persistence reload contract.
    pub fn coerce_for_reload(&mut self) {
        if self.status() == TaskStatus::Running {
            self.set_status(TaskStatus::Pending);
        }
        if let Task::Torrent(t) = self {
            t.info.clear();
        }
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

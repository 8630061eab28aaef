//! Wire types for the remote drive gateway (C1).

use serde::{Deserialize, Serialize};

/// A single entry returned by `file_list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    /// Ends in "folder" for directories, anything else for files.
    pub kind: String,
    pub parent_id: Option<String>,
}

impl RemoteFile {
    pub fn is_folder(&self) -> bool {
        self.kind.ends_with("folder")
    }
}

/// Response from `file_list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<RemoteFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Response from `get_download_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadUrlResponse {
    pub web_content_link: String,
}

/// Response from `create_folder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFolderResponse {
    pub file: CreatedFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedFile {
    pub id: String,
    pub name: String,
}

/// Response from `offline_download`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineDownloadResponse {
    pub task: OfflineTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineTask {
    pub id: String,
    #[serde(default)]
    pub file_id: Option<String>,
}

/// Status of an in-progress offline download, as reported by `get_task_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteDownloadPhase {
    NotFound,
    NotDownloading,
    Downloading,
    Done,
    Error,
}

impl RemoteDownloadPhase {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            RemoteDownloadPhase::NotFound
                | RemoteDownloadPhase::NotDownloading
                | RemoteDownloadPhase::Error
        )
    }

    pub fn is_done(self) -> bool {
        matches!(self, RemoteDownloadPhase::Done)
    }
}

/// Response from `get_task_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub phase: RemoteDownloadPhase,
    #[serde(default)]
    pub file_id: Option<String>,
}

/// Response from `offline_file_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineFileInfo {
    pub kind: String,
    pub parent_id: String,
    pub name: String,
}

impl OfflineFileInfo {
    pub fn is_folder(&self) -> bool {
        self.kind.ends_with("folder")
    }
}

/// Token bundle persisted to the on-disk login cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCache {
    pub username: String,
    pub password: String,
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub sub: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OfflineDownloadRequest<'a> {
    pub file_url: &'a str,
    pub parent_id: &'a str,
    pub name: &'a str,
}

//! Snapshot of all task queues to disk on shutdown, with reload + rehydration on startup (C9).

use crate::error::CoreError;
use crate::remote::types::TokenCache;
use crate::tasks::{Tag, Task};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Atomically writes `snapshot` to `path`: serialize to a temp file in the same directory,
/// then rename over the target. Mirrors the atomic-write idiom used for the token cache.
pub async fn save_snapshot(path: &Path, snapshot: &HashMap<Tag, Vec<Task>>) -> Result<(), CoreError> {
    let json = serde_json::to_vec_pretty(snapshot)?;
    atomic_write(path, &json).await
}

/// Best-effort load: a missing or corrupt snapshot yields an empty map and a logged warning,
/// never an error (startup should never fail because of a stale/broken snapshot file).
pub async fn load_snapshot(path: &Path) -> HashMap<Tag, Vec<Task>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read task snapshot, starting empty");
            return HashMap::new();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt task snapshot, starting empty");
            HashMap::new()
        }
    }
}

pub async fn save_token_cache(path: &Path, cache: &TokenCache) -> Result<(), CoreError> {
    let json = serde_json::to_vec_pretty(cache)?;
    atomic_write(path, &json).await
}

pub async fn load_token_cache(path: &Path) -> Option<TokenCache> {
    let bytes = tokio::fs::read(path).await.ok()?;
    serde_json::from_slice(&bytes).ok()
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), CoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;

    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("snapshot")
    ));
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{TaskHeader, TaskStatus, TorrentSubState, TorrentTask};

    fn sample_snapshot() -> HashMap<Tag, Vec<Task>> {
        let mut map = HashMap::new();
        map.insert(
            Tag::Torrent,
            vec![Task::Torrent(TorrentTask {
                header: TaskHeader {
                    id: "t1".to_string(),
                    tag: Tag::Torrent,
                    status: TaskStatus::Running,
                },
                torrent_status: TorrentSubState::RemoteDownloading,
                torrent: "magnet:?xt=urn:btih:abc".to_string(),
                remote_base_path: "/".to_string(),
                node_id: None,
                remote_task_id: Some("rt1".to_string()),
                name: "movie".to_string(),
                info: "3/5 (0|0)".to_string(),
            })],
        );
        map.insert(Tag::FileDownload, Vec::new());
        map
    }

    #[tokio::test]
    async fn round_trips_through_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        save_snapshot(&path, &sample_snapshot()).await.unwrap();

        let loaded = load_snapshot(&path).await;
        let torrents = &loaded[&Tag::Torrent];
        assert_eq!(torrents.len(), 1);
        assert_eq!(torrents[0].status(), TaskStatus::Running);
    }

    #[tokio::test]
    async fn missing_snapshot_loads_empty_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let loaded = load_snapshot(&path).await;
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn corrupt_snapshot_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let loaded = load_snapshot(&path).await;
        assert!(loaded.is_empty());
    }
}

//! File Download Pipeline (C8): per-file worker wrapping the local downloader gateway
//! with a poll/pause/resume loop.

use super::scheduler::Scheduler;
use super::{FileSubState, Task};
use crate::downloader::types::Aria2Status;
use crate::error::CoreError;
use std::rc::Rc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_secs(3);

pub async fn run(scheduler: Rc<Scheduler>, id: &str, token: CancellationToken) -> Result<(), CoreError> {
    loop {
        let sub = match scheduler.get(id) {
            Some(Task::FileDownload(t)) => t.file_status,
            _ => return Err(CoreError::TaskNotFound(id.to_string())),
        };

        match sub {
            FileSubState::Pending => submit(&scheduler, id, &token).await?,
            FileSubState::Downloading => poll_downloader(&scheduler, id, &token).await?,
            FileSubState::Done => return Ok(()),
        }
    }
}

async fn current_gid(scheduler: &Rc<Scheduler>, id: &str) -> Option<String> {
    match scheduler.get(id) {
        Some(Task::FileDownload(t)) => t.gid,
        _ => None,
    }
}

async fn pause_if_submitted(scheduler: &Rc<Scheduler>, id: &str) {
    if let Some(gid) = current_gid(scheduler, id).await {
        let _ = scheduler.downloader.pause(&gid).await;
    }
}

async fn submit(scheduler: &Rc<Scheduler>, id: &str, token: &CancellationToken) -> Result<(), CoreError> {
    let node_id = match scheduler.get(id) {
        Some(Task::FileDownload(t)) => t.node_id.clone(),
        _ => return Err(CoreError::TaskNotFound(id.to_string())),
    };
    let remote_path = match scheduler.get(id) {
        Some(Task::FileDownload(t)) => t.remote_path.clone(),
        _ => return Err(CoreError::TaskNotFound(id.to_string())),
    };

    let url = tokio::select! {
        result = scheduler.vfs.get_file_url_by_id(&node_id) => result?,
        _ = token.cancelled() => return Err(CoreError::Cancelled),
    };
    let url = url.ok_or_else(|| CoreError::NotFound(node_id.clone()))?;

    let gid = tokio::select! {
        result = scheduler.downloader.add_uri(&url, &remote_path) => result?,
        _ = token.cancelled() => return Err(CoreError::Cancelled),
    };

    scheduler.update_file_download(id, |t| {
        t.url = Some(url);
        t.gid = Some(gid);
        t.file_status = FileSubState::Downloading;
    });
    Ok(())
}

async fn poll_downloader(
    scheduler: &Rc<Scheduler>,
    id: &str,
    token: &CancellationToken,
) -> Result<(), CoreError> {
    let gid = current_gid(scheduler, id)
        .await
        .ok_or_else(|| CoreError::Unrecoverable("file download task missing gid in DOWNLOADING".into()))?;

    loop {
        let status = tokio::select! {
            result = scheduler.downloader.tell_status(&gid) => match result {
                Ok(s) => s,
                Err(CoreError::Cancelled) => {
                    pause_if_submitted(scheduler, id).await;
                    return Err(CoreError::Cancelled);
                }
                Err(e) => return Err(e),
            },
            _ = token.cancelled() => {
                pause_if_submitted(scheduler, id).await;
                return Err(CoreError::Cancelled);
            }
        };

        match status {
            Aria2Status::Complete => {
                scheduler.update_file_download(id, |t| t.file_status = FileSubState::Done);
                return Ok(());
            }
            Aria2Status::Paused => {
                let _ = scheduler.downloader.unpause(&gid).await;
            }
            Aria2Status::Removed | Aria2Status::Error => {
                return Err(CoreError::DownloaderTransient(format!("{status:?}")));
            }
            Aria2Status::Active | Aria2Status::Waiting => {}
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = token.cancelled() => {
                pause_if_submitted(scheduler, id).await;
                return Err(CoreError::Cancelled);
            }
        }
    }
}

//! Torrent Pipeline (C7): per-torrent supervisor implementing the three-stage protocol
//! and spawning file-download children.

use super::scheduler::Scheduler;
use super::{Task, TorrentSubState};
use crate::error::CoreError;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const INITIAL_BACKOFF: Duration = Duration::from_secs(3);
const BACKOFF_MULTIPLIER: f64 = 1.5;
const WAIT_LOOP_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(scheduler: Rc<Scheduler>, id: &str, token: CancellationToken) -> Result<(), CoreError> {
    loop {
        let sub = match scheduler.get(id) {
            Some(Task::Torrent(t)) => t.torrent_status,
            _ => return Err(CoreError::TaskNotFound(id.to_string())),
        };

        match sub {
            TorrentSubState::Pending => submit(&scheduler, id, &token).await?,
            TorrentSubState::RemoteDownloading => poll_remote(&scheduler, id, &token).await?,
            TorrentSubState::LocalDownloading => materialize_and_wait(&scheduler, id, &token).await?,
            TorrentSubState::Done => return Ok(()),
        }
    }
}

async fn cancellable<T, F>(fut: F, token: &CancellationToken) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    tokio::select! {
        result = fut => result,
        _ = token.cancelled() => Err(CoreError::Cancelled),
    }
}

fn propagate_cancel_to_children(scheduler: &Scheduler, owner_id: &str) {
    for child in scheduler.children_of(owner_id) {
        let _ = scheduler.stop(&child.header.id);
    }
}

async fn submit(scheduler: &Rc<Scheduler>, id: &str, token: &CancellationToken) -> Result<(), CoreError> {
    let (torrent, remote_base_path, name) = match scheduler.get(id) {
        Some(Task::Torrent(t)) => (t.torrent.clone(), t.remote_base_path.clone(), t.name.clone()),
        _ => return Err(CoreError::TaskNotFound(id.to_string())),
    };

    let parent_id = scheduler
        .vfs
        .resolve(&remote_base_path)
        .await?
        .ok_or_else(|| CoreError::NotFound(remote_base_path.clone()))?;

    let resp = match cancellable(
        scheduler.remote.offline_download(&torrent, &parent_id, &name),
        token,
    )
    .await
    {
        Ok(resp) => resp,
        Err(CoreError::Cancelled) => {
            propagate_cancel_to_children(scheduler, id);
            return Err(CoreError::Cancelled);
        }
        Err(e) => return Err(e),
    };

    scheduler.update_torrent(id, |t| {
        t.node_id = Some(resp.task.file_id.clone().unwrap_or_default());
        t.remote_task_id = Some(resp.task.id.clone());
        t.torrent_status = TorrentSubState::RemoteDownloading;
    });
    debug!(task_id = id, "torrent submitted to remote drive");
    Ok(())
}

async fn poll_remote(scheduler: &Rc<Scheduler>, id: &str, token: &CancellationToken) -> Result<(), CoreError> {
    let remote_task_id = match scheduler.get(id) {
        Some(Task::Torrent(t)) => t.remote_task_id.clone(),
        _ => return Err(CoreError::TaskNotFound(id.to_string())),
    };
    let remote_task_id = remote_task_id.ok_or_else(|| {
        CoreError::Unrecoverable("torrent task missing remote_task_id in REMOTE_DOWNLOADING".into())
    })?;

    let mut backoff = INITIAL_BACKOFF;
    loop {
        let status = match cancellable(scheduler.remote.get_task_status(&remote_task_id), token).await {
            Ok(s) => s,
            Err(CoreError::Cancelled) => {
                propagate_cancel_to_children(scheduler, id);
                return Err(CoreError::Cancelled);
            }
            Err(e) => return Err(e),
        };

        if status.phase.is_done() {
            if let Some(file_id) = status.file_id {
                scheduler.update_torrent(id, |t| t.node_id = Some(file_id));
            }
            scheduler.update_torrent(id, |t| t.torrent_status = TorrentSubState::LocalDownloading);
            return Ok(());
        }
        if status.phase.is_failure() {
            scheduler.update_torrent(id, |t| t.torrent_status = TorrentSubState::Pending);
            return Err(CoreError::RemoteTransient(format!("{:?}", status.phase)));
        }

        match tokio::select! {
            _ = tokio::time::sleep(backoff) => Ok(()),
            _ = token.cancelled() => Err(CoreError::Cancelled),
        } {
            Ok(()) => {}
            Err(CoreError::Cancelled) => {
                propagate_cancel_to_children(scheduler, id);
                return Err(CoreError::Cancelled);
            }
            Err(e) => return Err(e),
        }
        backoff = backoff.mul_f64(BACKOFF_MULTIPLIER);
    }
}

async fn materialize_and_wait(
    scheduler: &Rc<Scheduler>,
    id: &str,
    token: &CancellationToken,
) -> Result<(), CoreError> {
    let node_id = match scheduler.get(id) {
        Some(Task::Torrent(t)) => t.node_id.clone(),
        _ => return Err(CoreError::TaskNotFound(id.to_string())),
    };
    let node_id = node_id.ok_or_else(|| {
        CoreError::Unrecoverable("torrent task missing node_id in LOCAL_DOWNLOADING".into())
    })?;

    if let Err(CoreError::Cancelled) = cancellable(scheduler.vfs.update_node(&node_id), token).await {
        propagate_cancel_to_children(scheduler, id);
        return Err(CoreError::Cancelled);
    }

    let name = scheduler.vfs.node_name(&node_id).unwrap_or_default();

    if scheduler.vfs.is_dir_by_id(&node_id) {
        let files = match cancellable(scheduler.vfs.walk_files(&node_id), token).await {
            Ok(f) => f,
            Err(CoreError::Cancelled) => {
                propagate_cancel_to_children(scheduler, id);
                return Err(CoreError::Cancelled);
            }
            Err(e) => return Err(e),
        };
        for (rel_path, file_id) in files {
            let remote_path = format!("{name}/{rel_path}");
            scheduler.enqueue_file_download(&file_id, &remote_path, id);
        }
    } else {
        scheduler.enqueue_file_download(&node_id, &name, id);
    }

    wait_for_children(scheduler, id, token).await?;
    scheduler.update_torrent(id, |t| t.torrent_status = TorrentSubState::Done);
    Ok(())
}

async fn wait_for_children(
    scheduler: &Rc<Scheduler>,
    id: &str,
    token: &CancellationToken,
) -> Result<(), CoreError> {
    use super::TaskStatus;

    loop {
        let children = scheduler.children_of(id);
        let all = children.len();
        let paused = children
            .iter()
            .filter(|c| c.header.status == TaskStatus::Paused)
            .count();
        let error = children
            .iter()
            .filter(|c| c.header.status == TaskStatus::Error)
            .count();
        let not_completed = children
            .iter()
            .filter(|c| matches!(c.header.status, TaskStatus::Pending | TaskStatus::Running))
            .count();
        let running = all.saturating_sub(not_completed).saturating_sub(paused).saturating_sub(error);

        scheduler.update_torrent(id, |t| {
            t.info = format!("{running}/{all} ({paused}|{error})");
        });

        if not_completed > 0 {
            // keep waiting
        } else if error > 0 {
            return Err(CoreError::Unrecoverable(format!(
                "{error} file download(s) failed"
            )));
        } else if paused > 0 {
            propagate_cancel_to_children(scheduler, id);
            return Err(CoreError::Cancelled);
        } else {
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(WAIT_LOOP_INTERVAL) => {}
            _ = token.cancelled() => {
                propagate_cancel_to_children(scheduler, id);
                return Err(CoreError::Cancelled);
            }
        }
    }
}

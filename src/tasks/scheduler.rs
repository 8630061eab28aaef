//! Bounded-concurrency dispatcher (C6): promotes PENDING tasks to RUNNING per tag,
//! owns cancellation tokens, and rehydrates/persists queues across restarts.

use super::{
    file_download, new_id, torrent, FileDownloadTask, FileSubState, Tag, Task, TaskHeader,
    TaskStatus, TorrentSubState, TorrentTask,
};
use crate::config::SchedulerConfig;
use crate::downloader::LocalDownloaderGateway;
use crate::error::CoreError;
use crate::remote::RemoteDriveGateway;
use crate::vfs::Vfs;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct Scheduler {
    pub vfs: Rc<Vfs>,
    pub remote: Rc<RemoteDriveGateway>,
    pub downloader: Rc<LocalDownloaderGateway>,
    tasks: RefCell<HashMap<String, Task>>,
    queues: RefCell<HashMap<Tag, Vec<String>>>,
    handles: RefCell<HashMap<String, JoinHandle<()>>>,
    cancel_tokens: RefCell<HashMap<String, CancellationToken>>,
    torrent_concurrency: usize,
    file_download_concurrency: usize,
    tick: Duration,
    supervisor_cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        vfs: Rc<Vfs>,
        remote: Rc<RemoteDriveGateway>,
        downloader: Rc<LocalDownloaderGateway>,
        config: &SchedulerConfig,
    ) -> Rc<Self> {
        let mut queues = HashMap::new();
        queues.insert(Tag::Torrent, Vec::new());
        queues.insert(Tag::FileDownload, Vec::new());

        Rc::new(Scheduler {
            vfs,
            remote,
            downloader,
            tasks: RefCell::new(HashMap::new()),
            queues: RefCell::new(queues),
            handles: RefCell::new(HashMap::new()),
            cancel_tokens: RefCell::new(HashMap::new()),
            torrent_concurrency: config.torrent_concurrency,
            file_download_concurrency: config.file_download_concurrency,
            tick: Duration::from_millis(config.tick_millis),
            supervisor_cancel: CancellationToken::new(),
        })
    }

    pub fn cap_for(&self, tag: Tag) -> usize {
        match tag {
            Tag::Torrent => self.torrent_concurrency,
            Tag::FileDownload => self.file_download_concurrency,
        }
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.borrow().get(task_id).cloned()
    }

    pub fn query(&self, tag: Option<Tag>, status: Option<TaskStatus>) -> Vec<Task> {
        let tasks = self.tasks.borrow();
        let queues = self.queues.borrow();
        let tags = match tag {
            Some(t) => vec![t],
            None => vec![Tag::Torrent, Tag::FileDownload],
        };
        let mut out = Vec::new();
        for t in tags {
            if let Some(ids) = queues.get(&t) {
                for id in ids {
                    if let Some(task) = tasks.get(id) {
                        if status.map(|s| task.status() == s).unwrap_or(true) {
                            out.push(task.clone());
                        }
                    }
                }
            }
        }
        out
    }

    pub fn stop(&self, task_id: &str) -> Result<(), CoreError> {
        let exists = self.tasks.borrow().contains_key(task_id);
        if !exists {
            return Err(CoreError::TaskNotFound(task_id.to_string()));
        }
        if let Some(token) = self.cancel_tokens.borrow().get(task_id) {
            token.cancel();
        }
        Ok(())
    }

    pub fn resume(&self, task_id: &str) -> Result<(), CoreError> {
        let mut tasks = self.tasks.borrow_mut();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| CoreError::TaskNotFound(task_id.to_string()))?;
        if matches!(task.status(), TaskStatus::Paused | TaskStatus::Error) {
            task.set_status(TaskStatus::Pending);
        }
        Ok(())
    }

    fn insert_and_queue(&self, task: Task) {
        let tag = task.tag();
        let id = task.id().to_string();
        self.tasks.borrow_mut().insert(id.clone(), task);
        self.queues.borrow_mut().get_mut(&tag).unwrap().push(id);
    }

    pub fn create_torrent_task(&self, torrent: &str, remote_base_path: &str) -> String {
        let id = new_id();
        let task = Task::Torrent(TorrentTask {
            header: TaskHeader {
                id: id.clone(),
                tag: Tag::Torrent,
                status: TaskStatus::Pending,
            },
            torrent_status: TorrentSubState::Pending,
            torrent: torrent.to_string(),
            remote_base_path: remote_base_path.to_string(),
            node_id: None,
            remote_task_id: None,
            name: torrent.to_string(),
            info: String::new(),
        });
        self.insert_and_queue(task);
        id
    }

    /// Constructs (or finds) a "pull" TorrentTask rooted directly at an already-materialized
    /// VFS node, entering the state machine at LOCAL_DOWNLOADING.
    pub fn pull_remote(&self, node_id: &str, name: &str) -> String {
        if let Some(existing) = self.find_pull_task(node_id) {
            return existing;
        }
        let id = new_id();
        let task = Task::Torrent(TorrentTask {
            header: TaskHeader {
                id: id.clone(),
                tag: Tag::Torrent,
                status: TaskStatus::Pending,
            },
            torrent_status: TorrentSubState::LocalDownloading,
            torrent: String::new(),
            remote_base_path: String::new(),
            node_id: Some(node_id.to_string()),
            remote_task_id: None,
            name: name.to_string(),
            info: String::new(),
        });
        self.insert_and_queue(task);
        id
    }

    fn find_pull_task(&self, node_id: &str) -> Option<String> {
        self.tasks.borrow().values().find_map(|t| match t {
            Task::Torrent(tt) if tt.torrent.is_empty() && tt.node_id.as_deref() == Some(node_id) => {
                Some(tt.header.id.clone())
            }
            _ => None,
        })
    }

    /// Enqueues a FileDownloadTask, deduplicating on `(node_id, owner_id)`. If a matching
    /// task already exists and is PAUSED or ERROR, resets it to PENDING instead of creating
    /// a duplicate.
    pub fn enqueue_file_download(&self, node_id: &str, remote_path: &str, owner_id: &str) -> String {
        if let Some(existing_id) = self.find_file_download(node_id, owner_id) {
            let mut tasks = self.tasks.borrow_mut();
            if let Some(task) = tasks.get_mut(&existing_id) {
                if matches!(task.status(), TaskStatus::Paused | TaskStatus::Error) {
                    task.set_status(TaskStatus::Pending);
                }
            }
            return existing_id;
        }
        let id = new_id();
        let task = Task::FileDownload(FileDownloadTask {
            header: TaskHeader {
                id: id.clone(),
                tag: Tag::FileDownload,
                status: TaskStatus::Pending,
            },
            file_status: FileSubState::Pending,
            node_id: node_id.to_string(),
            remote_path: remote_path.to_string(),
            owner_id: owner_id.to_string(),
            gid: None,
            url: None,
        });
        self.insert_and_queue(task);
        id
    }

    fn find_file_download(&self, node_id: &str, owner_id: &str) -> Option<String> {
        self.tasks.borrow().values().find_map(|t| match t {
            Task::FileDownload(ft) if ft.node_id == node_id && ft.owner_id == owner_id => {
                Some(ft.header.id.clone())
            }
            _ => None,
        })
    }

    pub fn children_of(&self, owner_id: &str) -> Vec<FileDownloadTask> {
        self.tasks
            .borrow()
            .values()
            .filter_map(|t| match t {
                Task::FileDownload(ft) if ft.owner_id == owner_id => Some(ft.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn update_torrent<F: FnOnce(&mut TorrentTask)>(&self, id: &str, f: F) {
        if let Some(Task::Torrent(t)) = self.tasks.borrow_mut().get_mut(id) {
            f(t);
        }
    }

    pub fn update_file_download<F: FnOnce(&mut FileDownloadTask)>(&self, id: &str, f: F) {
        if let Some(Task::FileDownload(t)) = self.tasks.borrow_mut().get_mut(id) {
            f(t);
        }
    }

    /// Replaces all queues/tasks with a reloaded snapshot, coercing RUNNING to PENDING.
    pub fn load_snapshot(&self, snapshot: HashMap<Tag, Vec<Task>>) {
        let mut tasks = self.tasks.borrow_mut();
        let mut queues = self.queues.borrow_mut();
        tasks.clear();
        for (tag, entry) in queues.iter_mut() {
            entry.clear();
            if let Some(loaded) = snapshot.get(tag) {
                for mut task in loaded.clone() {
                    task.coerce_for_reload();
                    entry.push(task.id().to_string());
                    tasks.insert(task.id().to_string(), task);
                }
            }
        }
    }

    /// Dumps the current queues for serialization, in insertion order.
    pub fn snapshot(&self) -> HashMap<Tag, Vec<Task>> {
        let tasks = self.tasks.borrow();
        let queues = self.queues.borrow();
        queues
            .iter()
            .map(|(tag, ids)| {
                let entries = ids
                    .iter()
                    .filter_map(|id| tasks.get(id).cloned())
                    .collect();
                (*tag, entries)
            })
            .collect()
    }

    fn handle_is_live(&self, task_id: &str) -> bool {
        self.handles
            .borrow()
            .get(task_id)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Starts the supervisor coroutine on the current `LocalSet`. Must be called from
    /// within a `LocalSet`/`spawn_local` context.
    pub fn start(self: &Rc<Self>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::task::spawn_local(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(scheduler.tick) => scheduler.tick_once(),
                    _ = scheduler.supervisor_cancel.cancelled() => break,
                }
            }
        })
    }

    pub fn request_stop(&self) {
        self.supervisor_cancel.cancel();
    }

    fn tick_once(self: &Rc<Self>) {
        for tag in [Tag::Torrent, Tag::FileDownload] {
            self.tick_tag(tag);
        }
    }

    fn tick_tag(self: &Rc<Self>, tag: Tag) {
        let cap = self.cap_for(tag);
        let ids: Vec<String> = self.queues.borrow().get(&tag).cloned().unwrap_or_default();
        let mut running = ids
            .iter()
            .filter(|id| self.handle_is_live(id))
            .count();

        for id in ids {
            if running >= cap {
                break;
            }
            let eligible = self
                .tasks
                .borrow()
                .get(&id)
                .map(|t| t.status() == TaskStatus::Pending)
                .unwrap_or(false)
                && !self.handle_is_live(&id);
            if !eligible {
                continue;
            }

            let token = CancellationToken::new();
            self.cancel_tokens.borrow_mut().insert(id.clone(), token.clone());
            debug!(task_id = %id, tag = tag.as_str(), "promoting task");

            let scheduler = self.clone();
            let task_id = id.clone();
            let handle = tokio::task::spawn_local(async move {
                worker_wrapper(scheduler, task_id, token).await;
            });
            self.handles.borrow_mut().insert(id, handle);
            running += 1;
        }
    }
}

async fn worker_wrapper(scheduler: Rc<Scheduler>, task_id: String, token: CancellationToken) {
    let tag = match scheduler.get(&task_id) {
        Some(t) if t.status() == TaskStatus::Pending => t.tag(),
        _ => return,
    };

    if let Some(t) = scheduler.tasks.borrow_mut().get_mut(&task_id) {
        t.set_status(TaskStatus::Running);
    }

    let result = match tag {
        Tag::Torrent => torrent::run(scheduler.clone(), &task_id, token).await,
        Tag::FileDownload => file_download::run(scheduler.clone(), &task_id, token).await,
    };

    let final_status = match result {
        Ok(()) => {
            debug!(task_id = %task_id, "task done");
            TaskStatus::Done
        }
        Err(CoreError::Cancelled) => {
            debug!(task_id = %task_id, "task paused by cancellation");
            TaskStatus::Paused
        }
        Err(ref e) => {
            error!(task_id = %task_id, error = %e, "task errored");
            TaskStatus::Error
        }
    };

    if let Some(t) = scheduler.tasks.borrow_mut().get_mut(&task_id) {
        t.set_status(final_status);
    }
    scheduler.cancel_tokens.borrow_mut().remove(&task_id);
}

pub fn log_persistence_outcome(result: &Result<(), CoreError>) {
    match result {
        Ok(()) => info!("task snapshot persisted"),
        Err(e) => error!(error = %e, "failed to persist task snapshot"),
    }
}

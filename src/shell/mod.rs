//! Command shell (A3): a minimal line-oriented dispatcher implementing the command table.

pub mod bridge;

use crate::config::PersistenceConfig;
use crate::error::CoreError;
use crate::persistence;
use crate::remote::types::TokenCache;
use crate::remote::RemoteDriveGateway;
use crate::tasks::scheduler::Scheduler;
use crate::tasks::{Tag, Task, TaskStatus};
use crate::vfs::Vfs;
use std::rc::Rc;

pub struct Context {
    pub vfs: Rc<Vfs>,
    pub scheduler: Rc<Scheduler>,
    pub remote: Rc<RemoteDriveGateway>,
    pub persistence: PersistenceConfig,
    pub cached_credentials: Option<(String, String)>,
}

/// Outcome of dispatching one line: either a response to print, or a request to end the shell.
pub enum Outcome {
    Reply(String),
    Exit,
}

pub async fn dispatch(ctx: &mut Context, line: &str) -> Outcome {
    let line = line.trim();
    if line.is_empty() {
        return Outcome::Reply(String::new());
    }
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    match cmd {
        "exit" | "quit" => Outcome::Exit,
        "help" => Outcome::Reply(help_text()),
        _ => Outcome::Reply(run_command(ctx, cmd, &args).await),
    }
}

async fn run_command(ctx: &mut Context, cmd: &str, args: &[&str]) -> String {
    let result: Result<String, CoreError> = match cmd {
        "login" => login(ctx, args).await,
        "ls" => ls(ctx, args).await,
        "cd" => cd(ctx, args).await,
        "cwd" => Ok(ctx.vfs.get_cwd()),
        "rm" => rm(ctx, args).await,
        "mkdir" => mkdir(ctx, args).await,
        "download" => download(ctx, args).await,
        "pull" => pull(ctx, args).await,
        "query" => query(ctx, args),
        "pause" => pause(ctx, args),
        "resume" => resume(ctx, args),
        other => Err(CoreError::InvalidCommand(other.to_string())),
    };

    match result {
        Ok(s) => s,
        Err(e) => format!("error: {e}"),
    }
}

async fn login(ctx: &mut Context, args: &[&str]) -> Result<String, CoreError> {
    let (username, password) = match (args.first(), args.get(1)) {
        (Some(u), Some(p)) => (u.to_string(), p.to_string()),
        _ => ctx
            .cached_credentials
            .clone()
            .ok_or_else(|| CoreError::InvalidCommand("login: no cached credentials, pass <user> <pass>".into()))?,
    };

    let resp = ctx.remote.login(&username, &password).await?;
    ctx.cached_credentials = Some((username.clone(), password.clone()));

    let cache = TokenCache {
        username,
        password,
        access_token: resp.access_token,
        refresh_token: resp.refresh_token,
        user_id: resp.sub,
    };
    persistence::save_token_cache(&ctx.persistence.token_cache_path, &cache).await?;
    Ok("logged in".to_string())
}

async fn ls(ctx: &Context, args: &[&str]) -> Result<String, CoreError> {
    let path = args.first().copied().unwrap_or("");
    let names = ctx.vfs.list_children(path, true).await?;
    Ok(names.join("\n"))
}

async fn cd(ctx: &Context, args: &[&str]) -> Result<String, CoreError> {
    let path = args.first().copied().unwrap_or("/");
    ctx.vfs.set_cwd(path).await?;
    Ok(ctx.vfs.get_cwd())
}

async fn rm(ctx: &Context, args: &[&str]) -> Result<String, CoreError> {
    if args.is_empty() {
        return Err(CoreError::InvalidCommand("rm: missing path".into()));
    }
    let paths: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    ctx.vfs.delete(&paths).await?;
    Ok(format!("removed {} path(s)", paths.len()))
}

async fn mkdir(ctx: &Context, args: &[&str]) -> Result<String, CoreError> {
    let path = args
        .first()
        .ok_or_else(|| CoreError::InvalidCommand("mkdir: missing path".into()))?;
    ctx.vfs.make_dir(path).await?;
    Ok(format!("created {path}"))
}

async fn download(ctx: &Context, args: &[&str]) -> Result<String, CoreError> {
    let torrent = args
        .first()
        .ok_or_else(|| CoreError::InvalidCommand("download: missing torrent/url".into()))?;
    let cwd = ctx.vfs.get_cwd();
    let id = ctx.scheduler.create_torrent_task(torrent, &cwd);
    Ok(id)
}

async fn pull(ctx: &Context, args: &[&str]) -> Result<String, CoreError> {
    let path = args
        .first()
        .ok_or_else(|| CoreError::InvalidCommand("pull: missing path".into()))?;
    let node_id = ctx
        .vfs
        .resolve(path)
        .await?
        .ok_or_else(|| CoreError::NotFound(path.to_string()))?;
    let name = ctx.vfs.node_name(&node_id).unwrap_or_default();
    let id = ctx.scheduler.pull_remote(&node_id, &name);
    Ok(id)
}

fn query(ctx: &Context, args: &[&str]) -> Result<String, CoreError> {
    let mut tag = None;
    let mut status = None;
    let mut i = 0;
    while i < args.len() {
        match args[i] {
            "-t" => {
                let v = args.get(i + 1).ok_or_else(|| {
                    CoreError::InvalidCommand("query: -t requires a value".into())
                })?;
                tag = Some(match *v {
                    "torrent" => Tag::Torrent,
                    "file" => Tag::FileDownload,
                    other => return Err(CoreError::InvalidCommand(format!("query: unknown tag {other}"))),
                });
                i += 2;
            }
            "-f" => {
                let v = args.get(i + 1).ok_or_else(|| {
                    CoreError::InvalidCommand("query: -f requires a value".into())
                })?;
                status = Some(TaskStatus::from_query_filter(v).ok_or_else(|| {
                    CoreError::InvalidCommand(format!("query: unknown status {v}"))
                })?);
                i += 2;
            }
            other => return Err(CoreError::InvalidCommand(format!("query: unexpected argument {other}"))),
        }
    }

    let tasks = ctx.scheduler.query(tag, status);
    if tasks.is_empty() {
        return Ok("(no tasks)".to_string());
    }
    Ok(tasks.iter().map(format_task_row).collect::<Vec<_>>().join("\n"))
}

fn format_task_row(task: &Task) -> String {
    match task {
        Task::Torrent(t) => format!(
            "{}\tTORRENT\t{:?}\t{:?}\t{}\t{}",
            t.header.id, t.header.status, t.torrent_status, t.name, t.info
        ),
        Task::FileDownload(t) => format!(
            "{}\tFILE_DOWNLOAD\t{:?}\t{:?}\t{}",
            t.header.id, t.header.status, t.file_status, t.remote_path
        ),
    }
}

fn pause(ctx: &Context, args: &[&str]) -> Result<String, CoreError> {
    let id = args
        .first()
        .ok_or_else(|| CoreError::InvalidCommand("pause: missing task id".into()))?;
    ctx.scheduler.stop(id)?;
    Ok(format!("pausing {id}"))
}

fn resume(ctx: &Context, args: &[&str]) -> Result<String, CoreError> {
    let id = args
        .first()
        .ok_or_else(|| CoreError::InvalidCommand("resume: missing task id".into()))?;
    ctx.scheduler.resume(id)?;
    Ok(format!("resuming {id}"))
}

fn help_text() -> String {
    [
        "login [user] [pass]   authenticate against the remote drive",
        "ls [path]             list a directory's children",
        "cd [path]             change the working directory",
        "cwd                   print the working directory",
        "rm path...            move one or more paths to trash",
        "mkdir path            create a directory",
        "download <uri>        submit a torrent/url for offline download into cwd",
        "pull <path>           re-download an already-materialized node",
        "query [-t tag] [-f status]   list tasks",
        "pause <task_id>       request cooperative cancellation of a task",
        "resume <task_id>      re-enqueue a paused/errored task",
        "help                  show this text",
        "exit, quit            persist task state and exit",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::downloader::LocalDownloaderGateway;

    fn context() -> Context {
        let remote = Rc::new(RemoteDriveGateway::new("http://localhost:1".to_string(), None).unwrap());
        let downloader = Rc::new(LocalDownloaderGateway::new(
            "http://localhost:1/jsonrpc".to_string(),
            "secret".to_string(),
            "/downloads".to_string(),
        ));
        let vfs = Rc::new(Vfs::new(remote.clone()));
        let scheduler = Scheduler::new(vfs.clone(), remote.clone(), downloader, &SchedulerConfig::default());
        Context {
            vfs,
            scheduler,
            remote,
            persistence: crate::config::PersistenceConfig::default(),
            cached_credentials: None,
        }
    }

    #[tokio::test]
    async fn cwd_reports_root_initially() {
        let ctx = context();
        assert_eq!(ctx.vfs.get_cwd(), "/");
    }

    #[tokio::test]
    async fn query_with_no_tasks_reports_empty() {
        let ctx = context();
        let out = query(&ctx, &[]).unwrap();
        assert_eq!(out, "(no tasks)");
    }

    #[tokio::test]
    async fn download_enqueues_a_torrent_task_and_returns_its_id() {
        let ctx = context();
        let out = download(&ctx, &["magnet:?xt=urn:btih:abc"]).await.unwrap();
        assert!(!out.is_empty());
        assert!(ctx.scheduler.get(&out).is_some());
    }

    #[tokio::test]
    async fn unknown_command_is_reported_as_invalid() {
        let mut ctx = context();
        let reply = run_command(&mut ctx, "frobnicate", &[]).await;
        assert!(reply.starts_with("error:"));
    }

    #[tokio::test]
    async fn login_without_cached_credentials_errors() {
        let mut ctx = context();
        let result = login(&mut ctx, &[]).await;
        assert!(result.is_err());
    }
}

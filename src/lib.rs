//! # pikpakfs
//!
//! A command-driven client that exposes a remote cloud-storage account as an in-memory
//! virtual filesystem and orchestrates a two-stage pipeline: first landing an external
//! resource (a torrent or URL) in the remote drive via its offline-download API, then
//! retrieving each resulting file through a local downloader.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Command shell (stdin)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │ mpsc + oneshot
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Single-threaded async core (LocalSet)           │
//! │  ┌──────────┐  ┌───────────┐  ┌──────────────────────────┐  │
//! │  │   VFS    │  │ Scheduler │  │ Torrent / FileDownload    │  │
//! │  │ (Rc/RefCell) │ (C6)    │  │ pipelines (C7/C8)         │  │
//! │  └──────────┘  └───────────┘  └──────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                     │                          │
//!                     ▼                          ▼
//!          Remote Drive Gateway (C1)   Local Downloader Gateway (C2)
//!             HTTP + JSON                 JSON-RPC 2.0 over HTTP
//! ```
//!
//! ## Modules
//!
//! - [`config`] — layered configuration (defaults, TOML file, env vars, CLI flags)
//! - [`error`] — the consolidated [`error::CoreError`] type
//! - [`remote`] — the remote drive gateway (C1)
//! - [`downloader`] — the local downloader gateway (C2)
//! - [`vfs`] — the virtual filesystem (C3/C4)
//! - [`tasks`] — the task model, scheduler, and pipelines (C5–C8)
//! - [`persistence`] — task snapshot and token cache persistence (C9)
//! - [`shell`] — the command shell (A3)
//!
//! ## Concurrency model
//!
//! All core state (the VFS node map, task queues, cwd) is mutated exclusively from a
//! single `tokio::task::LocalSet` running on a current-thread runtime, so it is held in
//! `Rc<RefCell<_>>` rather than `Arc<Mutex<_>>` — no lock is required. Console I/O is
//! bridged in from a dedicated OS thread (see [`shell::bridge`]) so the main loop is never
//! blocked by a synchronous stdin read.

pub mod config;
pub mod downloader;
pub mod error;
pub mod persistence;
pub mod remote;
pub mod shell;
pub mod tasks;
pub mod vfs;

pub use config::{CliArgs, Config};
pub use error::{CoreError, CoreResult};

use crate::downloader::LocalDownloaderGateway;
use crate::remote::RemoteDriveGateway;
use crate::tasks::scheduler::Scheduler;
use crate::vfs::Vfs;
use anyhow::{Context as _, Result};
use std::rc::Rc;
use tokio::task::LocalSet;

/// Runs the core: reloads persisted state, starts the scheduler, and drives the command
/// shell until `exit`/`quit` or EOF on stdin. Must be called from within a `LocalSet`.
pub async fn run(config: Config) -> Result<()> {
    tracing::info!(operation = "startup", "pikpakfs starting");
    tracing::debug!(config = ?config, "configuration loaded");

    let remote = Rc::new(
        RemoteDriveGateway::new(config.remote.base_url.clone(), config.remote.proxy.clone())
            .context("failed to construct remote drive gateway")?,
    );
    let downloader = Rc::new(LocalDownloaderGateway::new(
        config.downloader.rpc_url.clone(),
        config.downloader.rpc_secret.clone(),
        config.downloader.base_path.clone(),
    ));
    let vfs = Rc::new(Vfs::new(remote.clone()));
    let scheduler = Scheduler::new(vfs.clone(), remote.clone(), downloader, &config.scheduler);

    let cached_credentials = if let Some(cache) =
        persistence::load_token_cache(&config.persistence.token_cache_path).await
    {
        remote.set_access_token(cache.access_token).await;
        Some((cache.username, cache.password))
    } else {
        match (&config.remote.username, &config.remote.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        }
    };

    let snapshot = persistence::load_snapshot(&config.persistence.snapshot_path).await;
    scheduler.load_snapshot(snapshot);

    let supervisor = scheduler.start();

    let mut ctx = shell::Context {
        vfs,
        scheduler: scheduler.clone(),
        remote,
        persistence: config.persistence.clone(),
        cached_credentials,
    };

    let mut stdin_rx = shell::bridge::spawn_stdin_bridge();
    while let Some(request) = stdin_rx.recv().await {
        match shell::dispatch(&mut ctx, &request.line).await {
            shell::Outcome::Reply(text) => {
                let _ = request.reply.send(text);
            }
            shell::Outcome::Exit => {
                let _ = request.reply.send("bye".to_string());
                break;
            }
        }
    }

    scheduler.request_stop();
    supervisor.await.ok();
    let snapshot = scheduler.snapshot();
    let result = persistence::save_snapshot(&config.persistence.snapshot_path, &snapshot).await;
    tasks::scheduler::log_persistence_outcome(&result);
    result?;

    Ok(())
}

/// Runs [`run`] inside a dedicated current-thread runtime with a `LocalSet`, for callers
/// (such as `main`) that are not already inside one.
pub fn run_blocking(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let local = LocalSet::new();
    local.block_on(&runtime, run(config))
}

//! Sync-to-async bridge: a dedicated OS thread blocks on stdin reads and pairs each
//! line with a oneshot reply channel, submitted to the single-threaded async core over
//! an unbounded channel. Mirrors the reference client's FUSE worker bridge with the
//! requester/responder roles reversed: the blocking side originates requests here.

use std::io::BufRead;
use tokio::sync::{mpsc, oneshot};

pub struct CommandRequest {
    pub line: String,
    pub reply: oneshot::Sender<String>,
}

/// Spawns the blocking stdin-reading thread and returns the receiver the async core
/// drains. The thread exits (dropping the sender) on EOF, which signals the core to stop.
pub fn spawn_stdin_bridge() -> mpsc::UnboundedReceiver<CommandRequest> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx
                .send(CommandRequest {
                    line,
                    reply: reply_tx,
                })
                .is_err()
            {
                break;
            }
            // Block this thread until the core has produced a response, so prompts stay
            // strictly ordered with the input that produced them.
            if let Ok(response) = reply_rx.blocking_recv() {
                println!("{response}");
            }
        }
    });

    rx
}

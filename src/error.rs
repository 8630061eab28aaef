use thiserror::Error;

/// A single validation issue surfaced while checking a [`crate::config::Config`].
///
/// Contains the field name that failed validation and a description of the issue.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Unified error type for the core (VFS, task engine, gateways, configuration).
///
/// Consolidating every error kind into one enum lets the scheduler's worker
/// wrapper classify failures with a single `is_transient()` call instead of
/// matching on error types from several modules.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    // === Input errors (surfaced to the command caller, no task state change) ===
    /// Path did not resolve to any node.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// Target of `cd`/`mkdir`'s parent is not a directory.
    #[error("not a directory: {0}")]
    NotDirectory(String),

    /// `mkdir` was given an empty leaf name.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// `rm` targeted cwd or one of its ancestors.
    #[error("refusing to delete an ancestor of the current directory")]
    DeleteAncestor,

    /// Malformed command input from the shell.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    // === Gateway / remote errors ===
    /// The remote drive reported the offline task as not found, not downloading, or errored.
    #[error("remote download failed: {0}")]
    RemoteTransient(String),

    /// The local downloader reported the gid as removed or errored.
    #[error("local download failed: {0}")]
    DownloaderTransient(String),

    /// An HTTP request to a gateway failed outright.
    #[error("request to {gateway} failed: {message}")]
    HttpError { gateway: &'static str, message: String },

    /// A gateway response could not be decoded.
    #[error("failed to decode gateway response: {0}")]
    DecodeError(String),

    /// Authentication against the remote drive failed.
    #[error("login failed: {0}")]
    AuthenticationError(String),

    // === Task engine ===
    /// Cooperative cancellation observed at a suspension point.
    #[error("task cancelled")]
    Cancelled,

    /// A condition that must not be retried automatically.
    #[error("unrecoverable: {0}")]
    Unrecoverable(String),

    /// Referenced task id is not present in any queue.
    #[error("no such task: {0}")]
    TaskNotFound(String),

    // === Configuration ===
    /// Configuration file could not be read.
    #[error("failed to read config file: {0}")]
    ReadError(String),

    /// Configuration file could not be parsed.
    #[error("failed to parse config: {0}")]
    ParseError(String),

    /// One or more configuration fields failed validation.
    #[error("invalid configuration: {}", .0.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; "))]
    ValidationError(Vec<ValidationIssue>),

    // === I/O ===
    /// Local filesystem I/O failure (token cache, snapshot file).
    #[error("I/O error: {0}")]
    IoError(String),
}

impl CoreError {
    /// Whether a retry (user-initiated via `resume`) is likely to succeed.
    ///
    /// Mirrors the propagation policy in the spec: transient gateway failures
    /// and cancellation both resolve to a resumable state, everything else
    /// surfaces as ERROR with no special handling.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::RemoteTransient(_)
                | CoreError::DownloaderTransient(_)
                | CoreError::HttpError { .. }
                | CoreError::Cancelled
        )
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(err.to_string()),
            _ => CoreError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DecodeError(err.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        CoreError::HttpError {
            gateway: if err.url().map(|u| u.as_str().contains("jsonrpc")).unwrap_or(false) {
                "downloader"
            } else {
                "remote"
            },
            message: err.to_string(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CoreError::RemoteTransient("x".into()).is_transient());
        assert!(CoreError::DownloaderTransient("x".into()).is_transient());
        assert!(CoreError::Cancelled.is_transient());
        assert!(!CoreError::NotFound("x".into()).is_transient());
        assert!(!CoreError::Unrecoverable("x".into()).is_transient());
    }

    #[test]
    fn validation_error_display_joins_issues() {
        let err = CoreError::ValidationError(vec![
            ValidationIssue {
                field: "remote.base_url".into(),
                message: "cannot be empty".into(),
            },
            ValidationIssue {
                field: "scheduler.torrent_concurrency".into(),
                message: "must be greater than 0".into(),
            },
        ]);
        let display = format!("{}", err);
        assert!(display.contains("remote.base_url: cannot be empty"));
        assert!(display.contains("scheduler.torrent_concurrency: must be greater than 0"));
    }
}

use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinError;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("repository config name is empty")]
    NameEmpty,
    #[error("repository config {0:?} name already exists")]
    DuplicateName(String),
    #[error("repository config {name:?} address is empty")]
    AddressEmpty { name: String },
    #[error("repository config address {0:?} is unsupported")]
    AddressUnsupported(String),
    #[error("repository config {repo:?} webhook {webhook:?} is invalid: {reason}")]
    InvalidWebhook {
        repo: String,
        webhook: String,
        reason: String,
    },
    #[error("repository config {name:?} sets depth {depth}, above the supported maximum")]
    DepthOutOfRange { name: String, depth: u32 },
    #[error("repository config {name:?} sets a shallow depth on a local address")]
    ShallowLocal { name: String },
    #[error("repository {0:?} not found")]
    NotFound(String),
    #[error("config error: could not load config file '{path}' - {source}")]
    Config { path: String, source: std::io::Error },
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not read private key '{}' - {source}", .path.display())]
    KeyUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("private key '{}' is malformed", .path.display())]
    KeyMalformed { path: PathBuf },
    #[error("cannot fast-forward branch '{branch}', local history diverged")]
    NotFastForward { branch: String },
    #[error(
        "working copy at '{}' has a detached HEAD and no branch is configured",
        .path.display()
    )]
    DetachedHead { path: PathBuf },
    #[error("task join error: {0}")]
    Join(#[from] JoinError),
}

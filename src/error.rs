use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum XocopyError {
    #[error("{0}")]
    Message(String),
    #[error("ledger: {0}")]
    Ledger(LedgerError),
    #[error("{0}")]
    Mount(MountError),
    #[error("{0}")]
    Media(MediaError),
    #[error("{0}")]
    Config(ConfigError),
    #[error("{0}")]
    Recover(RecoverError),
    #[error("upstream: {0}")]
    Upstream(UpstreamError),
    #[error("not enough space on {}: need {needed}, have {available} bytes", .path.display())]
    InsufficientSpace {
        path: PathBuf,
        needed: u64,
        available: u64,
    },
    #[error("{0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("schema: {0}")]
    Schema(String),
    #[error("encode payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MountError {
    #[error("mount helper {0} does not exist")]
    HelperMissing(PathBuf),
    #[error("mount {0}")]
    MountFailure(String),
    #[error("umount {0}")]
    UmountFailure(String),
    #[error("{0} timed out")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("no authorized USB device connected")]
    NoAuthorizedDevice,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("parse config: {0}")]
    Parse(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum RecoverError {
    #[error("encryption key not found for file {0}")]
    NotFound(String),
    #[error("destination directory {} does not exist", .0.display())]
    DestinationMissing(PathBuf),
    #[error("refusing to decrypt {} over itself", .0.display())]
    SameFile(PathBuf),
    #[error("corrupt ciphertext in {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Command(String),
    #[error("{0} timed out")]
    Timeout(String),
    #[error("decode job logs: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Run,
    Job,
    Artifact,
}

pub type Result<T> = std::result::Result<T, XocopyError>;

impl XocopyError {
    pub fn message(msg: impl Into<String>) -> Self {
        XocopyError::Message(msg.into())
    }

    pub fn scope(&self) -> ErrorScope {
        match self {
            XocopyError::Ledger(_) => ErrorScope::Run,
            XocopyError::Mount(MountError::HelperMissing(_)) => ErrorScope::Artifact,
            XocopyError::Mount(_) => ErrorScope::Run,
            XocopyError::Media(_) => ErrorScope::Run,
            XocopyError::Config(_) => ErrorScope::Run,
            XocopyError::InsufficientSpace { .. } => ErrorScope::Job,
            _ => ErrorScope::Artifact,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            XocopyError::Upstream(UpstreamError::Timeout(_))
                | XocopyError::Upstream(UpstreamError::Command(_))
        )
    }
}

impl From<LedgerError> for XocopyError {
    fn from(err: LedgerError) -> Self {
        XocopyError::Ledger(err)
    }
}

impl From<rusqlite::Error> for XocopyError {
    fn from(err: rusqlite::Error) -> Self {
        XocopyError::Ledger(LedgerError::Sqlite(err))
    }
}

impl From<MountError> for XocopyError {
    fn from(err: MountError) -> Self {
        XocopyError::Mount(err)
    }
}

impl From<MediaError> for XocopyError {
    fn from(err: MediaError) -> Self {
        XocopyError::Media(err)
    }
}

impl From<ConfigError> for XocopyError {
    fn from(err: ConfigError) -> Self {
        XocopyError::Config(err)
    }
}

impl From<RecoverError> for XocopyError {
    fn from(err: RecoverError) -> Self {
        XocopyError::Recover(err)
    }
}

impl From<UpstreamError> for XocopyError {
    fn from(err: UpstreamError) -> Self {
        XocopyError::Upstream(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_failures_stop_the_run() {
        let err: XocopyError = LedgerError::Schema("bad".to_string()).into();
        assert_eq!(err.scope(), ErrorScope::Run);
    }

    #[test]
    fn missing_helper_only_skips_artifact() {
        let err: XocopyError = MountError::HelperMissing(PathBuf::from("/bin/nope")).into();
        assert_eq!(err.scope(), ErrorScope::Artifact);
        let err: XocopyError = MountError::Timeout("gocryptfs".to_string()).into();
        assert_eq!(err.scope(), ErrorScope::Run);
    }

    #[test]
    fn space_errors_abort_the_job() {
        let err = XocopyError::InsufficientSpace {
            path: PathBuf::from("/tmp/usb/backup"),
            needed: 10,
            available: 1,
        };
        assert_eq!(err.scope(), ErrorScope::Job);
        assert_eq!(
            err.to_string(),
            "not enough space on /tmp/usb/backup: need 10, have 1 bytes"
        );
    }
}

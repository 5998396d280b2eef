use floe_vault::VaultError;

/// Errors returned by the upload and download coordinators.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("directories are not supported")]
    DirectoryNotSupported,

    #[error("part size must be greater than zero")]
    InvalidPartSize,

    #[error("part ({0}) range is invalid")]
    InvalidPartRange(String),

    #[error("file size mismatch: part ({range}) starts beyond the {size}-byte file")]
    FileSizeMismatch { range: String, size: u64 },

    #[error("part size mismatch: configured {configured}, remote {remote}")]
    PartSizeMismatch { configured: u64, remote: u64 },

    #[error("could not compute hashes of {0}")]
    HashUnavailable(String),

    #[error("{0} action is not supported")]
    UnsupportedAction(String),

    #[error("the job is not succeeded yet")]
    JobNotReady,

    #[error("the job is failed: {0}")]
    JobFailed(String),

    #[error("job status is unexpected: {0}")]
    UnexpectedJobStatus(String),

    #[error("the retrieved range must be tree-hash aligned")]
    MissingTreeHash,

    #[error("the job does not report an archive size")]
    MissingArchiveSize,

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("could not write {0} bytes to the file")]
    ShortWrite(u64),

    #[error("background task failed: {0}")]
    Task(String),
}

impl EngineError {
    /// Whether the same call may succeed later without any change on the
    /// caller's side. Only a retrieval job that is still running qualifies.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::JobNotReady)
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

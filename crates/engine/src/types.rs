use std::path::PathBuf;

use floe_transfer::DEFAULT_PART_SIZE;
use floe_vault::DEFAULT_ACCOUNT_ID;

/// Options for a multi-part upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInput {
    /// Account that owns the vault, or `"-"` for the caller's own account.
    pub account_id: String,
    pub vault_name: String,
    /// File to upload.
    pub file_name: PathBuf,
    /// Upload to resume. A new upload is initiated when `None`.
    pub upload_id: Option<String>,
    /// Size of every part except the last, in bytes.
    pub part_size: u64,
}

impl Default for UploadInput {
    fn default() -> Self {
        Self {
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            vault_name: String::new(),
            file_name: PathBuf::new(),
            upload_id: None,
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

/// Options for a ranged download of a retrieval job's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadInput {
    /// Account that owns the vault, or `"-"` for the caller's own account.
    pub account_id: String,
    pub vault_name: String,
    /// Destination file. Must not exist yet.
    pub file_name: PathBuf,
    /// Retrieval job whose output is downloaded.
    pub job_id: String,
    /// Size of every part except the last, in bytes.
    pub part_size: u64,
}

impl Default for DownloadInput {
    fn default() -> Self {
        Self {
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            vault_name: String::new(),
            file_name: PathBuf::new(),
            job_id: String::new(),
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Upload id used, either initiated or resumed.
    pub upload_id: String,
    pub archive_id: String,
    pub location: String,
    pub archive_size: u64,
    pub tree_hash: String,
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub archive_size: u64,
    pub tree_hash: String,
}

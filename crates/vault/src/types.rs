//! Request and response types of the vault service.

use std::fmt;

use floe_transfer::Range;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateMultipartUploadRequest {
    pub account_id: String,
    pub vault_name: String,
    /// Size of every part except the last, in bytes.
    pub part_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPartsRequest {
    pub account_id: String,
    pub vault_name: String,
    pub upload_id: String,
    /// Opaque position returned by the previous page.
    pub marker: Option<String>,
    /// Maximum number of parts per page; the service picks when `None`.
    pub limit: Option<usize>,
}

/// A part as recorded by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartListElement {
    /// Inclusive byte range text, e.g. `0-1048575`. Not validated by the service.
    pub range_in_bytes: String,
    /// Hex tree hash of the stored bytes.
    pub sha256_tree_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPartsOutput {
    /// Part size the upload was initiated with.
    pub part_size_in_bytes: u64,
    pub parts: Vec<PartListElement>,
    /// Present when more pages remain.
    pub marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMultipartPartRequest {
    pub account_id: String,
    pub vault_name: String,
    pub upload_id: String,
    pub range: Range,
    /// Hex tree hash of `body`.
    pub checksum: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteMultipartUploadRequest {
    pub account_id: String,
    pub vault_name: String,
    pub upload_id: String,
    pub archive_size: u64,
    /// Hex tree hash of the whole archive.
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteMultipartUploadOutput {
    pub archive_id: String,
    pub location: String,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeJobRequest {
    pub account_id: String,
    pub vault_name: String,
    pub job_id: String,
}

/// Kind of work a job performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobAction {
    ArchiveRetrieval,
    InventoryRetrieval,
    Other(String),
}

impl From<String> for JobAction {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ArchiveRetrieval" => Self::ArchiveRetrieval,
            "InventoryRetrieval" => Self::InventoryRetrieval,
            _ => Self::Other(s),
        }
    }
}

impl From<JobAction> for String {
    fn from(action: JobAction) -> Self {
        action.to_string()
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArchiveRetrieval => f.write_str("ArchiveRetrieval"),
            Self::InventoryRetrieval => f.write_str("InventoryRetrieval"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
    Other(String),
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "InProgress" => Self::InProgress,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Other(s),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => f.write_str("InProgress"),
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Failed => f.write_str("Failed"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescription {
    pub job_id: String,
    pub action: JobAction,
    pub status_code: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_size_in_bytes: Option<u64>,
    /// Absent when the retrieved range is not tree-hash aligned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_tree_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetJobOutputRequest {
    pub account_id: String,
    pub vault_name: String,
    pub job_id: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    pub body: Vec<u8>,
    /// Tree hash of `body`, sent only for tree-hash aligned ranges.
    pub checksum: Option<String>,
}

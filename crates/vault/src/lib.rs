//! Archival vault client interface.
//!
//! The transfer engine talks to the archival service only through the
//! [`VaultClient`] trait, which covers the six calls multi-part upload and
//! ranged retrieval need. The wire protocol behind it belongs to the
//! implementation; [`LocalVault`] is a directory-backed implementation used
//! by the CLI and the test suite.

pub mod client;
pub mod error;
pub mod local;
pub mod pager;
pub mod types;

pub use client::{VaultClient, VaultFuture};
pub use error::VaultError;
pub use local::LocalVault;
pub use pager::PartPager;
pub use types::{
    CompleteMultipartUploadOutput, CompleteMultipartUploadRequest, DescribeJobRequest,
    GetJobOutputRequest, InitiateMultipartUploadRequest, JobAction, JobDescription, JobOutput,
    JobStatus, ListPartsOutput, ListPartsRequest, PartListElement, UploadMultipartPartRequest,
};

/// Account id meaning "the account of the authenticated caller".
pub const DEFAULT_ACCOUNT_ID: &str = "-";

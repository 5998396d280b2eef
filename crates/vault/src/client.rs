//! The remote-service capability the engine depends on.

use std::future::Future;
use std::pin::Pin;

use crate::error::VaultError;
use crate::types::{
    CompleteMultipartUploadOutput, CompleteMultipartUploadRequest, DescribeJobRequest,
    GetJobOutputRequest, InitiateMultipartUploadRequest, JobDescription, JobOutput,
    ListPartsOutput, ListPartsRequest, UploadMultipartPartRequest,
};

/// Boxed future returned by every [`VaultClient`] call.
pub type VaultFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, VaultError>> + Send + 'a>>;

/// Abstract connection to an archival vault service.
///
/// Requests are owned so implementations can move them into the returned
/// future. Implementations must be shareable across the worker tasks of a
/// single transfer.
pub trait VaultClient: Send + Sync {
    /// Starts a multi-part upload and returns its upload id.
    fn initiate_multipart_upload(
        &self,
        req: InitiateMultipartUploadRequest,
    ) -> VaultFuture<'_, String>;

    /// Returns one page of the parts stored under an upload.
    ///
    /// Follow [`ListPartsOutput::marker`] to fetch the next page; see
    /// [`PartPager`](crate::PartPager).
    fn list_parts(&self, req: ListPartsRequest) -> VaultFuture<'_, ListPartsOutput>;

    /// Stores one part of an upload.
    fn upload_multipart_part(&self, req: UploadMultipartPartRequest) -> VaultFuture<'_, ()>;

    /// Assembles the stored parts into an archive after verifying its tree hash.
    fn complete_multipart_upload(
        &self,
        req: CompleteMultipartUploadRequest,
    ) -> VaultFuture<'_, CompleteMultipartUploadOutput>;

    /// Describes a job.
    fn describe_job(&self, req: DescribeJobRequest) -> VaultFuture<'_, JobDescription>;

    /// Fetches a byte range of a job's output.
    fn get_job_output(&self, req: GetJobOutputRequest) -> VaultFuture<'_, JobOutput>;
}

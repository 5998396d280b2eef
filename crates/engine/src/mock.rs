//! Scripted vault client for coordinator tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use floe_transfer::{TREE_HASH_CHUNK_SIZE, tree_hash_bytes};
use floe_vault::{
    CompleteMultipartUploadOutput, CompleteMultipartUploadRequest, DescribeJobRequest,
    GetJobOutputRequest, InitiateMultipartUploadRequest, JobAction, JobDescription, JobOutput,
    JobStatus, ListPartsOutput, ListPartsRequest, PartListElement, UploadMultipartPartRequest,
    VaultClient, VaultError, VaultFuture,
};

pub(crate) const UPLOAD_ID: &str = "upload-1";
pub(crate) const LOCATION: &str = "/-/vaults/v/archives/a1";

/// Records every call and answers from scripted state.
#[derive(Default)]
pub(crate) struct MockVault {
    pub initiate_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
    pub output_calls: AtomicUsize,

    pub fail_initiate: bool,
    /// Part size reported by the empty page served once `pages` runs out.
    pub part_size: u64,
    /// Pages served by `list_parts`, front first.
    pub pages: Mutex<VecDeque<Result<ListPartsOutput, VaultError>>>,
    /// Offsets whose upload fails.
    pub fail_offsets: HashSet<u64>,
    /// Every successfully uploaded part.
    pub uploaded: Mutex<Vec<UploadMultipartPartRequest>>,
    pub completed: Mutex<Vec<CompleteMultipartUploadRequest>>,
    pub fail_complete: bool,

    pub job: Option<JobDescription>,
    /// Bytes served by `get_job_output`.
    pub archive: Vec<u8>,
    /// Offsets whose output loses its last byte.
    pub short_offsets: HashSet<u64>,
    /// Offsets whose output carries a wrong checksum.
    pub bad_checksum_offsets: HashSet<u64>,
    /// Offsets whose output body is corrupted but still carries no checksum.
    pub corrupt_offsets: HashSet<u64>,
}

impl MockVault {
    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn with_part_size(part_size: u64) -> Self {
        Self {
            part_size,
            ..Self::default()
        }
    }

    pub fn with_pages(part_size: u64, pages: Vec<Result<ListPartsOutput, VaultError>>) -> Self {
        Self {
            part_size,
            pages: Mutex::new(pages.into()),
            ..Self::default()
        }
    }

    pub fn with_job(job: JobDescription, archive: Vec<u8>) -> Self {
        Self {
            job: Some(job),
            archive,
            ..Self::default()
        }
    }
}

pub(crate) fn page(part_size: u64, parts: &[(&str, &str)], marker: Option<&str>) -> ListPartsOutput {
    ListPartsOutput {
        part_size_in_bytes: part_size,
        parts: parts
            .iter()
            .map(|(range, hash)| PartListElement {
                range_in_bytes: range.to_string(),
                sha256_tree_hash: hash.to_string(),
            })
            .collect(),
        marker: marker.map(str::to_string),
    }
}

pub(crate) fn retrieval_job(status: JobStatus, size: u64, tree_hash: Option<String>) -> JobDescription {
    JobDescription {
        job_id: "job-1".into(),
        action: JobAction::ArchiveRetrieval,
        status_code: status,
        status_message: None,
        archive_id: Some("a1".into()),
        archive_size_in_bytes: Some(size),
        sha256_tree_hash: tree_hash,
    }
}

fn transport<T: Send + 'static>(what: &str) -> VaultFuture<'static, T> {
    let message = format!("{what} failed");
    Box::pin(async move { Err(VaultError::Transport(message)) })
}

impl VaultClient for MockVault {
    fn initiate_multipart_upload(
        &self,
        _req: InitiateMultipartUploadRequest,
    ) -> VaultFuture<'_, String> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initiate {
            return transport("initiate");
        }
        Box::pin(async { Ok(UPLOAD_ID.to_string()) })
    }

    fn list_parts(&self, _req: ListPartsRequest) -> VaultFuture<'_, ListPartsOutput> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.pages.lock().unwrap().pop_front();
        let part_size = self.part_size;
        Box::pin(async move { next.unwrap_or_else(|| Ok(page(part_size, &[], None))) })
    }

    fn upload_multipart_part(&self, req: UploadMultipartPartRequest) -> VaultFuture<'_, ()> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_offsets.contains(&req.range.offset) {
            return transport("upload");
        }
        Box::pin(async move {
            self.uploaded.lock().unwrap().push(req);
            Ok(())
        })
    }

    fn complete_multipart_upload(
        &self,
        req: CompleteMultipartUploadRequest,
    ) -> VaultFuture<'_, CompleteMultipartUploadOutput> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_complete {
            return transport("complete");
        }
        Box::pin(async move {
            let checksum = req.checksum.clone();
            self.completed.lock().unwrap().push(req);
            Ok(CompleteMultipartUploadOutput {
                archive_id: "a1".into(),
                location: LOCATION.into(),
                checksum,
            })
        })
    }

    fn describe_job(&self, _req: DescribeJobRequest) -> VaultFuture<'_, JobDescription> {
        match self.job.clone() {
            Some(job) => Box::pin(async move { Ok(job) }),
            None => transport("describe"),
        }
    }

    fn get_job_output(&self, req: GetJobOutputRequest) -> VaultFuture<'_, JobOutput> {
        self.output_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let range = req.range;
            let start = range.offset as usize;
            let end = (range.end() as usize).min(self.archive.len());
            let mut body = self.archive[start..end].to_vec();

            let mut checksum = if range.offset % TREE_HASH_CHUNK_SIZE as u64 == 0 {
                tree_hash_bytes(&body)
            } else {
                None
            };
            if self.short_offsets.contains(&range.offset) {
                body.pop();
            }
            if self.bad_checksum_offsets.contains(&range.offset) {
                checksum = tree_hash_bytes(b"something else");
            }
            if self.corrupt_offsets.contains(&range.offset) {
                checksum = None;
                if let Some(first) = body.first_mut() {
                    *first ^= 0xff;
                }
            }
            Ok(JobOutput { body, checksum })
        })
    }
}

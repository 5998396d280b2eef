//! Directory-backed vault.
//!
//! Emulates the archival service on the local filesystem so the engine can
//! be exercised end to end without network access. Layout under the root:
//!
//! ```text
//! <account>/<vault>/uploads/<upload-id>/session.json
//! <account>/<vault>/uploads/<upload-id>/parts/<offset>.part
//! <account>/<vault>/uploads/<upload-id>/parts/<offset>.json
//! <account>/<vault>/archives/<archive-id>
//! <account>/<vault>/archives/<archive-id>.json
//! <account>/<vault>/jobs/<job-id>.json
//! ```
//!
//! Retrieval jobs complete immediately: [`LocalVault::initiate_retrieval`]
//! records a succeeded job.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use floe_transfer::{
    Range, SectionReader, TREE_HASH_CHUNK_SIZE, compute_tree_hash, read_exact_at, tree_hash_bytes,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::DEFAULT_ACCOUNT_ID;
use crate::client::{VaultClient, VaultFuture};
use crate::error::VaultError;
use crate::types::{
    CompleteMultipartUploadOutput, CompleteMultipartUploadRequest, DescribeJobRequest,
    GetJobOutputRequest, InitiateMultipartUploadRequest, JobAction, JobDescription, JobOutput,
    JobStatus, ListPartsOutput, ListPartsRequest, PartListElement, UploadMultipartPartRequest,
};

/// Account directory used when the caller passes [`DEFAULT_ACCOUNT_ID`].
pub const LOCAL_ACCOUNT_ID: &str = "local";

/// Parts per `list_parts` page unless the request asks for fewer.
pub const DEFAULT_PAGE_LIMIT: usize = 1000;

const MIN_PART_SIZE: u64 = 1024 * 1024;
const MAX_PART_SIZE: u64 = 4 * 1024 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    part_size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PartRecord {
    offset: u64,
    length: u64,
    tree_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveRecord {
    size: u64,
    tree_hash: String,
}

/// A vault service rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalVault {
    root: PathBuf,
    page_limit: usize,
}

impl LocalVault {
    /// Creates a vault rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, VaultError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            page_limit: DEFAULT_PAGE_LIMIT,
        })
    }

    /// Sets how many parts a `list_parts` page holds at most.
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Creates a retrieval job for an archive and returns its job id.
    ///
    /// The job is immediately `Succeeded` and carries the archive's size and
    /// tree hash.
    pub async fn initiate_retrieval(
        &self,
        account_id: &str,
        vault_name: &str,
        archive_id: &str,
    ) -> Result<String, VaultError> {
        let vault_dir = self.vault_dir(account_id, vault_name)?;
        let archive_id = checked_component("archive id", archive_id)?.to_string();
        blocking(move || {
            let archive: ArchiveRecord =
                read_json(&archive_meta_path(&vault_dir, &archive_id), || {
                    format!("archive {archive_id}")
                })?;

            let job_id = new_id();
            let job = JobDescription {
                job_id: job_id.clone(),
                action: JobAction::ArchiveRetrieval,
                status_code: JobStatus::Succeeded,
                status_message: None,
                archive_id: Some(archive_id.clone()),
                archive_size_in_bytes: Some(archive.size),
                sha256_tree_hash: Some(archive.tree_hash),
            };
            let jobs_dir = vault_dir.join("jobs");
            fs::create_dir_all(&jobs_dir)?;
            write_json(&jobs_dir.join(format!("{job_id}.json")), &job)?;

            info!(job_id = %job_id, archive_id = %archive_id, "retrieval job created");
            Ok(job_id)
        })
        .await
    }

    fn vault_dir(&self, account_id: &str, vault_name: &str) -> Result<PathBuf, VaultError> {
        let account = if account_id == DEFAULT_ACCOUNT_ID {
            LOCAL_ACCOUNT_ID
        } else {
            checked_component("account id", account_id)?
        };
        let vault = checked_component("vault name", vault_name)?;
        Ok(self.root.join(account).join(vault))
    }

    fn upload_dir(
        &self,
        account_id: &str,
        vault_name: &str,
        upload_id: &str,
    ) -> Result<PathBuf, VaultError> {
        let upload = checked_component("upload id", upload_id)?;
        Ok(self
            .vault_dir(account_id, vault_name)?
            .join("uploads")
            .join(upload))
    }
}

impl VaultClient for LocalVault {
    fn initiate_multipart_upload(
        &self,
        req: InitiateMultipartUploadRequest,
    ) -> VaultFuture<'_, String> {
        Box::pin(async move {
            validate_part_size(req.part_size)?;
            let vault_dir = self.vault_dir(&req.account_id, &req.vault_name)?;
            blocking(move || {
                let upload_id = new_id();
                let dir = vault_dir.join("uploads").join(&upload_id);
                fs::create_dir_all(dir.join("parts"))?;
                write_json(
                    &dir.join("session.json"),
                    &SessionRecord {
                        part_size: req.part_size,
                    },
                )?;
                info!(upload_id = %upload_id, part_size = req.part_size, "multipart upload initiated");
                Ok(upload_id)
            })
            .await
        })
    }

    fn list_parts(&self, req: ListPartsRequest) -> VaultFuture<'_, ListPartsOutput> {
        Box::pin(async move {
            let dir = self.upload_dir(&req.account_id, &req.vault_name, &req.upload_id)?;
            let limit = req.limit.unwrap_or(self.page_limit).clamp(1, self.page_limit);
            blocking(move || {
                let session = read_session(&dir, &req.upload_id)?;
                let start = match req.marker.as_deref() {
                    Some(marker) => marker.parse::<u64>().map_err(|_| {
                        VaultError::InvalidRequest(format!("invalid marker: {marker}"))
                    })?,
                    None => 0,
                };

                let records = read_parts(&dir)?;
                let mut page: Vec<PartRecord> = records
                    .into_iter()
                    .filter(|p| p.offset >= start)
                    .take(limit + 1)
                    .collect();
                let marker = if page.len() > limit {
                    page.pop().map(|next| next.offset.to_string())
                } else {
                    None
                };

                Ok(ListPartsOutput {
                    part_size_in_bytes: session.part_size,
                    parts: page
                        .into_iter()
                        .map(|p| PartListElement {
                            range_in_bytes: format!("{}-{}", p.offset, p.offset + p.length - 1),
                            sha256_tree_hash: p.tree_hash,
                        })
                        .collect(),
                    marker,
                })
            })
            .await
        })
    }

    fn upload_multipart_part(&self, req: UploadMultipartPartRequest) -> VaultFuture<'_, ()> {
        Box::pin(async move {
            let dir = self.upload_dir(&req.account_id, &req.vault_name, &req.upload_id)?;
            blocking(move || {
                let session = read_session(&dir, &req.upload_id)?;
                let range = req.range;

                if range.offset % session.part_size != 0 {
                    return Err(VaultError::InvalidRequest(format!(
                        "range {range} is not aligned to part size {}",
                        session.part_size
                    )));
                }
                if range.length > session.part_size {
                    return Err(VaultError::InvalidRequest(format!(
                        "range {range} is larger than part size {}",
                        session.part_size
                    )));
                }
                if req.body.len() as u64 != range.length {
                    return Err(VaultError::InvalidRequest(format!(
                        "body has {} bytes, range {range} expects {}",
                        req.body.len(),
                        range.length
                    )));
                }

                let actual = tree_hash_bytes(&req.body).unwrap_or_default();
                if actual != req.checksum {
                    return Err(VaultError::ChecksumMismatch {
                        expected: req.checksum,
                        actual,
                    });
                }

                let parts_dir = dir.join("parts");
                write_atomic(&parts_dir.join(part_file(range.offset, "part")), &req.body)?;
                write_json(
                    &parts_dir.join(part_file(range.offset, "json")),
                    &PartRecord {
                        offset: range.offset,
                        length: range.length,
                        tree_hash: actual,
                    },
                )?;
                debug!(upload_id = %req.upload_id, %range, "part stored");
                Ok(())
            })
            .await
        })
    }

    fn complete_multipart_upload(
        &self,
        req: CompleteMultipartUploadRequest,
    ) -> VaultFuture<'_, CompleteMultipartUploadOutput> {
        Box::pin(async move {
            let vault_dir = self.vault_dir(&req.account_id, &req.vault_name)?;
            let dir = self.upload_dir(&req.account_id, &req.vault_name, &req.upload_id)?;
            let account = if req.account_id == DEFAULT_ACCOUNT_ID {
                LOCAL_ACCOUNT_ID.to_string()
            } else {
                req.account_id.clone()
            };
            blocking(move || {
                let session = read_session(&dir, &req.upload_id)?;
                let parts = read_parts(&dir)?;
                check_coverage(&parts, session.part_size, req.archive_size)?;

                let archives_dir = vault_dir.join("archives");
                fs::create_dir_all(&archives_dir)?;
                let archive_id = new_id();
                let archive_path = archives_dir.join(&archive_id);
                let tmp_path = archives_dir.join(format!("{archive_id}.tmp"));

                let assembled = assemble_archive(
                    &dir.join("parts"),
                    &parts,
                    &tmp_path,
                    req.archive_size,
                    &req.checksum,
                )
                .and_then(|actual| {
                    fs::rename(&tmp_path, &archive_path)?;
                    Ok(actual)
                });
                if assembled.is_err() {
                    let _ = fs::remove_file(&tmp_path);
                }
                let actual = assembled?;

                write_json(
                    &archive_meta_path(&vault_dir, &archive_id),
                    &ArchiveRecord {
                        size: req.archive_size,
                        tree_hash: actual.clone(),
                    },
                )?;
                fs::remove_dir_all(&dir)?;

                let location = format!(
                    "/{account}/vaults/{}/archives/{archive_id}",
                    req.vault_name
                );
                info!(upload_id = %req.upload_id, archive_id = %archive_id, "multipart upload completed");
                Ok(CompleteMultipartUploadOutput {
                    archive_id,
                    location,
                    checksum: actual,
                })
            })
            .await
        })
    }

    fn describe_job(&self, req: DescribeJobRequest) -> VaultFuture<'_, JobDescription> {
        Box::pin(async move {
            let vault_dir = self.vault_dir(&req.account_id, &req.vault_name)?;
            let job_id = checked_component("job id", &req.job_id)?.to_string();
            blocking(move || {
                read_json(&vault_dir.join("jobs").join(format!("{job_id}.json")), || {
                    format!("job {job_id}")
                })
            })
            .await
        })
    }

    fn get_job_output(&self, req: GetJobOutputRequest) -> VaultFuture<'_, JobOutput> {
        Box::pin(async move {
            let vault_dir = self.vault_dir(&req.account_id, &req.vault_name)?;
            let job_id = checked_component("job id", &req.job_id)?.to_string();
            blocking(move || {
                let job: JobDescription =
                    read_json(&vault_dir.join("jobs").join(format!("{job_id}.json")), || {
                        format!("job {job_id}")
                    })?;
                if job.status_code != JobStatus::Succeeded {
                    return Err(VaultError::InvalidRequest(format!(
                        "job {job_id} is {}",
                        job.status_code
                    )));
                }
                let Some(archive_id) = job.archive_id else {
                    return Err(VaultError::InvalidRequest(format!(
                        "job {job_id} has no archive output"
                    )));
                };

                let size = job.archive_size_in_bytes.unwrap_or(0);
                let range = req.range;
                if range.end() > size {
                    return Err(VaultError::InvalidRequest(format!(
                        "range {range} is outside archive of {size} bytes"
                    )));
                }

                let file = File::open(vault_dir.join("archives").join(&archive_id))?;
                let body = read_exact_at(&file, range)?;
                let checksum = if range.offset % TREE_HASH_CHUNK_SIZE as u64 == 0 {
                    tree_hash_bytes(&body)
                } else {
                    None
                };
                Ok(JobOutput { body, checksum })
            })
            .await
        })
    }
}

async fn blocking<T, F>(f: F) -> Result<T, VaultError>
where
    F: FnOnce() -> Result<T, VaultError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VaultError::Transport(format!("task join error: {e}")))?
}

fn validate_part_size(part_size: u64) -> Result<(), VaultError> {
    let valid = (MIN_PART_SIZE..=MAX_PART_SIZE).contains(&part_size)
        && (part_size / MIN_PART_SIZE).is_power_of_two()
        && part_size % MIN_PART_SIZE == 0;
    if valid {
        Ok(())
    } else {
        Err(VaultError::InvalidRequest(format!(
            "part size {part_size} must be 1 MiB times a power of two, at most 4 GiB"
        )))
    }
}

// Stored parts must tile [0, archive_size) with full-size parts and one
// optional shorter tail.
fn check_coverage(parts: &[PartRecord], part_size: u64, archive_size: u64) -> Result<(), VaultError> {
    let mut expected = 0;
    for (i, part) in parts.iter().enumerate() {
        if part.offset != expected {
            return Err(VaultError::InvalidRequest(format!(
                "archive is incomplete: missing bytes at offset {expected}"
            )));
        }
        let is_last = i + 1 == parts.len();
        if !is_last && part.length != part_size {
            return Err(VaultError::InvalidRequest(format!(
                "part at offset {} has {} bytes, expected {part_size}",
                part.offset, part.length
            )));
        }
        expected += part.length;
    }
    if expected != archive_size {
        return Err(VaultError::InvalidRequest(format!(
            "archive size mismatch: parts cover {expected} bytes, request says {archive_size}"
        )));
    }
    Ok(())
}

fn checked_component<'a>(kind: &str, value: &'a str) -> Result<&'a str, VaultError> {
    let valid = !value.is_empty()
        && value.len() <= 255
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(value)
    } else {
        Err(VaultError::InvalidRequest(format!("invalid {kind}: {value:?}")))
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn part_file(offset: u64, ext: &str) -> String {
    format!("{offset:020}.{ext}")
}

/// Concatenates the stored parts into `tmp_path` and checks the result
/// against `checksum`. Returns the computed tree hash.
fn assemble_archive(
    parts_dir: &Path,
    parts: &[PartRecord],
    tmp_path: &Path,
    archive_size: u64,
    checksum: &str,
) -> Result<String, VaultError> {
    let mut out = File::create(tmp_path)?;
    for part in parts {
        let mut input = File::open(parts_dir.join(part_file(part.offset, "part")))?;
        io::copy(&mut input, &mut out)?;
    }
    out.sync_all()?;
    drop(out);

    let assembled = File::open(tmp_path)?;
    let whole = Range::new(0, archive_size)
        .ok_or_else(|| VaultError::InvalidRequest("archive size must be positive".into()))?;
    let actual = compute_tree_hash(&mut SectionReader::new(&assembled, whole))?.unwrap_or_default();
    if actual != checksum {
        return Err(VaultError::ChecksumMismatch {
            expected: checksum.to_string(),
            actual,
        });
    }
    Ok(actual)
}

fn archive_meta_path(vault_dir: &Path, archive_id: &str) -> PathBuf {
    vault_dir.join("archives").join(format!("{archive_id}.json"))
}

fn read_session(dir: &Path, upload_id: &str) -> Result<SessionRecord, VaultError> {
    read_json(&dir.join("session.json"), || format!("upload {upload_id}"))
}

/// Part records sorted by offset.
fn read_parts(dir: &Path) -> Result<Vec<PartRecord>, VaultError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir.join("parts"))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            names.push(path);
        }
    }
    names.sort();

    names
        .iter()
        .map(|path| Ok(serde_json::from_slice(&fs::read(path)?)?))
        .collect()
}

fn read_json<T, F>(path: &Path, what: F) -> Result<T, VaultError>
where
    T: for<'de> Deserialize<'de>,
    F: FnOnce() -> String,
{
    match fs::read(path) {
        Ok(data) => Ok(serde_json::from_slice(&data)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(VaultError::NotFound(what())),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), VaultError> {
    write_atomic(path, &serde_json::to_vec_pretty(value)?)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), VaultError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
